//! Text Extractor: turns uploaded document bytes into one ordered text blob.
//!
//! PDF pages are concatenated in page order; DOCX paragraphs and tables are
//! concatenated in body order. No OCR: image-only documents fail with
//! `EmptyDocument` rather than yielding an empty record downstream.
//!
//! Extraction is CPU-bound. Async callers must run it inside
//! `tokio::task::spawn_blocking`.

pub mod docx;
pub mod pdf;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }

    /// Maps an extension (`"pdf"`, `".DOCX"`) to a supported format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime {
            "application/pdf" => Some(DocumentFormat::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentFormat::Docx)
            }
            _ => None,
        }
    }

    /// Magic-byte sniffing. A bare `PK` header only says "zip"; the DOCX
    /// reader rejects zips without `word/document.xml`.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(DocumentFormat::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(DocumentFormat::Docx)
        } else {
            None
        }
    }

    /// Resolves the format of an upload: filename extension first, then the
    /// declared content type, then magic bytes. A filename with an
    /// unsupported extension is rejected outright.
    pub fn resolve(
        filename: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, ExtractionError> {
        if let Some(name) = filename.filter(|n| n.contains('.')) {
            return Self::from_filename(name).ok_or_else(|| {
                let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
                ExtractionError::UnsupportedFormat(ext.to_ascii_lowercase())
            });
        }
        content_type
            .and_then(Self::from_content_type)
            .or_else(|| Self::sniff(bytes))
            .ok_or_else(|| {
                ExtractionError::UnsupportedFormat(
                    content_type.unwrap_or("unknown").to_string(),
                )
            })
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A hyperlink recovered from the document: its display text and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hyperlink {
    pub text: String,
    pub url: String,
}

/// Plain text pulled out of one uploaded document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub format: DocumentFormat,
    /// Byte length of the source document.
    pub source_len: usize,
    pub text: String,
    /// Hyperlink targets in document order (DOCX only).
    pub hyperlinks: Vec<Hyperlink>,
}

impl ExtractedText {
    pub fn extracted_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported document format '{0}' (expected pdf or docx)")]
    UnsupportedFormat(String),

    #[error("{format} document could not be read: {detail}")]
    CorruptDocument {
        format: DocumentFormat,
        detail: String,
    },

    #[error("no extractable text found in {format} document")]
    EmptyDocument { format: DocumentFormat },
}

/// Extracts text for a declared format tag such as `"pdf"` or `"docx"`.
pub fn extract(bytes: &[u8], declared_format: &str) -> Result<ExtractedText, ExtractionError> {
    let format = DocumentFormat::from_extension(declared_format)
        .ok_or_else(|| ExtractionError::UnsupportedFormat(declared_format.to_string()))?;
    extract_as(bytes, format)
}

/// Extracts text from a document whose format is already resolved.
fn extract_as(bytes: &[u8], format: DocumentFormat) -> Result<ExtractedText, ExtractionError> {
    let (raw, hyperlinks) = match format {
        DocumentFormat::Pdf => (pdf::extract_text(bytes)?, Vec::new()),
        DocumentFormat::Docx => {
            let doc = docx::extract(bytes)?;
            (doc.text, doc.hyperlinks)
        }
    };

    let text = clean_text(&raw);
    if text.is_empty() {
        return Err(ExtractionError::EmptyDocument { format });
    }

    debug!(
        format = format.label(),
        source_len = bytes.len(),
        text_len = text.len(),
        hyperlinks = hyperlinks.len(),
        "text extracted"
    );

    Ok(ExtractedText {
        format,
        source_len: bytes.len(),
        text,
        hyperlinks,
    })
}

/// Normalizes line endings, strips trailing whitespace per line and collapses
/// runs of blank lines to a single paragraph break.
fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(line);
    }
    out
}

fn corrupt(format: DocumentFormat, detail: impl Into<String>) -> ExtractionError {
    ExtractionError::CorruptDocument {
        format,
        detail: detail.into(),
    }
}
