//! PDF text extraction using pdf-extract, one page at a time.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace};

use super::{corrupt, DocumentFormat, ExtractionError};

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Extracts the text of every page in page order. Pages without text are
/// skipped; the caller decides whether the overall result is empty.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract panics on some malformed content streams instead of erroring.
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| corrupt(DocumentFormat::Pdf, "PDF reader aborted on malformed content"))?
    .map_err(|e| corrupt(DocumentFormat::Pdf, e.to_string()))?;

    debug!("PDF has {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page = page.trim();
        trace!(page = idx + 1, chars = page.len(), "page extracted");
        if page.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str(PAGE_SEPARATOR);
        }
        text.push_str(page);
    }
    Ok(text)
}
