//! One resume upload in, one structured record (or one typed failure) out.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extraction::{self, DocumentFormat, ExtractedText};
use crate::llm_client::{CompletionClient, CompletionConfig, Usage};
use crate::parsing::normalizer::{normalize, NormalizationWarning};
use crate::parsing::prompt_builder::{build, Prompt};
use crate::parsing::ParseError;
use crate::schema::{ResumeRecord, Schema, RESUME_SCHEMA};

/// An uploaded document as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub request_id: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Pipeline settings derived from `Config`.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub max_input_chars: usize,
    pub allowed_formats: Vec<DocumentFormat>,
    pub completion: CompletionConfig,
}

impl ParseOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_input_chars: config.max_input_chars,
            allowed_formats: config.allowed_formats.clone(),
            completion: config.completion_config(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseMeta {
    pub request_id: String,
    pub schema_version: &'static str,
    pub source_format: DocumentFormat,
    pub source_bytes: usize,
    pub extracted_chars: usize,
    pub truncated: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    pub usage: Option<Usage>,
    pub warnings: Vec<NormalizationWarning>,
    pub parsed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub record: ResumeRecord,
    pub meta: ParseMeta,
}

/// One extraction attempt: owns the extracted text, the schema and the
/// prompt built from both. Consumed by `run`, so it yields at most one
/// outcome, validated against the same schema the prompt was rendered from.
#[derive(Debug)]
pub struct ParseRequest {
    request_id: String,
    text: ExtractedText,
    schema: &'static Schema,
    prompt: Prompt,
}

impl ParseRequest {
    pub fn new(
        request_id: String,
        text: ExtractedText,
        schema: &'static Schema,
        max_input_chars: usize,
    ) -> Self {
        let prompt = build(schema, &text, max_input_chars);
        Self {
            request_id,
            text,
            schema,
            prompt,
        }
    }

    /// Runs completion and validation. Dropping the returned future cancels
    /// the in-flight upstream call; no partial record is ever produced.
    pub async fn run(
        self,
        client: &dyn CompletionClient,
        config: &CompletionConfig,
    ) -> Result<ParseOutcome, ParseError> {
        let request_id = self.request_id;

        if self.prompt.truncated() {
            warn!(
                request_id = %request_id,
                extracted_chars = self.text.extracted_len(),
                "resume text truncated to fit the input budget"
            );
        }

        let response = client.complete(&self.prompt, config).await?;
        let finish_reason = response.finish_reason.as_deref().unwrap_or("unknown");
        info!(
            request_id = %request_id,
            status = response.status,
            attempts = response.attempts,
            latency_ms = response.latency.as_millis() as u64,
            finish_reason,
            "completion received"
        );
        if finish_reason == "length" {
            warn!(
                request_id = %request_id,
                max_tokens = config.max_tokens,
                "completion stopped at the token limit; output may be cut off"
            );
        }
        debug!(
            request_id = %request_id,
            "raw model output: {}",
            preview(&response.text)
        );

        let normalized = normalize(&response.text, self.schema)?;
        if !normalized.warnings.is_empty() {
            warn!(
                request_id = %request_id,
                dropped_elements = normalized.dropped_elements(),
                warnings = normalized.warnings.len(),
                "model output normalized with drops: {:?}",
                normalized.warnings
            );
        }

        Ok(ParseOutcome {
            meta: ParseMeta {
                request_id,
                schema_version: self.prompt.schema_version(),
                source_format: self.text.format,
                source_bytes: self.text.source_len,
                extracted_chars: self.text.extracted_len(),
                truncated: self.prompt.truncated(),
                attempts: response.attempts,
                latency_ms: response.latency.as_millis() as u64,
                usage: response.usage,
                warnings: normalized.warnings,
                parsed_at: Utc::now(),
            },
            record: normalized.record,
        })
    }
}

/// Raw model output is logged at most this many characters at a time.
const OUTPUT_PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    text.chars().take(OUTPUT_PREVIEW_CHARS).collect()
}

/// Full pipeline for one upload: resolve format, extract off the async
/// runtime, then prompt, complete and validate.
pub async fn parse_document(
    upload: DocumentUpload,
    client: &dyn CompletionClient,
    options: &ParseOptions,
) -> Result<ParseOutcome, ParseError> {
    let format = DocumentFormat::resolve(
        upload.filename.as_deref(),
        upload.content_type.as_deref(),
        &upload.bytes,
    )?;
    if !options.allowed_formats.contains(&format) {
        return Err(ParseError::UnsupportedFormat(format.label().to_string()));
    }

    info!(
        request_id = %upload.request_id,
        format = format.label(),
        size = upload.bytes.len(),
        "resume parse started"
    );

    let bytes = upload.bytes.clone();
    let text = tokio::task::spawn_blocking(move || extraction::extract(&bytes, format.label()))
        .await
        .map_err(|e| ParseError::CorruptDocument {
            format,
            detail: format!("reader task failed: {e}"),
        })??;

    info!(
        request_id = %upload.request_id,
        text_len = text.text.len(),
        "resume text extracted"
    );

    ParseRequest::new(upload.request_id, text, &RESUME_SCHEMA, options.max_input_chars)
        .run(client, &options.completion)
        .await
}
