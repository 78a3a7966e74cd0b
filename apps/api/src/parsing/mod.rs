// Resume parsing pipeline.
// Stages run strictly in order: extraction -> prompt -> completion -> validation.
// All LLM calls go through llm_client; only the completion stage retries.

pub mod handlers;
pub mod normalizer;
pub mod pipeline;
pub mod prompt_builder;
pub mod prompts;

use serde::Serialize;
use thiserror::Error;

use crate::extraction::{DocumentFormat, ExtractionError};
use crate::llm_client::LlmError;
use crate::parsing::normalizer::NormalizeError;

pub use pipeline::{parse_document, DocumentUpload, ParseMeta, ParseOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Completion,
    Validation,
}

/// Every way a single parse request can fail. No variant is fatal to the
/// process; each is scoped to one request.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported document format '{0}' (expected pdf or docx)")]
    UnsupportedFormat(String),

    #[error("{format} document could not be read: {detail}")]
    CorruptDocument {
        format: DocumentFormat,
        detail: String,
    },

    #[error("no extractable text found in {format} document")]
    EmptyDocument { format: DocumentFormat },

    #[error("completion timed out after {attempts} attempt(s)")]
    UpstreamTimeout { attempts: u32 },

    #[error("completion service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("completion request rejected (status {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("model output is not a single JSON object: {0}")]
    MalformedOutput(String),

    #[error("required field '{field}' is {reason}")]
    SchemaViolation { field: String, reason: String },
}

impl ParseError {
    pub fn stage(&self) -> Stage {
        match self {
            ParseError::UnsupportedFormat(_)
            | ParseError::CorruptDocument { .. }
            | ParseError::EmptyDocument { .. } => Stage::Extraction,
            ParseError::UpstreamTimeout { .. }
            | ParseError::UpstreamUnavailable(_)
            | ParseError::UpstreamRejected { .. } => Stage::Completion,
            ParseError::MalformedOutput(_) | ParseError::SchemaViolation { .. } => {
                Stage::Validation
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ParseError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ParseError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            ParseError::EmptyDocument { .. } => "EMPTY_DOCUMENT",
            ParseError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            ParseError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ParseError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            ParseError::MalformedOutput(_) => "MALFORMED_OUTPUT",
            ParseError::SchemaViolation { .. } => "SCHEMA_VIOLATION",
        }
    }
}

impl From<ExtractionError> for ParseError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedFormat(f) => ParseError::UnsupportedFormat(f),
            ExtractionError::CorruptDocument { format, detail } => {
                ParseError::CorruptDocument { format, detail }
            }
            ExtractionError::EmptyDocument { format } => ParseError::EmptyDocument { format },
        }
    }
}

impl From<LlmError> for ParseError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { attempts } => ParseError::UpstreamTimeout { attempts },
            LlmError::Unavailable { .. } | LlmError::InvalidResponse(_) => {
                ParseError::UpstreamUnavailable(e.to_string())
            }
            LlmError::Rejected { status, message } => {
                ParseError::UpstreamRejected { status, message }
            }
            LlmError::EmptyContent => {
                ParseError::MalformedOutput("model returned no content".to_string())
            }
        }
    }
}

impl From<NormalizeError> for ParseError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::MalformedOutput(reason) => ParseError::MalformedOutput(reason),
            NormalizeError::SchemaViolation { field, reason } => {
                ParseError::SchemaViolation { field, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_per_error_family() {
        assert_eq!(
            ParseError::from(ExtractionError::EmptyDocument {
                format: DocumentFormat::Pdf
            })
            .stage(),
            Stage::Extraction
        );
        assert_eq!(
            ParseError::from(LlmError::Timeout { attempts: 4 }).stage(),
            Stage::Completion
        );
        assert_eq!(
            ParseError::from(NormalizeError::MalformedOutput("x".into())).stage(),
            Stage::Validation
        );
    }

    #[test]
    fn test_llm_errors_map_to_upstream_kinds() {
        let err = ParseError::from(LlmError::Unavailable {
            attempts: 4,
            reason: "upstream returned 503".to_string(),
        });
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        assert!(err.to_string().contains("4 attempt(s)"));

        let err = ParseError::from(LlmError::Rejected {
            status: 401,
            message: "bad key".to_string(),
        });
        assert!(matches!(err, ParseError::UpstreamRejected { status: 401, .. }));

        let err = ParseError::from(LlmError::EmptyContent);
        assert_eq!(err.code(), "MALFORMED_OUTPUT");
    }
}
