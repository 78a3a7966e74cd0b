use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::extraction::DocumentFormat;
use crate::llm_client::CompletionConfig;

pub const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub groq_api_key: String,
    pub llm_api_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub llm_retry_backoff_ms: u64,
    /// Character budget for resume text inside the prompt.
    pub max_input_chars: usize,
    pub max_file_size_mb: usize,
    pub allowed_formats: Vec<DocumentFormat>,
    /// When set, every parse request must carry a matching `X-Internal-API-Key`.
    pub internal_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            groq_api_key: require_env("GROQ_API_KEY")?,
            llm_api_url: env_or("LLM_API_URL", DEFAULT_LLM_API_URL),
            model_name: env_or("MODEL_NAME", DEFAULT_MODEL),
            temperature: parse_env("LLM_TEMPERATURE", 0.1)?,
            max_tokens: parse_env("LLM_MAX_TOKENS", 2000)?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 30)?,
            llm_max_retries: parse_env("LLM_MAX_RETRIES", 3)?,
            llm_retry_backoff_ms: parse_env("LLM_RETRY_BACKOFF_MS", 1000)?,
            max_input_chars: parse_env("MAX_INPUT_CHARS", 24_000)?,
            max_file_size_mb: parse_env("MAX_FILE_SIZE_MB", 5)?,
            allowed_formats: parse_allowed_formats(&env_or("ALLOWED_FILE_TYPES", "pdf,docx")),
            internal_api_key: std::env::var("INTERNAL_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    /// Per-call settings handed to the completion client.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model_id: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.llm_timeout_secs),
            max_retries: self.llm_max_retries,
            backoff_base: Duration::from_millis(self.llm_retry_backoff_ms),
        }
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Parses `ALLOWED_FILE_TYPES`; unknown entries are ignored since only PDF
/// and DOCX have readers.
fn parse_allowed_formats(raw: &str) -> Vec<DocumentFormat> {
    let mut formats: Vec<DocumentFormat> = raw
        .split(',')
        .filter_map(DocumentFormat::from_extension)
        .collect();
    formats.dedup();
    formats
}
