/// LLM Client: the single point of entry for completion calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion endpoint
/// directly. The pipeline depends on the `CompletionClient` trait so tests
/// can substitute a deterministic stub.
///
/// Wire format: OpenAI-compatible chat completions (Groq by default).
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::parsing::prompt_builder::Prompt;
use crate::parsing::prompts::RESUME_PARSE_SYSTEM;

/// Upper bound for any single wait between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("completion endpoint unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("completion request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("completion endpoint returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Per-call settings. Derived from `Config::completion_config`.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base * 2^(n-1)`.
    pub backoff_base: Duration,
}

/// Raw model output plus call metadata.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub status: u16,
    /// Wall time across all attempts, backoff included.
    pub latency: Duration,
    pub usage: Option<Usage>,
    pub attempts: u32,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Sends one prompt to a completion model and returns its complete output.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &Prompt,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Outcome of a single failed attempt.
enum AttemptError {
    /// Worth retrying. `retry_after` overrides the computed backoff.
    Transient {
        timed_out: bool,
        reason: String,
        retry_after: Option<Duration>,
    },
    Fatal(LlmError),
}

/// HTTP completion client. Cheap to clone; the connection pool is shared.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl LlmClient {
    pub fn new(api_key: String, endpoint: String) -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            endpoint,
        }
    }

    async fn attempt(
        &self,
        body: &ChatRequest<'_>,
        timeout: Duration,
    ) -> Result<(u16, ChatResponse), AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await.map_err(transport_error)?;
            let parsed: ChatResponse = serde_json::from_slice(&bytes)
                .map_err(|e| AttemptError::Fatal(LlmError::InvalidResponse(e.to_string())))?;
            return Ok((status.as_u16(), parsed));
        }

        if status == StatusCode::REQUEST_TIMEOUT {
            return Err(AttemptError::Transient {
                timed_out: true,
                reason: "upstream returned 408".to_string(),
                retry_after: None,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(delay) = retry_after(&response) {
                return Err(AttemptError::Transient {
                    timed_out: false,
                    reason: "rate limited".to_string(),
                    retry_after: Some(delay),
                });
            }
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, truncate(&body));
            return Err(AttemptError::Transient {
                timed_out: false,
                reason: format!("upstream returned {}", status.as_u16()),
                retry_after: None,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(AttemptError::Fatal(LlmError::Rejected {
            status: status.as_u16(),
            message: truncate(&message),
        }))
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    /// Sends the prompt, retrying transient failures (network errors,
    /// timeouts, 408, 5xx, 429 with `Retry-After`) with exponential backoff.
    /// Any other non-success status is returned immediately as `Rejected`.
    async fn complete(
        &self,
        prompt: &Prompt,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, LlmError> {
        let request_body = ChatRequest {
            model: &config.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: RESUME_PARSE_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: prompt.text(),
                },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let started = Instant::now();
        let max_attempts = config.max_retries.saturating_add(1);
        let mut last_timed_out = false;
        let mut last_reason = String::new();
        let mut next_delay: Option<Duration> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = next_delay
                    .take()
                    .unwrap_or_else(|| backoff(config.backoff_base, attempt - 1));
                warn!(
                    "LLM call attempt {} failed ({}), retrying after {}ms...",
                    attempt - 1,
                    last_reason,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&request_body, config.timeout).await {
                Ok((status, response)) => {
                    let latency = started.elapsed();
                    let usage = response.usage;
                    let choice = response
                        .choices
                        .into_iter()
                        .next()
                        .ok_or(LlmError::EmptyContent)?;
                    let text = choice
                        .message
                        .content
                        .filter(|c| !c.trim().is_empty())
                        .ok_or(LlmError::EmptyContent)?;

                    debug!(
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        prompt_tokens = usage.map(|u| u.prompt_tokens),
                        completion_tokens = usage.map(|u| u.completion_tokens),
                        "LLM call succeeded"
                    );

                    return Ok(CompletionResponse {
                        text,
                        status,
                        latency,
                        usage,
                        attempts: attempt,
                        finish_reason: choice.finish_reason,
                    });
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient {
                    timed_out,
                    reason,
                    retry_after,
                }) => {
                    last_timed_out = timed_out;
                    last_reason = reason;
                    next_delay = retry_after;
                }
            }
        }

        if last_timed_out {
            Err(LlmError::Timeout {
                attempts: max_attempts,
            })
        } else {
            Err(LlmError::Unavailable {
                attempts: max_attempts,
                reason: last_reason,
            })
        }
    }
}

fn transport_error(e: reqwest::Error) -> AttemptError {
    AttemptError::Transient {
        timed_out: e.is_timeout(),
        reason: if e.is_timeout() {
            "request timed out".to_string()
        } else {
            format!("network error: {e}")
        },
        retry_after: None,
    }
}

/// Exponential backoff for retry number `retry` (1-based): base, 2x, 4x...
fn backoff(base: Duration, retry: u32) -> Duration {
    let factor = 1u32 << retry.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Reads a `Retry-After` header given in seconds.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

/// Deterministic stand-in for the completion endpoint.
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    type Reply = Box<dyn Fn() -> Result<String, LlmError> + Send + Sync>;

    pub struct StubCompletionClient {
        reply: Reply,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl StubCompletionClient {
        pub fn replying(text: &str) -> Self {
            let text = text.to_string();
            Self::new(Box::new(move || Ok(text.clone())))
        }

        pub fn failing(error: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
            Self::new(Box::new(move || Err(error())))
        }

        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for StubCompletionClient {
        async fn complete(
            &self,
            prompt: &Prompt,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.text().to_string());
            let text = (self.reply)()?;
            Ok(CompletionResponse {
                text,
                status: 200,
                latency: Duration::from_millis(5),
                usage: None,
                attempts: 1,
                finish_reason: Some("stop".to_string()),
            })
        }
    }
}
