use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionClient;
use crate::parsing::ParseOptions;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Completion backend. `LlmClient` in production, a stub in tests.
    pub completion: Arc<dyn CompletionClient>,
    pub options: Arc<ParseOptions>,
}

impl AppState {
    pub fn new(config: Config, completion: Arc<dyn CompletionClient>) -> Self {
        let options = Arc::new(ParseOptions::from_config(&config));
        Self {
            config,
            completion,
            options,
        }
    }
}
