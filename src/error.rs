use crate::state::RunPhase;

#[derive(Debug, thiserror::Error)]
pub enum PerfError {
    #[error("Invalid test configuration: {0}")]
    Validation(String),

    #[error("Performance test failed: {0}")]
    TestExecution(String),

    #[error("Failed to parse response data: {0}")]
    ResponseParse(String),

    #[error("Enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PerfError {
    /// Short machine-readable tag, used in the CLI's error JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            PerfError::Validation(_) => "validation",
            PerfError::TestExecution(_) => "test_execution",
            PerfError::ResponseParse(_) => "response_parse",
            PerfError::EnrichmentUnavailable(_) => "enrichment_unavailable",
            PerfError::InvalidTransition { .. } => "invalid_transition",
            PerfError::Config(_) => "config",
            PerfError::Store(_) => "store",
            PerfError::Http(_) => "http",
            PerfError::InvalidUrl(_) => "invalid_url",
            PerfError::Io(_) => "io",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}
