use thiserror::Error;

/// Main error type for the fleet coordinator
#[derive(Error, Debug)]
pub enum FleetError {
    // Initialization errors
    #[error("Fleet initialization failed, unconfigured engines: {}", .unconfigured.join(", "))]
    FatalInit { unconfigured: Vec<String> },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid engine address: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Engine errors surfaced outside the coordinator's isolation boundary
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    /// Addresses left unconfigured by a fatal initialization, empty otherwise
    pub fn unconfigured(&self) -> &[String] {
        match self {
            FleetError::FatalInit { unconfigured } => unconfigured,
            _ => &[],
        }
    }

    pub fn is_fatal_init(&self) -> bool {
        matches!(self, FleetError::FatalInit { .. })
    }
}

/// Result type alias for FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

/// Failures raised by a remote engine or the factory that reaches it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Cannot connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Configuration rejected: {0}")]
    Configuration(String),

    #[error("Illegal engine state: {0}")]
    IllegalState(String),

    #[error("Engine failure: {0}")]
    Engine(String),

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },
}

impl EngineError {
    /// Connect-class and configuration failures may clear up on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Connect { .. } | EngineError::Configuration(_) | EngineError::Timeout { .. }
        )
    }
}
