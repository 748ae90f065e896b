use thiserror::Error;

/// Faults raised by a browser session collaborator.
///
/// The driver classifies what went wrong so the executor can tell an element
/// that vanished apart from one that is present but refuses pointer input.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("browser error: {0}")]
    Browser(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("interaction rejected: {0}")]
    InteractionRejected(String),

    #[error("error communicating with oracle: {0}")]
    OracleCommunication(String),

    #[error("could not parse oracle response: {0}")]
    OracleMalformedResponse(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid value {value:?} for parameter {name}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("step budget exhausted")]
    StepBudgetExhausted,

    #[error("page did not finish loading within {0} s")]
    PageLoadTimeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AgentError {
    /// Lift a driver fault into the executor's taxonomy.
    pub fn from_interaction(err: DriverError) -> Self {
        match err {
            DriverError::NotFound(what) => AgentError::ElementNotFound(what),
            DriverError::NotInteractable(what) => AgentError::InteractionRejected(what),
            other => AgentError::Driver(other),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
