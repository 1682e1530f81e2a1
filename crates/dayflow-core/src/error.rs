//! Core error types for dayflow-core.
//!
//! One thiserror enum per concern. Flow errors are always session-local:
//! the driver turns them into a user-facing message and leaves the session
//! at the step it was on.

use std::path::PathBuf;
use thiserror::Error;

use crate::flow::Step;

/// Core error type for dayflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scheduler-related errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Calendar provider or user directory errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Flow table is inconsistent
    #[error("Flow registry error: {0}")]
    Registry(#[from] RegistryError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Dot-path key does not exist
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Scheduler errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Absolute fire time already passed beyond the tolerance
    #[error("Job '{job}' would fire in the past ({fire_at}, now {now})")]
    InvalidTime {
        job: String,
        fire_at: chrono::DateTime<chrono::Utc>,
        now: chrono::DateTime<chrono::Utc>,
    },
}

/// Calendar provider / user directory errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network or HTTP-level failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The remote API answered with an error object
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Chat delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to deliver message to {session}: {message}")]
pub struct DeliveryError {
    pub session: String,
    pub message: String,
}

/// Errors raised by flow handlers.
#[derive(Error, Debug)]
pub enum FlowError {
    /// A required session, scratch or timer field is absent
    #[error("Missing context: {0}")]
    MissingContext(String),

    /// Expected-unique calendar lookup found nothing
    #[error("No calendar event matches '{query}'")]
    LookupEmpty { query: String },

    /// Expected-unique calendar lookup found several events
    #[error("{count} calendar events match '{query}'")]
    LookupAmbiguous { query: String, count: usize },

    /// Event has no end time
    #[error("Calendar event '{title}' has no end time")]
    MissingEnd { title: String },

    /// Free text failed parsing; the reprompt is shown to the user
    #[error("Invalid input: {reprompt}")]
    InvalidUserInput { reprompt: String },

    /// Calendar or directory failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Scratch value could not be (de)serialized
    #[error("Scratch value error: {0}")]
    Scratch(#[from] serde_json::Error),
}

/// Message shown for every failure that is not a local reprompt.
pub const FALLBACK_MESSAGE: &str = "Sorry, something went wrong on my side. Please try again.";

impl FlowError {
    pub fn invalid_input(reprompt: impl Into<String>) -> Self {
        FlowError::InvalidUserInput {
            reprompt: reprompt.into(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        FlowError::MissingContext(what.into())
    }

    /// True when the error is recovered by re-prompting the user.
    pub fn is_reprompt(&self) -> bool {
        matches!(self, FlowError::InvalidUserInput { .. })
    }

    /// Text sent to the user when a handler fails.
    pub fn user_message(&self) -> &str {
        match self {
            FlowError::InvalidUserInput { reprompt } => reprompt,
            _ => FALLBACK_MESSAGE,
        }
    }
}

/// Flow table validation errors, raised at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Step '{0}' is declared by more than one flow")]
    DuplicateStep(Step),

    #[error("Step '{0}' has no handler")]
    MissingStep(Step),

    #[error("Step '{from}' lists unknown successor '{to}'")]
    UnknownSuccessor { from: Step, to: Step },

    #[error("Flow '{flow}' must have exactly one entry step, found {count}")]
    EntryCount { flow: String, count: usize },

    #[error("Step '{0}' cannot reach a terminal step")]
    NoPathToTerminal(Step),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
