//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`]
//! via `#[from]`. No variant carries a bare `String` as its only payload
//! except where the message is the whole diagnostic.

/// Workspace-wide error.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    #[error("script error")]
    Script(#[from] ScriptError),

    #[error("conflicting write")]
    Conflict(#[from] ConflictError),

    /// The event bus is draining and refuses new publishes.
    #[error("event bus is closed")]
    BusClosed,

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("channel must not be empty")]
    EmptyChannel,

    #[error("value name must not be empty")]
    EmptyValueName,

    #[error("rule must declare at least one trigger")]
    NoTriggers,

    #[error("invalid topic pattern `{0}`")]
    InvalidTopicPattern(String),

    #[error("invalid topic `{0}`")]
    InvalidTopic(String),

    #[error("unknown source protocol `{0}`")]
    UnknownProtocol(String),

    #[error("invalid device identity `{0}`, expected `<protocol>/channel/<channel>`")]
    InvalidDeviceIdentity(String),
}

/// A looked-up record does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A rule or schedule definition could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid schedule `{expression}`: {reason}")]
    InvalidSchedule {
        expression: String,
        reason: &'static str,
    },

    #[error("rule `{rule}` rejected")]
    InvalidRule {
        rule: String,
        #[source]
        source: ValidationError,
    },
}

/// A script could not be loaded or failed while running.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script `{0}` not found")]
    NotFound(String),

    #[error("script `{reference}` failed to compile")]
    Compile {
        reference: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("script `{reference}` failed: {message}")]
    Runtime { reference: String, message: String },

    #[error("script `{0}` panicked")]
    Panicked(String),
}

/// A write lost a race against a concurrent writer on the same key.
#[derive(Debug, thiserror::Error)]
#[error("{entity} `{key}` was written concurrently")]
pub struct ConflictError {
    pub entity: &'static str,
    pub key: String,
}
