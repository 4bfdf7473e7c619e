//! Xiaomi adapter error types.

use homebus_domain::error::{HubError, ValidationError};

/// Errors specific to the Xiaomi adapter. None of them stop the listener.
#[derive(Debug, thiserror::Error)]
pub enum XiaomiError {
    /// The socket could not be bound or read.
    #[error("gateway socket error")]
    Io(#[from] std::io::Error),

    /// A datagram is not a gateway message.
    #[error("malformed gateway datagram")]
    Datagram(#[source] serde_json::Error),

    /// The `data` field of a report is not a JSON object.
    #[error("malformed data in report from `{sid}`")]
    Data {
        sid: String,
        #[source]
        source: serde_json::Error,
    },

    /// A device command cannot be turned into a gateway write.
    #[error("invalid command for `{sid}`: {reason}")]
    Command { sid: String, reason: &'static str },

    /// A derived topic is not a valid topic name.
    #[error("invalid topic")]
    Topic(#[from] ValidationError),

    /// The registry or the bus rejected an update.
    #[error("hub error")]
    Hub(#[from] HubError),
}
