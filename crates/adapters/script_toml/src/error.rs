//! Script file error types.

use std::path::PathBuf;

use homebus_domain::error::{ScriptError, ValidationError};

/// Errors raised while loading a script file.
#[derive(Debug, thiserror::Error)]
pub enum ScriptFileError {
    /// The reference is not a plain file stem.
    #[error("invalid script reference `{0}`")]
    InvalidReference(String),

    /// No file exists for the reference.
    #[error("script `{reference}` not found at {}", path.display())]
    Missing { reference: String, path: PathBuf },

    /// The file exists but could not be read.
    #[error("cannot read script `{reference}`")]
    Read {
        reference: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid script document.
    #[error("script `{reference}` is not valid TOML")]
    Parse {
        reference: String,
        #[source]
        source: toml::de::Error,
    },

    /// An action names a malformed topic, protocol, or device.
    #[error("script `{reference}` action #{index} is invalid")]
    InvalidAction {
        reference: String,
        index: usize,
        #[source]
        source: ValidationError,
    },
}

impl ScriptFileError {
    fn reference(&self) -> &str {
        match self {
            Self::InvalidReference(reference)
            | Self::Missing { reference, .. }
            | Self::Read { reference, .. }
            | Self::Parse { reference, .. }
            | Self::InvalidAction { reference, .. } => reference,
        }
    }
}

impl From<ScriptFileError> for ScriptError {
    fn from(err: ScriptFileError) -> Self {
        match err {
            ScriptFileError::InvalidReference(reference)
            | ScriptFileError::Missing { reference, .. } => Self::NotFound(reference),
            other => Self::Compile {
                reference: other.reference().to_string(),
                source: Box::new(other),
            },
        }
    }
}
