use thiserror::Error;

/// Guarded payload could not be frozen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload body must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("payload may not set reserved field `{0}`")]
    ReservedField(String),

    #[error("payload field `{field}` is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("payload encoding failed: {0}")]
    Encoding(String),
}

impl PayloadError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Problems detected before any network call; the handshake never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no card reader is mapped to location `{location}`")]
    NoDeviceMapped { location: String },

    #[error("device directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
}
