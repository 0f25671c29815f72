use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceDirectoryError {
    #[error("directory lookup failed: {0}")]
    Lookup(String),
}

/// Failure to open (arm) a scan session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("device id is empty")]
    EmptyDeviceId,

    #[error("device `{0}` is not known to the gateway")]
    DeviceUnknown(String),

    /// Another session already armed the reader. Retryable.
    #[error("device is already armed by another session")]
    DeviceBusy,

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Aborted through the cancellation signal; never shown to the user.
    #[error("bind aborted")]
    Aborted,
}

/// Failure to exchange a session token for a member identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Rejected locally, no request was sent.
    #[error("session token is not the live token of this handshake")]
    StaleToken,

    #[error("badge does not resolve to an active member")]
    UnknownBadge,

    #[error("scan session expired")]
    SessionExpired,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("verification aborted")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
    #[error("release request failed: {0}")]
    Transport(String),
}

/// Failure of a guarded domain write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardedActionError {
    /// Business rule rejection from the backend.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The session token was already used for a write.
    #[error("session token was already consumed")]
    AlreadyConsumed,

    #[error("transport error: {0}")]
    Transport(String),
}
