use async_trait::async_trait;

use super::errors::{BindError, ReleaseError, VerifyError};
use crate::handshake::{PendingIdentity, ResolvedMember, SessionToken};
use crate::ids::DeviceId;

/// Session opened by `bind_session`.
///
/// `pending` is `Some` when the gateway returns the tapped badge together
/// with the token, `None` when the tap is reported later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSession {
    pub token: String,
    pub pending: Option<PendingIdentity>,
}

/// Backend endpoints of the badge session protocol.
#[async_trait]
pub trait BadgeSessionPort: Send + Sync {
    /// Arms the reader for exactly one tap.
    async fn bind_session(&self, device_id: &DeviceId) -> Result<BoundSession, BindError>;

    /// Trust boundary: resolves the scanned badge to a member.
    async fn verify_identity(
        &self,
        token: &SessionToken,
        pending: &PendingIdentity,
    ) -> Result<ResolvedMember, VerifyError>;

    /// Best-effort disarm of the reader.
    async fn cancel_session(&self, token: &SessionToken) -> Result<(), ReleaseError>;
}
