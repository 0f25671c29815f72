use async_trait::async_trait;

use super::errors::GuardedActionError;
use crate::handshake::{ActionReceipt, GuardedPayload, ResolvedMember, SessionToken};

/// Domain write endpoints (create purchase, save rating, ...).
///
/// The token is passed so the adapter can send it as an idempotency key.
#[async_trait]
pub trait GuardedActionPort: Send + Sync {
    async fn execute(
        &self,
        token: &SessionToken,
        member: &ResolvedMember,
        payload: &GuardedPayload,
    ) -> Result<ActionReceipt, GuardedActionError>;
}
