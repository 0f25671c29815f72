use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sg_core::handshake::{ActionReceipt, GuardedPayload, ResolvedMember, SessionToken};
use sg_core::ports::{GuardedActionError, GuardedActionPort};

/// Runs the guarded domain write for a verified member.
///
/// At most one write per session token: a token that already reached the
/// port is refused with `AlreadyConsumed`, whatever the first call returned.
/// Nothing here retries.
pub struct GuardedActionExecutor {
    guarded_actions: Arc<dyn GuardedActionPort>,
    consumed: Mutex<HashSet<String>>,
}

impl GuardedActionExecutor {
    pub fn new(guarded_actions: Arc<dyn GuardedActionPort>) -> Self {
        Self {
            guarded_actions,
            consumed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn run(
        &self,
        token: &SessionToken,
        member: &ResolvedMember,
        payload: &GuardedPayload,
    ) -> Result<ActionReceipt, GuardedActionError> {
        let first_use = match self.consumed.lock() {
            Ok(mut consumed) => consumed.insert(token.token.clone()),
            Err(poisoned) => poisoned.into_inner().insert(token.token.clone()),
        };
        if !first_use {
            tracing::warn!(token = %token.redacted(), "Guarded action already ran for token");
            return Err(GuardedActionError::AlreadyConsumed);
        }

        tracing::info!(
            action = %payload.kind(),
            member_id = %member.member_id,
            digest = %payload.digest(),
            "Running guarded action"
        );
        self.guarded_actions.execute(token, member, payload).await
    }
}
