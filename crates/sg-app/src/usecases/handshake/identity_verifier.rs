use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sg_core::handshake::{PendingIdentity, ResolvedMember, SessionToken};
use sg_core::ports::{BadgeSessionPort, VerifyError};
use tokio_util::sync::CancellationToken;

/// Exchanges a session token and the tapped badge for a trusted member.
///
/// Everything before this call is untrusted input; a `ResolvedMember` is the
/// only thing a guarded action may be authorized on.
pub struct IdentityVerifier {
    badge_sessions: Arc<dyn BadgeSessionPort>,
    /// 已用于验证的 token，不可再次提交
    spent: Mutex<HashSet<String>>,
}

impl IdentityVerifier {
    pub fn new(badge_sessions: Arc<dyn BadgeSessionPort>) -> Self {
        Self {
            badge_sessions,
            spent: Mutex::new(HashSet::new()),
        }
    }

    /// Verifies `token` against the backend.
    ///
    /// `live` is the flow's current token. A token that is not the live one,
    /// or that was already submitted once, is rejected locally with
    /// `VerifyError::StaleToken` and no request is sent.
    pub async fn verify(
        &self,
        token: &SessionToken,
        live: Option<&SessionToken>,
        pending: &PendingIdentity,
        signal: &CancellationToken,
    ) -> Result<ResolvedMember, VerifyError> {
        match live {
            Some(live) if live.same_session(token) => {}
            _ => return Err(VerifyError::StaleToken),
        }
        if signal.is_cancelled() {
            return Err(VerifyError::Aborted);
        }
        if !self.mark_spent(token) {
            tracing::warn!(token = %token.redacted(), "Session token already submitted");
            return Err(VerifyError::StaleToken);
        }

        let member = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(VerifyError::Aborted),
            result = self.badge_sessions.verify_identity(token, pending) => result?,
        };

        if member.member_id.is_blank() {
            return Err(VerifyError::UnknownBadge);
        }
        Ok(member)
    }

    fn mark_spent(&self, token: &SessionToken) -> bool {
        match self.spent.lock() {
            Ok(mut spent) => spent.insert(token.token.clone()),
            Err(poisoned) => poisoned.into_inner().insert(token.token.clone()),
        }
    }
}
