use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use sg_core::handshake::SessionToken;
use sg_core::ids::AttemptId;
use sg_core::ports::BadgeSessionPort;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

/// Abort signal and backend release for one handshake.
///
/// 每个 attempt 对应一个共享的取消信号；bind / verify 请求都绑定到该信号上。
pub struct CancellationController {
    badge_sessions: Arc<dyn BadgeSessionPort>,
    current: Mutex<Option<(AttemptId, CancellationToken)>>,
    released: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CancellationController {
    pub fn new(badge_sessions: Arc<dyn BadgeSessionPort>) -> Self {
        Self {
            badge_sessions,
            current: Mutex::new(None),
            released: Mutex::new(HashSet::new()),
        }
    }

    /// Fresh signal for `attempt_id`. A signal left over from an earlier
    /// attempt is fired first.
    pub fn arm(&self, attempt_id: &AttemptId) -> CancellationToken {
        let mut current = lock(&self.current);
        if let Some((previous, signal)) = current.as_ref() {
            if previous == attempt_id {
                return signal.clone();
            }
            signal.cancel();
        }
        let signal = CancellationToken::new();
        *current = Some((attempt_id.clone(), signal.clone()));
        signal
    }

    /// Signal of the live attempt; `None` for any other attempt id.
    pub fn signal_for(&self, attempt_id: &AttemptId) -> Option<CancellationToken> {
        lock(&self.current)
            .as_ref()
            .filter(|(live, _)| live == attempt_id)
            .map(|(_, signal)| signal.clone())
    }

    /// Fires the abort signal of `attempt_id`. Returns false when it was
    /// not armed or had already fired.
    pub fn abort(&self, attempt_id: &AttemptId) -> bool {
        match lock(&self.current).as_ref() {
            Some((live, signal)) if live == attempt_id && !signal.is_cancelled() => {
                signal.cancel();
                true
            }
            _ => false,
        }
    }

    /// Best-effort release in the background; never blocks the caller.
    ///
    /// Each token is released at most once. Failures are logged only.
    pub fn release(&self, token: &SessionToken) {
        if !self.claim_release(token) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(token = %token.redacted(), "No runtime available to release session");
            return;
        };

        let badge_sessions = self.badge_sessions.clone();
        let token = token.clone();
        let span = info_span!("handshake.release", device_id = %token.device_id);
        runtime.spawn(
            async move {
                if let Err(error) = badge_sessions.cancel_session(&token).await {
                    tracing::warn!(token = %token.redacted(), %error, "Session release failed");
                }
            }
            .instrument(span),
        );
    }

    fn claim_release(&self, token: &SessionToken) -> bool {
        lock(&self.released).insert(token.token.clone())
    }
}
