use std::sync::Arc;

use sg_core::handshake::{PendingIdentity, SessionToken};
use sg_core::ids::DeviceId;
use sg_core::ports::{BadgeSessionPort, BindError, ClockPort};
use tokio_util::sync::CancellationToken;

/// Token issued by a successful bind, with the tap if the gateway already
/// reported one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundToken {
    pub token: SessionToken,
    pub pending: Option<PendingIdentity>,
}

/// Opens a pending scan session on a reader.
pub struct SessionBinder {
    badge_sessions: Arc<dyn BadgeSessionPort>,
    clock: Arc<dyn ClockPort>,
}

impl SessionBinder {
    pub fn new(badge_sessions: Arc<dyn BadgeSessionPort>, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            badge_sessions,
            clock,
        }
    }

    /// Arms `device_id` for one tap.
    ///
    /// The request is raced against `signal`; when the signal fires first the
    /// result is `BindError::Aborted` and the response, if any, is dropped.
    pub async fn bind(
        &self,
        device_id: &DeviceId,
        signal: &CancellationToken,
    ) -> Result<BoundToken, BindError> {
        if device_id.is_blank() {
            return Err(BindError::EmptyDeviceId);
        }
        if signal.is_cancelled() {
            return Err(BindError::Aborted);
        }

        let bound = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(BindError::Aborted),
            result = self.badge_sessions.bind_session(device_id) => result?,
        };

        if bound.token.trim().is_empty() {
            return Err(BindError::Transport(
                "gateway returned an empty session token".to_string(),
            ));
        }

        tracing::debug!(device_id = %device_id, "Reader armed");
        Ok(BoundToken {
            token: SessionToken::new(bound.token, device_id.clone(), self.clock.now()),
            pending: bound.pending,
        })
    }
}
