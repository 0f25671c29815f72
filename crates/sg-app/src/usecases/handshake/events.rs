use async_trait::async_trait;
use tokio::sync::mpsc;

use sg_core::handshake::{ActionKind, ActionReceipt, FailureReason, ResolvedMember};
use sg_core::ids::{AttemptId, DeviceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeDomainEvent {
    StateChanged {
        attempt_id: Option<AttemptId>,
        state: String,
    },
    ConfirmationRequired {
        attempt_id: AttemptId,
        device_id: DeviceId,
        action: ActionKind,
        payload_digest: String,
    },
    Completed {
        attempt_id: AttemptId,
        member: ResolvedMember,
        receipt: ActionReceipt,
    },
    Cancelled {
        attempt_id: AttemptId,
    },
    Failed {
        attempt_id: AttemptId,
        reason: FailureReason,
        message: String,
    },
}

#[async_trait]
pub trait HandshakeEventPort: Send + Sync {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<HandshakeDomainEvent>>;
}
