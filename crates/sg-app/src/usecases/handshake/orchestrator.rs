//! Handshake orchestrator
//!
//! 负责解析读卡器、冻结业务载荷并创建 `HandshakeFlow`。每个流程相互独立，
//! 共享同一组端口；token 的单次使用记录属于各自的流程，流程结束即释放。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};

use sg_core::handshake::{GuardedPayload, HandshakeStateMachine, PreconditionError};
use sg_core::ids::LocationId;

use super::cancellation::CancellationController;
use super::config::HandshakeConfig;
use super::device_resolver::DeviceResolver;
use super::events::{HandshakeDomainEvent, HandshakeEventPort};
use super::flow::{EventSenders, FlowComponents, HandshakeFlow};
use super::guarded_executor::GuardedActionExecutor;
use super::identity_verifier::IdentityVerifier;
use super::session_binder::SessionBinder;
use crate::deps::HandshakeDeps;
use crate::usecases::guarded::GuardedForm;

/// Input of a guarded UI action.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Room the operator works in; selects the card reader.
    pub location: LocationId,
    /// Frozen request body of the guarded write.
    pub payload: GuardedPayload,
    /// Overrides the configured confirmation step when set.
    pub require_confirmation: Option<bool>,
}

impl HandshakeRequest {
    pub fn new(location: impl Into<LocationId>, payload: GuardedPayload) -> Self {
        Self {
            location: location.into(),
            payload,
            require_confirmation: None,
        }
    }

    pub fn with_confirmation(mut self, require: bool) -> Self {
        self.require_confirmation = Some(require);
        self
    }
}

/// 握手编排器
#[derive(Clone)]
pub struct HandshakeOrchestrator {
    config: HandshakeConfig,
    deps: HandshakeDeps,
    resolver: Arc<DeviceResolver>,
    binder: Arc<SessionBinder>,
    event_senders: EventSenders,
}

impl HandshakeOrchestrator {
    pub fn new(config: HandshakeConfig, deps: HandshakeDeps) -> Self {
        Self {
            resolver: Arc::new(DeviceResolver::new(deps.device_directory.clone())),
            binder: Arc::new(SessionBinder::new(
                deps.badge_sessions.clone(),
                deps.clock.clone(),
            )),
            event_senders: Arc::new(Mutex::new(Vec::new())),
            config,
            deps,
        }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Starts a handshake for `request`.
    ///
    /// The reader is resolved first: an unmapped location is a precondition
    /// error and nothing is sent to the badge backend.
    pub async fn begin(&self, request: HandshakeRequest) -> Result<HandshakeFlow, PreconditionError> {
        let span = info_span!(
            "handshake.start",
            location = %request.location,
            action = %request.payload.kind()
        );
        async move {
            let device_id = self.resolver.resolve(&request.location).await?;
            let require_confirmation = self
                .config
                .requires_confirmation(request.payload.kind(), request.require_confirmation);

            let flow = HandshakeFlow::new(
                device_id,
                request.payload,
                require_confirmation,
                HandshakeStateMachine::with_policy(self.config.policy()),
                // Token guards are scoped to the flow.
                FlowComponents {
                    binder: self.binder.clone(),
                    verifier: Arc::new(IdentityVerifier::new(self.deps.badge_sessions.clone())),
                    executor: Arc::new(GuardedActionExecutor::new(
                        self.deps.guarded_actions.clone(),
                    )),
                    cancellation: CancellationController::new(self.deps.badge_sessions.clone()),
                    clock: self.deps.clock.clone(),
                    event_senders: self.event_senders.clone(),
                },
            );
            flow.start();
            tracing::info!(
                device_id = %flow.device_id(),
                state = flow.state().label(),
                "Handshake started"
            );
            Ok(flow)
        }
        .instrument(span)
        .await
    }

    /// Validates and freezes `form`, then starts the handshake.
    pub async fn begin_form<F: GuardedForm>(
        &self,
        location: impl Into<LocationId>,
        form: &F,
    ) -> Result<HandshakeFlow, PreconditionError> {
        let payload = form.freeze(self.deps.clock.now())?;
        self.begin(HandshakeRequest::new(location, payload)).await
    }
}

#[async_trait]
impl HandshakeEventPort for HandshakeOrchestrator {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<HandshakeDomainEvent>> {
        let (event_tx, event_rx) = mpsc::channel(100);
        let mut senders = self
            .event_senders
            .lock()
            .map_err(|_| anyhow::anyhow!("handshake event subscribers lock poisoned"))?;
        senders.retain(|sender| !sender.is_closed());
        senders.push(event_tx);
        Ok(event_rx)
    }
}
