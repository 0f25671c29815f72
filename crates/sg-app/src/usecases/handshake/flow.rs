//! Live handshake driven by the state machine
//!
//! `HandshakeFlow` 是一次握手的所有者句柄：把用户操作、网络结果和定时器转换为
//! `HandshakeEvent`，交给状态机，再执行返回的动作。
//!
//! ```text
//! confirm / cancel / report_scan / network results / timer
//!   ↓
//! HandshakeStateMachine::handle_event (under one lock, never across .await)
//!   ↓
//! HandshakeAction → spawned bind / verify / run, release, timers, events
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use sg_core::handshake::{
    GuardedPayload, HandshakeAction, HandshakeEvent, HandshakeOutcome, HandshakeState,
    HandshakeStateMachine, PendingIdentity, SessionToken,
};
use sg_core::ids::{AttemptId, DeviceId};
use sg_core::ports::{ClockPort, GuardedActionError};

use super::cancellation::CancellationController;
use super::events::HandshakeDomainEvent;
use super::guarded_executor::GuardedActionExecutor;
use super::identity_verifier::IdentityVerifier;
use super::session_binder::SessionBinder;

pub(crate) type EventSenders = Arc<Mutex<Vec<mpsc::Sender<HandshakeDomainEvent>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Components a flow runs its actions with.
pub(crate) struct FlowComponents {
    pub binder: Arc<SessionBinder>,
    pub verifier: Arc<IdentityVerifier>,
    pub executor: Arc<GuardedActionExecutor>,
    pub cancellation: CancellationController,
    pub clock: Arc<dyn ClockPort>,
    pub event_senders: EventSenders,
}

struct FlowInner {
    machine: Mutex<HandshakeStateMachine>,
    state_tx: watch::Sender<HandshakeState>,
    device_id: DeviceId,
    payload: GuardedPayload,
    require_confirmation: bool,
    components: FlowComponents,
    expiry_timer: Mutex<Option<AbortHandle>>,
}

/// Clonable handle used by spawned tasks to report back.
#[derive(Clone)]
struct FlowDriver {
    inner: Arc<FlowInner>,
}

/// One card-scan handshake for one guarded action.
///
/// Not `Clone`: the view that started the handshake owns it. Dropping the
/// flow while it is still waiting for a scan cancels it.
pub struct HandshakeFlow {
    driver: FlowDriver,
}

impl HandshakeFlow {
    pub(crate) fn new(
        device_id: DeviceId,
        payload: GuardedPayload,
        require_confirmation: bool,
        machine: HandshakeStateMachine,
        components: FlowComponents,
    ) -> Self {
        let (state_tx, _) = watch::channel(machine.state().clone());
        Self {
            driver: FlowDriver {
                inner: Arc::new(FlowInner {
                    machine: Mutex::new(machine),
                    state_tx,
                    device_id,
                    payload,
                    require_confirmation,
                    components,
                    expiry_timer: Mutex::new(None),
                }),
            },
        }
    }

    pub(crate) fn start(&self) {
        self.driver.dispatch(HandshakeEvent::Start {
            device_id: self.driver.inner.device_id.clone(),
            require_confirmation: self.driver.inner.require_confirmation,
        });
    }

    pub fn state(&self) -> HandshakeState {
        self.driver.inner.state_tx.borrow().clone()
    }

    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.driver.inner.state_tx.borrow().attempt_id().cloned()
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.driver.inner.device_id
    }

    pub fn payload(&self) -> &GuardedPayload {
        &self.driver.inner.payload
    }

    /// Receives every visible state change.
    pub fn subscribe_state(&self) -> watch::Receiver<HandshakeState> {
        self.driver.inner.state_tx.subscribe()
    }

    /// Operator approved the confirmation step; arms the reader.
    pub fn confirm(&self) {
        let span = info_span!("handshake.confirm", device_id = %self.driver.inner.device_id);
        let _guard = span.enter();
        self.driver.dispatch(HandshakeEvent::UserConfirm);
    }

    /// Operator declined the confirmation step. Ends in `Cancelled`
    /// without any network call.
    pub fn decline(&self) {
        let span = info_span!("handshake.decline", device_id = %self.driver.inner.device_id);
        let _guard = span.enter();
        self.driver.dispatch(HandshakeEvent::UserDecline);
    }

    /// Cancels the handshake.
    ///
    /// The state flips to `Cancelled` before this returns; the abort signal
    /// fires and the backend release runs in the background. No effect once
    /// identity was verified or the handshake already ended.
    pub fn cancel(&self) {
        let span = info_span!(
            "handshake.cancel",
            attempt_id = ?self.attempt_id(),
            device_id = %self.driver.inner.device_id
        );
        let _guard = span.enter();
        self.driver.dispatch(HandshakeEvent::UserCancel);
    }

    /// Tap reported by the reader after the session was bound.
    pub fn report_scan(&self, token: &str, pending: PendingIdentity) {
        let token = SessionToken::new(
            token,
            self.driver.inner.device_id.clone(),
            self.driver.inner.components.clock.now(),
        );
        self.driver
            .dispatch(HandshakeEvent::ScanReported { token, pending });
    }

    /// Starts a new attempt from `Failed` or `Cancelled`, through `Idle`.
    ///
    /// Same reader and frozen payload; the attempt id and token are new.
    pub fn restart(&self) -> Result<()> {
        let state = self.driver.dispatch(HandshakeEvent::Restart);
        if state != HandshakeState::Idle {
            bail!("cannot restart handshake in state {}", state.label());
        }
        self.start();
        Ok(())
    }

    /// Resolves once the handshake settles (terminal with nothing left running).
    pub async fn wait_outcome(&self) -> Result<HandshakeOutcome> {
        let mut rx = self.subscribe_state();
        let state = rx
            .wait_for(HandshakeState::is_settled)
            .await
            .context("handshake state channel closed")?;
        let outcome = state.outcome();
        outcome.context("settled handshake state carries no outcome")
    }

    /// Tears the flow down, cancelling it if still pending.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for HandshakeFlow {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            tracing::debug!(device_id = %self.driver.inner.device_id, "Handshake dropped while pending");
            self.cancel();
        }
        self.driver.clear_expiry_timer();
    }
}

impl FlowDriver {
    /// Single entry point for state changes. Returns the new state.
    fn dispatch(&self, event: HandshakeEvent) -> HandshakeState {
        let (state, actions) = {
            let mut machine = lock(&self.inner.machine);
            let now = self.inner.components.clock.now();
            let (state, actions) = machine.handle_event(event, now);
            self.inner.state_tx.send_replace(state.clone());
            (state, actions)
        };

        for action in actions {
            self.execute(action);
        }
        state
    }

    fn execute(&self, action: HandshakeAction) {
        match action {
            HandshakeAction::RequestConfirmation {
                attempt_id,
                device_id,
            } => {
                self.emit(HandshakeDomainEvent::ConfirmationRequired {
                    attempt_id,
                    device_id,
                    action: self.inner.payload.kind(),
                    payload_digest: self.inner.payload.digest().to_string(),
                });
            }
            HandshakeAction::BindSession {
                attempt_id,
                device_id,
            } => self.spawn_bind(attempt_id, device_id),
            HandshakeAction::VerifyIdentity { token, pending } => {
                self.spawn_verify(token, pending)
            }
            HandshakeAction::RunGuardedAction { token, member } => {
                let driver = self.clone();
                let span = info_span!(
                    "handshake.run",
                    action = %self.inner.payload.kind(),
                    member_id = %member.member_id
                );
                tokio::spawn(
                    async move {
                        let result = driver
                            .inner
                            .components
                            .executor
                            .run(&token, &member, &driver.inner.payload)
                            .await;
                        let event = match result {
                            Ok(receipt) => HandshakeEvent::ActionSucceeded { token, receipt },
                            Err(GuardedActionError::Rejected(message)) => {
                                HandshakeEvent::ActionFailed {
                                    token,
                                    error: message,
                                }
                            }
                            Err(error) => HandshakeEvent::ActionFailed {
                                token,
                                error: error.to_string(),
                            },
                        };
                        driver.dispatch(event);
                    }
                    .instrument(span),
                );
            }
            HandshakeAction::AbortInFlight { attempt_id } => {
                if self.inner.components.cancellation.abort(&attempt_id) {
                    tracing::debug!(%attempt_id, "Aborted in-flight request");
                }
            }
            HandshakeAction::ReleaseSession { token } => {
                tracing::debug!(token = %token.redacted(), "Releasing scan session");
                self.inner.components.cancellation.release(&token);
            }
            HandshakeAction::StartExpiryTimer { token, deadline } => {
                let sleep_for = deadline
                    .signed_duration_since(self.inner.components.clock.now())
                    .to_std()
                    .unwrap_or_else(|_| std::time::Duration::from_secs(0));
                let driver = self.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(sleep_for).await;
                    tracing::info!(token = %token.redacted(), "Scan session expired");
                    driver.dispatch(HandshakeEvent::ScanExpired { token });
                });
                if let Some(previous) = lock(&self.inner.expiry_timer).replace(handle.abort_handle())
                {
                    previous.abort();
                }
            }
            HandshakeAction::CancelExpiryTimer { .. } => self.clear_expiry_timer(),
            HandshakeAction::LogTransition {
                attempt_id,
                old_state,
                event,
                new_state,
            } => {
                tracing::debug!(
                    attempt_id = ?attempt_id,
                    %old_state,
                    %event,
                    %new_state,
                    "Handshake state transition"
                );
                if old_state != new_state {
                    self.emit(HandshakeDomainEvent::StateChanged {
                        attempt_id,
                        state: new_state,
                    });
                }
            }
            HandshakeAction::DiscardStale { event, reason } => {
                tracing::debug!(%event, %reason, "Discarded stale handshake event");
            }
            HandshakeAction::EmitOutcome {
                attempt_id,
                outcome,
            } => {
                self.clear_expiry_timer();
                let event = match outcome {
                    HandshakeOutcome::Completed { member, receipt } => {
                        tracing::info!(
                            %attempt_id,
                            member_id = %member.member_id,
                            record_id = ?receipt.record_id,
                            "Handshake completed"
                        );
                        HandshakeDomainEvent::Completed {
                            attempt_id,
                            member,
                            receipt,
                        }
                    }
                    HandshakeOutcome::Cancelled => {
                        tracing::info!(%attempt_id, "Handshake cancelled");
                        HandshakeDomainEvent::Cancelled { attempt_id }
                    }
                    HandshakeOutcome::Failed { reason, message } => {
                        tracing::warn!(%attempt_id, ?reason, "Handshake failed");
                        HandshakeDomainEvent::Failed {
                            attempt_id,
                            reason,
                            message,
                        }
                    }
                };
                self.emit(event);
            }
        }
    }

    fn spawn_bind(&self, attempt_id: AttemptId, device_id: DeviceId) {
        let signal = self.inner.components.cancellation.arm(&attempt_id);
        let driver = self.clone();
        let span = info_span!("handshake.bind", %attempt_id, %device_id);
        tokio::spawn(
            async move {
                let result = driver
                    .inner
                    .components
                    .binder
                    .bind(&device_id, &signal)
                    .await;
                let event = match result {
                    Ok(bound) => HandshakeEvent::BindSucceeded {
                        attempt_id,
                        token: bound.token,
                        pending: bound.pending,
                    },
                    Err(error) => HandshakeEvent::BindFailed { attempt_id, error },
                };
                driver.dispatch(event);
            }
            .instrument(span),
        );
    }

    fn spawn_verify(&self, token: SessionToken, pending: PendingIdentity) {
        let signal = self.current_signal();
        let driver = self.clone();
        let span = info_span!(
            "handshake.verify",
            token = %token.redacted(),
            device_id = %token.device_id
        );
        tokio::spawn(
            async move {
                let live = driver.inner.state_tx.borrow().live_token().cloned();
                let result = driver
                    .inner
                    .components
                    .verifier
                    .verify(&token, live.as_ref(), &pending, &signal)
                    .await;
                let event = match result {
                    Ok(member) => HandshakeEvent::VerifySucceeded { token, member },
                    Err(error) => HandshakeEvent::VerifyFailed { token, error },
                };
                driver.dispatch(event);
            }
            .instrument(span),
        );
    }

    /// Abort signal of the live attempt; an already fired one when nothing
    /// is armed.
    fn current_signal(&self) -> CancellationToken {
        let attempt_id = self.inner.state_tx.borrow().attempt_id().cloned();
        attempt_id
            .and_then(|attempt_id| self.inner.components.cancellation.signal_for(&attempt_id))
            .unwrap_or_else(|| {
                let signal = CancellationToken::new();
                signal.cancel();
                signal
            })
    }

    fn clear_expiry_timer(&self) {
        if let Some(handle) = lock(&self.inner.expiry_timer).take() {
            handle.abort();
        }
    }

    fn emit(&self, event: HandshakeDomainEvent) {
        let senders = {
            let mut senders = lock(&self.inner.components.event_senders);
            senders.retain(|sender| !sender.is_closed());
            senders.clone()
        };
        for sender in senders {
            if let Err(error) = sender.try_send(event.clone()) {
                tracing::debug!(%error, "Handshake event not delivered");
            }
        }
    }
}
