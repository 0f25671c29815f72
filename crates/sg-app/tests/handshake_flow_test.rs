use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::oneshot;
use tokio::time::timeout;

use sg_app::usecases::handshake::HandshakeDomainEvent;
use sg_app::{
    HandshakeConfig, HandshakeDeps, HandshakeEventPort, HandshakeFlow, HandshakeOrchestrator,
    PurchaseForm, PurchaseLine, RatingForm,
};
use sg_core::handshake::{
    ActionKind, ActionReceipt, FailureReason, GuardedPayload, HandshakeOutcome, HandshakeState,
    PendingIdentity, PreconditionError, ResolvedMember, SessionToken,
};
use sg_core::ids::{DeviceId, LocationId, MemberId};
use sg_core::ports::{
    BadgeSessionPort, BindError, BoundSession, ClockPort, DeviceDirectoryError,
    DeviceDirectoryPort, GuardedActionError, GuardedActionPort, ReleaseError, VerifyError,
};

const WAIT: Duration = Duration::from_secs(5);

struct RoomDirectory;

#[async_trait]
impl DeviceDirectoryPort for RoomDirectory {
    async fn reader_for(
        &self,
        location: &LocationId,
    ) -> Result<Option<DeviceId>, DeviceDirectoryError> {
        Ok(match location.as_str() {
            "counter-1" => Some(DeviceId::from("D1")),
            _ => None,
        })
    }
}

/// Badge backend answering from a script. Verify can be held open with a gate.
#[derive(Default)]
struct ScriptedBackend {
    binds: Mutex<VecDeque<Result<BoundSession, BindError>>>,
    verifies: Mutex<VecDeque<Result<ResolvedMember, VerifyError>>>,
    verify_gate: Mutex<Option<oneshot::Receiver<()>>>,
    bind_calls: Mutex<Vec<String>>,
    verify_calls: Mutex<Vec<(String, String)>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn bind_ok(&self, token: &str, tapped: Option<&str>) {
        self.binds.lock().unwrap().push_back(Ok(BoundSession {
            token: token.to_string(),
            pending: tapped.map(badge),
        }));
    }

    fn bind_err(&self, error: BindError) {
        self.binds.lock().unwrap().push_back(Err(error));
    }

    fn verify_ok(&self, member: ResolvedMember) {
        self.verifies.lock().unwrap().push_back(Ok(member));
    }

    fn verify_err(&self, error: VerifyError) {
        self.verifies.lock().unwrap().push_back(Err(error));
    }

    fn hold_verify(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.verify_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn bind_calls(&self) -> Vec<String> {
        self.bind_calls.lock().unwrap().clone()
    }

    fn verify_calls(&self) -> Vec<(String, String)> {
        self.verify_calls.lock().unwrap().clone()
    }

    fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl BadgeSessionPort for ScriptedBackend {
    async fn bind_session(&self, device_id: &DeviceId) -> Result<BoundSession, BindError> {
        self.bind_calls.lock().unwrap().push(device_id.to_string());
        self.binds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BindError::Transport("no scripted bind".to_string())))
    }

    async fn verify_identity(
        &self,
        token: &SessionToken,
        pending: &PendingIdentity,
    ) -> Result<ResolvedMember, VerifyError> {
        self.verify_calls
            .lock()
            .unwrap()
            .push((token.token.clone(), pending.badge_display_name.clone()));
        let gate = self.verify_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.verifies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VerifyError::Transport("no scripted verify".to_string())))
    }

    async fn cancel_session(&self, token: &SessionToken) -> Result<(), ReleaseError> {
        self.released.lock().unwrap().push(token.token.clone());
        Ok(())
    }
}

/// Guarded write endpoint that records calls. Can be held open with a gate.
#[derive(Default)]
struct RecordingActions {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    reject_with: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl RecordingActions {
    fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    fn calls(&self) -> Vec<(String, String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuardedActionPort for RecordingActions {
    async fn execute(
        &self,
        token: &SessionToken,
        member: &ResolvedMember,
        payload: &GuardedPayload,
    ) -> Result<ActionReceipt, GuardedActionError> {
        self.calls.lock().unwrap().push((
            token.token.clone(),
            member.member_id.to_string(),
            payload.to_request_body(&member.member_id),
        ));
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(GuardedActionError::Rejected(message));
        }
        Ok(ActionReceipt {
            kind: payload.kind(),
            member_id: member.member_id.clone(),
            record_id: Some(format!("rec-{}", token.token)),
            completed_at: fixed_now(),
        })
    }
}

struct FixedClock;

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        fixed_now()
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 16, 20, 0).unwrap()
}

fn badge(display_name: &str) -> PendingIdentity {
    PendingIdentity {
        badge_user_ref: format!("ref-{display_name}"),
        badge_display_name: display_name.to_string(),
    }
}

fn alice() -> ResolvedMember {
    ResolvedMember {
        member_id: MemberId::from("m-7"),
        member_name: "Alice".to_string(),
    }
}

fn purchase() -> PurchaseForm {
    PurchaseForm {
        items: vec![PurchaseLine {
            product_id: "p-1".to_string(),
            quantity: 2,
            unit_price_cents: 600,
        }],
        total_cents: 1200,
    }
}

fn rating() -> RatingForm {
    RatingForm {
        batch_id: "B-12".to_string(),
        scores: [("aroma".to_string(), 8)].into_iter().collect(),
        comment: Some("citrus".to_string()),
    }
}

struct Harness {
    backend: Arc<ScriptedBackend>,
    actions: Arc<RecordingActions>,
    orchestrator: HandshakeOrchestrator,
}

static TRACE_INIT: Once = Once::new();

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn harness_with(config: HandshakeConfig) -> Harness {
    init_tracing();
    let backend = Arc::new(ScriptedBackend::default());
    let actions = Arc::new(RecordingActions::default());
    let orchestrator = HandshakeOrchestrator::new(
        config,
        HandshakeDeps {
            device_directory: Arc::new(RoomDirectory),
            badge_sessions: backend.clone(),
            guarded_actions: actions.clone(),
            clock: Arc::new(FixedClock),
        },
    );
    Harness {
        backend,
        actions,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(HandshakeConfig::default())
}

async fn settle(flow: &HandshakeFlow) -> HandshakeOutcome {
    timeout(WAIT, flow.wait_outcome())
        .await
        .expect("handshake did not settle")
        .expect("outcome")
}

async fn wait_state(flow: &HandshakeFlow, predicate: impl FnMut(&HandshakeState) -> bool) {
    let mut rx = flow.subscribe_state();
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("state not reached")
        .expect("state channel open");
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn happy_path_binds_verifies_and_runs_once() {
    let h = harness();
    h.backend.bind_ok("T1", Some("alice-badge"));
    h.backend.verify_ok(alice());

    let flow = h
        .orchestrator
        .begin_form("counter-1", &purchase())
        .await
        .expect("flow");
    let outcome = settle(&flow).await;

    match outcome {
        HandshakeOutcome::Completed { member, receipt } => {
            assert_eq!(member, alice());
            assert_eq!(receipt.kind, ActionKind::RecordPurchase);
            assert_eq!(receipt.record_id.as_deref(), Some("rec-T1"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.backend.bind_calls(), vec!["D1".to_string()]);
    assert_eq!(
        h.backend.verify_calls(),
        vec![("T1".to_string(), "alice-badge".to_string())]
    );

    let calls = h.actions.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "T1");
    assert_eq!(calls[0].1, "m-7");
    assert_eq!(calls[0].2["member_id"], "m-7");
    assert_eq!(calls[0].2["total_cents"], 1200);
    assert!(matches!(flow.state(), HandshakeState::Verified { receipt: Some(_), .. }));
    assert!(h.backend.released().is_empty());
}

#[tokio::test]
async fn repeated_scan_report_verifies_and_runs_once() {
    let h = harness();
    h.backend.bind_ok("T1", None);
    h.backend.verify_ok(alice());
    h.backend.verify_ok(alice());

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::AwaitingScan { token: Some(_), .. })
    })
    .await;

    flow.report_scan("T1", badge("alice-badge"));
    flow.report_scan("T1", badge("alice-badge"));
    let outcome = settle(&flow).await;

    assert!(matches!(outcome, HandshakeOutcome::Completed { .. }));
    assert_eq!(h.backend.verify_calls().len(), 1);
    assert_eq!(h.actions.calls().len(), 1);
}

#[tokio::test]
async fn cancel_before_verify_resolves_never_runs_action() {
    let h = harness();
    h.backend.bind_ok("T2", Some("alice-badge"));
    h.backend.verify_ok(alice());
    let verify_gate = h.backend.hold_verify();

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    wait_state(&flow, |s| matches!(s, HandshakeState::Verifying { .. })).await;
    let backend = h.backend.clone();
    eventually(|| !backend.verify_calls().is_empty()).await;

    flow.cancel();
    assert!(matches!(flow.state(), HandshakeState::Cancelled { .. }));
    let _ = verify_gate.send(());

    assert_eq!(settle(&flow).await, HandshakeOutcome::Cancelled);
    eventually(|| backend.released() == vec!["T2".to_string()]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.actions.calls().is_empty());
    assert!(matches!(flow.state(), HandshakeState::Cancelled { .. }));
}

#[tokio::test]
async fn cancel_after_verify_is_noop_and_action_completes() {
    let h = harness();
    h.backend.bind_ok("T1", Some("alice-badge"));
    h.backend.verify_ok(alice());
    let action_gate = h.actions.hold();

    let flow = h
        .orchestrator
        .begin_form("counter-1", &purchase())
        .await
        .expect("flow");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::Verified { receipt: None, .. })
    })
    .await;

    flow.cancel();
    assert!(matches!(flow.state(), HandshakeState::Verified { .. }));
    let _ = action_gate.send(());

    assert!(matches!(
        settle(&flow).await,
        HandshakeOutcome::Completed { .. }
    ));
    assert_eq!(h.actions.calls().len(), 1);
    assert!(h.backend.released().is_empty());
}

#[tokio::test]
async fn unmapped_location_sends_no_bind() {
    let h = harness();

    let err = h
        .orchestrator
        .begin_form("back-office", &purchase())
        .await
        .err()
        .expect("precondition error");

    assert_eq!(
        err,
        PreconditionError::NoDeviceMapped {
            location: "back-office".to_string()
        }
    );
    assert!(h.backend.bind_calls().is_empty());
}

#[tokio::test]
async fn failed_handshake_restarts_through_idle() {
    let h = harness();
    h.backend.bind_err(BindError::DeviceBusy);
    h.backend.bind_ok("T3", Some("alice-badge"));
    h.backend.verify_ok(alice());
    let mut events = h.orchestrator.subscribe().await.expect("subscribe");

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    let first_attempt = flow.attempt_id();

    match settle(&flow).await {
        HandshakeOutcome::Failed { reason, message } => {
            assert_eq!(reason, FailureReason::DeviceBusy);
            assert!(reason.is_retryable());
            assert!(!message.is_empty());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    flow.restart().expect("restart");
    assert_ne!(flow.attempt_id(), first_attempt);
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::Verified { receipt: Some(_), .. })
    })
    .await;
    assert_eq!(h.backend.bind_calls().len(), 2);

    let mut labels = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let HandshakeDomainEvent::StateChanged { state, .. } = event {
            labels.push(state);
        }
    }
    let failed = labels.iter().position(|s| s == "failed").expect("failed");
    let idle = labels.iter().position(|s| s == "idle").expect("idle");
    let verified = labels.iter().position(|s| s == "verified").expect("verified");
    assert!(failed < idle && idle < verified);
    assert!(!labels[failed + 1..idle].iter().any(|s| s == "verified"));
}

#[tokio::test]
async fn restart_is_refused_while_pending() {
    let h = harness();
    h.backend.bind_ok("T1", None);

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::AwaitingScan { token: Some(_), .. })
    })
    .await;

    assert!(flow.restart().is_err());
    assert!(matches!(flow.state(), HandshakeState::AwaitingScan { .. }));
    assert_eq!(h.backend.bind_calls().len(), 1);
}

#[tokio::test]
async fn cancel_before_scan_releases_and_discards_late_report() {
    let h = harness();
    h.backend.bind_ok("T2", None);

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::AwaitingScan { token: Some(_), .. })
    })
    .await;

    flow.cancel();
    assert_eq!(settle(&flow).await, HandshakeOutcome::Cancelled);
    let backend = h.backend.clone();
    eventually(|| backend.released() == vec!["T2".to_string()]).await;

    flow.report_scan("T2", badge("alice-badge"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(flow.state(), HandshakeState::Cancelled { .. }));
    assert!(h.backend.verify_calls().is_empty());
    assert!(h.actions.calls().is_empty());

    flow.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.backend.released().len(), 1);
}

#[tokio::test]
async fn unknown_badge_fails_and_retry_uses_new_token() {
    let h = harness();
    h.backend.bind_ok("T3", Some("stranger"));
    h.backend.verify_err(VerifyError::UnknownBadge);
    h.backend.bind_ok("T4", Some("alice-badge"));
    h.backend.verify_ok(alice());

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");

    match settle(&flow).await {
        HandshakeOutcome::Failed { reason, .. } => {
            assert_eq!(reason, FailureReason::UnknownBadge);
            assert!(reason.requires_rescan());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(h.actions.calls().is_empty());
    let backend = h.backend.clone();
    eventually(|| backend.released().contains(&"T3".to_string())).await;

    flow.restart().expect("restart");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::Verified { receipt: Some(_), .. })
    })
    .await;

    let tokens: Vec<String> = h
        .backend
        .verify_calls()
        .into_iter()
        .map(|(token, _)| token)
        .collect();
    assert_eq!(tokens, vec!["T3".to_string(), "T4".to_string()]);
    assert_eq!(h.actions.calls()[0].0, "T4");
}

#[tokio::test]
async fn rejected_action_is_terminal_without_rebind() {
    let h = harness();
    h.backend.bind_ok("T1", Some("alice-badge"));
    h.backend.verify_ok(alice());
    *h.actions.reject_with.lock().unwrap() = Some("batch locked".to_string());

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");

    match settle(&flow).await {
        HandshakeOutcome::Failed { reason, .. } => {
            assert_eq!(reason, FailureReason::ActionRejected("batch locked".to_string()));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.backend.bind_calls().len(), 1);
    assert_eq!(h.actions.calls().len(), 1);
}

#[tokio::test]
async fn dropping_a_pending_flow_cancels_and_releases() {
    let h = harness();
    h.backend.bind_ok("T6", None);

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");
    wait_state(&flow, |s| {
        matches!(s, HandshakeState::AwaitingScan { token: Some(_), .. })
    })
    .await;

    flow.close();
    let backend = h.backend.clone();
    eventually(|| backend.released() == vec!["T6".to_string()]).await;
}

#[tokio::test(start_paused = true)]
async fn armed_reader_expires_when_configured() {
    let h = harness_with(HandshakeConfig {
        scan_expiry: Some(Duration::from_secs(30)),
        ..HandshakeConfig::default()
    });
    h.backend.bind_ok("T5", None);

    let flow = h
        .orchestrator
        .begin_form("counter-1", &rating())
        .await
        .expect("flow");

    // Paused clock: the 30s expiry must fire before this outer timeout.
    let outcome = timeout(Duration::from_secs(600), flow.wait_outcome())
        .await
        .expect("handshake did not settle")
        .expect("outcome");
    match outcome {
        HandshakeOutcome::Failed { reason, .. } => {
            assert_eq!(reason, FailureReason::SessionExpired)
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let backend = h.backend.clone();
    eventually(|| backend.released() == vec!["T5".to_string()]).await;
}

#[tokio::test]
async fn confirmation_gates_the_bind() {
    let h = harness();
    h.backend.bind_ok("T7", Some("alice-badge"));
    h.backend.verify_ok(alice());

    let request = sg_app::HandshakeRequest::new(
        "counter-1",
        sg_app::GuardedForm::freeze(&purchase(), fixed_now()).expect("payload"),
    )
    .with_confirmation(true);
    let flow = h.orchestrator.begin(request).await.expect("flow");

    assert!(matches!(
        flow.state(),
        HandshakeState::AwaitingConfirmation { .. }
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.backend.bind_calls().is_empty());

    flow.confirm();
    assert!(matches!(
        settle(&flow).await,
        HandshakeOutcome::Completed { .. }
    ));
    assert_eq!(h.backend.bind_calls(), vec!["D1".to_string()]);
}

#[tokio::test]
async fn token_guards_do_not_outlive_their_handshake() {
    // The backend recycles token values once a session is closed.
    let h = harness();
    for round in 0..25 {
        h.backend.bind_ok("T1", Some("alice-badge"));
        h.backend.verify_ok(alice());

        let flow = h
            .orchestrator
            .begin_form("counter-1", &purchase())
            .await
            .expect("flow");
        let outcome = settle(&flow).await;
        assert!(
            matches!(outcome, HandshakeOutcome::Completed { .. }),
            "round {round}: {outcome:?}"
        );
    }
    assert_eq!(h.actions.calls().len(), 25);
    assert_eq!(h.backend.verify_calls().len(), 25);
}
