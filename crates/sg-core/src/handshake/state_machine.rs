//! Card-scan handshake state machine
//!
//! 这个模块实现了刷卡身份绑定握手的显式状态机。
//!
//! # Design Principles / 设计原则
//!
//! - **显式状态**: 每个阶段（等待确认、等待刷卡、验证中、已验证）都是一个带数据的变体
//! - **过期回调**: 每个异步结果都携带 attempt_id 或 token，不属于当前握手的结果一律丢弃
//! - **单次执行**: `RunGuardedAction` 只在 `Verifying → Verified` 迁移时产生一次
//! - **可测试**: 纯函数式状态转换 `(state, event) -> (new_state, actions[])`
//!
//! # Architecture / 架构
//!
//! ```text
//! HandshakeStateMachine (sg-core)
//!   ├── State: 握手当前状态
//!   ├── Event: 用户操作 / 网络结果 / 定时器
//!   └── Action: 需要执行的副作用
//!
//! HandshakeFlow (sg-app)
//!   ├── 把网络结果转换为 HandshakeEvent
//!   ├── 调用状态机获取 actions
//!   └── 执行 actions (bind / verify / run / release / timers)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActionReceipt, PendingIdentity, ResolvedMember, SessionToken};
use crate::ids::{AttemptId, DeviceId};
use crate::ports::{BindError, VerifyError};

/// Visible handshake states.
///
/// 握手的可见状态。`Verified`、`Cancelled`、`Failed` 为终态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    /// 空闲，尚未开始或已重置
    Idle,

    /// 等待操作员确认 (替代阻塞式 "确定吗?" 对话框)
    AwaitingConfirmation {
        attempt_id: AttemptId,
        device_id: DeviceId,
    },

    /// 读卡器已请求布防；`token` 在 bind 返回后才有值
    AwaitingScan {
        attempt_id: AttemptId,
        device_id: DeviceId,
        token: Option<SessionToken>,
    },

    /// 正在向后端验证身份
    Verifying {
        attempt_id: AttemptId,
        token: SessionToken,
    },

    /// 身份已验证 (终态)；`receipt` 在业务写入成功后设置
    Verified {
        attempt_id: AttemptId,
        token: SessionToken,
        member: ResolvedMember,
        receipt: Option<ActionReceipt>,
    },

    /// 被操作员取消 (终态)
    Cancelled {
        attempt_id: AttemptId,
        token: Option<SessionToken>,
    },

    /// 失败 (终态)，只能通过 restart 重新开始
    Failed {
        attempt_id: AttemptId,
        token: Option<SessionToken>,
        reason: FailureReason,
    },
}

impl HandshakeState {
    pub fn attempt_id(&self) -> Option<&AttemptId> {
        match self {
            HandshakeState::Idle => None,
            HandshakeState::AwaitingConfirmation { attempt_id, .. }
            | HandshakeState::AwaitingScan { attempt_id, .. }
            | HandshakeState::Verifying { attempt_id, .. }
            | HandshakeState::Verified { attempt_id, .. }
            | HandshakeState::Cancelled { attempt_id, .. }
            | HandshakeState::Failed { attempt_id, .. } => Some(attempt_id),
        }
    }

    /// Token a network callback must carry to be accepted in this state.
    pub fn live_token(&self) -> Option<&SessionToken> {
        match self {
            HandshakeState::AwaitingScan { token, .. } => token.as_ref(),
            HandshakeState::Verifying { token, .. } => Some(token),
            HandshakeState::Verified {
                token,
                receipt: None,
                ..
            } => Some(token),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Verified { .. }
                | HandshakeState::Cancelled { .. }
                | HandshakeState::Failed { .. }
        )
    }

    /// Terminal and nothing left running.
    pub fn is_settled(&self) -> bool {
        match self {
            HandshakeState::Verified { receipt, .. } => receipt.is_some(),
            HandshakeState::Cancelled { .. } | HandshakeState::Failed { .. } => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HandshakeState::Idle => "idle",
            HandshakeState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            HandshakeState::AwaitingScan { .. } => "awaiting_scan",
            HandshakeState::Verifying { .. } => "verifying",
            HandshakeState::Verified { .. } => "verified",
            HandshakeState::Cancelled { .. } => "cancelled",
            HandshakeState::Failed { .. } => "failed",
        }
    }

    /// Outcome value for a settled state.
    pub fn outcome(&self) -> Option<HandshakeOutcome> {
        match self {
            HandshakeState::Verified {
                member,
                receipt: Some(receipt),
                ..
            } => Some(HandshakeOutcome::Completed {
                member: member.clone(),
                receipt: receipt.clone(),
            }),
            HandshakeState::Cancelled { .. } => Some(HandshakeOutcome::Cancelled),
            HandshakeState::Failed { reason, .. } => Some(HandshakeOutcome::Failed {
                message: reason.user_message(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// 失败原因 (可审计)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// 设备 ID 为空
    InvalidDevice,
    /// 网关不认识该设备
    DeviceUnknown(String),
    /// 读卡器已被其他会话布防
    DeviceBusy,
    /// 读卡器不可达
    DeviceUnreachable(String),
    /// 传输层错误
    Transport(String),
    /// 卡片未对应任何有效成员
    UnknownBadge,
    /// 会话过期
    SessionExpired,
    /// 业务写入被后端拒绝
    ActionRejected(String),
    /// 其他原因
    Other(String),
}

/// Failure taxonomy shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network or server trouble; restart and try again.
    Transport,
    /// Reader armed by someone else; retry shortly.
    Conflict,
    /// Badge or session not trusted; scan again.
    Trust,
    /// Backend refused the domain write.
    Domain,
    Internal,
}

impl FailureReason {
    pub fn class(&self) -> FailureClass {
        match self {
            FailureReason::DeviceUnreachable(_) | FailureReason::Transport(_) => {
                FailureClass::Transport
            }
            FailureReason::DeviceBusy => FailureClass::Conflict,
            FailureReason::UnknownBadge | FailureReason::SessionExpired => FailureClass::Trust,
            FailureReason::ActionRejected(_) => FailureClass::Domain,
            FailureReason::InvalidDevice
            | FailureReason::DeviceUnknown(_)
            | FailureReason::Other(_) => FailureClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            FailureClass::Transport | FailureClass::Conflict
        )
    }

    /// Operator should tap the badge again rather than retry blindly.
    pub fn requires_rescan(&self) -> bool {
        self.class() == FailureClass::Trust
    }

    pub fn user_message(&self) -> String {
        match self {
            FailureReason::InvalidDevice => "No card reader selected.".to_string(),
            FailureReason::DeviceUnknown(device) => {
                format!("Card reader {device} is not registered.")
            }
            FailureReason::DeviceBusy => {
                "The card reader is busy with another scan. Try again in a moment.".to_string()
            }
            FailureReason::DeviceUnreachable(detail) => {
                format!("The card reader could not be reached ({detail}).")
            }
            FailureReason::Transport(detail) => format!("Network error: {detail}"),
            FailureReason::UnknownBadge => {
                "This card is not linked to an active member. Scan again.".to_string()
            }
            FailureReason::SessionExpired => "The scan session expired. Scan again.".to_string(),
            FailureReason::ActionRejected(detail) => format!("The action was rejected: {detail}"),
            FailureReason::Other(detail) => detail.clone(),
        }
    }
}

impl From<BindError> for FailureReason {
    fn from(error: BindError) -> Self {
        match error {
            BindError::EmptyDeviceId => FailureReason::InvalidDevice,
            BindError::DeviceUnknown(device) => FailureReason::DeviceUnknown(device),
            BindError::DeviceBusy => FailureReason::DeviceBusy,
            BindError::Unreachable(detail) => FailureReason::DeviceUnreachable(detail),
            BindError::Transport(detail) => FailureReason::Transport(detail),
            BindError::Aborted => FailureReason::Other("bind aborted".to_string()),
        }
    }
}

impl From<VerifyError> for FailureReason {
    fn from(error: VerifyError) -> Self {
        match error {
            VerifyError::UnknownBadge => FailureReason::UnknownBadge,
            VerifyError::SessionExpired => FailureReason::SessionExpired,
            VerifyError::Transport(detail) => FailureReason::Transport(detail),
            VerifyError::StaleToken => FailureReason::Other("stale session token".to_string()),
            VerifyError::Aborted => FailureReason::Other("verification aborted".to_string()),
        }
    }
}

/// Result value handed back to the view that started the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeOutcome {
    Completed {
        member: ResolvedMember,
        receipt: ActionReceipt,
    },
    Cancelled,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

/// 触发状态转换的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// 开始握手
    Start {
        device_id: DeviceId,
        require_confirmation: bool,
    },
    /// 操作员确认
    UserConfirm,
    /// 操作员拒绝确认
    UserDecline,
    /// 操作员取消
    UserCancel,
    /// 从终态回到 Idle
    Restart,
    /// bind 成功
    BindSucceeded {
        attempt_id: AttemptId,
        token: SessionToken,
        pending: Option<PendingIdentity>,
    },
    /// bind 失败
    BindFailed {
        attempt_id: AttemptId,
        error: BindError,
    },
    /// 读卡器上报刷卡
    ScanReported {
        token: SessionToken,
        pending: PendingIdentity,
    },
    /// 身份验证成功
    VerifySucceeded {
        token: SessionToken,
        member: ResolvedMember,
    },
    /// 身份验证失败
    VerifyFailed {
        token: SessionToken,
        error: VerifyError,
    },
    /// 业务写入成功
    ActionSucceeded {
        token: SessionToken,
        receipt: ActionReceipt,
    },
    /// 业务写入失败
    ActionFailed { token: SessionToken, error: String },
    /// 刷卡会话过期
    ScanExpired { token: SessionToken },
}

impl HandshakeEvent {
    fn name(&self) -> &'static str {
        match self {
            HandshakeEvent::Start { .. } => "Start",
            HandshakeEvent::UserConfirm => "UserConfirm",
            HandshakeEvent::UserDecline => "UserDecline",
            HandshakeEvent::UserCancel => "UserCancel",
            HandshakeEvent::Restart => "Restart",
            HandshakeEvent::BindSucceeded { .. } => "BindSucceeded",
            HandshakeEvent::BindFailed { .. } => "BindFailed",
            HandshakeEvent::ScanReported { .. } => "ScanReported",
            HandshakeEvent::VerifySucceeded { .. } => "VerifySucceeded",
            HandshakeEvent::VerifyFailed { .. } => "VerifyFailed",
            HandshakeEvent::ActionSucceeded { .. } => "ActionSucceeded",
            HandshakeEvent::ActionFailed { .. } => "ActionFailed",
            HandshakeEvent::ScanExpired { .. } => "ScanExpired",
        }
    }
}

/// 状态转换产生的动作
///
/// 这些动作由 HandshakeFlow 执行,实现状态机的副作用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// 展示确认步骤
    RequestConfirmation {
        attempt_id: AttemptId,
        device_id: DeviceId,
    },
    /// 请求后端布防读卡器
    BindSession {
        attempt_id: AttemptId,
        device_id: DeviceId,
    },
    /// 向后端验证身份
    VerifyIdentity {
        token: SessionToken,
        pending: PendingIdentity,
    },
    /// 执行受保护的业务写入 (每个 token 最多一次)
    RunGuardedAction {
        token: SessionToken,
        member: ResolvedMember,
    },
    /// 中止正在进行的 bind / verify 请求
    AbortInFlight { attempt_id: AttemptId },
    /// 通知后端释放会话 (尽力而为)
    ReleaseSession { token: SessionToken },
    /// 启动刷卡过期定时器
    StartExpiryTimer {
        token: SessionToken,
        deadline: DateTime<Utc>,
    },
    /// 取消刷卡过期定时器
    CancelExpiryTimer { token: SessionToken },
    /// 记录状态转换日志 (用于审计)
    LogTransition {
        attempt_id: Option<AttemptId>,
        old_state: String,
        event: String,
        new_state: String,
    },
    /// 事件不属于当前握手，已丢弃
    DiscardStale { event: String, reason: String },
    /// 握手结束，向调用方返回结果
    EmitOutcome {
        attempt_id: AttemptId,
        outcome: HandshakeOutcome,
    },
}

/// 握手策略配置
#[derive(Debug, Clone, Default)]
pub struct HandshakePolicy {
    /// 已布防读卡器等待刷卡的最长时间；`None` 表示只能由操作员取消
    pub scan_expiry: Option<Duration>,
}

/// 握手状态机
///
/// # Example / 示例
///
/// ```
/// use chrono::Utc;
/// use sg_core::handshake::{HandshakeEvent, HandshakeState, HandshakeStateMachine};
///
/// let mut sm = HandshakeStateMachine::new();
/// let (state, _actions) = sm.handle_event(
///     HandshakeEvent::Start {
///         device_id: "D1".into(),
///         require_confirmation: false,
///     },
///     Utc::now(),
/// );
/// assert!(matches!(state, HandshakeState::AwaitingScan { token: None, .. }));
/// ```
#[derive(Debug, Clone)]
pub struct HandshakeStateMachine {
    state: HandshakeState,
    policy: HandshakePolicy,
}

type Transition = (HandshakeState, Vec<HandshakeAction>);

impl HandshakeStateMachine {
    pub fn new() -> Self {
        Self::with_policy(HandshakePolicy::default())
    }

    pub fn with_policy(policy: HandshakePolicy) -> Self {
        Self {
            state: HandshakeState::Idle,
            policy,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// 处理事件并返回新状态和动作列表
    ///
    /// 这是状态机唯一的状态修改入口。
    pub fn handle_event(
        &mut self,
        event: HandshakeEvent,
        now: DateTime<Utc>,
    ) -> (HandshakeState, Vec<HandshakeAction>) {
        let old_state = self.state.clone();
        let event_name = event.name();

        let (new_state, actions) = self.transition(event, now);

        let log_action = HandshakeAction::LogTransition {
            attempt_id: new_state
                .attempt_id()
                .or_else(|| old_state.attempt_id())
                .cloned(),
            old_state: old_state.label().to_string(),
            event: event_name.to_string(),
            new_state: new_state.label().to_string(),
        };

        let mut all_actions = vec![log_action];
        all_actions.extend(actions);

        self.state = new_state.clone();
        (new_state, all_actions)
    }

    fn transition(&self, event: HandshakeEvent, now: DateTime<Utc>) -> Transition {
        match (self.state.clone(), event) {
            (
                HandshakeState::Idle,
                HandshakeEvent::Start {
                    device_id,
                    require_confirmation,
                },
            ) => {
                let attempt_id = AttemptId::new();
                if device_id.is_blank() {
                    return self.fail(attempt_id, None, FailureReason::InvalidDevice, vec![]);
                }
                if require_confirmation {
                    (
                        HandshakeState::AwaitingConfirmation {
                            attempt_id: attempt_id.clone(),
                            device_id: device_id.clone(),
                        },
                        vec![HandshakeAction::RequestConfirmation {
                            attempt_id,
                            device_id,
                        }],
                    )
                } else {
                    Self::arm(attempt_id, device_id)
                }
            }
            (
                HandshakeState::AwaitingConfirmation {
                    attempt_id,
                    device_id,
                },
                HandshakeEvent::UserConfirm,
            ) => Self::arm(attempt_id, device_id),
            (
                HandshakeState::AwaitingConfirmation { attempt_id, .. },
                HandshakeEvent::UserDecline | HandshakeEvent::UserCancel,
            ) => Self::cancel(attempt_id, None, vec![]),
            (
                HandshakeState::AwaitingScan {
                    attempt_id,
                    device_id,
                    token: None,
                },
                HandshakeEvent::BindSucceeded {
                    attempt_id: event_attempt,
                    token,
                    pending,
                },
            ) if attempt_id == event_attempt => {
                if token.device_id != device_id {
                    return self.fail(
                        attempt_id,
                        Some(token.clone()),
                        FailureReason::Other(format!(
                            "session bound to reader {} instead of {}",
                            token.device_id, device_id
                        )),
                        vec![HandshakeAction::ReleaseSession { token }],
                    );
                }
                match pending {
                    Some(pending) => Self::begin_verify(attempt_id, token, pending, vec![]),
                    None => {
                        let mut actions = Vec::new();
                        if let Some(expiry) = self.policy.scan_expiry {
                            actions.push(HandshakeAction::StartExpiryTimer {
                                token: token.clone(),
                                deadline: now + expiry,
                            });
                        }
                        (
                            HandshakeState::AwaitingScan {
                                attempt_id,
                                device_id,
                                token: Some(token),
                            },
                            actions,
                        )
                    }
                }
            }
            (
                HandshakeState::AwaitingScan {
                    attempt_id,
                    token: None,
                    ..
                },
                HandshakeEvent::BindFailed {
                    attempt_id: event_attempt,
                    error,
                },
            ) if attempt_id == event_attempt => match error {
                // 中止只来自取消信号，不作为错误上报
                BindError::Aborted => Self::cancel(attempt_id, None, vec![]),
                error => self.fail(attempt_id, None, error.into(), vec![]),
            },
            (
                HandshakeState::AwaitingScan {
                    attempt_id,
                    token: Some(live),
                    ..
                },
                HandshakeEvent::ScanReported { token, pending },
            ) if live.same_session(&token) => {
                let mut prefix = Vec::new();
                if self.policy.scan_expiry.is_some() {
                    prefix.push(HandshakeAction::CancelExpiryTimer {
                        token: live.clone(),
                    });
                }
                Self::begin_verify(attempt_id, live, pending, prefix)
            }
            (
                HandshakeState::AwaitingScan {
                    attempt_id,
                    token: Some(live),
                    ..
                },
                HandshakeEvent::ScanExpired { token },
            )
            | (
                HandshakeState::Verifying {
                    attempt_id,
                    token: live,
                },
                HandshakeEvent::ScanExpired { token },
            ) if live.same_session(&token) => self.fail(
                attempt_id.clone(),
                Some(live.clone()),
                FailureReason::SessionExpired,
                vec![
                    HandshakeAction::AbortInFlight { attempt_id },
                    HandshakeAction::ReleaseSession { token: live },
                ],
            ),
            (
                HandshakeState::Verifying {
                    attempt_id,
                    token: live,
                },
                HandshakeEvent::VerifySucceeded { token, member },
            ) if live.same_session(&token) => (
                HandshakeState::Verified {
                    attempt_id,
                    token: live.clone(),
                    member: member.clone(),
                    receipt: None,
                },
                vec![HandshakeAction::RunGuardedAction {
                    token: live,
                    member,
                }],
            ),
            (
                HandshakeState::Verifying {
                    attempt_id,
                    token: live,
                },
                HandshakeEvent::VerifyFailed { token, error },
            ) if live.same_session(&token) => match error {
                VerifyError::Aborted => Self::cancel(attempt_id, Some(live), vec![]),
                error => self.fail(
                    attempt_id,
                    Some(live.clone()),
                    error.into(),
                    vec![HandshakeAction::ReleaseSession { token: live }],
                ),
            },
            (
                HandshakeState::Verified {
                    attempt_id,
                    token: live,
                    member,
                    receipt: None,
                },
                HandshakeEvent::ActionSucceeded { token, receipt },
            ) if live.same_session(&token) => (
                HandshakeState::Verified {
                    attempt_id: attempt_id.clone(),
                    token: live,
                    member: member.clone(),
                    receipt: Some(receipt.clone()),
                },
                vec![HandshakeAction::EmitOutcome {
                    attempt_id,
                    outcome: HandshakeOutcome::Completed { member, receipt },
                }],
            ),
            (
                HandshakeState::Verified {
                    attempt_id,
                    token: live,
                    receipt: None,
                    ..
                },
                HandshakeEvent::ActionFailed { token, error },
            ) if live.same_session(&token) => self.fail(
                attempt_id,
                Some(live),
                FailureReason::ActionRejected(error),
                vec![],
            ),
            (
                HandshakeState::AwaitingScan {
                    attempt_id, token, ..
                },
                HandshakeEvent::UserCancel,
            ) => {
                let mut actions = vec![HandshakeAction::AbortInFlight {
                    attempt_id: attempt_id.clone(),
                }];
                if let Some(token) = token.clone() {
                    if self.policy.scan_expiry.is_some() {
                        actions.push(HandshakeAction::CancelExpiryTimer {
                            token: token.clone(),
                        });
                    }
                    actions.push(HandshakeAction::ReleaseSession { token });
                }
                Self::cancel(attempt_id, token, actions)
            }
            (HandshakeState::Verifying { attempt_id, token }, HandshakeEvent::UserCancel) => {
                let actions = vec![
                    HandshakeAction::AbortInFlight {
                        attempt_id: attempt_id.clone(),
                    },
                    HandshakeAction::ReleaseSession {
                        token: token.clone(),
                    },
                ];
                Self::cancel(attempt_id, Some(token), actions)
            }
            (
                HandshakeState::Cancelled { .. } | HandshakeState::Failed { .. },
                HandshakeEvent::Restart,
            ) => (HandshakeState::Idle, vec![]),
            // A token issued for an attempt that is no longer waiting for it
            // still arms a reader; release it.
            (state, HandshakeEvent::BindSucceeded { token, .. }) => (
                state,
                vec![
                    HandshakeAction::DiscardStale {
                        event: "BindSucceeded".to_string(),
                        reason: "attempt is no longer awaiting a session".to_string(),
                    },
                    HandshakeAction::ReleaseSession { token },
                ],
            ),
            (state, event) => {
                let reason = if state.is_terminal() {
                    "handshake already finished"
                } else {
                    "event does not belong to the live session"
                };
                (
                    state,
                    vec![HandshakeAction::DiscardStale {
                        event: event.name().to_string(),
                        reason: reason.to_string(),
                    }],
                )
            }
        }
    }

    fn arm(attempt_id: AttemptId, device_id: DeviceId) -> Transition {
        (
            HandshakeState::AwaitingScan {
                attempt_id: attempt_id.clone(),
                device_id: device_id.clone(),
                token: None,
            },
            vec![HandshakeAction::BindSession {
                attempt_id,
                device_id,
            }],
        )
    }

    fn begin_verify(
        attempt_id: AttemptId,
        token: SessionToken,
        pending: PendingIdentity,
        mut actions: Vec<HandshakeAction>,
    ) -> Transition {
        actions.push(HandshakeAction::VerifyIdentity {
            token: token.clone(),
            pending,
        });
        (HandshakeState::Verifying { attempt_id, token }, actions)
    }

    fn fail(
        &self,
        attempt_id: AttemptId,
        token: Option<SessionToken>,
        reason: FailureReason,
        mut actions: Vec<HandshakeAction>,
    ) -> Transition {
        actions.push(HandshakeAction::EmitOutcome {
            attempt_id: attempt_id.clone(),
            outcome: HandshakeOutcome::Failed {
                message: reason.user_message(),
                reason: reason.clone(),
            },
        });
        (
            HandshakeState::Failed {
                attempt_id,
                token,
                reason,
            },
            actions,
        )
    }

    fn cancel(
        attempt_id: AttemptId,
        token: Option<SessionToken>,
        mut actions: Vec<HandshakeAction>,
    ) -> Transition {
        actions.push(HandshakeAction::EmitOutcome {
            attempt_id: attempt_id.clone(),
            outcome: HandshakeOutcome::Cancelled,
        });
        (HandshakeState::Cancelled { attempt_id, token }, actions)
    }
}

impl Default for HandshakeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
