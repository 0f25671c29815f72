//! Handshake domain values.
//!
//! 握手流程中流转的数据：会话令牌、未验证身份、已验证成员、冻结的业务载荷。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::PayloadError;
use crate::ids::{DeviceId, MemberId};

/// One pending scan attempt, issued by the backend when a reader is armed.
///
/// Consumed exactly once by identity verification, or invalidated by
/// cancellation. Never reused across attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub device_id: DeviceId,
    pub issued_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(token: impl Into<String>, device_id: DeviceId, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            device_id,
            issued_at,
        }
    }

    /// Constant-time comparison against another token value.
    pub fn matches(&self, other: &str) -> bool {
        self.token.as_bytes().ct_eq(other.as_bytes()).into()
    }

    /// Same backend session (token value and reader).
    pub fn same_session(&self, other: &SessionToken) -> bool {
        self.matches(&other.token) && self.device_id == other.device_id
    }

    /// Short form for logs; the full token never goes to log output.
    pub fn redacted(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        format!("{prefix}…")
    }
}

/// Badge data reported by the reader. Untrusted: it is only ever an input
/// to identity verification, never a basis for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIdentity {
    pub badge_user_ref: String,
    pub badge_display_name: String,
}

/// Trusted member identity produced by identity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMember {
    pub member_id: MemberId,
    pub member_name: String,
}

/// Guarded domain actions that require a scanned member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RecordPurchase,
    SaveRating,
    ConfirmLabResult,
    AuthorizeDestruction,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RecordPurchase => "record_purchase",
            ActionKind::SaveRating => "save_rating",
            ActionKind::ConfirmLabResult => "confirm_lab_result",
            ActionKind::AuthorizeDestruction => "authorize_destruction",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "record_purchase" => Ok(ActionKind::RecordPurchase),
            "save_rating" => Ok(ActionKind::SaveRating),
            "confirm_lab_result" => Ok(ActionKind::ConfirmLabResult),
            "authorize_destruction" => Ok(ActionKind::AuthorizeDestruction),
            other => Err(format!("unknown action kind: {other}")),
        }
    }
}

/// Request body of a guarded action, frozen when the handshake starts.
///
/// Fields are private: once frozen the payload cannot be changed, so the
/// write executed after a successful scan is exactly what the operator
/// reviewed. The digest is SHA-256 over the canonical JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardedPayload {
    kind: ActionKind,
    body: serde_json::Map<String, serde_json::Value>,
    digest: String,
    frozen_at: DateTime<Utc>,
}

/// Keys the handshake attaches itself; a form may not smuggle them in.
const RESERVED_KEYS: [&str; 2] = ["member_id", "session_token"];

impl GuardedPayload {
    pub fn freeze(
        kind: ActionKind,
        body: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Self, PayloadError> {
        let body = match body {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(PayloadError::NotAnObject {
                    found: json_type_name(&other),
                })
            }
        };
        if let Some(key) = RESERVED_KEYS.iter().find(|key| body.contains_key(**key)) {
            return Err(PayloadError::ReservedField((*key).to_string()));
        }
        let digest = digest_body(&body)?;
        Ok(Self {
            kind,
            body,
            digest,
            frozen_at: now,
        })
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn body(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.body
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    /// Body sent to the write endpoint: the frozen fields plus `member_id`.
    pub fn to_request_body(&self, member_id: &MemberId) -> serde_json::Value {
        let mut body = self.body.clone();
        body.insert(
            "member_id".to_string(),
            serde_json::Value::String(member_id.to_string()),
        );
        serde_json::Value::Object(body)
    }
}

fn digest_body(body: &serde_json::Map<String, serde_json::Value>) -> Result<String, PayloadError> {
    // serde_json::Map is key-ordered, so this encoding is canonical.
    let bytes = serde_json::to_vec(body).map_err(|e| PayloadError::Encoding(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Confirmation returned by a guarded write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub kind: ActionKind,
    pub member_id: MemberId,
    pub record_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}
