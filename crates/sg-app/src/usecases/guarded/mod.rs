//! Guarded payload builders
//!
//! 四种受保护业务写入的表单：本地校验后冻结为 `GuardedPayload`。
//! 校验失败属于前置条件错误，握手不会开始。

mod destruction;
mod lab_result;
mod purchase;
mod rating;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sg_core::handshake::{ActionKind, GuardedPayload, PayloadError};

pub use destruction::DestructionForm;
pub use lab_result::LabResultForm;
pub use purchase::{PurchaseForm, PurchaseLine};
pub use rating::RatingForm;

/// A form whose submission requires a scanned member.
pub trait GuardedForm: Serialize {
    const KIND: ActionKind;

    /// Local checks that need no backend.
    fn validate(&self) -> Result<(), PayloadError>;

    /// Validates and freezes the form body.
    fn freeze(&self, now: DateTime<Utc>) -> Result<GuardedPayload, PayloadError> {
        self.validate()?;
        let body = serde_json::to_value(self).map_err(|e| PayloadError::Encoding(e.to_string()))?;
        GuardedPayload::freeze(Self::KIND, body, now)
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::invalid(field, "must not be empty"));
    }
    Ok(())
}
