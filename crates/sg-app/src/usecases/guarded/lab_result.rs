use serde::{Deserialize, Serialize};

use sg_core::handshake::{ActionKind, PayloadError};

use super::{require_text, GuardedForm};

/// Confirmation of a lab analysis for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResultForm {
    pub sample_id: String,
    pub batch_id: String,
    pub thc_percent: f64,
    pub cbd_percent: f64,
    pub passed: bool,
}

fn check_percent(field: &str, value: f64) -> Result<(), PayloadError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(PayloadError::invalid(field, "must be between 0 and 100"));
    }
    Ok(())
}

impl GuardedForm for LabResultForm {
    const KIND: ActionKind = ActionKind::ConfirmLabResult;

    fn validate(&self) -> Result<(), PayloadError> {
        require_text("sample_id", &self.sample_id)?;
        require_text("batch_id", &self.batch_id)?;
        check_percent("thc_percent", self.thc_percent)?;
        check_percent("cbd_percent", self.cbd_percent)?;
        if self.thc_percent + self.cbd_percent > 100.0 {
            return Err(PayloadError::invalid(
                "cbd_percent",
                "thc and cbd together exceed 100",
            ));
        }
        Ok(())
    }
}
