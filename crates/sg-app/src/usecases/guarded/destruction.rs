use serde::{Deserialize, Serialize};

use sg_core::handshake::{ActionKind, PayloadError};

use super::{require_text, GuardedForm};

/// Authorization to destroy stock. Requires a named witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestructionForm {
    pub batch_id: String,
    pub weight_grams: f64,
    pub reason: String,
    pub witness: String,
}

impl GuardedForm for DestructionForm {
    const KIND: ActionKind = ActionKind::AuthorizeDestruction;

    fn validate(&self) -> Result<(), PayloadError> {
        require_text("batch_id", &self.batch_id)?;
        require_text("reason", &self.reason)?;
        require_text("witness", &self.witness)?;
        if !self.weight_grams.is_finite() || self.weight_grams <= 0.0 {
            return Err(PayloadError::invalid("weight_grams", "must be positive"));
        }
        Ok(())
    }
}
