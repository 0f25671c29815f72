use serde::{Deserialize, Serialize};

use sg_core::handshake::{ActionKind, PayloadError};

use super::{require_text, GuardedForm};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

/// Counter sale recorded against the scanned member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseForm {
    pub items: Vec<PurchaseLine>,
    pub total_cents: u64,
}

impl GuardedForm for PurchaseForm {
    const KIND: ActionKind = ActionKind::RecordPurchase;

    fn validate(&self) -> Result<(), PayloadError> {
        if self.items.is_empty() {
            return Err(PayloadError::invalid("items", "at least one line is required"));
        }
        let mut sum: u64 = 0;
        for (index, line) in self.items.iter().enumerate() {
            require_text(&format!("items[{index}].product_id"), &line.product_id)?;
            if line.quantity == 0 {
                return Err(PayloadError::invalid(
                    format!("items[{index}].quantity"),
                    "must be positive",
                ));
            }
            sum = line
                .unit_price_cents
                .checked_mul(u64::from(line.quantity))
                .and_then(|line_total| sum.checked_add(line_total))
                .ok_or_else(|| PayloadError::invalid("total_cents", "overflow"))?;
        }
        if sum != self.total_cents {
            return Err(PayloadError::invalid(
                "total_cents",
                format!("expected {sum}, got {}", self.total_cents),
            ));
        }
        Ok(())
    }
}
