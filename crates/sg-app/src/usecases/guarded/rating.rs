use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sg_core::handshake::{ActionKind, PayloadError};

use super::{require_text, GuardedForm};

/// Member rating of a batch. Scores are per criterion, 1 to 10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingForm {
    pub batch_id: String,
    pub scores: BTreeMap<String, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl GuardedForm for RatingForm {
    const KIND: ActionKind = ActionKind::SaveRating;

    fn validate(&self) -> Result<(), PayloadError> {
        require_text("batch_id", &self.batch_id)?;
        if self.scores.is_empty() {
            return Err(PayloadError::invalid("scores", "at least one score is required"));
        }
        if let Some((criterion, score)) = self
            .scores
            .iter()
            .find(|(_, score)| !(1..=10).contains(*score))
        {
            return Err(PayloadError::invalid(
                format!("scores.{criterion}"),
                format!("{score} is outside 1..=10"),
            ));
        }
        Ok(())
    }
}
