use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Room / location selected by the operator (dispensary counter, lab, vault...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl_id!(LocationId);
