use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Trusted member identifier returned by identity verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl_id!(MemberId);
