use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Physical card reader identifier, as known to the device gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl_id!(DeviceId);
