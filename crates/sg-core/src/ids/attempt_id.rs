use serde::{Deserialize, Serialize};

use super::id_macro::impl_id;

/// Identifies one start of a handshake (a restart gets a new one).
///
/// 每次启动握手都会生成新的 AttemptId，用于识别过期的异步回调。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl_id!(AttemptId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_attempt_ids_are_unique() {
        assert_ne!(AttemptId::new(), AttemptId::new());
    }

    #[test]
    fn attempt_id_from_str_round_trips_display() {
        let id: AttemptId = "attempt-1".into();
        assert_eq!(id.to_string(), "attempt-1");
        assert_eq!(id.as_str(), "attempt-1");
    }
}
