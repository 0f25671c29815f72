use async_trait::async_trait;

use super::errors::DeviceDirectoryError;
use crate::ids::{DeviceId, LocationId};

/// Location → card reader mapping (room inventory).
#[async_trait]
pub trait DeviceDirectoryPort: Send + Sync {
    /// `Ok(None)` when the location has no reader mapped.
    async fn reader_for(&self, location: &LocationId)
        -> Result<Option<DeviceId>, DeviceDirectoryError>;
}
