use std::sync::Arc;

use sg_core::handshake::PreconditionError;
use sg_core::ids::{DeviceId, LocationId};
use sg_core::ports::DeviceDirectoryPort;

/// Maps the operator's location/room to the card reader that must receive
/// the scan.
///
/// A missing mapping is a precondition error shown to the operator, not a
/// retryable fault; nothing is sent to the badge backend.
pub struct DeviceResolver {
    directory: Arc<dyn DeviceDirectoryPort>,
}

impl DeviceResolver {
    pub fn new(directory: Arc<dyn DeviceDirectoryPort>) -> Self {
        Self { directory }
    }

    #[tracing::instrument(name = "handshake.resolve_device", skip(self), fields(location = %location))]
    pub async fn resolve(&self, location: &LocationId) -> Result<DeviceId, PreconditionError> {
        let device = self
            .directory
            .reader_for(location)
            .await
            .map_err(|e| PreconditionError::DirectoryUnavailable(e.to_string()))?;

        match device {
            Some(device) if !device.is_blank() => Ok(device),
            _ => {
                tracing::info!("No card reader mapped to location");
                Err(PreconditionError::NoDeviceMapped {
                    location: location.to_string(),
                })
            }
        }
    }
}
