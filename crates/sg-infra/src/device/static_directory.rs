use std::collections::BTreeMap;

use async_trait::async_trait;
use sg_core::ids::{DeviceId, LocationId};
use sg_core::ports::{DeviceDirectoryError, DeviceDirectoryPort};
use sg_core::AppConfig;

/// Room → reader mapping taken from the `[devices]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceDirectory {
    readers: BTreeMap<String, DeviceId>,
}

impl StaticDeviceDirectory {
    pub fn new(readers: impl IntoIterator<Item = (String, String)>) -> Self {
        let readers = readers
            .into_iter()
            .filter(|(_, device)| !device.trim().is_empty())
            .map(|(location, device)| (location.trim().to_string(), DeviceId::from(device.trim())))
            .collect();
        Self { readers }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.devices.clone())
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

#[async_trait]
impl DeviceDirectoryPort for StaticDeviceDirectory {
    async fn reader_for(
        &self,
        location: &LocationId,
    ) -> Result<Option<DeviceId>, DeviceDirectoryError> {
        Ok(self.readers.get(location.as_str().trim()).cloned())
    }
}
