// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use khora_gpu_core::renderer::api::{GraphicsBackendType, ValidationMode};
use khora_gpu_core::renderer::error::DeviceError;
use khora_gpu_core::renderer::events::DeviceEvent;
use khora_gpu_core::renderer::traits::{BackendProvider, DeviceBackend};
use khora_gpu_core::renderer::DeviceDescriptor;

use super::device::{SoftwareDevice, SoftwareDeviceConfig};

/// Creates [`SoftwareDevice`]s. The software backend is available everywhere.
#[derive(Debug, Clone, Default)]
pub struct SoftwareBackendProvider {
    config: SoftwareDeviceConfig,
}

impl SoftwareBackendProvider {
    /// A provider whose devices report `config`.
    pub fn new(config: SoftwareDeviceConfig) -> Self {
        Self { config }
    }

    /// The configuration handed to every created device.
    pub fn config(&self) -> &SoftwareDeviceConfig {
        &self.config
    }
}

impl BackendProvider for SoftwareBackendProvider {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Software
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
        events: flume::Sender<DeviceEvent>,
    ) -> Result<Box<dyn DeviceBackend>, DeviceError> {
        let mut config = self.config.clone();
        if let Some(label) = &descriptor.label {
            config.adapter_name = format!("{} ({label})", config.adapter_name);
        }
        if descriptor.validation_mode >= ValidationMode::Verbose {
            log::debug!("SoftwareBackendProvider: replay errors are always logged");
        }
        Ok(Box::new(SoftwareDevice::new(config, events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creates_software_devices() {
        let provider = SoftwareBackendProvider::default();
        assert!(provider.is_supported());

        let (sender, _receiver) = flume::unbounded();
        let descriptor = DeviceDescriptor {
            label: Some("unit".to_owned()),
            ..Default::default()
        };
        let device = provider.create_device(&descriptor, sender).unwrap();
        assert_eq!(device.backend_type(), GraphicsBackendType::Software);
        assert_eq!(device.adapter_info().name, "Khora Software Device (unit)");
        assert!(device.as_any().downcast_ref::<SoftwareDevice>().is_some());
    }
}
