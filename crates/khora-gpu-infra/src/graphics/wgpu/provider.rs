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

use std::sync::{Arc, Mutex};

use khora_gpu_core::renderer::api::GraphicsBackendType;
use khora_gpu_core::renderer::traits::{BackendProvider, DeviceBackend};
use khora_gpu_core::renderer::{DeviceDescriptor, DeviceError, DeviceEvent};

use super::context::WgpuContext;
use super::conversions::backend_bits;
use super::device::WgpuDevice;

/// Opens [`WgpuDevice`]s on one native API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuBackendProvider {
    backend: GraphicsBackendType,
}

impl WgpuBackendProvider {
    /// Native APIs wgpu can drive on desktop platforms.
    pub const BACKENDS: [GraphicsBackendType; 4] = [
        GraphicsBackendType::Vulkan,
        GraphicsBackendType::Dx12,
        GraphicsBackendType::Metal,
        GraphicsBackendType::OpenGL,
    ];

    /// Creates a provider for `backend`, or `None` if wgpu cannot drive it.
    pub fn new(backend: GraphicsBackendType) -> Option<Self> {
        Self::BACKENDS
            .contains(&backend)
            .then_some(Self { backend })
    }

    /// One provider per entry of [`WgpuBackendProvider::BACKENDS`].
    pub fn all() -> Vec<Self> {
        Self::BACKENDS
            .iter()
            .map(|&backend| Self { backend })
            .collect()
    }
}

impl BackendProvider for WgpuBackendProvider {
    fn backend_type(&self) -> GraphicsBackendType {
        self.backend
    }

    fn is_supported(&self) -> bool {
        let Some(backends) = backend_bits(self.backend) else {
            return false;
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let adapters = instance.enumerate_adapters(backends);
        log::debug!(
            "WgpuBackendProvider: {} exposes {} adapter(s)",
            self.backend,
            adapters.len()
        );
        !adapters.is_empty()
    }

    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
        events: flume::Sender<DeviceEvent>,
    ) -> Result<Box<dyn DeviceBackend>, DeviceError> {
        let lost = Arc::new(Mutex::new(None));
        let context = pollster::block_on(WgpuContext::new(
            self.backend,
            descriptor,
            events,
            Arc::clone(&lost),
        ))?;
        Ok(Box::new(WgpuDevice::new(self.backend, context, lost)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_wgpu_apis_get_providers() {
        assert!(WgpuBackendProvider::new(GraphicsBackendType::Vulkan).is_some());
        assert!(WgpuBackendProvider::new(GraphicsBackendType::Dx11).is_none());
        assert!(WgpuBackendProvider::new(GraphicsBackendType::Software).is_none());
    }

    #[test]
    fn test_every_provider_maps_to_wgpu_backends() {
        for provider in WgpuBackendProvider::all() {
            assert!(backend_bits(provider.backend_type()).is_some());
        }
    }
}
