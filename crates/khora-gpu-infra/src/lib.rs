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

//! Concrete GPU backends for `khora-gpu-core`.
//!
//! The software backend is always available. Hardware backends go through wgpu and
//! are compiled with the default `wgpu` feature.

pub mod graphics;
pub mod logging;

use khora_gpu_core::renderer::traits::BackendProvider;

pub use graphics::software::{SoftwareBackendProvider, SoftwareDevice, SoftwareDeviceConfig};
#[cfg(feature = "wgpu")]
pub use graphics::wgpu::{WgpuBackendProvider, WgpuDevice};

/// Every backend provider this crate was compiled with, hardware first.
///
/// Pass the list to [`GraphicsDevice::create`](khora_gpu_core::GraphicsDevice::create).
pub fn providers() -> Vec<Box<dyn BackendProvider>> {
    let mut providers: Vec<Box<dyn BackendProvider>> = Vec::new();
    #[cfg(feature = "wgpu")]
    providers.extend(
        WgpuBackendProvider::all()
            .into_iter()
            .map(|provider| Box::new(provider) as Box<dyn BackendProvider>),
    );
    providers.push(Box::new(SoftwareBackendProvider::default()));
    providers
}
