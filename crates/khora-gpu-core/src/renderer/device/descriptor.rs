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

//! Device configuration.

use crate::renderer::api::{
    BackendSelectionConfig, GraphicsBackendType, PowerPreference, ValidationMode,
};

/// Upper bound for [`DeviceDescriptor::max_frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: u32 = 8;

/// Parameters of [`GraphicsDevice::create`](crate::renderer::GraphicsDevice::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Debug label of the native device.
    pub label: Option<String>,
    /// Backend tried first; `None` walks [`DeviceDescriptor::fallback`] only.
    pub preferred_backend: Option<GraphicsBackendType>,
    /// Adapter preference.
    pub power_preference: PowerPreference,
    /// Native validation and leak reporting.
    pub validation_mode: ValidationMode,
    /// How many frames the CPU may record ahead of the GPU.
    pub max_frames_in_flight: u32,
    /// Backends tried, in order, after the preferred one.
    pub fallback: BackendSelectionConfig,
}

impl DeviceDescriptor {
    /// A descriptor that asks for a specific backend first.
    pub fn with_backend(backend: GraphicsBackendType) -> Self {
        Self {
            preferred_backend: Some(backend),
            ..Default::default()
        }
    }

    /// The frame count clamped to `1..=MAX_FRAMES_IN_FLIGHT_LIMIT`.
    pub fn effective_frames_in_flight(&self) -> u32 {
        let clamped = self
            .max_frames_in_flight
            .clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT);
        if clamped != self.max_frames_in_flight {
            log::warn!(
                "max_frames_in_flight {} out of range, using {clamped}",
                self.max_frames_in_flight
            );
        }
        clamped
    }
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            preferred_backend: None,
            power_preference: PowerPreference::HighPerformance,
            validation_mode: ValidationMode::default(),
            max_frames_in_flight: 2,
            fallback: BackendSelectionConfig::default(),
        }
    }
}
