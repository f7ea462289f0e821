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

use khora_gpu_core::renderer::api::{AdapterInfo, DeviceLimits, GraphicsBackendType, ValidationMode};
use khora_gpu_core::renderer::traits::AdapterSelector;
use khora_gpu_core::renderer::{DeviceDescriptor, DeviceError, DeviceEvent};

use super::conversions::{backend_bits, device_limits, requestable_features};
use super::selector::WgpuAdapterSelector;

/// Reason recorded by the device-lost callback, shared with the device.
pub(crate) type LostFlag = Arc<Mutex<Option<String>>>;

/// Holds the core wgpu state objects of one logical device.
///
/// The context is created with no surface; swap chains create their surfaces from the
/// same instance later on.
#[derive(Debug)]
pub struct WgpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    // Store info for easy access
    pub adapter_info: AdapterInfo,
    pub features: wgpu::Features,
    pub limits: DeviceLimits,
    /// Ticks per second of timestamp queries, 0 when they are unavailable.
    pub timestamp_frequency: u64,
}

impl WgpuContext {
    /// Asynchronously opens a device on the best adapter of one native backend.
    ///
    /// ## Arguments
    /// * `backend` - The native API to open.
    /// * `descriptor` - Device configuration (power preference, validation, label).
    /// * `events` - Channel receiving uncaptured errors and device loss.
    /// * `lost` - Set to the loss reason by the device-lost callback.
    pub async fn new(
        backend: GraphicsBackendType,
        descriptor: &DeviceDescriptor,
        events: flume::Sender<DeviceEvent>,
        lost: LostFlag,
    ) -> Result<Self, DeviceError> {
        let backends = backend_bits(backend).ok_or(DeviceError::BackendUnsupported(backend))?;
        log::info!("Initializing wgpu context on {backend}...");

        // --- 1. Create Instance ---
        let flags = match descriptor.validation_mode {
            ValidationMode::Disabled => wgpu::InstanceFlags::empty(),
            ValidationMode::Enabled | ValidationMode::Verbose => {
                wgpu::InstanceFlags::DEBUG | wgpu::InstanceFlags::VALIDATION
            }
            ValidationMode::Gpu => {
                wgpu::InstanceFlags::DEBUG
                    | wgpu::InstanceFlags::VALIDATION
                    | wgpu::InstanceFlags::GPU_BASED_VALIDATION
            }
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        // --- 2. Select Adapter ---
        let selector = WgpuAdapterSelector::new(instance.clone(), backend);
        let (adapter, adapter_info) = selector
            .select_adapter(descriptor.power_preference)
            .await
            .map_err(DeviceError::InitializationFailed)?;
        log::info!(
            "Using graphics adapter: \"{}\" ({:?}, {})",
            adapter_info.name,
            adapter_info.adapter_type,
            adapter_info.driver_description
        );

        // --- 3. Create Logical Device and Queue ---
        let required_features = requestable_features(adapter.features());
        let label = descriptor.label.as_deref().unwrap_or("Khora Logical Device");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| {
                DeviceError::InitializationFailed(format!("failed to create logical device: {e}"))
            })?;
        log::info!("Logical device and command queue created.");

        let error_events = events.clone();
        device.on_uncaptured_error(Box::new(move |e| {
            log::error!("wgpu uncaptured error: {e}");
            let _ = error_events.send(DeviceEvent::Error {
                message: e.to_string(),
            });
        }));
        device.set_device_lost_callback(move |reason, message| {
            if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                return;
            }
            log::error!("wgpu device lost ({reason:?}): {message}");
            if let Ok(mut flag) = lost.lock() {
                flag.get_or_insert_with(|| message.clone());
            }
            let _ = events.send(DeviceEvent::Lost { reason: message });
        });

        let features = device.features();
        let limits = device_limits(&device.limits());
        log::debug!("Active device features: {features:?}");
        log::debug!("Device limits: {limits:?}");

        let timestamp_frequency = if features.contains(wgpu::Features::TIMESTAMP_QUERY) {
            let period = queue.get_timestamp_period();
            if period > 0.0 {
                (1e9 / period as f64) as u64
            } else {
                0
            }
        } else {
            0
        };

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            adapter_info,
            features,
            limits,
            timestamp_frequency,
        })
    }
}
