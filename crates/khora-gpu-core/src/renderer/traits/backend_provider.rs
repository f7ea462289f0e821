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

//! Backend discovery: availability probes, device factories and adapter selection.

use async_trait::async_trait;

use super::device_backend::DeviceBackend;
use crate::renderer::api::{AdapterInfo, GraphicsBackendType, PowerPreference};
use crate::renderer::device::DeviceDescriptor;
use crate::renderer::error::DeviceError;
use crate::renderer::events::DeviceEvent;

/// A factory for one native backend.
pub trait BackendProvider {
    /// The backend this provider creates devices for.
    fn backend_type(&self) -> GraphicsBackendType;

    /// Probes whether the backend can run on this machine.
    ///
    /// May be slow (it can load drivers); the result is cached process-wide by
    /// [`backend_support`](crate::renderer::backend_support).
    fn is_supported(&self) -> bool;

    /// Opens a native device.
    ///
    /// ## Arguments
    /// * `descriptor` - Device configuration.
    /// * `events` - Channel for asynchronous device notifications such as device loss.
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
        events: flume::Sender<DeviceEvent>,
    ) -> Result<Box<dyn DeviceBackend>, DeviceError>;
}

/// Discovers physical adapters and selects one.
///
/// Adapter enumeration can load drivers, so the methods are asynchronous.
#[async_trait]
pub trait AdapterSelector<TAdapter> {
    /// The error returned when no adapter fits.
    type Error: std::fmt::Debug + std::fmt::Display + Send + Sync + 'static;

    /// Selects the adapter that best matches the power preference.
    ///
    /// ## Arguments
    /// * `power_preference` - Which class of adapter to favor.
    ///
    /// ## Returns
    /// The native adapter and its description.
    async fn select_adapter(
        &self,
        power_preference: PowerPreference,
    ) -> Result<(TAdapter, AdapterInfo), Self::Error>;

    /// Lists every adapter the backend can see.
    async fn list_adapters(&self) -> Result<Vec<AdapterInfo>, Self::Error>;
}
