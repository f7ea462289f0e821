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

//! The graphics device: root owner of queues, resources and the frame lifecycle.

mod deletion_queue;
mod descriptor;
mod registry;
pub(crate) mod shared;

pub use self::deletion_queue::DeletionQueue;
pub use self::descriptor::{DeviceDescriptor, MAX_FRAMES_IN_FLIGHT_LIMIT};
pub use self::registry::LiveResource;

use std::rc::Rc;

use bytemuck::Pod;

use self::shared::DeviceShared;
use crate::renderer::api::{
    AdapterInfo, BackendTraits, BindGroupDescriptor, BindGroupLayoutDescriptor,
    BufferDescriptor, ComputePipelineDescriptor, DeviceLimits, Feature, GraphicsBackendType,
    PipelineLayoutDescriptor, QueryHeapDescriptor, QueueType, RenderPipelineDescriptor,
    SamplerDescriptor, SurfaceHandle, SwapChainDescriptor, TextureDescriptor, ValidationMode,
};
use crate::renderer::backend_support;
use crate::renderer::command::CommandRecorder;
use crate::renderer::error::{DeviceError, ResourceError, SwapChainError};
use crate::renderer::events::{DeviceEvent, DeviceEventBus};
use crate::renderer::resource::{
    BindGroup, BindGroupLayout, Buffer, Pipeline, PipelineLayout, QueryHeap, Sampler, SwapChain,
    Texture,
};
use crate::renderer::traits::{BackendProvider, DeviceBackend};

/// What the last [`GraphicsDevice::finish_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frame count after the frame was finished.
    pub frame_count: u64,
    /// Command batches submitted across all queues.
    pub submitted_batches: usize,
    /// Swap chains presented.
    pub presented_swap_chains: usize,
    /// Native objects released by the deletion queue.
    pub destroyed_resources: usize,
}

/// A GPU device on one backend.
///
/// The device owns a command queue per [`QueueType`], a deletion queue and the frame
/// counters. Resources keep a weak reference back to it: destroying a resource only
/// enqueues it, and the native object is released by [`GraphicsDevice::finish_frame`]
/// once `max_frames_in_flight` frames have been finished since.
///
/// A device and everything created from it belong to the thread that created it.
/// Dropping the device waits for the GPU, releases every queued object and reports
/// resources that were never destroyed.
pub struct GraphicsDevice {
    shared: Rc<DeviceShared>,
}

impl GraphicsDevice {
    /// Creates a device on the first backend that is supported and initializes.
    ///
    /// The preferred backend is tried first, then [`DeviceDescriptor::fallback`] in order.
    /// Backend availability is probed once per process.
    ///
    /// ## Arguments
    /// * `descriptor` - Device configuration.
    /// * `providers` - The backend factories available to the application.
    pub fn create(
        descriptor: &DeviceDescriptor,
        providers: &[Box<dyn BackendProvider>],
    ) -> Result<Self, DeviceError> {
        let support = backend_support::initialize(providers);

        let mut candidates = Vec::new();
        if let Some(preferred) = descriptor.preferred_backend {
            candidates.push(preferred);
        }
        for backend in &descriptor.fallback.preferred_backends {
            if !candidates.contains(backend) {
                candidates.push(*backend);
            }
        }

        let mut attempted = Vec::new();
        for backend in candidates {
            if !support.is_supported(backend) {
                if Some(backend) == descriptor.preferred_backend {
                    log::warn!("Preferred backend {backend} is not supported, falling back");
                }
                continue;
            }
            let Some(provider) = providers.iter().find(|p| p.backend_type() == backend) else {
                continue;
            };

            attempted.push(backend);
            log::info!("Attempting to create a {backend} device...");
            let events = DeviceEventBus::new();
            match provider.create_device(descriptor, events.sender()) {
                Ok(native) => return Ok(Self::from_backend(descriptor, native, events)),
                Err(e) => log::warn!("Failed to create {backend} device: {e}"),
            }
        }

        log::error!("No graphics backend could be initialized. Attempted: {attempted:?}");
        Err(DeviceError::NoCompatibleBackend(attempted))
    }

    /// Wraps an already created native backend.
    ///
    /// ## Arguments
    /// * `descriptor` - Device configuration.
    /// * `backend` - The native device.
    /// * `events` - The bus whose sender was handed to the backend.
    pub fn from_backend(
        descriptor: &DeviceDescriptor,
        backend: Box<dyn DeviceBackend>,
        events: DeviceEventBus,
    ) -> Self {
        let frames_in_flight = descriptor.effective_frames_in_flight();
        let shared = DeviceShared::new(
            backend,
            descriptor.validation_mode,
            frames_in_flight,
            events,
        );
        log::info!(
            "GraphicsDevice: Created {} device on \"{}\" ({} frames in flight, validation {:?})",
            shared.backend_type,
            shared.adapter_info.name,
            frames_in_flight,
            descriptor.validation_mode
        );
        Self {
            shared: Rc::new(shared),
        }
    }

    /// Returns `true` if `backend` was probed as available by a previous
    /// [`GraphicsDevice::create`] or [`backend_support::initialize`] call.
    pub fn is_backend_supported(backend: GraphicsBackendType) -> bool {
        backend_support::is_supported(backend)
    }

    // --- Information ---

    /// The native API in use.
    pub fn backend_type(&self) -> GraphicsBackendType {
        self.shared.backend_type
    }

    /// The adapter the device runs on.
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.shared.adapter_info
    }

    /// Device limits.
    pub fn limits(&self) -> &DeviceLimits {
        &self.shared.limits
    }

    /// Creation rules applied for this backend.
    pub fn traits(&self) -> BackendTraits {
        self.shared.traits
    }

    /// Returns `true` if an optional feature is enabled.
    pub fn query_feature(&self, feature: Feature) -> bool {
        self.shared.backend.borrow().query_feature(feature)
    }

    /// Ticks per second of timestamp queries.
    pub fn timestamp_frequency(&self) -> u64 {
        self.shared.backend.borrow().timestamp_frequency()
    }

    /// Validation mode requested at creation.
    pub fn validation_mode(&self) -> ValidationMode {
        self.shared.validation
    }

    /// How many frames the CPU may record ahead of the GPU.
    pub fn max_frames_in_flight(&self) -> u32 {
        self.shared.max_frames_in_flight
    }

    /// Number of finished frames since creation.
    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count()
    }

    /// Current frame slot, in `0..max_frames_in_flight`.
    pub fn frame_index(&self) -> u32 {
        self.shared.frame_index()
    }

    /// Statistics of the last finished frame.
    pub fn last_frame_stats(&self) -> FrameStats {
        self.shared.last_stats()
    }

    /// Number of resources created and not yet destroyed.
    pub fn live_resource_count(&self) -> usize {
        self.shared.live_resource_count()
    }

    /// Resources created and not yet destroyed.
    pub fn live_resources(&self) -> Vec<LiveResource> {
        self.shared.live_resources()
    }

    /// Number of destroyed objects whose native release is still pending.
    pub fn pending_deletions(&self) -> usize {
        self.shared.pending_deletions()
    }

    /// Receiver of asynchronous device notifications, such as device loss.
    pub fn events(&self) -> flume::Receiver<DeviceEvent> {
        self.shared.events.receiver().clone()
    }

    /// Runs `f` with the native backend, for backend-specific inspection.
    pub fn with_backend<R>(&self, f: impl FnOnce(&dyn DeviceBackend) -> R) -> R {
        f(&**self.shared.backend.borrow())
    }

    /// Runs `f` with the mutable native backend, for backend-specific configuration.
    pub fn with_backend_mut<R>(&self, f: impl FnOnce(&mut dyn DeviceBackend) -> R) -> R {
        f(&mut **self.shared.backend.borrow_mut())
    }

    // --- Resource creation ---

    /// Creates a buffer, optionally filled with initial data.
    ///
    /// Constant buffers are rounded up to the backend's binding granularity; every size
    /// is rounded up to 4 bytes. [`Buffer::size`] keeps reporting the requested size.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<Buffer, ResourceError> {
        Buffer::create(&self.shared, descriptor, initial_data)
            .inspect_err(|e| log::error!("Failed to create buffer {:?}: {e}", descriptor.label))
    }

    /// Creates a buffer holding `data`, sized to fit it.
    pub fn create_buffer_from_slice<T: Pod>(
        &self,
        descriptor: &BufferDescriptor<'_>,
        data: &[T],
    ) -> Result<Buffer, ResourceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let descriptor = BufferDescriptor {
            size: descriptor.size.max(bytes.len() as u64),
            ..descriptor.clone()
        };
        self.create_buffer(&descriptor, Some(bytes))
    }

    /// Creates a texture, optionally filled with tightly packed initial data.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<Texture, ResourceError> {
        Texture::create(&self.shared, descriptor, initial_data)
            .inspect_err(|e| log::error!("Failed to create texture {:?}: {e}", descriptor.label))
    }

    /// Creates a sampler.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor<'_>) -> Result<Sampler, ResourceError> {
        Sampler::create(&self.shared, descriptor)
            .inspect_err(|e| log::error!("Failed to create sampler {:?}: {e}", descriptor.label))
    }

    /// Creates a bind group layout.
    pub fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<BindGroupLayout, ResourceError> {
        BindGroupLayout::create(&self.shared, descriptor).inspect_err(|e| {
            log::error!("Failed to create bind group layout {:?}: {e}", descriptor.label)
        })
    }

    /// Creates a bind group.
    pub fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor<'_>,
    ) -> Result<BindGroup, ResourceError> {
        BindGroup::create(&self.shared, descriptor)
            .inspect_err(|e| log::error!("Failed to create bind group {:?}: {e}", descriptor.label))
    }

    /// Creates a pipeline layout.
    ///
    /// Fails with [`ResourceError::Unsupported`] if the push-constant ranges need more
    /// than [`DeviceLimits::max_push_constant_size`].
    pub fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<PipelineLayout, ResourceError> {
        PipelineLayout::create(&self.shared, descriptor).inspect_err(|e| {
            log::error!("Failed to create pipeline layout {:?}: {e}", descriptor.label)
        })
    }

    /// Creates a render pipeline.
    pub fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<Pipeline, ResourceError> {
        Pipeline::create_render(&self.shared, descriptor).inspect_err(|e| {
            log::error!("Failed to create render pipeline {:?}: {e}", descriptor.label)
        })
    }

    /// Creates a compute pipeline.
    pub fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> Result<Pipeline, ResourceError> {
        Pipeline::create_compute(&self.shared, descriptor).inspect_err(|e| {
            log::error!("Failed to create compute pipeline {:?}: {e}", descriptor.label)
        })
    }

    /// Creates a query heap.
    pub fn create_query_heap(
        &self,
        descriptor: &QueryHeapDescriptor<'_>,
    ) -> Result<QueryHeap, ResourceError> {
        QueryHeap::create(&self.shared, descriptor)
            .inspect_err(|e| log::error!("Failed to create query heap {:?}: {e}", descriptor.label))
    }

    /// Creates a swap chain presenting to `surface`.
    pub fn create_swap_chain(
        &self,
        surface: &SurfaceHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<SwapChain, SwapChainError> {
        SwapChain::create(&self.shared, surface, descriptor)
            .inspect_err(|e| log::error!("Failed to create swap chain {:?}: {e}", descriptor.label))
    }

    // --- Commands and frames ---

    /// Returns a pooled recorder from `queue`, ready to record.
    ///
    /// The recorder must be handed back with [`CommandRecorder::flush`]; its commands are
    /// submitted by the next [`GraphicsDevice::finish_frame`].
    pub fn acquire_command_buffer(
        &self,
        queue: QueueType,
        label: Option<&str>,
    ) -> Result<CommandRecorder, DeviceError> {
        self.shared.check_lost()?;
        let pooled = {
            let mut backend = self.shared.backend.borrow_mut();
            self.shared
                .queue(queue)
                .borrow_mut()
                .acquire(&mut **backend)?
        };
        Ok(CommandRecorder::begin(&self.shared, queue, pooled, label))
    }

    /// Finishes the current frame.
    ///
    /// Submits every queue's recorded batches in order, presents the swap chains queued
    /// this frame, advances `frame_index` and `frame_count`, waits for the new frame
    /// slot's previous work, then releases every destroyed object whose frame has retired.
    #[doc(alias = "commit_frame")]
    pub fn finish_frame(&self) -> Result<FrameStats, DeviceError> {
        let shared = &self.shared;
        shared.check_lost()?;

        let mut stats = FrameStats::default();
        for queue in QueueType::ALL {
            let result = {
                let mut backend = shared.backend.borrow_mut();
                shared.queue(queue).borrow_mut().submit(&mut **backend)
            };
            match result {
                Ok(submitted) => {
                    stats.submitted_batches += submitted.batches;
                    stats.presented_swap_chains += submitted.presents;
                }
                Err(e) => {
                    shared.note_error(&e);
                    return Err(e);
                }
            }
        }

        shared.advance_frame();
        let begin = shared
            .backend
            .borrow_mut()
            .begin_frame(shared.frame_index());
        if let Err(e) = begin {
            shared.note_error(&e);
            return Err(e);
        }

        stats.destroyed_resources = shared.drain_deletion_queue();
        stats.frame_count = shared.frame_count();
        shared.set_last_stats(stats);
        log::trace!("GraphicsDevice: finished frame {stats:?}");
        Ok(stats)
    }

    /// Alias of [`GraphicsDevice::finish_frame`].
    pub fn commit_frame(&self) -> Result<FrameStats, DeviceError> {
        self.finish_frame()
    }

    /// Blocks until the GPU has finished all submitted work.
    ///
    /// Does not release queued objects; only [`GraphicsDevice::finish_frame`] and device
    /// teardown do.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        let result = self.shared.backend.borrow_mut().wait_idle();
        if let Err(e) = &result {
            self.shared.note_error(e);
        }
        result
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        let shared = &self.shared;
        log::info!("GraphicsDevice: Shutting down {} device", shared.backend_type);

        if let Err(e) = shared.backend.borrow_mut().wait_idle() {
            log::error!("GraphicsDevice: wait_idle failed during shutdown: {e}");
        }

        for queue in &shared.queues {
            queue.borrow_mut().discard_pending();
        }

        let released = shared.shut_down();
        log::debug!("GraphicsDevice: released {released} queued objects at shutdown");

        let leaked = shared.live_resources();
        if !leaked.is_empty() {
            if shared.validation >= ValidationMode::Enabled {
                log::error!(
                    "GraphicsDevice: {} resources were never destroyed",
                    leaked.len()
                );
                for resource in &leaked {
                    log::error!("  leaked {} '{}'", resource.kind, resource.label);
                }
            } else {
                log::debug!(
                    "GraphicsDevice: {} resources were never destroyed",
                    leaked.len()
                );
            }
            debug_assert!(
                shared.validation < ValidationMode::Verbose || std::thread::panicking(),
                "GraphicsDevice: {} resources were never destroyed",
                leaked.len()
            );
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.shared.backend_type)
            .field("adapter", &self.shared.adapter_info.name)
            .field("frame_count", &self.shared.frame_count())
            .field("frame_index", &self.shared.frame_index())
            .finish_non_exhaustive()
    }
}
