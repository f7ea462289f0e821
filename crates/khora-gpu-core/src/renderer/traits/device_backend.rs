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

//! Defines the `DeviceBackend` trait, the contract every native graphics API implements.

use std::any::Any;

use super::command_encoder::{CommandEncoder, NativeCommandBatch};
use crate::renderer::api::{
    AdapterInfo, BackendTraits, BufferDescriptor, DeviceLimits, Feature, GraphicsBackendType,
    NativeHandle, QueryHeapDescriptor, QueueType, ResourceKind, SamplerDescriptor,
    SurfaceHandle, SwapChainConfiguration, SwapChainDescriptor, TextureAllocation,
    TextureDescriptor,
};
use crate::renderer::api::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, ComputePipelineDescriptor,
    PipelineLayoutDescriptor, RenderPipelineDescriptor,
};
use crate::renderer::error::{DeviceError, ResourceError, SwapChainError};

/// The native side of a [`GraphicsDevice`](crate::renderer::GraphicsDevice).
///
/// A backend owns the native device, allocates objects and hands back opaque
/// [`NativeHandle`]s. It never decides *when* an object may be freed: the core calls
/// [`DeviceBackend::destroy`] only once the frame-delay rule guarantees the GPU is done
/// with it. Descriptors arrive already validated against [`DeviceBackend::limits`] and
/// [`DeviceBackend::traits`].
///
/// All methods are called from the thread that owns the device.
pub trait DeviceBackend {
    // --- Identity and capabilities ---

    /// The native API this backend drives.
    fn backend_type(&self) -> GraphicsBackendType;

    /// The adapter the device was opened on.
    fn adapter_info(&self) -> &AdapterInfo;

    /// Device limits.
    fn limits(&self) -> &DeviceLimits;

    /// Creation rules the core must apply for this backend.
    fn traits(&self) -> BackendTraits;

    /// Returns `true` if an optional feature is enabled.
    fn query_feature(&self, feature: Feature) -> bool;

    /// Ticks per second of GPU timestamps, 0 when timestamps are unsupported.
    fn timestamp_frequency(&self) -> u64;

    // --- Resource creation ---

    /// Creates a buffer whose size has already been aligned by the core.
    ///
    /// ## Arguments
    /// * `descriptor` - Buffer parameters with the allocation size.
    /// * `initial_data` - Bytes copied to the start of the buffer.
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a texture.
    ///
    /// ## Arguments
    /// * `descriptor` - Texture parameters.
    /// * `allocation` - Storage and view formats resolved by the core.
    /// * `initial_data` - Tightly packed texels of every layer and mip.
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor<'_>,
        allocation: &TextureAllocation,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a sampler.
    fn create_sampler(
        &mut self,
        descriptor: &SamplerDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a bind group layout.
    fn create_bind_group_layout(
        &mut self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a bind group.
    fn create_bind_group(
        &mut self,
        descriptor: &BindGroupDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a pipeline layout.
    fn create_pipeline_layout(
        &mut self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a render pipeline.
    fn create_render_pipeline(
        &mut self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a compute pipeline.
    fn create_compute_pipeline(
        &mut self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Creates a query heap.
    fn create_query_heap(
        &mut self,
        descriptor: &QueryHeapDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError>;

    /// Releases a native object. Called at most once per handle.
    fn destroy(&mut self, kind: ResourceKind, handle: NativeHandle);

    /// Renames a native object. Backends without debug names ignore it.
    fn set_label(&mut self, kind: ResourceKind, handle: NativeHandle, label: &str);

    // --- CPU access ---

    /// Writes bytes into a CPU-writable buffer.
    fn write_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError>;

    /// Reads bytes from a CPU-readable buffer.
    ///
    /// Blocks until the mapping is available; previously submitted GPU writes to the
    /// buffer are visible.
    fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        output: &mut [u8],
    ) -> Result<(), ResourceError>;

    // --- Swap chains ---

    /// Creates a swap chain on a platform surface.
    fn create_swap_chain(
        &mut self,
        surface: &SurfaceHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<SwapChainConfiguration, SwapChainError>;

    /// Acquires the next backbuffer, returning its texture handle.
    ///
    /// Returns `Ok(None)` when the surface cannot be rendered to right now
    /// (minimized, occluded, outdated).
    fn acquire_next_texture(
        &mut self,
        swap_chain: NativeHandle,
    ) -> Result<Option<NativeHandle>, SwapChainError>;

    /// Resizes the backbuffers. No backbuffer is acquired when this is called.
    fn resize_swap_chain(
        &mut self,
        swap_chain: NativeHandle,
        width: u32,
        height: u32,
    ) -> Result<(), SwapChainError>;

    /// Presents the acquired backbuffer. The texture handle returned by the matching
    /// acquire becomes invalid.
    fn present(&mut self, swap_chain: NativeHandle) -> Result<(), SwapChainError>;

    // --- Commands and frames ---

    /// Creates a native encoder for a queue.
    fn create_command_encoder(
        &mut self,
        queue: QueueType,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError>;

    /// Submits finished batches to a queue, in order.
    fn submit(
        &mut self,
        queue: QueueType,
        batches: Vec<NativeCommandBatch>,
    ) -> Result<(), DeviceError>;

    /// Enters a frame slot, blocking until the work last submitted in that slot has
    /// completed on the GPU.
    fn begin_frame(&mut self, frame_index: u32) -> Result<(), DeviceError>;

    /// Blocks until every submitted batch has completed.
    fn wait_idle(&mut self) -> Result<(), DeviceError>;

    /// Returns `self` as `Any` for backend-specific inspection.
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as mutable `Any` for backend-specific configuration.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
