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

//! The software device: a CPU implementation of [`DeviceBackend`].
//!
//! Objects live in host memory. Command lists are replayed at submission: copies,
//! clears, queries and indirect argument reads execute for real, draws and dispatches
//! are counted but not rasterized. Swap chains are headless.

use std::any::Any;
use std::collections::HashMap;
use std::time::Instant;

use khora_gpu_core::renderer::api::{
    AdapterInfo, AdapterType, BackendTraits, BindGroupDescriptor, BindGroupLayoutDescriptor,
    BufferDescriptor, Color, ComputePipelineDescriptor, CpuAccessMode, DeviceLimits, Feature,
    GraphicsBackendType, LoadAction, NativeHandle, PipelineKind, PipelineLayoutDescriptor,
    PixelFormat, QueryHeapDescriptor, QueryType, QueueType, RenderPipelineDescriptor,
    ResourceKind, SamplerDescriptor, SurfaceHandle, SwapChainConfiguration, SwapChainDescriptor,
    TextureAllocation, TextureDescriptor, TextureDimension, TextureUsage,
};
use khora_gpu_core::renderer::error::{DeviceError, ResourceError, SwapChainError};
use khora_gpu_core::renderer::events::DeviceEvent;
use khora_gpu_core::renderer::traits::{CommandEncoder, DeviceBackend, NativeCommandBatch};

use super::command::{SoftwareCommand, SoftwareCommandEncoder, SoftwareCommandList};
use super::memory::{
    copy_into_texture, encode_clear_color, encode_clear_depth_stencil, fill_texels,
    SoftwareObject, SwapChainStorage, TextureStorage,
};

/// Configuration of a [`SoftwareDevice`].
#[derive(Debug, Clone)]
pub struct SoftwareDeviceConfig {
    /// Adapter name reported by the device.
    pub adapter_name: String,
    /// Limits reported by the device.
    pub limits: DeviceLimits,
    /// Creation rules the core applies; lets the device stand in for another backend.
    pub traits: BackendTraits,
    /// Optional features the device reports as enabled.
    pub features: Vec<Feature>,
    /// Timestamp ticks per second.
    pub timestamp_frequency: u64,
}

impl SoftwareDeviceConfig {
    /// A configuration that applies the creation rules of `backend`.
    pub fn emulating(backend: GraphicsBackendType) -> Self {
        Self {
            traits: backend.default_traits(),
            ..Default::default()
        }
    }
}

impl Default for SoftwareDeviceConfig {
    fn default() -> Self {
        Self {
            adapter_name: "Khora Software Device".to_owned(),
            limits: DeviceLimits::default(),
            traits: GraphicsBackendType::Software.default_traits(),
            features: vec![
                Feature::TimestampQuery,
                Feature::PipelineStatisticsQuery,
                Feature::DepthClipControl,
                Feature::Depth32FloatStencil8,
                Feature::TextureCompressionBc,
                Feature::IndirectFirstInstance,
                Feature::PushConstants,
            ],
            timestamp_frequency: 1_000_000_000,
        }
    }
}

/// Counters of everything the software device executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftwareDeviceStats {
    /// Batches submitted, per [`QueueType::index`].
    pub submitted_batches: [u64; QueueType::ALL.len()],
    /// Commands replayed.
    pub executed_commands: u64,
    /// Pipeline binds replayed.
    pub pipeline_binds: u64,
    /// Draws replayed, direct and indirect.
    pub draws: u64,
    /// Dispatches replayed, direct and indirect.
    pub dispatches: u64,
    /// Buffer and texture copies replayed.
    pub copies: u64,
    /// Attachment clears performed.
    pub clears: u64,
    /// Backbuffers acquired.
    pub acquires: u64,
    /// Backbuffers presented.
    pub presents: u64,
    /// Calls to `begin_frame`.
    pub frames_begun: u64,
    /// Native objects released.
    pub destroyed_objects: u64,
    /// `destroy` calls for a handle that was not alive.
    pub invalid_destroys: u64,
}

impl SoftwareDeviceStats {
    /// Batches submitted across all queues.
    pub fn total_submitted_batches(&self) -> u64 {
        self.submitted_batches.iter().sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveQuery {
    heap: NativeHandle,
    index: u32,
    ty: QueryType,
    value: u64,
}

/// Replay state reset at the start of every command list.
#[derive(Debug, Default)]
struct ReplayState {
    render_pipeline: Option<NativeHandle>,
    compute_pipeline: Option<NativeHandle>,
    active_queries: Vec<ActiveQuery>,
}

/// A [`DeviceBackend`] running entirely on the CPU.
pub struct SoftwareDevice {
    config: SoftwareDeviceConfig,
    adapter_info: AdapterInfo,
    events: flume::Sender<DeviceEvent>,
    objects: HashMap<NativeHandle, SoftwareObject>,
    labels: HashMap<NativeHandle, String>,
    next_handle: u64,
    epoch: Instant,
    frame_index: u32,
    lost: Option<String>,
    stats: SoftwareDeviceStats,
}

impl SoftwareDevice {
    /// Creates a software device.
    ///
    /// ## Arguments
    /// * `config` - Limits, traits and features to report.
    /// * `events` - Channel for device notifications.
    pub fn new(config: SoftwareDeviceConfig, events: flume::Sender<DeviceEvent>) -> Self {
        let adapter_info = AdapterInfo {
            name: config.adapter_name.clone(),
            vendor_id: 0,
            device_id: 0,
            adapter_type: AdapterType::Cpu,
            backend: Some(GraphicsBackendType::Software),
            driver_description: concat!("khora-gpu-infra ", env!("CARGO_PKG_VERSION")).to_owned(),
        };
        log::info!(
            "SoftwareDevice: Created \"{}\" ({:?} execution model)",
            adapter_info.name,
            config.traits.execution_model
        );
        Self {
            config,
            adapter_info,
            events,
            objects: HashMap::new(),
            labels: HashMap::new(),
            next_handle: 1,
            epoch: Instant::now(),
            frame_index: 0,
            lost: None,
            stats: SoftwareDeviceStats::default(),
        }
    }

    // --- Inspection ---

    /// Counters of executed work.
    pub fn stats(&self) -> SoftwareDeviceStats {
        self.stats
    }

    /// Returns `true` while the native object behind `handle` exists.
    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Number of live native objects of `kind`, swap chain backbuffers excluded.
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.objects
            .values()
            .filter(|object| object.kind() == kind)
            .filter(|object| !matches!(object, SoftwareObject::Texture(t) if t.backbuffer))
            .count()
    }

    /// Number of live native objects, swap chain backbuffers excluded.
    pub fn live_handle_count(&self) -> usize {
        self.objects
            .values()
            .filter(|object| !matches!(object, SoftwareObject::Texture(t) if t.backbuffer))
            .count()
    }

    /// The debug label last given to `handle`.
    pub fn label_of(&self, handle: NativeHandle) -> Option<&str> {
        self.labels.get(&handle).map(String::as_str)
    }

    /// Raw bytes of a buffer.
    pub fn buffer_data(&self, handle: NativeHandle) -> Option<&[u8]> {
        match self.objects.get(&handle) {
            Some(SoftwareObject::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// Raw texels of a texture, layer by layer with mips largest first.
    pub fn texture_data(&self, handle: NativeHandle) -> Option<&[u8]> {
        match self.objects.get(&handle) {
            Some(SoftwareObject::Texture(texture)) => Some(&texture.data),
            _ => None,
        }
    }

    /// Storage and view formats a texture was allocated with.
    pub fn texture_allocation(&self, handle: NativeHandle) -> Option<TextureAllocation> {
        match self.objects.get(&handle) {
            Some(SoftwareObject::Texture(texture)) => Some(texture.allocation),
            _ => None,
        }
    }

    /// Number of presents issued on a swap chain.
    pub fn present_count(&self, swap_chain: NativeHandle) -> Option<u64> {
        match self.objects.get(&swap_chain) {
            Some(SoftwareObject::SwapChain(chain)) => Some(chain.presents),
            _ => None,
        }
    }

    /// Marks the device as lost and notifies the device's event channel. Every later
    /// submission fails with [`DeviceError::DeviceLost`].
    pub fn simulate_device_loss(&mut self, reason: &str) {
        log::error!("SoftwareDevice: device lost: {reason}");
        self.lost = Some(reason.to_owned());
        let event = DeviceEvent::Lost {
            reason: reason.to_owned(),
        };
        if self.events.send(event).is_err() {
            log::warn!("SoftwareDevice: no receiver for the device-lost event");
        }
    }

    // --- Internals ---

    fn insert(&mut self, object: SoftwareObject, label: Option<&str>) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        log::trace!("SoftwareDevice: new {} {handle}", object.kind());
        self.objects.insert(handle, object);
        if let Some(label) = label {
            self.labels.insert(handle, label.to_owned());
        }
        handle
    }

    fn check_lost(&self) -> Result<(), DeviceError> {
        match &self.lost {
            Some(reason) => Err(DeviceError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn timestamp(&self) -> u64 {
        let nanos = self.epoch.elapsed().as_nanos() as u64;
        nanos.saturating_mul(self.config.timestamp_frequency) / 1_000_000_000
    }

    fn buffer(&self, handle: NativeHandle) -> Option<&[u8]> {
        self.buffer_data(handle)
    }

    fn buffer_mut(&mut self, handle: NativeHandle) -> Option<&mut Vec<u8>> {
        match self.objects.get_mut(&handle) {
            Some(SoftwareObject::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    fn read_u32s<const N: usize>(&self, buffer: NativeHandle, offset: u64) -> Option<[u32; N]> {
        let data = self.buffer(buffer)?;
        let start = offset as usize;
        let bytes = data.get(start..start + N * 4)?;
        let mut values = [0u32; N];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(values)
    }

    fn create_backbuffers(
        &mut self,
        count: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Vec<NativeHandle> {
        (0..count)
            .map(|i| {
                let descriptor = TextureDescriptor {
                    label: None,
                    dimension: TextureDimension::D2,
                    format,
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                    mip_level_count: 1,
                    sample_count: 1,
                    usage: TextureUsage::RENDER_TARGET,
                };
                let data = vec![0; descriptor.total_size() as usize];
                let label = format!("backbuffer {i}");
                self.insert(
                    SoftwareObject::Texture(TextureStorage {
                        descriptor,
                        allocation: TextureAllocation {
                            storage_format: format,
                            shader_view_format: format,
                            typeless: false,
                        },
                        data,
                        backbuffer: true,
                    }),
                    Some(&label),
                )
            })
            .collect()
    }

    fn swap_chain_mut(
        &mut self,
        handle: NativeHandle,
    ) -> Result<&mut SwapChainStorage, SwapChainError> {
        match self.objects.get_mut(&handle) {
            Some(SoftwareObject::SwapChain(chain)) => Ok(chain),
            _ => Err(SwapChainError::Backend(format!("{handle} is not a swap chain"))),
        }
    }

    // --- Replay ---

    fn execute(&mut self, list: SoftwareCommandList) {
        let mut state = ReplayState::default();
        log::trace!(
            "SoftwareDevice: executing {} commands on {:?} (frame slot {})",
            list.commands.len(),
            list.queue,
            list.frame_index
        );
        for command in list.commands {
            self.stats.executed_commands += 1;
            self.execute_command(&mut state, command);
        }
        if !state.active_queries.is_empty() {
            log::warn!(
                "SoftwareDevice: {} queries left open at the end of a command list",
                state.active_queries.len()
            );
        }
    }

    fn require_pipeline(pipeline: Option<NativeHandle>, operation: &str) {
        if pipeline.is_none() {
            log::error!("SoftwareDevice: {operation} replayed without a pipeline");
        }
    }

    fn record_work(state: &mut ReplayState, vertices: u64, invocations: u64) {
        for query in &mut state.active_queries {
            query.value += match query.ty {
                QueryType::Occlusion => vertices,
                QueryType::BinaryOcclusion => u64::from(vertices > 0),
                QueryType::PipelineStatistics => vertices + invocations,
                QueryType::Timestamp => 0,
            };
        }
    }

    fn execute_command(&mut self, state: &mut ReplayState, command: SoftwareCommand) {
        match command {
            SoftwareCommand::PushDebugGroup(_)
            | SoftwareCommand::PopDebugGroup
            | SoftwareCommand::InsertDebugMarker(_)
            | SoftwareCommand::SetBindGroup { .. }
            | SoftwareCommand::SetPushConstants { .. }
            | SoftwareCommand::SetVertexBuffer { .. }
            | SoftwareCommand::SetIndexBuffer { .. }
            | SoftwareCommand::SetViewport(_)
            | SoftwareCommand::SetScissorRect(_)
            | SoftwareCommand::SetStencilReference(_)
            | SoftwareCommand::SetBlendConstant(_) => {}
            SoftwareCommand::BeginRenderPass { color, depth, .. } => {
                for (texture, load) in color {
                    if let LoadAction::Clear(value) = load {
                        self.clear_color(texture, value);
                    }
                }
                if let Some((texture, depth_load, stencil_load)) = depth {
                    let depth = match depth_load {
                        LoadAction::Clear(d) => Some(d),
                        _ => None,
                    };
                    let stencil = match stencil_load {
                        LoadAction::Clear(s) => Some(s),
                        _ => None,
                    };
                    if depth.is_some() || stencil.is_some() {
                        self.clear_depth_stencil(texture, depth, stencil);
                    }
                }
                state.render_pipeline = None;
            }
            SoftwareCommand::EndRenderPass => state.render_pipeline = None,
            SoftwareCommand::SetPipeline(kind, pipeline) => {
                self.stats.pipeline_binds += 1;
                match kind {
                    PipelineKind::Render => state.render_pipeline = Some(pipeline),
                    PipelineKind::Compute => state.compute_pipeline = Some(pipeline),
                }
            }
            SoftwareCommand::Draw {
                vertices,
                instances,
            } => {
                Self::require_pipeline(state.render_pipeline, "draw");
                self.stats.draws += 1;
                let count = vertices.len() as u64 * instances.len() as u64;
                Self::record_work(state, count, 0);
            }
            SoftwareCommand::DrawIndexed {
                indices, instances, ..
            } => {
                Self::require_pipeline(state.render_pipeline, "draw");
                self.stats.draws += 1;
                let count = indices.len() as u64 * instances.len() as u64;
                Self::record_work(state, count, 0);
            }
            SoftwareCommand::DrawIndirect {
                buffer,
                offset,
                indexed,
            } => {
                Self::require_pipeline(state.render_pipeline, "draw");
                self.stats.draws += 1;
                // Both argument layouts start with (count, instance_count).
                let args = if indexed {
                    self.read_u32s::<5>(buffer, offset).map(|a| [a[0], a[1]])
                } else {
                    self.read_u32s::<4>(buffer, offset).map(|a| [a[0], a[1]])
                };
                match args {
                    Some([count, instances]) => {
                        Self::record_work(state, u64::from(count) * u64::from(instances), 0)
                    }
                    None => log::error!("SoftwareDevice: indirect draw arguments out of bounds"),
                }
            }
            SoftwareCommand::Dispatch { x, y, z } => {
                Self::require_pipeline(state.compute_pipeline, "dispatch");
                self.stats.dispatches += 1;
                let groups = u64::from(x) * u64::from(y) * u64::from(z);
                Self::record_work(state, 0, groups);
            }
            SoftwareCommand::DispatchIndirect { buffer, offset } => {
                Self::require_pipeline(state.compute_pipeline, "dispatch");
                self.stats.dispatches += 1;
                match self.read_u32s::<3>(buffer, offset) {
                    Some([x, y, z]) => {
                        let groups = u64::from(x) * u64::from(y) * u64::from(z);
                        Self::record_work(state, 0, groups);
                    }
                    None => log::error!("SoftwareDevice: indirect dispatch arguments out of bounds"),
                }
            }
            SoftwareCommand::CopyBufferToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => self.copy_buffer_to_buffer(
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            ),
            SoftwareCommand::CopyBufferToTexture {
                source,
                layout,
                destination,
                region,
            } => {
                let Some(bytes) = self.buffer(source).map(<[u8]>::to_vec) else {
                    log::error!("SoftwareDevice: copy source {source} is not a buffer");
                    return;
                };
                let Some(SoftwareObject::Texture(texture)) = self.objects.get_mut(&destination)
                else {
                    log::error!("SoftwareDevice: copy destination {destination} is not a texture");
                    return;
                };
                match copy_into_texture(texture, &bytes, &layout, &region) {
                    Some(_) => self.stats.copies += 1,
                    None => log::error!(
                        "SoftwareDevice: buffer-to-texture copy out of bounds ({source} -> {destination})"
                    ),
                }
            }
            SoftwareCommand::BeginQuery { heap, index } => {
                let ty = match self.objects.get(&heap) {
                    Some(SoftwareObject::QueryHeap { ty, .. }) => *ty,
                    _ => {
                        log::error!("SoftwareDevice: {heap} is not a query heap");
                        return;
                    }
                };
                state.active_queries.push(ActiveQuery {
                    heap,
                    index,
                    ty,
                    value: 0,
                });
            }
            SoftwareCommand::EndQuery { heap, index } => {
                let Some(position) = state
                    .active_queries
                    .iter()
                    .position(|q| q.heap == heap && q.index == index)
                else {
                    log::error!("SoftwareDevice: query {index} of {heap} ended without begin");
                    return;
                };
                let query = state.active_queries.swap_remove(position);
                self.store_query(heap, index, query.value);
            }
            SoftwareCommand::WriteTimestamp { heap, index } => {
                let now = self.timestamp();
                self.store_query(heap, index, now);
            }
            SoftwareCommand::ResolveQueryHeap {
                heap,
                queries,
                destination,
                destination_offset,
            } => {
                let results = match self.objects.get(&heap) {
                    Some(SoftwareObject::QueryHeap { ty, results }) => {
                        let stride = (ty.result_size() / 8) as usize;
                        let start = queries.start as usize * stride;
                        let end = queries.end as usize * stride;
                        results.get(start..end).map(<[u64]>::to_vec)
                    }
                    _ => None,
                };
                let Some(results) = results else {
                    log::error!("SoftwareDevice: invalid query resolve from {heap}");
                    return;
                };
                let bytes: &[u8] = bytemuck::cast_slice(&results);
                let start = destination_offset as usize;
                match self
                    .buffer_mut(destination)
                    .and_then(|data| data.get_mut(start..start + bytes.len()))
                {
                    Some(target) => target.copy_from_slice(bytes),
                    None => log::error!("SoftwareDevice: query resolve target out of bounds"),
                }
            }
        }
    }

    fn store_query(&mut self, heap: NativeHandle, index: u32, value: u64) {
        match self.objects.get_mut(&heap) {
            Some(SoftwareObject::QueryHeap { ty, results }) => {
                let stride = (ty.result_size() / 8) as usize;
                if let Some(slot) = results.get_mut(index as usize * stride) {
                    *slot = value;
                }
            }
            _ => log::error!("SoftwareDevice: {heap} is not a query heap"),
        }
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: NativeHandle,
        source_offset: u64,
        destination: NativeHandle,
        destination_offset: u64,
        size: u64,
    ) {
        let src = source_offset as usize..(source_offset + size) as usize;
        let Some(bytes) = self.buffer(source).and_then(|data| data.get(src)).map(<[u8]>::to_vec)
        else {
            log::error!("SoftwareDevice: copy source {source} out of bounds");
            return;
        };
        let dst = destination_offset as usize..(destination_offset + size) as usize;
        match self.buffer_mut(destination).and_then(|data| data.get_mut(dst)) {
            Some(target) => {
                target.copy_from_slice(&bytes);
                self.stats.copies += 1;
            }
            None => log::error!("SoftwareDevice: copy destination {destination} out of bounds"),
        }
    }

    fn clear_color(&mut self, texture: NativeHandle, color: Color) {
        let Some(SoftwareObject::Texture(storage)) = self.objects.get_mut(&texture) else {
            log::error!("SoftwareDevice: attachment {texture} is not a texture");
            return;
        };
        match encode_clear_color(storage.descriptor.format, color) {
            Some(texel) => {
                fill_texels(&mut storage.data, &texel, None);
                self.stats.clears += 1;
            }
            None => log::trace!(
                "SoftwareDevice: clear of {} attachments is not emulated",
                storage.descriptor.format
            ),
        }
    }

    fn clear_depth_stencil(
        &mut self,
        texture: NativeHandle,
        depth: Option<f32>,
        stencil: Option<u32>,
    ) {
        let Some(SoftwareObject::Texture(storage)) = self.objects.get_mut(&texture) else {
            log::error!("SoftwareDevice: attachment {texture} is not a texture");
            return;
        };
        let format = storage.descriptor.format;
        if let Some((texel, mask)) = encode_clear_depth_stencil(format, depth, stencil) {
            fill_texels(&mut storage.data, &texel, Some(&mask));
            self.stats.clears += 1;
        }
    }
}

impl DeviceBackend for SoftwareDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Software
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    fn limits(&self) -> &DeviceLimits {
        &self.config.limits
    }

    fn traits(&self) -> BackendTraits {
        self.config.traits
    }

    fn query_feature(&self, feature: Feature) -> bool {
        self.config.features.contains(&feature)
    }

    fn timestamp_frequency(&self) -> u64 {
        self.config.timestamp_frequency
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError> {
        let mut data = vec![0; descriptor.size as usize];
        if let Some(initial) = initial_data {
            data[..initial.len()].copy_from_slice(initial);
        }
        Ok(self.insert(
            SoftwareObject::Buffer {
                data,
                cpu_access: descriptor.cpu_access,
            },
            descriptor.label.as_deref(),
        ))
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor<'_>,
        allocation: &TextureAllocation,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError> {
        let size = descriptor.total_size() as usize;
        let data = match initial_data {
            Some(initial) => initial[..size].to_vec(),
            None => vec![0; size],
        };
        Ok(self.insert(
            SoftwareObject::Texture(TextureStorage {
                descriptor: descriptor.clone().into_owned(),
                allocation: *allocation,
                data,
                backbuffer: false,
            }),
            descriptor.label.as_deref(),
        ))
    }

    fn create_sampler(
        &mut self,
        descriptor: &SamplerDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        Ok(self.insert(SoftwareObject::Sampler, descriptor.label.as_deref()))
    }

    fn create_bind_group_layout(
        &mut self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        Ok(self.insert(SoftwareObject::BindGroupLayout, descriptor.label.as_deref()))
    }

    fn create_bind_group(
        &mut self,
        descriptor: &BindGroupDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        if !self.is_alive(descriptor.layout.native_handle()) {
            return Err(ResourceError::Backend(format!(
                "bind group layout {} does not exist",
                descriptor.layout.native_handle()
            )));
        }
        Ok(self.insert(SoftwareObject::BindGroup, descriptor.label.as_deref()))
    }

    fn create_pipeline_layout(
        &mut self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        Ok(self.insert(SoftwareObject::PipelineLayout, descriptor.label.as_deref()))
    }

    fn create_render_pipeline(
        &mut self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        Ok(self.insert(SoftwareObject::RenderPipeline, descriptor.label.as_deref()))
    }

    fn create_compute_pipeline(
        &mut self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        Ok(self.insert(SoftwareObject::ComputePipeline, descriptor.label.as_deref()))
    }

    fn create_query_heap(
        &mut self,
        descriptor: &QueryHeapDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let stride = (descriptor.ty.result_size() / 8) as usize;
        Ok(self.insert(
            SoftwareObject::QueryHeap {
                ty: descriptor.ty,
                results: vec![0; descriptor.count as usize * stride],
            },
            descriptor.label.as_deref(),
        ))
    }

    fn destroy(&mut self, kind: ResourceKind, handle: NativeHandle) {
        let Some(object) = self.objects.remove(&handle) else {
            log::error!("SoftwareDevice: destroy of unknown {kind} {handle}");
            self.stats.invalid_destroys += 1;
            return;
        };
        if object.kind() != kind {
            log::error!(
                "SoftwareDevice: {handle} destroyed as {kind} but is a {}",
                object.kind()
            );
        }
        if let SoftwareObject::SwapChain(chain) = &object {
            for buffer in &chain.buffers {
                self.objects.remove(buffer);
                self.labels.remove(buffer);
            }
        }
        self.labels.remove(&handle);
        self.stats.destroyed_objects += 1;
        log::trace!("SoftwareDevice: destroyed {kind} {handle}");
    }

    fn set_label(&mut self, _kind: ResourceKind, handle: NativeHandle, label: &str) {
        if self.objects.contains_key(&handle) {
            self.labels.insert(handle, label.to_owned());
        }
    }

    fn write_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let Some(SoftwareObject::Buffer {
            data: storage,
            cpu_access,
        }) = self.objects.get_mut(&buffer)
        else {
            return Err(ResourceError::Backend(format!("{buffer} is not a buffer")));
        };
        if *cpu_access != CpuAccessMode::Write {
            return Err(ResourceError::Backend(format!("{buffer} is not CPU-writable")));
        }
        let start = offset as usize;
        let capacity = storage.len() as u64;
        let target = storage
            .get_mut(start..start + data.len())
            .ok_or(ResourceError::OutOfBounds {
                offset,
                size: data.len() as u64,
                capacity,
            })?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        output: &mut [u8],
    ) -> Result<(), ResourceError> {
        let Some(SoftwareObject::Buffer { data, cpu_access }) = self.objects.get(&buffer) else {
            return Err(ResourceError::Backend(format!("{buffer} is not a buffer")));
        };
        if *cpu_access != CpuAccessMode::Read {
            return Err(ResourceError::Backend(format!("{buffer} is not CPU-readable")));
        }
        let start = offset as usize;
        let source = data
            .get(start..start + output.len())
            .ok_or(ResourceError::OutOfBounds {
                offset,
                size: output.len() as u64,
                capacity: data.len() as u64,
            })?;
        output.copy_from_slice(source);
        Ok(())
    }

    fn create_swap_chain(
        &mut self,
        surface: &SurfaceHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<SwapChainConfiguration, SwapChainError> {
        if !surface.is_headless() {
            return Err(SwapChainError::UnsupportedSurface(
                "the software device only presents to headless surfaces".into(),
            ));
        }
        let format = match descriptor.format {
            PixelFormat::Undefined => PixelFormat::Bgra8UnormSrgb,
            format => format,
        };
        let buffers = self.create_backbuffers(
            descriptor.back_buffer_count,
            descriptor.width,
            descriptor.height,
            format,
        );
        let handle = self.insert(
            SoftwareObject::SwapChain(SwapChainStorage {
                width: descriptor.width,
                height: descriptor.height,
                format,
                present_mode: descriptor.present_mode,
                buffers,
                next: 0,
                acquired: None,
                presents: 0,
            }),
            descriptor.label.as_deref(),
        );
        Ok(SwapChainConfiguration {
            handle,
            format,
            present_mode: descriptor.present_mode,
            back_buffer_count: descriptor.back_buffer_count,
        })
    }

    fn acquire_next_texture(
        &mut self,
        swap_chain: NativeHandle,
    ) -> Result<Option<NativeHandle>, SwapChainError> {
        let chain = self.swap_chain_mut(swap_chain)?;
        if chain.width == 0 || chain.height == 0 {
            return Ok(None);
        }
        if let Some(index) = chain.acquired {
            return Ok(Some(chain.buffers[index]));
        }
        let index = chain.next;
        chain.acquired = Some(index);
        let texture = chain.buffers[index];
        self.stats.acquires += 1;
        Ok(Some(texture))
    }

    fn resize_swap_chain(
        &mut self,
        swap_chain: NativeHandle,
        width: u32,
        height: u32,
    ) -> Result<(), SwapChainError> {
        let chain = self.swap_chain_mut(swap_chain)?;
        if chain.acquired.is_some() {
            return Err(SwapChainError::BackbufferAcquired);
        }
        let old = std::mem::take(&mut chain.buffers);
        let (count, format) = (old.len() as u32, chain.format);
        for buffer in &old {
            self.objects.remove(buffer);
            self.labels.remove(buffer);
        }
        let buffers = self.create_backbuffers(count, width, height, format);
        let chain = self.swap_chain_mut(swap_chain)?;
        chain.buffers = buffers;
        chain.width = width;
        chain.height = height;
        chain.next = 0;
        Ok(())
    }

    fn present(&mut self, swap_chain: NativeHandle) -> Result<(), SwapChainError> {
        let chain = self.swap_chain_mut(swap_chain)?;
        let Some(index) = chain.acquired.take() else {
            return Err(SwapChainError::Backend(format!(
                "present on {swap_chain} without an acquired backbuffer"
            )));
        };
        chain.next = (index + 1) % chain.buffers.len();
        chain.presents += 1;
        let mode = chain.present_mode;
        self.stats.presents += 1;
        log::trace!("SoftwareDevice: presented backbuffer {index} of {swap_chain} ({mode:?})");
        Ok(())
    }

    fn create_command_encoder(
        &mut self,
        queue: QueueType,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        Ok(Box::new(SoftwareCommandEncoder::new(queue)))
    }

    fn submit(
        &mut self,
        queue: QueueType,
        batches: Vec<NativeCommandBatch>,
    ) -> Result<(), DeviceError> {
        self.check_lost()?;
        for batch in batches {
            let list = batch.downcast::<SoftwareCommandList>().map_err(|_| {
                DeviceError::SubmissionFailed(
                    "batch was not recorded by a software encoder".into(),
                )
            })?;
            if list.queue != queue {
                return Err(DeviceError::SubmissionFailed(format!(
                    "batch recorded for {:?} submitted to {queue:?}",
                    list.queue
                )));
            }
            self.stats.submitted_batches[queue.index()] += 1;
            self.execute(list);
        }
        Ok(())
    }

    fn begin_frame(&mut self, frame_index: u32) -> Result<(), DeviceError> {
        self.check_lost()?;
        // Submissions execute synchronously, so the slot's previous work is already done.
        self.frame_index = frame_index;
        self.stats.frames_begun += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.check_lost()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for SoftwareDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareDevice")
            .field("adapter", &self.adapter_info.name)
            .field("objects", &self.objects.len())
            .field("frame_index", &self.frame_index)
            .field("lost", &self.lost)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khora_gpu_core::renderer::api::{BufferUsage, PresentMode};

    fn device() -> (SoftwareDevice, flume::Receiver<DeviceEvent>) {
        let (sender, receiver) = flume::unbounded();
        (SoftwareDevice::new(SoftwareDeviceConfig::default(), sender), receiver)
    }

    fn buffer(device: &mut SoftwareDevice, size: u64, access: CpuAccessMode) -> NativeHandle {
        let descriptor = BufferDescriptor::new("test", size, BufferUsage::COPY_SRC | BufferUsage::COPY_DST)
            .with_cpu_access(access);
        device.create_buffer(&descriptor, None).unwrap()
    }

    fn submit(device: &mut SoftwareDevice, commands: Vec<SoftwareCommand>) -> Result<(), DeviceError> {
        let count = commands.len();
        let list = SoftwareCommandList {
            queue: QueueType::Graphics,
            frame_index: 0,
            commands,
        };
        device.submit(QueueType::Graphics, vec![NativeCommandBatch::new(list, count)])
    }

    #[test]
    fn test_cpu_access_is_enforced() {
        let (mut device, _events) = device();
        let upload = buffer(&mut device, 16, CpuAccessMode::Write);
        let gpu_only = buffer(&mut device, 16, CpuAccessMode::None);

        device.write_buffer(upload, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&device.buffer_data(upload).unwrap()[4..8], &[1, 2, 3, 4]);
        assert!(device.write_buffer(gpu_only, 0, &[0]).is_err());
        assert!(matches!(
            device.write_buffer(upload, 14, &[0; 4]),
            Err(ResourceError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_submitted_copy_executes() {
        let (mut device, _events) = device();
        let source = buffer(&mut device, 8, CpuAccessMode::Write);
        let destination = buffer(&mut device, 8, CpuAccessMode::Read);
        device.write_buffer(source, 0, &[9; 8]).unwrap();

        submit(
            &mut device,
            vec![SoftwareCommand::CopyBufferToBuffer {
                source,
                source_offset: 0,
                destination,
                destination_offset: 4,
                size: 4,
            }],
        )
        .unwrap();

        let mut output = [0u8; 8];
        device.read_buffer(destination, 0, &mut output).unwrap();
        assert_eq!(output, [0, 0, 0, 0, 9, 9, 9, 9]);
        assert_eq!(device.stats().copies, 1);
        assert_eq!(device.stats().submitted_batches[QueueType::Graphics.index()], 1);
    }

    #[test]
    fn test_foreign_batch_is_rejected() {
        let (mut device, _events) = device();
        let result = device.submit(QueueType::Graphics, vec![NativeCommandBatch::new(42u32, 0)]);
        assert!(matches!(result, Err(DeviceError::SubmissionFailed(_))));
    }

    #[test]
    fn test_occlusion_query_counts_drawn_vertices() {
        let (mut device, _events) = device();
        let heap = device
            .create_query_heap(&QueryHeapDescriptor {
                label: None,
                ty: QueryType::Occlusion,
                count: 2,
            })
            .unwrap();
        let readback = buffer(&mut device, 16, CpuAccessMode::Read);

        submit(
            &mut device,
            vec![
                SoftwareCommand::SetPipeline(PipelineKind::Render, NativeHandle(999)),
                SoftwareCommand::BeginQuery { heap, index: 1 },
                SoftwareCommand::Draw {
                    vertices: 0..3,
                    instances: 0..2,
                },
                SoftwareCommand::EndQuery { heap, index: 1 },
                SoftwareCommand::ResolveQueryHeap {
                    heap,
                    queries: 0..2,
                    destination: readback,
                    destination_offset: 0,
                },
            ],
        )
        .unwrap();

        let data = device.buffer_data(readback).unwrap();
        assert_eq!(u64::from_le_bytes(data[0..8].try_into().unwrap()), 0);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 6);
    }

    #[test]
    fn test_swap_chain_rotates_backbuffers() {
        let (mut device, _events) = device();
        let config = device
            .create_swap_chain(
                &SurfaceHandle::headless(),
                &SwapChainDescriptor {
                    label: None,
                    width: 4,
                    height: 4,
                    format: PixelFormat::Undefined,
                    present_mode: PresentMode::Fifo,
                    back_buffer_count: 2,
                },
            )
            .unwrap();
        assert_eq!(config.format, PixelFormat::Bgra8UnormSrgb);

        let first = device.acquire_next_texture(config.handle).unwrap().unwrap();
        assert_eq!(device.acquire_next_texture(config.handle).unwrap(), Some(first));
        device.present(config.handle).unwrap();
        let second = device.acquire_next_texture(config.handle).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            device.resize_swap_chain(config.handle, 8, 8),
            Err(SwapChainError::BackbufferAcquired)
        ));
        device.present(config.handle).unwrap();
        assert_eq!(device.present_count(config.handle), Some(2));

        // Backbuffers are not counted as textures and die with their swap chain.
        assert_eq!(device.live_count(ResourceKind::Texture), 0);
        device.destroy(ResourceKind::SwapChain, config.handle);
        assert!(!device.is_alive(first));
        assert_eq!(device.live_handle_count(), 0);
    }

    #[test]
    fn test_destroy_of_unknown_handle_is_counted() {
        let (mut device, _events) = device();
        let handle = buffer(&mut device, 4, CpuAccessMode::None);
        device.destroy(ResourceKind::Buffer, handle);
        device.destroy(ResourceKind::Buffer, handle);
        assert_eq!(device.stats().destroyed_objects, 1);
        assert_eq!(device.stats().invalid_destroys, 1);
    }

    #[test]
    fn test_device_loss_is_published() {
        let (mut device, events) = device();
        device.simulate_device_loss("unplugged");

        assert!(matches!(events.try_recv(), Ok(DeviceEvent::Lost { reason }) if reason == "unplugged"));
        assert!(matches!(device.begin_frame(1), Err(DeviceError::DeviceLost(_))));
        assert!(matches!(submit(&mut device, Vec::new()), Err(DeviceError::DeviceLost(_))));
    }
}
