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

//! The command recorder handed out by [`GraphicsDevice::acquire_command_buffer`].

use std::ops::Range;
use std::rc::{Rc, Weak};

use super::queue::PooledEncoder;
use crate::renderer::api::{
    BufferUsage, DeviceLimits, IndexFormat, PipelineKind, PixelFormat, QueryType, QueueType,
    RenderPassDescriptor, ResourceId, ScissorRect, ShaderStageFlags, TextureDataLayout,
    TextureRegion, TextureUsage, Viewport,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::CommandError;
use crate::renderer::resource::{BindGroup, Buffer, Pipeline, QueryHeap, SwapChain, Texture};
use crate::renderer::traits::CommandEncoder;

const DRAW_INDIRECT_ARGS_SIZE: u64 = 16;
const DRAW_INDEXED_INDIRECT_ARGS_SIZE: u64 = 20;
const DISPATCH_INDIRECT_ARGS_SIZE: u64 = 12;
const QUERY_RESOLVE_ALIGNMENT: u64 = 256;
const COPY_ALIGNMENT: u64 = 4;

/// Where a recorder is in its pass structure.
///
/// A recorder is *idle* while it sits in its queue's pool and *submitted* between
/// [`CommandRecorder::flush`] and the next frame; neither state is observable through a
/// live `CommandRecorder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Outside any render pass.
    Recording,
    /// Inside a render pass.
    InRenderPass,
}

/// Counters of what a recorder forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecorderStats {
    /// Pipeline binds forwarded.
    pub pipeline_binds: u32,
    /// Pipeline binds skipped because the pipeline was already bound.
    pub redundant_pipeline_binds: u32,
    /// Draw calls, direct and indirect.
    pub draws: u32,
    /// Dispatches, direct and indirect.
    pub dispatches: u32,
}

#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    id: ResourceId,
    kind: PipelineKind,
    push_constant_size: u32,
}

/// Records GPU commands for one queue.
///
/// Every operation is validated against the recorder's state before it reaches the
/// native encoder. A rejected operation is logged, returns a [`CommandError`] and leaves
/// both the recorder and the recorded commands unchanged.
///
/// Recording ends with [`CommandRecorder::flush`], which hands the native batch to the
/// queue. Dropping a recorder without flushing discards its commands.
pub struct CommandRecorder {
    device: Weak<DeviceShared>,
    queue_type: QueueType,
    pooled: Option<PooledEncoder>,
    frame_index: u32,
    limits: DeviceLimits,
    state: RecorderState,
    label_group: bool,
    debug_group_depth: u32,
    pipeline: Option<BoundPipeline>,
    render_area: (u32, u32),
    presents: Vec<SwapChain>,
    stats: RecorderStats,
}

fn reject(error: CommandError) -> Result<(), CommandError> {
    log::error!("CommandRecorder: rejected command: {error}");
    Err(error)
}

fn check_buffer(
    buffer: &Buffer,
    usage: BufferUsage,
    offset: u64,
    size: u64,
    op: &'static str,
) -> Result<(), CommandError> {
    if buffer.is_destroyed() {
        return reject(CommandError::InvalidResource(format!(
            "{op}: buffer '{}' was destroyed",
            buffer.label()
        )));
    }
    if !buffer.usage().contains(usage) {
        return reject(CommandError::InvalidResource(format!(
            "{op}: buffer '{}' lacks usage {usage:?}",
            buffer.label()
        )));
    }
    if offset.checked_add(size).is_none_or(|end| end > buffer.size()) {
        return reject(CommandError::InvalidResource(format!(
            "{op}: range {offset}+{size} exceeds buffer '{}' of {} bytes",
            buffer.label(),
            buffer.size()
        )));
    }
    Ok(())
}

/// Bytes a buffer-to-texture copy reads past `layout.offset`, or `None` on overflow.
fn texel_copy_footprint(
    format: PixelFormat,
    layout: &TextureDataLayout,
    extent: [u32; 3],
) -> Option<u64> {
    if extent.contains(&0) {
        return Some(0);
    }
    let info = format.info();
    let block_rows = u64::from(extent[1].div_ceil(info.block_height));
    let last_row_bytes =
        u64::from(extent[0].div_ceil(info.block_width)) * u64::from(info.bytes_per_block);
    let rows_per_image = match layout.rows_per_image {
        0 => block_rows,
        rows => u64::from(rows),
    };
    let full_rows = rows_per_image
        .checked_mul(u64::from(extent[2] - 1))?
        .checked_add(block_rows - 1)?;
    u64::from(layout.bytes_per_row)
        .checked_mul(full_rows)?
        .checked_add(last_row_bytes)
}

impl CommandRecorder {
    pub(crate) fn begin(
        shared: &Rc<DeviceShared>,
        queue_type: QueueType,
        mut pooled: PooledEncoder,
        label: Option<&str>,
    ) -> Self {
        let frame_index = shared.frame_index();
        pooled.encoder.begin(frame_index);

        let label_group = match label {
            Some(label) if shared.traits.debug_labels => {
                pooled.encoder.push_debug_group(label);
                true
            }
            _ => false,
        };

        Self {
            device: Rc::downgrade(shared),
            queue_type,
            pooled: Some(pooled),
            frame_index,
            limits: shared.limits.clone(),
            state: RecorderState::Recording,
            label_group,
            debug_group_depth: 0,
            pipeline: None,
            render_area: (0, 0),
            presents: Vec::new(),
            stats: RecorderStats::default(),
        }
    }

    /// The queue the recorder belongs to.
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// The frame slot the recorder was begun in.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Current pass state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Number of user debug groups currently open.
    pub fn debug_group_depth(&self) -> u32 {
        self.debug_group_depth
    }

    /// What has been forwarded to the backend so far.
    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    fn native(&mut self) -> Result<&mut dyn CommandEncoder, CommandError> {
        match self.pooled.as_mut() {
            Some(pooled) => Ok(&mut *pooled.encoder),
            None => Err(CommandError::DeviceDropped),
        }
    }

    fn require_render_pass(&self, op: &'static str) -> Result<(), CommandError> {
        if self.state != RecorderState::InRenderPass {
            return reject(CommandError::NotInRenderPass(op));
        }
        Ok(())
    }

    fn require_outside_render_pass(&self, op: &'static str) -> Result<(), CommandError> {
        if self.state == RecorderState::InRenderPass {
            return reject(CommandError::InRenderPass(op));
        }
        Ok(())
    }

    fn require_queue(&self, allowed: &[QueueType], op: &'static str) -> Result<(), CommandError> {
        if !allowed.contains(&self.queue_type) {
            return reject(CommandError::QueueMismatch(op));
        }
        Ok(())
    }

    fn require_pipeline(&self, kind: PipelineKind, op: &'static str) -> Result<(), CommandError> {
        match self.pipeline {
            Some(bound) if bound.kind == kind => Ok(()),
            _ => reject(CommandError::NoPipelineBound(op)),
        }
    }

    // --- Debug groups ---

    /// Opens a named debug group. Groups must be closed in reverse order.
    pub fn push_debug_group(&mut self, label: &str) -> Result<(), CommandError> {
        self.native()?.push_debug_group(label);
        self.debug_group_depth += 1;
        Ok(())
    }

    /// Closes the innermost debug group.
    pub fn pop_debug_group(&mut self) -> Result<(), CommandError> {
        if self.debug_group_depth == 0 {
            return reject(CommandError::DebugGroupUnderflow);
        }
        self.native()?.pop_debug_group();
        self.debug_group_depth -= 1;
        Ok(())
    }

    /// Inserts a single debug marker.
    pub fn insert_debug_marker(&mut self, label: &str) -> Result<(), CommandError> {
        self.native()?.insert_debug_marker(label);
        Ok(())
    }

    // --- Render passes ---

    /// Opens a render pass. The viewport and scissor are reset to cover the smallest
    /// attachment, and the bound pipeline is forgotten.
    pub fn begin_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<(), CommandError> {
        self.require_queue(&[QueueType::Graphics], "begin_render_pass")?;
        if self.state == RecorderState::InRenderPass {
            return reject(CommandError::AlreadyInRenderPass);
        }

        let attachments = descriptor
            .color_attachments
            .iter()
            .map(|attachment| attachment.texture)
            .chain(descriptor.depth_stencil_attachment.as_ref().map(|depth| depth.texture));

        let mut area: Option<(u32, u32)> = None;
        for texture in attachments {
            check_attachment(texture)?;
            let (width, height) = (texture.width(), texture.height());
            area = Some(match area {
                Some((w, h)) => (w.min(width), h.min(height)),
                None => (width, height),
            });
        }
        let Some((width, height)) = area else {
            return reject(CommandError::InvalidResource(
                "render pass has no attachments".into(),
            ));
        };
        if descriptor.color_attachments.len() > self.limits.max_color_attachments as usize {
            return reject(CommandError::InvalidResource(format!(
                "render pass has {} color attachments, the device allows {}",
                descriptor.color_attachments.len(),
                self.limits.max_color_attachments
            )));
        }
        if let Some(heap) = descriptor.occlusion_query_heap {
            if !matches!(heap.ty(), QueryType::Occlusion | QueryType::BinaryOcclusion) {
                return reject(CommandError::InvalidResource(format!(
                    "query heap '{}' is not an occlusion heap",
                    heap.label()
                )));
            }
        }

        let native = self.native()?;
        native.begin_render_pass(descriptor);
        native.set_viewport(&Viewport::full(width, height));
        native.set_scissor_rect(&ScissorRect::full(width, height));

        self.state = RecorderState::InRenderPass;
        self.render_area = (width, height);
        self.pipeline = None;
        Ok(())
    }

    /// Closes the open render pass.
    pub fn end_render_pass(&mut self) -> Result<(), CommandError> {
        self.require_render_pass("end_render_pass")?;
        self.native()?.end_render_pass();
        self.state = RecorderState::Recording;
        self.pipeline = None;
        Ok(())
    }

    /// Width and height covered by the open render pass.
    pub fn render_area(&self) -> Option<(u32, u32)> {
        (self.state == RecorderState::InRenderPass).then_some(self.render_area)
    }

    // --- State ---

    /// Binds a pipeline. Binding the pipeline that is already bound does nothing.
    ///
    /// Render pipelines are bound inside render passes, compute pipelines outside.
    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), CommandError> {
        if pipeline.is_destroyed() {
            return reject(CommandError::InvalidResource(format!(
                "pipeline '{}' was destroyed",
                pipeline.label()
            )));
        }
        match pipeline.kind() {
            PipelineKind::Render => {
                self.require_queue(&[QueueType::Graphics], "set_pipeline")?;
                self.require_render_pass("set_pipeline")?;
            }
            PipelineKind::Compute => {
                self.require_queue(&[QueueType::Graphics, QueueType::Compute], "set_pipeline")?;
                self.require_outside_render_pass("set_pipeline")?;
            }
        }

        if self.pipeline.is_some_and(|bound| bound.id == pipeline.id()) {
            self.stats.redundant_pipeline_binds += 1;
            return Ok(());
        }

        self.native()?
            .set_pipeline(pipeline.kind(), pipeline.native_handle());
        self.pipeline = Some(BoundPipeline {
            id: pipeline.id(),
            kind: pipeline.kind(),
            push_constant_size: pipeline.push_constant_size(),
        });
        self.stats.pipeline_binds += 1;
        Ok(())
    }

    /// Binds a bind group at `index` for the current pass type.
    pub fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: &BindGroup,
        dynamic_offsets: &[u32],
    ) -> Result<(), CommandError> {
        self.require_queue(&[QueueType::Graphics, QueueType::Compute], "set_bind_group")?;
        if index >= self.limits.max_bind_groups {
            return reject(CommandError::InvalidResource(format!(
                "bind group index {index} exceeds the device limit of {}",
                self.limits.max_bind_groups
            )));
        }
        if bind_group.is_destroyed() {
            return reject(CommandError::InvalidResource(format!(
                "bind group '{}' was destroyed",
                bind_group.label()
            )));
        }
        self.native()?.set_bind_group(
            index,
            bind_group.native_handle(),
            bind_group.layout_entries(),
            dynamic_offsets,
        );
        Ok(())
    }

    /// Uploads push constants for the bound pipeline.
    ///
    /// Writing past the bound pipeline's push-constant budget (or the device maximum when
    /// nothing is bound) is a programming error: it asserts in debug builds and is
    /// clamped to the budget otherwise.
    pub fn set_push_constants(
        &mut self,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<(), CommandError> {
        let budget = self
            .pipeline
            .map(|bound| bound.push_constant_size)
            .unwrap_or(self.limits.max_push_constant_size);
        let end = offset as usize + data.len();

        debug_assert!(
            end <= budget as usize,
            "push constant write ends at byte {end}, past the {budget}-byte budget"
        );

        let data = if end > budget as usize {
            log::error!(
                "CommandRecorder: push constant write ends at byte {end}, clamped to the {budget}-byte budget"
            );
            if offset >= budget {
                return Ok(());
            }
            &data[..(budget - offset) as usize]
        } else {
            data
        };

        if !data.is_empty() {
            self.native()?.set_push_constants(stages, offset, data);
        }
        Ok(())
    }

    /// Binds a vertex buffer slot.
    pub fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: &Buffer,
        offset: u64,
    ) -> Result<(), CommandError> {
        self.require_render_pass("set_vertex_buffer")?;
        if slot >= self.limits.max_vertex_buffers {
            return reject(CommandError::InvalidResource(format!(
                "vertex buffer slot {slot} exceeds the device limit of {}",
                self.limits.max_vertex_buffers
            )));
        }
        check_buffer(buffer, BufferUsage::VERTEX, offset, 0, "set_vertex_buffer")?;
        self.native()?
            .set_vertex_buffer(slot, buffer.native_handle(), offset);
        Ok(())
    }

    /// Binds the index buffer.
    pub fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        format: IndexFormat,
    ) -> Result<(), CommandError> {
        self.require_render_pass("set_index_buffer")?;
        check_buffer(buffer, BufferUsage::INDEX, offset, 0, "set_index_buffer")?;
        self.native()?
            .set_index_buffer(buffer.native_handle(), offset, format);
        Ok(())
    }

    /// Sets the viewport of the open render pass.
    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<(), CommandError> {
        self.require_render_pass("set_viewport")?;
        self.native()?.set_viewport(viewport);
        Ok(())
    }

    /// Sets the scissor rectangle of the open render pass, clipped to the render area.
    pub fn set_scissor_rect(&mut self, rect: &ScissorRect) -> Result<(), CommandError> {
        self.require_render_pass("set_scissor_rect")?;
        let (width, height) = self.render_area;
        let x = rect.x.min(width);
        let y = rect.y.min(height);
        let clipped = ScissorRect {
            x,
            y,
            width: rect.width.min(width - x),
            height: rect.height.min(height - y),
        };
        self.native()?.set_scissor_rect(&clipped);
        Ok(())
    }

    /// Sets the stencil reference of the open render pass.
    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<(), CommandError> {
        self.require_render_pass("set_stencil_reference")?;
        self.native()?.set_stencil_reference(reference);
        Ok(())
    }

    /// Sets the blend constant of the open render pass.
    pub fn set_blend_constant(&mut self, color: [f64; 4]) -> Result<(), CommandError> {
        self.require_render_pass("set_blend_constant")?;
        self.native()?.set_blend_constant(color);
        Ok(())
    }

    // --- Draws and dispatches ---

    /// Draws non-indexed primitives with the bound render pipeline.
    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), CommandError> {
        self.require_render_pass("draw")?;
        self.require_pipeline(PipelineKind::Render, "draw")?;
        self.native()?.draw(vertices, instances);
        self.stats.draws += 1;
        Ok(())
    }

    /// Draws indexed primitives with the bound render pipeline and index buffer.
    pub fn draw_indexed(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), CommandError> {
        self.require_render_pass("draw_indexed")?;
        self.require_pipeline(PipelineKind::Render, "draw_indexed")?;
        self.native()?.draw_indexed(indices, base_vertex, instances);
        self.stats.draws += 1;
        Ok(())
    }

    /// Draws with arguments read from `buffer` at `offset`.
    pub fn draw_indirect(&mut self, buffer: &Buffer, offset: u64) -> Result<(), CommandError> {
        self.require_render_pass("draw_indirect")?;
        self.require_pipeline(PipelineKind::Render, "draw_indirect")?;
        check_buffer(
            buffer,
            BufferUsage::INDIRECT,
            offset,
            DRAW_INDIRECT_ARGS_SIZE,
            "draw_indirect",
        )?;
        self.native()?.draw_indirect(buffer.native_handle(), offset);
        self.stats.draws += 1;
        Ok(())
    }

    /// Draws indexed primitives with arguments read from `buffer` at `offset`.
    pub fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64) -> Result<(), CommandError> {
        self.require_render_pass("draw_indexed_indirect")?;
        self.require_pipeline(PipelineKind::Render, "draw_indexed_indirect")?;
        check_buffer(
            buffer,
            BufferUsage::INDIRECT,
            offset,
            DRAW_INDEXED_INDIRECT_ARGS_SIZE,
            "draw_indexed_indirect",
        )?;
        self.native()?
            .draw_indexed_indirect(buffer.native_handle(), offset);
        self.stats.draws += 1;
        Ok(())
    }

    /// Dispatches compute workgroups with the bound compute pipeline.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), CommandError> {
        self.require_queue(&[QueueType::Graphics, QueueType::Compute], "dispatch")?;
        self.require_outside_render_pass("dispatch")?;
        self.require_pipeline(PipelineKind::Compute, "dispatch")?;
        self.native()?.dispatch(x, y, z);
        self.stats.dispatches += 1;
        Ok(())
    }

    /// Dispatches compute workgroups with counts read from `buffer` at `offset`.
    pub fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) -> Result<(), CommandError> {
        self.require_queue(&[QueueType::Graphics, QueueType::Compute], "dispatch_indirect")?;
        self.require_outside_render_pass("dispatch_indirect")?;
        self.require_pipeline(PipelineKind::Compute, "dispatch_indirect")?;
        check_buffer(
            buffer,
            BufferUsage::INDIRECT,
            offset,
            DISPATCH_INDIRECT_ARGS_SIZE,
            "dispatch_indirect",
        )?;
        self.native()?
            .dispatch_indirect(buffer.native_handle(), offset);
        self.stats.dispatches += 1;
        Ok(())
    }

    // --- Copies ---

    /// Copies `size` bytes between buffers. Offsets and size must be multiples of 4.
    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), CommandError> {
        self.require_outside_render_pass("copy_buffer_to_buffer")?;
        if source_offset % COPY_ALIGNMENT != 0
            || destination_offset % COPY_ALIGNMENT != 0
            || size % COPY_ALIGNMENT != 0
        {
            return reject(CommandError::InvalidResource(format!(
                "copy_buffer_to_buffer: offsets and size must be multiples of {COPY_ALIGNMENT}"
            )));
        }
        check_buffer(
            source,
            BufferUsage::COPY_SRC,
            source_offset,
            size,
            "copy_buffer_to_buffer",
        )?;
        check_buffer(
            destination,
            BufferUsage::COPY_DST,
            destination_offset,
            size,
            "copy_buffer_to_buffer",
        )?;
        if source == destination {
            let overlaps = source_offset < destination_offset + size
                && destination_offset < source_offset + size;
            if overlaps {
                return reject(CommandError::InvalidResource(
                    "copy_buffer_to_buffer: source and destination ranges overlap".into(),
                ));
            }
        }
        self.native()?.copy_buffer_to_buffer(
            source.native_handle(),
            source_offset,
            destination.native_handle(),
            destination_offset,
            size,
        );
        Ok(())
    }

    /// Copies texel rows from a buffer into a region of one texture mip level.
    pub fn copy_buffer_to_texture(
        &mut self,
        source: &Buffer,
        layout: &TextureDataLayout,
        destination: &Texture,
        region: &TextureRegion,
    ) -> Result<(), CommandError> {
        self.require_outside_render_pass("copy_buffer_to_texture")?;
        if destination.is_destroyed() || !destination.usage().contains(TextureUsage::COPY_DST) {
            return reject(CommandError::InvalidResource(format!(
                "copy_buffer_to_texture: texture '{}' is destroyed or lacks COPY_DST",
                destination.label()
            )));
        }
        if region.mip_level >= destination.mip_level_count() {
            return reject(CommandError::InvalidResource(format!(
                "copy_buffer_to_texture: mip level {} out of range",
                region.mip_level
            )));
        }
        let (width, height, depth) = destination.mip_extent(region.mip_level);
        let layers = destination.descriptor().array_layers();
        let limit = [width, height, depth.max(layers)];
        for axis in 0..3 {
            let end = region.origin[axis].checked_add(region.extent[axis]);
            if end.is_none_or(|end| end > limit[axis]) {
                return reject(CommandError::InvalidResource(format!(
                    "copy_buffer_to_texture: region exceeds texture '{}'",
                    destination.label()
                )));
            }
        }
        let format = destination.format();
        let (row_pitch, slice_pitch) = format.surface_pitch(region.extent[0], region.extent[1]);
        if u64::from(layout.bytes_per_row) < row_pitch {
            return reject(CommandError::InvalidResource(format!(
                "copy_buffer_to_texture: bytes_per_row {} is smaller than a row of {row_pitch} bytes",
                layout.bytes_per_row
            )));
        }
        let block_rows = (slice_pitch / row_pitch) as u32;
        if layout.rows_per_image != 0 && layout.rows_per_image < block_rows {
            return reject(CommandError::InvalidResource(format!(
                "copy_buffer_to_texture: rows_per_image {} is smaller than the {block_rows} rows copied",
                layout.rows_per_image
            )));
        }
        let Some(footprint) = texel_copy_footprint(format, layout, region.extent) else {
            return reject(CommandError::InvalidResource(
                "copy_buffer_to_texture: source footprint overflows".into(),
            ));
        };
        check_buffer(
            source,
            BufferUsage::COPY_SRC,
            layout.offset,
            footprint,
            "copy_buffer_to_texture",
        )?;
        self.native()?.copy_buffer_to_texture(
            source.native_handle(),
            layout,
            destination.native_handle(),
            region,
        );
        Ok(())
    }

    // --- Queries ---

    fn check_query(&self, heap: &QueryHeap, index: u32, op: &'static str) -> Result<(), CommandError> {
        if heap.is_destroyed() {
            return reject(CommandError::InvalidResource(format!(
                "{op}: query heap '{}' was destroyed",
                heap.label()
            )));
        }
        if index >= heap.count() {
            return reject(CommandError::InvalidResource(format!(
                "{op}: query {index} out of range for heap '{}' of {}",
                heap.label(),
                heap.count()
            )));
        }
        Ok(())
    }

    /// Starts an occlusion (inside a render pass) or pipeline-statistics query.
    pub fn begin_query(&mut self, heap: &QueryHeap, index: u32) -> Result<(), CommandError> {
        self.check_query(heap, index, "begin_query")?;
        match heap.ty() {
            QueryType::Timestamp => {
                return reject(CommandError::InvalidResource(
                    "begin_query: timestamp heaps are written with write_timestamp".into(),
                ))
            }
            QueryType::Occlusion | QueryType::BinaryOcclusion => {
                self.require_render_pass("begin_query")?
            }
            QueryType::PipelineStatistics => {}
        }
        self.native()?.begin_query(heap.native_handle(), index);
        Ok(())
    }

    /// Ends a query started with [`CommandRecorder::begin_query`].
    pub fn end_query(&mut self, heap: &QueryHeap, index: u32) -> Result<(), CommandError> {
        self.check_query(heap, index, "end_query")?;
        if heap.ty() == QueryType::Timestamp {
            return reject(CommandError::InvalidResource(
                "end_query: timestamp heaps are written with write_timestamp".into(),
            ));
        }
        self.native()?.end_query(heap.native_handle(), index);
        Ok(())
    }

    /// Writes a GPU timestamp into a timestamp heap.
    pub fn write_timestamp(&mut self, heap: &QueryHeap, index: u32) -> Result<(), CommandError> {
        self.require_outside_render_pass("write_timestamp")?;
        self.check_query(heap, index, "write_timestamp")?;
        if heap.ty() != QueryType::Timestamp {
            return reject(CommandError::InvalidResource(format!(
                "write_timestamp: heap '{}' is not a timestamp heap",
                heap.label()
            )));
        }
        self.native()?.write_timestamp(heap.native_handle(), index);
        Ok(())
    }

    /// Writes the results of `queries` into `destination` at a 256-byte aligned offset.
    pub fn resolve_query_heap(
        &mut self,
        heap: &QueryHeap,
        queries: Range<u32>,
        destination: &Buffer,
        destination_offset: u64,
    ) -> Result<(), CommandError> {
        self.require_outside_render_pass("resolve_query_heap")?;
        if queries.is_empty() || queries.end > heap.count() {
            return reject(CommandError::InvalidResource(format!(
                "resolve_query_heap: range {queries:?} invalid for heap '{}' of {}",
                heap.label(),
                heap.count()
            )));
        }
        self.check_query(heap, queries.start, "resolve_query_heap")?;
        if destination_offset % QUERY_RESOLVE_ALIGNMENT != 0 {
            return reject(CommandError::InvalidResource(format!(
                "resolve_query_heap: offset must be a multiple of {QUERY_RESOLVE_ALIGNMENT}"
            )));
        }
        let size = u64::from(queries.end - queries.start) * heap.ty().result_size();
        check_buffer(
            destination,
            BufferUsage::QUERY_RESOLVE,
            destination_offset,
            size,
            "resolve_query_heap",
        )?;
        self.native()?.resolve_query_heap(
            heap.native_handle(),
            queries,
            destination.native_handle(),
            destination_offset,
        );
        Ok(())
    }

    // --- Presentation and submission ---

    /// Requests presentation of the swap chain's acquired backbuffer.
    ///
    /// The native present is deferred until the device finishes the frame, after this
    /// recorder's commands are submitted. A swap chain can be presented once per frame.
    pub fn present(&mut self, swap_chain: &SwapChain) -> Result<(), CommandError> {
        self.require_queue(&[QueueType::Graphics], "present")?;
        self.require_outside_render_pass("present")?;
        if swap_chain.is_destroyed() {
            return reject(CommandError::InvalidResource(format!(
                "swap chain '{}' was destroyed",
                swap_chain.label()
            )));
        }
        if let Err(e) = swap_chain.queue_present() {
            return reject(e);
        }
        self.presents.push(swap_chain.clone());
        Ok(())
    }

    fn close_open_scopes(&mut self) {
        let Some(pooled) = self.pooled.as_mut() else {
            return;
        };
        if self.state == RecorderState::InRenderPass {
            log::warn!("CommandRecorder: render pass left open, closing it");
            pooled.encoder.end_render_pass();
            self.state = RecorderState::Recording;
        }
        if self.debug_group_depth > 0 {
            log::warn!(
                "CommandRecorder: {} debug groups left open, closing them",
                self.debug_group_depth
            );
        }
        for _ in 0..self.debug_group_depth {
            pooled.encoder.pop_debug_group();
        }
        self.debug_group_depth = 0;
        if self.label_group {
            pooled.encoder.pop_debug_group();
            self.label_group = false;
        }
    }

    /// Ends recording and hands the commands to the queue for the next
    /// [`GraphicsDevice::finish_frame`](crate::renderer::GraphicsDevice::finish_frame).
    ///
    /// An open render pass and open debug groups are closed first.
    pub fn flush(mut self) -> Result<(), CommandError> {
        self.close_open_scopes();

        let Some(device) = self.device.upgrade() else {
            return Err(CommandError::DeviceDropped);
        };
        let Some(mut pooled) = self.pooled.take() else {
            return Err(CommandError::DeviceDropped);
        };

        let batch = pooled.encoder.finish();
        let presents = std::mem::take(&mut self.presents);
        device
            .queue(self.queue_type)
            .borrow_mut()
            .commit(pooled, batch, presents);
        Ok(())
    }
}

fn check_attachment(texture: &Texture) -> Result<(), CommandError> {
    if texture.is_destroyed() {
        return reject(CommandError::InvalidResource(format!(
            "render pass attachment '{}' was destroyed",
            texture.label()
        )));
    }
    if !texture.usage().contains(TextureUsage::RENDER_TARGET) {
        return reject(CommandError::InvalidResource(format!(
            "texture '{}' is not a render target",
            texture.label()
        )));
    }
    Ok(())
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if self.pooled.is_none() {
            return;
        }
        log::warn!("CommandRecorder: dropped without flush, discarding its commands");
        self.close_open_scopes();
        for swap_chain in self.presents.drain(..) {
            swap_chain.abandon_present();
        }
        if let Some(mut pooled) = self.pooled.take() {
            drop(pooled.encoder.finish());
            if let Some(device) = self.device.upgrade() {
                device.queue(self.queue_type).borrow_mut().recycle(pooled);
            }
        }
    }
}

impl std::fmt::Debug for CommandRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRecorder")
            .field("queue", &self.queue_type)
            .field("frame_index", &self.frame_index)
            .field("state", &self.state)
            .field("debug_group_depth", &self.debug_group_depth)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
