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

//! Command recording into native wgpu encoders.
//!
//! The core records in a flat stream while wgpu scopes commands into passes. Render
//! passes map one to one; compute passes are opened lazily on the first dispatch and
//! closed by any encoder-level command, with the compute bindings replayed on reopen.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use std::rc::Rc;

use khora_gpu_core::renderer::api::{
    BindGroupLayoutEntry, Color, IndexFormat, NativeHandle, PipelineKind, QueryType, QueueType,
    RenderPassDescriptor, ScissorRect, ShaderStageFlags, TextureDataLayout, TextureRegion,
    Viewport,
};
use khora_gpu_core::renderer::traits::{CommandEncoder, NativeCommandBatch};

use super::conversions::{operations, IntoWgpu};
use super::objects::WgpuObjects;

/// A finished wgpu command buffer and the queue it was recorded for.
#[derive(Debug)]
pub struct WgpuCommandList {
    pub(crate) queue: QueueType,
    pub(crate) buffer: wgpu::CommandBuffer,
}

/// Bindings of the compute pipeline, kept across compute pass boundaries.
#[derive(Debug, Default)]
struct ComputeState {
    pipeline: Option<NativeHandle>,
    bind_groups: BTreeMap<u32, (NativeHandle, Vec<u32>)>,
    push_constants: Vec<(u32, Vec<u8>)>,
}

/// Where a debug group was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DebugScope {
    Encoder(String),
    RenderPass(String),
}

/// A [`CommandEncoder`] recording into a `wgpu::CommandEncoder`.
pub struct WgpuCommandEncoder {
    queue: QueueType,
    device: wgpu::Device,
    objects: Rc<RefCell<WgpuObjects>>,
    features: wgpu::Features,
    // Passes are declared before the encoder they were begun on.
    render_pass: Option<wgpu::RenderPass<'static>>,
    compute_pass: Option<wgpu::ComputePass<'static>>,
    encoder: Option<wgpu::CommandEncoder>,
    compute: ComputeState,
    debug_scopes: Vec<DebugScope>,
    /// Encoder groups closed while a render pass was open, popped when it ends.
    deferred_pops: u32,
    command_count: usize,
    frame_index: u32,
}

impl WgpuCommandEncoder {
    pub(crate) fn new(
        queue: QueueType,
        device: wgpu::Device,
        objects: Rc<RefCell<WgpuObjects>>,
        features: wgpu::Features,
    ) -> Self {
        Self {
            queue,
            device,
            objects,
            features,
            render_pass: None,
            compute_pass: None,
            encoder: None,
            compute: ComputeState::default(),
            debug_scopes: Vec::new(),
            deferred_pops: 0,
            command_count: 0,
            frame_index: 0,
        }
    }

    /// Looks an object up, logging when the handle is stale or of another kind.
    fn lookup<T>(
        &self,
        what: &str,
        handle: NativeHandle,
        get: impl FnOnce(&WgpuObjects) -> Option<T>,
    ) -> Option<T> {
        let found = get(&self.objects.borrow());
        if found.is_none() {
            log::error!("WgpuCommandEncoder: {what} {handle} not found");
        }
        found
    }

    fn buffer(&self, handle: NativeHandle) -> Option<wgpu::Buffer> {
        self.lookup("buffer", handle, |objects| {
            objects.buffer(handle).map(|entry| entry.buffer.clone())
        })
    }

    fn query_set(&self, handle: NativeHandle) -> Option<(wgpu::QuerySet, QueryType)> {
        self.lookup("query heap", handle, |objects| {
            objects.query_set(handle).map(|(set, ty)| (set.clone(), ty))
        })
    }

    fn attachment_view(&self, handle: NativeHandle) -> Option<wgpu::TextureView> {
        self.lookup("attachment", handle, |objects| {
            objects
                .texture(handle)
                .and_then(|entry| entry.attachment_view.clone())
        })
    }

    fn native_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Khora Command List"),
            })
        })
    }

    /// Closes the compute pass and returns the encoder for encoder-level commands.
    ///
    /// Returns `None` while a render pass is open.
    fn encoder_level(&mut self, operation: &str) -> Option<&mut wgpu::CommandEncoder> {
        if self.render_pass.is_some() {
            log::error!("WgpuCommandEncoder: {operation} recorded inside a render pass");
            return None;
        }
        self.compute_pass = None;
        Some(self.native_encoder())
    }

    fn active_render_pass(&mut self, operation: &str) -> Option<&mut wgpu::RenderPass<'static>> {
        if self.render_pass.is_none() {
            log::error!("WgpuCommandEncoder: {operation} recorded outside a render pass");
        }
        self.render_pass.as_mut()
    }

    /// Opens the compute pass if needed and replays the compute bindings into it.
    fn open_compute_pass(&mut self) -> Option<&mut wgpu::ComputePass<'static>> {
        if self.render_pass.is_some() {
            log::error!("WgpuCommandEncoder: dispatch recorded inside a render pass");
            return None;
        }
        if self.compute_pass.is_none() {
            let Some(handle) = self.compute.pipeline else {
                log::error!("WgpuCommandEncoder: dispatch without a compute pipeline");
                return None;
            };
            let pipeline = self.lookup("compute pipeline", handle, |objects| {
                objects.compute_pipeline(handle).cloned()
            })?;
            let groups: Vec<(u32, wgpu::BindGroup, Vec<u32>)> = self
                .compute
                .bind_groups
                .iter()
                .filter_map(|(&index, (group, offsets))| {
                    let group = self.lookup("bind group", *group, |objects| {
                        objects.bind_group(*group).cloned()
                    })?;
                    Some((index, group, offsets.clone()))
                })
                .collect();

            let mut pass = self
                .native_encoder()
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: None,
                    timestamp_writes: None,
                })
                .forget_lifetime();
            pass.set_pipeline(&pipeline);
            for (index, group, offsets) in &groups {
                pass.set_bind_group(*index, group, offsets);
            }
            for (offset, data) in &self.compute.push_constants {
                pass.set_push_constants(*offset, data);
            }
            self.compute_pass = Some(pass);
        }
        self.compute_pass.as_mut()
    }

    fn close_render_pass(&mut self) {
        let Some(mut pass) = self.render_pass.take() else {
            return;
        };
        // Groups still open in the pass are closed with it and reopened on the encoder.
        let mut reopened = Vec::new();
        for scope in self.debug_scopes.iter_mut().rev() {
            let DebugScope::RenderPass(label) = scope else {
                break;
            };
            let label = label.clone();
            pass.pop_debug_group();
            *scope = DebugScope::Encoder(label.clone());
            reopened.push(label);
        }
        drop(pass);

        let pops = std::mem::take(&mut self.deferred_pops);
        let encoder = self.native_encoder();
        for _ in 0..pops {
            encoder.pop_debug_group();
        }
        for label in reopened.iter().rev() {
            encoder.push_debug_group(label);
        }
    }
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin(&mut self, frame_index: u32) {
        self.render_pass = None;
        self.compute_pass = None;
        self.encoder = None;
        self.compute = ComputeState::default();
        self.debug_scopes.clear();
        self.deferred_pops = 0;
        self.command_count = 0;
        self.frame_index = frame_index;
        self.native_encoder();
    }

    fn push_debug_group(&mut self, label: &str) {
        self.command_count += 1;
        if let Some(pass) = self.render_pass.as_mut() {
            pass.push_debug_group(label);
            self.debug_scopes.push(DebugScope::RenderPass(label.to_owned()));
        } else if let Some(encoder) = self.encoder_level("debug group") {
            encoder.push_debug_group(label);
            self.debug_scopes.push(DebugScope::Encoder(label.to_owned()));
        }
    }

    fn pop_debug_group(&mut self) {
        self.command_count += 1;
        match self.debug_scopes.pop() {
            Some(DebugScope::RenderPass(_)) => {
                if let Some(pass) = self.render_pass.as_mut() {
                    pass.pop_debug_group();
                }
            }
            Some(DebugScope::Encoder(_)) if self.render_pass.is_some() => {
                self.deferred_pops += 1;
            }
            Some(DebugScope::Encoder(_)) => {
                if let Some(encoder) = self.encoder_level("debug group") {
                    encoder.pop_debug_group();
                }
            }
            None => log::error!("WgpuCommandEncoder: debug group popped with none open"),
        }
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.command_count += 1;
        if let Some(pass) = self.render_pass.as_mut() {
            pass.insert_debug_marker(label);
        } else if let Some(encoder) = self.encoder_level("debug marker") {
            encoder.insert_debug_marker(label);
        }
    }

    fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor<'_>) {
        self.command_count += 1;
        if self.render_pass.is_some() {
            log::error!("WgpuCommandEncoder: render pass begun inside another one");
            self.close_render_pass();
        }
        self.compute_pass = None;

        // --- 1. Resolve attachments ---
        let mut color_views = Vec::with_capacity(descriptor.color_attachments.len());
        for attachment in descriptor.color_attachments {
            let Some(view) = self.attachment_view(attachment.texture.native_handle()) else {
                return;
            };
            let resolve = match attachment.resolve_target {
                Some(target) => Some(self.attachment_view(target.native_handle())),
                None => None,
            };
            color_views.push((view, resolve.flatten()));
        }
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = descriptor
            .color_attachments
            .iter()
            .zip(&color_views)
            .map(|(attachment, (view, resolve))| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: resolve.as_ref(),
                    ops: operations(attachment.load, attachment.store, |color: Color| {
                        color.into_wgpu()
                    }),
                })
            })
            .collect();

        let depth = match &descriptor.depth_stencil_attachment {
            Some(attachment) => {
                let handle = attachment.texture.native_handle();
                let Some(view) = self.attachment_view(handle) else {
                    return;
                };
                Some((attachment, view, attachment.texture.format()))
            }
            None => None,
        };
        let depth_stencil_attachment =
            depth
                .as_ref()
                .map(|(attachment, view, format)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: format.has_depth().then(|| {
                        operations(attachment.depth_load, attachment.depth_store, |d| d)
                    }),
                    stencil_ops: format.has_stencil().then(|| {
                        operations(attachment.stencil_load, attachment.stencil_store, |s| s)
                    }),
                });

        let occlusion_query_set = match descriptor.occlusion_query_heap {
            Some(heap) => self.query_set(heap.native_handle()).map(|(set, _)| set),
            None => None,
        };

        // --- 2. Begin the pass ---
        let label = descriptor.label.as_deref();
        let pass = self
            .native_encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label,
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: occlusion_query_set.as_ref(),
            })
            .forget_lifetime();
        self.render_pass = Some(pass);
    }

    fn end_render_pass(&mut self) {
        self.command_count += 1;
        if self.render_pass.is_none() {
            log::error!("WgpuCommandEncoder: end_render_pass without an open pass");
        }
        self.close_render_pass();
    }

    fn set_pipeline(&mut self, kind: PipelineKind, pipeline: NativeHandle) {
        self.command_count += 1;
        match kind {
            PipelineKind::Render => {
                let Some(native) = self.lookup("render pipeline", pipeline, |objects| {
                    objects.render_pipeline(pipeline).cloned()
                }) else {
                    return;
                };
                if let Some(pass) = self.active_render_pass("set_pipeline") {
                    pass.set_pipeline(&native);
                }
            }
            PipelineKind::Compute => {
                self.compute.pipeline = Some(pipeline);
                // The next dispatch reopens the pass with the new pipeline.
                self.compute_pass = None;
            }
        }
    }

    fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: NativeHandle,
        _layout_entries: &[BindGroupLayoutEntry],
        dynamic_offsets: &[u32],
    ) {
        self.command_count += 1;
        if self.render_pass.is_some() {
            let Some(group) = self.lookup("bind group", bind_group, |objects| {
                objects.bind_group(bind_group).cloned()
            }) else {
                return;
            };
            if let Some(pass) = self.render_pass.as_mut() {
                pass.set_bind_group(index, &group, dynamic_offsets);
            }
        } else {
            self.compute
                .bind_groups
                .insert(index, (bind_group, dynamic_offsets.to_vec()));
            self.compute_pass = None;
        }
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.command_count += 1;
        if let Some(pass) = self.render_pass.as_mut() {
            pass.set_push_constants(stages.into_wgpu(), offset, data);
            return;
        }
        self.compute.push_constants.retain(|(start, _)| *start != offset);
        self.compute.push_constants.push((offset, data.to_vec()));
        if let Some(pass) = self.compute_pass.as_mut() {
            pass.set_push_constants(offset, data);
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: NativeHandle, offset: u64) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        if let Some(pass) = self.active_render_pass("set_vertex_buffer") {
            pass.set_vertex_buffer(slot, buffer.slice(offset..));
        }
    }

    fn set_index_buffer(&mut self, buffer: NativeHandle, offset: u64, format: IndexFormat) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        if let Some(pass) = self.active_render_pass("set_index_buffer") {
            pass.set_index_buffer(buffer.slice(offset..), format.into_wgpu());
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("set_viewport") {
            pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                viewport.min_depth,
                viewport.max_depth,
            );
        }
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("set_scissor_rect") {
            pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
        }
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("set_stencil_reference") {
            pass.set_stencil_reference(reference);
        }
    }

    fn set_blend_constant(&mut self, color: [f64; 4]) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("set_blend_constant") {
            pass.set_blend_constant(wgpu::Color {
                r: color[0],
                g: color[1],
                b: color[2],
                a: color[3],
            });
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("draw") {
            pass.draw(vertices, instances);
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.command_count += 1;
        if let Some(pass) = self.active_render_pass("draw_indexed") {
            pass.draw_indexed(indices, base_vertex, instances);
        }
    }

    fn draw_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        if let Some(pass) = self.active_render_pass("draw_indirect") {
            pass.draw_indirect(&buffer, offset);
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        if let Some(pass) = self.active_render_pass("draw_indexed_indirect") {
            pass.draw_indexed_indirect(&buffer, offset);
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.command_count += 1;
        if let Some(pass) = self.open_compute_pass() {
            pass.dispatch_workgroups(x, y, z);
        }
    }

    fn dispatch_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        if let Some(pass) = self.open_compute_pass() {
            pass.dispatch_workgroups_indirect(&buffer, offset);
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
        self.command_count += 1;
        let (Some(source), Some(destination)) = (self.buffer(source), self.buffer(destination))
        else {
            return;
        };
        if let Some(encoder) = self.encoder_level("copy_buffer_to_buffer") {
            encoder.copy_buffer_to_buffer(
                &source,
                source_offset,
                &destination,
                destination_offset,
                size,
            );
        }
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: NativeHandle,
        layout: &TextureDataLayout,
        destination: NativeHandle,
        region: &TextureRegion,
    ) {
        self.command_count += 1;
        let Some(buffer) = self.buffer(source) else {
            return;
        };
        let Some((texture, format)) = self.lookup("texture", destination, |objects| {
            objects
                .texture(destination)
                .map(|entry| (entry.texture.clone(), entry.format))
        }) else {
            return;
        };
        let Some(encoder) = self.encoder_level("copy_buffer_to_texture") else {
            return;
        };

        let info = format.info();
        let block_rows = region.extent[1].div_ceil(info.block_height).max(1);
        let rows_per_image = match layout.rows_per_image {
            0 => block_rows,
            rows => rows,
        };
        let aspect = if format.has_depth() && format.has_stencil() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let target = |y: u32, z: u32| wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: region.mip_level,
            origin: wgpu::Origin3d {
                x: region.origin[0],
                y: region.origin[1] + y,
                z: region.origin[2] + z,
            },
            aspect,
        };

        if layout.bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT == 0 {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: layout.offset,
                        bytes_per_row: Some(layout.bytes_per_row),
                        rows_per_image: Some(rows_per_image),
                    },
                },
                target(0, 0),
                wgpu::Extent3d {
                    width: region.extent[0],
                    height: region.extent[1],
                    depth_or_array_layers: region.extent[2],
                },
            );
            return;
        }

        // Encoder copies need 256-byte row pitches; tightly packed data goes row by row.
        let row_pitch = layout.bytes_per_row as u64;
        let image_pitch = row_pitch * rows_per_image as u64;
        for z in 0..region.extent[2] {
            for row in 0..block_rows {
                let y = row * info.block_height;
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: &buffer,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: layout.offset + z as u64 * image_pitch + row as u64 * row_pitch,
                            bytes_per_row: None,
                            rows_per_image: None,
                        },
                    },
                    target(y, z),
                    wgpu::Extent3d {
                        width: region.extent[0],
                        height: info.block_height.min(region.extent[1] - y),
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
    }

    fn begin_query(&mut self, heap: NativeHandle, index: u32) {
        self.command_count += 1;
        let Some((set, ty)) = self.query_set(heap) else {
            return;
        };
        let Some(pass) = self.render_pass.as_mut() else {
            log::warn!("WgpuCommandEncoder: {ty:?} query {index} outside a render pass skipped");
            return;
        };
        match ty {
            QueryType::Occlusion | QueryType::BinaryOcclusion => {
                pass.begin_occlusion_query(index)
            }
            QueryType::PipelineStatistics => pass.begin_pipeline_statistics_query(&set, index),
            QueryType::Timestamp => {
                log::error!("WgpuCommandEncoder: timestamp queries are written, not begun")
            }
        }
    }

    fn end_query(&mut self, heap: NativeHandle, _index: u32) {
        self.command_count += 1;
        let Some((_, ty)) = self.query_set(heap) else {
            return;
        };
        let Some(pass) = self.render_pass.as_mut() else {
            return;
        };
        match ty {
            QueryType::Occlusion | QueryType::BinaryOcclusion => pass.end_occlusion_query(),
            QueryType::PipelineStatistics => pass.end_pipeline_statistics_query(),
            QueryType::Timestamp => {}
        }
    }

    fn write_timestamp(&mut self, heap: NativeHandle, index: u32) {
        self.command_count += 1;
        let Some((set, _)) = self.query_set(heap) else {
            return;
        };
        if let Some(pass) = self.render_pass.as_mut() {
            if self
                .features
                .contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_PASSES)
            {
                pass.write_timestamp(&set, index);
            } else {
                log::warn!("WgpuCommandEncoder: timestamp inside a render pass unsupported, skipped");
            }
        } else if let Some(encoder) = self.encoder_level("write_timestamp") {
            encoder.write_timestamp(&set, index);
        }
    }

    fn resolve_query_heap(
        &mut self,
        heap: NativeHandle,
        queries: Range<u32>,
        destination: NativeHandle,
        destination_offset: u64,
    ) {
        self.command_count += 1;
        let (Some((set, _)), Some(buffer)) = (self.query_set(heap), self.buffer(destination))
        else {
            return;
        };
        if destination_offset % wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT != 0 {
            log::warn!(
                "WgpuCommandEncoder: resolve offset {destination_offset} is not {}-byte aligned",
                wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT
            );
        }
        if let Some(encoder) = self.encoder_level("resolve_query_heap") {
            encoder.resolve_query_set(&set, queries, &buffer, destination_offset);
        }
    }

    fn finish(&mut self) -> NativeCommandBatch {
        if self.render_pass.is_some() {
            log::error!("WgpuCommandEncoder: command list finished inside a render pass");
            self.close_render_pass();
        }
        self.compute_pass = None;
        let mut encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor::default()),
        };
        let open = std::mem::take(&mut self.debug_scopes);
        if !open.is_empty() {
            log::warn!("WgpuCommandEncoder: closing {} unbalanced debug groups", open.len());
        }
        for _ in &open {
            encoder.pop_debug_group();
        }
        let buffer = encoder.finish();
        log::trace!(
            "WgpuCommandEncoder: finished {} commands for {:?} (frame slot {})",
            self.command_count,
            self.queue,
            self.frame_index
        );
        let count = std::mem::take(&mut self.command_count);
        NativeCommandBatch::new(
            WgpuCommandList {
                queue: self.queue,
                buffer,
            },
            count,
        )
    }
}
