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

//! Command recording for the software device.

use std::ops::Range;

use khora_gpu_core::renderer::api::{
    BindGroupLayoutEntry, Color, IndexFormat, LoadAction, NativeHandle, PipelineKind, QueueType,
    RenderPassDescriptor, ScissorRect, ShaderStageFlags, TextureDataLayout, TextureRegion,
    Viewport,
};
use khora_gpu_core::renderer::traits::{CommandEncoder, NativeCommandBatch};

/// One recorded command, replayed by the device at submission.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum SoftwareCommand {
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
    BeginRenderPass {
        color: Vec<(NativeHandle, LoadAction<Color>)>,
        depth: Option<(NativeHandle, LoadAction<f32>, LoadAction<u32>)>,
        occlusion_heap: Option<NativeHandle>,
    },
    EndRenderPass,
    SetPipeline(PipelineKind, NativeHandle),
    SetBindGroup {
        index: u32,
        bind_group: NativeHandle,
        dynamic_offsets: Vec<u32>,
    },
    SetPushConstants {
        stages: ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: NativeHandle,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: NativeHandle,
        offset: u64,
        format: IndexFormat,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetStencilReference(u32),
    SetBlendConstant([f64; 4]),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawIndirect {
        buffer: NativeHandle,
        offset: u64,
        indexed: bool,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: NativeHandle,
        offset: u64,
    },
    CopyBufferToBuffer {
        source: NativeHandle,
        source_offset: u64,
        destination: NativeHandle,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: NativeHandle,
        layout: TextureDataLayout,
        destination: NativeHandle,
        region: TextureRegion,
    },
    BeginQuery {
        heap: NativeHandle,
        index: u32,
    },
    EndQuery {
        heap: NativeHandle,
        index: u32,
    },
    WriteTimestamp {
        heap: NativeHandle,
        index: u32,
    },
    ResolveQueryHeap {
        heap: NativeHandle,
        queries: Range<u32>,
        destination: NativeHandle,
        destination_offset: u64,
    },
}

/// The payload of a [`NativeCommandBatch`] produced by [`SoftwareCommandEncoder`].
#[derive(Debug, Clone)]
pub struct SoftwareCommandList {
    /// Queue the list was recorded for.
    pub queue: QueueType,
    /// Frame slot the list was recorded in.
    pub frame_index: u32,
    /// Commands in recording order.
    pub commands: Vec<SoftwareCommand>,
}

/// Records [`SoftwareCommand`]s into a list. Nothing executes until the list is
/// submitted, mimicking a deferred context on an immediate-mode API.
#[derive(Debug)]
pub struct SoftwareCommandEncoder {
    queue: QueueType,
    frame_index: u32,
    commands: Vec<SoftwareCommand>,
}

impl SoftwareCommandEncoder {
    pub(crate) fn new(queue: QueueType) -> Self {
        Self {
            queue,
            frame_index: 0,
            commands: Vec::new(),
        }
    }

    fn record(&mut self, command: SoftwareCommand) {
        log::trace!("SoftwareCommandEncoder({:?}): {command:?}", self.queue);
        self.commands.push(command);
    }
}

impl CommandEncoder for SoftwareCommandEncoder {
    fn begin(&mut self, frame_index: u32) {
        self.frame_index = frame_index;
        self.commands.clear();
    }

    fn push_debug_group(&mut self, label: &str) {
        self.record(SoftwareCommand::PushDebugGroup(label.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.record(SoftwareCommand::PopDebugGroup);
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.record(SoftwareCommand::InsertDebugMarker(label.to_owned()));
    }

    fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor<'_>) {
        let color = descriptor
            .color_attachments
            .iter()
            .map(|attachment| (attachment.texture.native_handle(), attachment.load))
            .collect();
        let depth = descriptor.depth_stencil_attachment.as_ref().map(|depth| {
            (
                depth.texture.native_handle(),
                depth.depth_load,
                depth.stencil_load,
            )
        });
        self.record(SoftwareCommand::BeginRenderPass {
            color,
            depth,
            occlusion_heap: descriptor.occlusion_query_heap.map(|heap| heap.native_handle()),
        });
    }

    fn end_render_pass(&mut self) {
        self.record(SoftwareCommand::EndRenderPass);
    }

    fn set_pipeline(&mut self, kind: PipelineKind, pipeline: NativeHandle) {
        self.record(SoftwareCommand::SetPipeline(kind, pipeline));
    }

    fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: NativeHandle,
        _layout_entries: &[BindGroupLayoutEntry],
        dynamic_offsets: &[u32],
    ) {
        self.record(SoftwareCommand::SetBindGroup {
            index,
            bind_group,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.record(SoftwareCommand::SetPushConstants {
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: NativeHandle, offset: u64) {
        self.record(SoftwareCommand::SetVertexBuffer {
            slot,
            buffer,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: NativeHandle, offset: u64, format: IndexFormat) {
        self.record(SoftwareCommand::SetIndexBuffer {
            buffer,
            offset,
            format,
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(SoftwareCommand::SetViewport(*viewport));
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.record(SoftwareCommand::SetScissorRect(*rect));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.record(SoftwareCommand::SetStencilReference(reference));
    }

    fn set_blend_constant(&mut self, color: [f64; 4]) {
        self.record(SoftwareCommand::SetBlendConstant(color));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(SoftwareCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(SoftwareCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.record(SoftwareCommand::DrawIndirect {
            buffer,
            offset,
            indexed: false,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.record(SoftwareCommand::DrawIndirect {
            buffer,
            offset,
            indexed: true,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(SoftwareCommand::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&mut self, buffer: NativeHandle, offset: u64) {
        self.record(SoftwareCommand::DispatchIndirect { buffer, offset });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: NativeHandle,
        source_offset: u64,
        destination: NativeHandle,
        destination_offset: u64,
        size: u64,
    ) {
        self.record(SoftwareCommand::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: NativeHandle,
        layout: &TextureDataLayout,
        destination: NativeHandle,
        region: &TextureRegion,
    ) {
        self.record(SoftwareCommand::CopyBufferToTexture {
            source,
            layout: *layout,
            destination,
            region: *region,
        });
    }

    fn begin_query(&mut self, heap: NativeHandle, index: u32) {
        self.record(SoftwareCommand::BeginQuery { heap, index });
    }

    fn end_query(&mut self, heap: NativeHandle, index: u32) {
        self.record(SoftwareCommand::EndQuery { heap, index });
    }

    fn write_timestamp(&mut self, heap: NativeHandle, index: u32) {
        self.record(SoftwareCommand::WriteTimestamp { heap, index });
    }

    fn resolve_query_heap(
        &mut self,
        heap: NativeHandle,
        queries: Range<u32>,
        destination: NativeHandle,
        destination_offset: u64,
    ) {
        self.record(SoftwareCommand::ResolveQueryHeap {
            heap,
            queries,
            destination,
            destination_offset,
        });
    }

    fn finish(&mut self) -> NativeCommandBatch {
        let commands = std::mem::take(&mut self.commands);
        let count = commands.len();
        NativeCommandBatch::new(
            SoftwareCommandList {
                queue: self.queue,
                frame_index: self.frame_index,
                commands,
            },
            count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_hands_out_the_recorded_list() {
        let mut encoder = SoftwareCommandEncoder::new(QueueType::Compute);
        encoder.begin(1);
        encoder.push_debug_group("work");
        encoder.dispatch(4, 2, 1);
        encoder.pop_debug_group();

        let batch = encoder.finish();
        assert_eq!(batch.command_count(), 3);
        let list = batch.downcast::<SoftwareCommandList>().unwrap();
        assert_eq!(list.queue, QueueType::Compute);
        assert_eq!(list.frame_index, 1);
        assert_eq!(list.commands[1], SoftwareCommand::Dispatch { x: 4, y: 2, z: 1 });
    }

    #[test]
    fn test_begin_discards_previous_commands() {
        let mut encoder = SoftwareCommandEncoder::new(QueueType::Graphics);
        encoder.begin(0);
        encoder.insert_debug_marker("stale");
        encoder.begin(1);
        assert_eq!(encoder.finish().command_count(), 0);
    }
}
