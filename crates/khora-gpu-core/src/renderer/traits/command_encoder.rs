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

//! Defines the native command recording contract implemented by each backend.

use std::any::Any;
use std::fmt;
use std::ops::Range;

use crate::renderer::api::{
    BindGroupLayoutEntry, IndexFormat, NativeHandle, PipelineKind, RenderPassDescriptor,
    ScissorRect, ShaderStageFlags, TextureDataLayout, TextureRegion, Viewport,
};

/// A finished, backend-native command list waiting for submission.
///
/// The payload is opaque to the core; only the backend that produced it knows how to
/// downcast and submit it.
pub struct NativeCommandBatch {
    payload: Box<dyn Any>,
    command_count: usize,
}

impl NativeCommandBatch {
    /// Wraps a backend payload.
    ///
    /// ## Arguments
    /// * `payload` - The native command list.
    /// * `command_count` - Number of commands recorded, used for statistics only.
    pub fn new<T: Any>(payload: T, command_count: usize) -> Self {
        Self {
            payload: Box::new(payload),
            command_count,
        }
    }

    /// Number of commands recorded into this batch.
    pub fn command_count(&self) -> usize {
        self.command_count
    }

    /// Extracts the payload if it has type `T`, returning the batch otherwise.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let command_count = self.command_count;
        match self.payload.downcast::<T>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Self {
                payload,
                command_count,
            }),
        }
    }
}

impl fmt::Debug for NativeCommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCommandBatch")
            .field("command_count", &self.command_count)
            .finish_non_exhaustive()
    }
}

/// A backend-native command recorder.
///
/// Encoders are owned by the queue's recorder pool and reused every frame: `begin`
/// starts a new command list, `finish` hands it out. The core validates every call
/// before forwarding it, so implementations may assume a well-formed sequence
/// (balanced passes and debug groups, a pipeline of the right kind bound before
/// draws and dispatches).
pub trait CommandEncoder {
    /// Starts a new command list for the given frame slot.
    fn begin(&mut self, frame_index: u32);

    /// Opens a named debug group.
    fn push_debug_group(&mut self, label: &str);

    /// Closes the innermost debug group.
    fn pop_debug_group(&mut self);

    /// Inserts a single debug marker.
    fn insert_debug_marker(&mut self, label: &str);

    /// Opens a render pass.
    fn begin_render_pass(&mut self, descriptor: &RenderPassDescriptor<'_>);

    /// Closes the open render pass.
    fn end_render_pass(&mut self);

    /// Binds a pipeline of the given kind.
    fn set_pipeline(&mut self, kind: PipelineKind, pipeline: NativeHandle);

    /// Binds a bind group to the pipeline kind currently in use.
    ///
    /// `layout_entries` are the entries of the group's layout, for backends that bind
    /// slot by slot.
    fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: NativeHandle,
        layout_entries: &[BindGroupLayoutEntry],
        dynamic_offsets: &[u32],
    );

    /// Uploads push-constant bytes.
    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]);

    /// Binds a vertex buffer slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: NativeHandle, offset: u64);

    /// Binds the index buffer.
    fn set_index_buffer(&mut self, buffer: NativeHandle, offset: u64, format: IndexFormat);

    /// Sets the viewport.
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Sets the scissor rectangle.
    fn set_scissor_rect(&mut self, rect: &ScissorRect);

    /// Sets the stencil reference value.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Sets the blend constant.
    fn set_blend_constant(&mut self, color: [f64; 4]);

    /// Draws non-indexed primitives.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draws indexed primitives.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Draws with arguments read from a buffer.
    fn draw_indirect(&mut self, buffer: NativeHandle, offset: u64);

    /// Draws indexed primitives with arguments read from a buffer.
    fn draw_indexed_indirect(&mut self, buffer: NativeHandle, offset: u64);

    /// Dispatches compute workgroups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Dispatches compute workgroups with counts read from a buffer.
    fn dispatch_indirect(&mut self, buffer: NativeHandle, offset: u64);

    /// Copies bytes between buffers.
    fn copy_buffer_to_buffer(
        &mut self,
        source: NativeHandle,
        source_offset: u64,
        destination: NativeHandle,
        destination_offset: u64,
        size: u64,
    );

    /// Copies texel data from a buffer into a texture region.
    fn copy_buffer_to_texture(
        &mut self,
        source: NativeHandle,
        layout: &TextureDataLayout,
        destination: NativeHandle,
        region: &TextureRegion,
    );

    /// Starts an occlusion or pipeline-statistics query.
    fn begin_query(&mut self, heap: NativeHandle, index: u32);

    /// Ends a query started with [`CommandEncoder::begin_query`].
    fn end_query(&mut self, heap: NativeHandle, index: u32);

    /// Writes a GPU timestamp.
    fn write_timestamp(&mut self, heap: NativeHandle, index: u32);

    /// Writes query results into a buffer.
    fn resolve_query_heap(
        &mut self,
        heap: NativeHandle,
        queries: Range<u32>,
        destination: NativeHandle,
        destination_offset: u64,
    );

    /// Ends recording and returns the command list.
    fn finish(&mut self) -> NativeCommandBatch;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_downcast() {
        let batch = NativeCommandBatch::new(vec![1u32, 2, 3], 3);
        let batch = match batch.downcast::<String>() {
            Ok(_) => panic!("payload is not a String"),
            Err(batch) => batch,
        };
        assert_eq!(batch.command_count(), 3);
        assert_eq!(batch.downcast::<Vec<u32>>().ok(), Some(vec![1, 2, 3]));
    }
}
