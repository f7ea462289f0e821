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

//! The table of native wgpu objects shared by the device and its encoders.

use std::collections::HashMap;

use khora_gpu_core::renderer::api::{
    CpuAccessMode, KhoraWindowHandle, NativeHandle, PixelFormat, QueryType, ResourceKind,
};

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) cpu_access: CpuAccessMode,
    /// Size requested by the core; the native buffer may be padded past it.
    pub(crate) size: u64,
    /// Host copy of upload buffers; partial writes are widened to 4-byte granularity
    /// from it.
    pub(crate) shadow: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct TextureEntry {
    pub(crate) texture: wgpu::Texture,
    pub(crate) format: PixelFormat,
    /// View used for bindings.
    pub(crate) view: wgpu::TextureView,
    /// Mip 0, layer 0 view used for attachments.
    pub(crate) attachment_view: Option<wgpu::TextureView>,
}

/// The presentation target behind a swap chain handle.
pub(crate) enum SwapChainTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        // Must outlive the surface.
        _window: KhoraWindowHandle,
        /// Zero-sized; nothing can be acquired until the next resize.
        suspended: bool,
        frame: Option<(wgpu::SurfaceTexture, NativeHandle)>,
    },
    /// Backbuffers rendered to without a window.
    Offscreen {
        format: PixelFormat,
        count: u32,
        buffers: Vec<NativeHandle>,
        next: usize,
        acquired: Option<usize>,
    },
}

impl SwapChainTarget {
    pub(crate) fn has_acquired(&self) -> bool {
        match self {
            SwapChainTarget::Surface { frame, .. } => frame.is_some(),
            SwapChainTarget::Offscreen { acquired, .. } => acquired.is_some(),
        }
    }
}

pub(crate) enum WgpuObject {
    Buffer(BufferEntry),
    Texture(TextureEntry),
    Sampler(wgpu::Sampler),
    BindGroupLayout(wgpu::BindGroupLayout),
    BindGroup(wgpu::BindGroup),
    PipelineLayout(wgpu::PipelineLayout),
    RenderPipeline(wgpu::RenderPipeline),
    ComputePipeline(wgpu::ComputePipeline),
    QuerySet { set: wgpu::QuerySet, ty: QueryType },
}

impl WgpuObject {
    pub(crate) fn kind(&self) -> ResourceKind {
        match self {
            WgpuObject::Buffer(_) => ResourceKind::Buffer,
            WgpuObject::Texture(_) => ResourceKind::Texture,
            WgpuObject::Sampler(_) => ResourceKind::Sampler,
            WgpuObject::BindGroupLayout(_) => ResourceKind::BindGroupLayout,
            WgpuObject::BindGroup(_) => ResourceKind::BindGroup,
            WgpuObject::PipelineLayout(_) => ResourceKind::PipelineLayout,
            WgpuObject::RenderPipeline(_) => ResourceKind::RenderPipeline,
            WgpuObject::ComputePipeline(_) => ResourceKind::ComputePipeline,
            WgpuObject::QuerySet { .. } => ResourceKind::QueryHeap,
        }
    }
}

/// Native objects keyed by the handles given to the core.
#[derive(Default)]
pub(crate) struct WgpuObjects {
    entries: HashMap<NativeHandle, WgpuObject>,
    next_handle: u64,
}

impl WgpuObjects {
    /// Allocates a handle for an object stored outside the table.
    pub(crate) fn reserve(&mut self) -> NativeHandle {
        self.next_handle += 1;
        NativeHandle(self.next_handle)
    }

    pub(crate) fn insert(&mut self, object: WgpuObject) -> NativeHandle {
        let handle = self.reserve();
        self.entries.insert(handle, object);
        handle
    }

    pub(crate) fn remove(&mut self, handle: NativeHandle) -> Option<WgpuObject> {
        self.entries.remove(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn buffer_mut(&mut self, handle: NativeHandle) -> Option<&mut BufferEntry> {
        match self.entries.get_mut(&handle) {
            Some(WgpuObject::Buffer(entry)) => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn buffer(&self, handle: NativeHandle) -> Option<&BufferEntry> {
        match self.entries.get(&handle) {
            Some(WgpuObject::Buffer(entry)) => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn texture(&self, handle: NativeHandle) -> Option<&TextureEntry> {
        match self.entries.get(&handle) {
            Some(WgpuObject::Texture(entry)) => Some(entry),
            _ => None,
        }
    }

    pub(crate) fn sampler(&self, handle: NativeHandle) -> Option<&wgpu::Sampler> {
        match self.entries.get(&handle) {
            Some(WgpuObject::Sampler(sampler)) => Some(sampler),
            _ => None,
        }
    }

    pub(crate) fn bind_group_layout(&self, handle: NativeHandle) -> Option<&wgpu::BindGroupLayout> {
        match self.entries.get(&handle) {
            Some(WgpuObject::BindGroupLayout(layout)) => Some(layout),
            _ => None,
        }
    }

    pub(crate) fn bind_group(&self, handle: NativeHandle) -> Option<&wgpu::BindGroup> {
        match self.entries.get(&handle) {
            Some(WgpuObject::BindGroup(group)) => Some(group),
            _ => None,
        }
    }

    pub(crate) fn pipeline_layout(&self, handle: NativeHandle) -> Option<&wgpu::PipelineLayout> {
        match self.entries.get(&handle) {
            Some(WgpuObject::PipelineLayout(layout)) => Some(layout),
            _ => None,
        }
    }

    pub(crate) fn render_pipeline(&self, handle: NativeHandle) -> Option<&wgpu::RenderPipeline> {
        match self.entries.get(&handle) {
            Some(WgpuObject::RenderPipeline(pipeline)) => Some(pipeline),
            _ => None,
        }
    }

    pub(crate) fn compute_pipeline(&self, handle: NativeHandle) -> Option<&wgpu::ComputePipeline> {
        match self.entries.get(&handle) {
            Some(WgpuObject::ComputePipeline(pipeline)) => Some(pipeline),
            _ => None,
        }
    }

    pub(crate) fn query_set(&self, handle: NativeHandle) -> Option<(&wgpu::QuerySet, QueryType)> {
        match self.entries.get(&handle) {
            Some(WgpuObject::QuerySet { set, ty }) => Some((set, *ty)),
            _ => None,
        }
    }
}
