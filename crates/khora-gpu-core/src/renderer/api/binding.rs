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

//! Bind group layouts and bind groups.

use std::borrow::Cow;

use super::format::PixelFormat;
use crate::gpu_bitflags;
use crate::renderer::resource::{BindGroupLayout, Buffer, Sampler, Texture};

gpu_bitflags! {
    /// Shader stages that can see a binding or a push-constant range.
    pub struct ShaderStageFlags: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
    }
}

impl ShaderStageFlags {
    /// Vertex and fragment stages.
    pub const VERTEX_FRAGMENT: Self = Self::VERTEX.union(Self::FRAGMENT);
}

/// What a shader reads from a sampled texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Sint,
    Uint,
}

/// The view dimension a binding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum TextureViewDimension {
    D1,
    #[default]
    D2,
    D2Array,
    Cube,
    CubeArray,
    D3,
}

/// Access of a storage texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum StorageTextureAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// The kind of sampler a binding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SamplerBindingType {
    Filtering,
    NonFiltering,
    Comparison,
}

/// The type of resource bound at a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A constant buffer.
    ConstantBuffer {
        /// Offset is supplied when the group is bound.
        has_dynamic_offset: bool,
        /// Smallest acceptable binding size, 0 for no check.
        min_binding_size: u64,
    },
    /// A storage buffer.
    StorageBuffer {
        /// Shaders only read the buffer.
        read_only: bool,
        /// Offset is supplied when the group is bound.
        has_dynamic_offset: bool,
    },
    /// A sampled texture.
    SampledTexture {
        /// Texel interpretation.
        sample_type: TextureSampleType,
        /// Expected view dimension.
        view_dimension: TextureViewDimension,
        /// The texture is multisampled.
        multisampled: bool,
    },
    /// A storage texture.
    StorageTexture {
        /// Access mode.
        access: StorageTextureAccess,
        /// Texel format.
        format: PixelFormat,
        /// Expected view dimension.
        view_dimension: TextureViewDimension,
    },
    /// A sampler.
    Sampler(SamplerBindingType),
}

/// One slot of a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// Binding index in the shader.
    pub binding: u32,
    /// Stages that can access the binding.
    pub visibility: ShaderStageFlags,
    /// Resource type.
    pub ty: BindingType,
}

/// Creation parameters of a bind group layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Slots, each with a distinct binding index.
    pub entries: Cow<'a, [BindGroupLayoutEntry]>,
}

impl BindGroupLayoutDescriptor<'_> {
    /// Returns a descriptor that owns its data.
    pub fn into_owned(self) -> BindGroupLayoutDescriptor<'static> {
        BindGroupLayoutDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            entries: Cow::Owned(self.entries.into_owned()),
        }
    }

    /// Returns the entry declared for `binding`.
    pub fn entry(&self, binding: u32) -> Option<&BindGroupLayoutEntry> {
        self.entries.iter().find(|entry| entry.binding == binding)
    }
}

/// A resource attached to a bind group slot.
#[derive(Debug, Clone, Copy)]
pub enum BindingResource<'a> {
    /// A range of a buffer; `size` of `None` binds to the end.
    Buffer {
        /// The buffer.
        buffer: &'a Buffer,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: Option<u64>,
    },
    /// A texture through its default view.
    Texture(&'a Texture),
    /// A sampler.
    Sampler(&'a Sampler),
}

/// One bound slot of a bind group.
#[derive(Debug, Clone, Copy)]
pub struct BindGroupEntry<'a> {
    /// Binding index matching a layout entry.
    pub binding: u32,
    /// Bound resource.
    pub resource: BindingResource<'a>,
}

/// Creation parameters of a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Layout the group conforms to.
    pub layout: &'a BindGroupLayout,
    /// Bound slots.
    pub entries: &'a [BindGroupEntry<'a>],
}
