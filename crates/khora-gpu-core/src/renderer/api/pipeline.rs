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

//! Pipeline layouts, shader stages and fixed-function pipeline state.

use std::borrow::Cow;
use std::ops::Range;

use super::binding::ShaderStageFlags;
use super::format::{IndexFormat, PixelFormat, VertexFormat};
use super::texture::CompareFunction;
use crate::gpu_bitflags;
use crate::renderer::resource::{BindGroupLayout, PipelineLayout};

/// A byte range of push-constant memory visible to some stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Stages that can read the range.
    pub stages: ShaderStageFlags,
    /// Byte range, 4-byte aligned.
    pub range: Range<u32>,
}

/// Creation parameters of a pipeline layout.
#[derive(Debug, Clone)]
pub struct PipelineLayoutDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Bind group layouts, indexed by group.
    pub bind_group_layouts: &'a [&'a BindGroupLayout],
    /// Push-constant ranges.
    pub push_constant_ranges: &'a [PushConstantRange],
}

/// Returns the push-constant budget in bytes needed by `ranges`.
pub fn push_constant_size(ranges: &[PushConstantRange]) -> u32 {
    ranges.iter().map(|range| range.range.end).max().unwrap_or(0)
}

/// Shader code handed to the backend as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource<'a> {
    /// WGSL text.
    Wgsl(Cow<'a, str>),
    /// SPIR-V words.
    SpirV(Cow<'a, [u32]>),
}

/// One programmable stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDescriptor<'a> {
    /// Shader code.
    pub source: ShaderSource<'a>,
    /// Entry point function.
    pub entry_point: Cow<'a, str>,
}

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// One attribute read from a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset inside one element.
    pub offset: u64,
    /// Shader location.
    pub shader_location: u32,
}

/// Layout of one vertex buffer slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout<'a> {
    /// Bytes between consecutive elements.
    pub array_stride: u64,
    /// Advance rate.
    pub step_mode: VertexStepMode,
    /// Attributes.
    pub attributes: Cow<'a, [VertexAttribute]>,
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Polygon rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveState {
    /// Topology.
    pub topology: PrimitiveTopology,
    /// Index format required for strip topologies with primitive restart.
    pub strip_index_format: Option<IndexFormat>,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Culling.
    pub cull_mode: CullMode,
    /// Fill mode.
    pub polygon_mode: PolygonMode,
    /// Disable depth clipping (requires [`Feature::DepthClipControl`](super::caps::Feature::DepthClipControl)).
    pub unclipped_depth: bool,
}

/// Stencil buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

/// Stencil state of one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

/// Depth and stencil testing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct DepthStencilState {
    pub format: PixelFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub depth_bias: i32,
    /// Bit pattern of an `f32`, stored as bits so the state stays hashable.
    pub depth_bias_slope_scale: u32,
    /// Bit pattern of an `f32`.
    pub depth_bias_clamp: u32,
}

impl DepthStencilState {
    /// Standard less-than depth testing with writes and no stencil.
    pub fn depth_test(format: PixelFormat) -> Self {
        Self {
            format,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            depth_bias: 0,
            depth_bias_slope_scale: 0,
            depth_bias_clamp: 0,
        }
    }
}

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

/// Blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend equation of one channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    /// `src * 1 + dst * 0`.
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };
}

/// Color and alpha blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    /// Standard non-premultiplied alpha blending.
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
    };
}

gpu_bitflags! {
    /// Color channels written to a target.
    pub struct ColorWrites: u32 {
        /// Red.
        const RED = 1 << 0;
        /// Green.
        const GREEN = 1 << 1;
        /// Blue.
        const BLUE = 1 << 2;
        /// Alpha.
        const ALPHA = 1 << 3;
    }
}

/// One color target of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    /// Attachment format.
    pub format: PixelFormat,
    /// Blending, `None` to overwrite.
    pub blend: Option<BlendState>,
    /// Channel write mask.
    pub write_mask: ColorWrites,
}

impl ColorTargetState {
    /// Writes every channel without blending.
    pub fn opaque(format: PixelFormat) -> Self {
        Self {
            format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }
    }
}

/// Creation parameters of a render pipeline.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Resource layout.
    pub layout: &'a PipelineLayout,
    /// Vertex stage.
    pub vertex: ShaderStageDescriptor<'a>,
    /// Fragment stage, `None` for depth-only pipelines.
    pub fragment: Option<ShaderStageDescriptor<'a>>,
    /// Vertex buffer slots.
    pub vertex_buffers: &'a [VertexBufferLayout<'a>],
    /// Rasterizer state.
    pub primitive: PrimitiveState,
    /// Depth-stencil state.
    pub depth_stencil: Option<DepthStencilState>,
    /// Color targets.
    pub color_targets: &'a [ColorTargetState],
    /// Samples per pixel.
    pub sample_count: u32,
}

/// Creation parameters of a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Resource layout.
    pub layout: &'a PipelineLayout,
    /// Compute stage.
    pub shader: ShaderStageDescriptor<'a>,
}

/// Whether a pipeline is bound for rendering or for compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Bound inside render passes.
    Render,
    /// Bound outside render passes for dispatches.
    Compute,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_size_is_highest_end() {
        let ranges = [
            PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                range: 0..64,
            },
            PushConstantRange {
                stages: ShaderStageFlags::FRAGMENT,
                range: 64..96,
            },
        ];
        assert_eq!(push_constant_size(&ranges), 96);
        assert_eq!(push_constant_size(&[]), 0);
    }
}
