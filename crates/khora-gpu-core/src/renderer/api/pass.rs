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

//! Render pass attachments and dynamic rasterizer state.

use std::borrow::Cow;

use crate::renderer::resource::{QueryHeap, Texture};

/// A linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[allow(missing_docs)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Creates a color from its channels.
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

/// What happens to an attachment's contents when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction<V> {
    /// Keep the existing contents.
    Load,
    /// Overwrite with a value.
    Clear(V),
    /// Contents are undefined.
    DontCare,
}

/// What happens to an attachment's contents when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreAction {
    /// Keep the rendered contents.
    #[default]
    Store,
    /// Contents may be discarded.
    Discard,
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassColorAttachment<'a> {
    /// Target texture (mip 0, layer 0).
    pub texture: &'a Texture,
    /// Multisample resolve target.
    pub resolve_target: Option<&'a Texture>,
    /// Load action.
    pub load: LoadAction<Color>,
    /// Store action.
    pub store: StoreAction,
}

/// The depth-stencil attachment of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDepthStencilAttachment<'a> {
    /// Target texture.
    pub texture: &'a Texture,
    /// Depth load action.
    pub depth_load: LoadAction<f32>,
    /// Depth store action.
    pub depth_store: StoreAction,
    /// Stencil load action.
    pub stencil_load: LoadAction<u32>,
    /// Stencil store action.
    pub stencil_store: StoreAction,
}

/// Parameters of [`CommandRecorder::begin_render_pass`](crate::renderer::CommandRecorder::begin_render_pass).
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Color attachments.
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    /// Depth-stencil attachment.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
    /// Heap receiving occlusion queries issued inside the pass.
    pub occlusion_query_heap: Option<&'a QueryHeap>,
}

/// The rectangle rasterized primitives are mapped to.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// A viewport covering `width` x `height` with the full depth range.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// The rectangle outside which fragments are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    /// A scissor covering `width` x `height`.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}
