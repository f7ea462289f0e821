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

//! Swap chain descriptors and the opaque platform surface handle.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::format::PixelFormat;

/// A window the GPU can present to.
pub trait WindowHandle: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle> WindowHandle for T {}

/// A shared, thread-safe reference to a presentable window.
pub type KhoraWindowHandle = Arc<dyn WindowHandle + Send + Sync>;

/// An opaque platform surface consumed by [`GraphicsDevice::create_swap_chain`](crate::renderer::GraphicsDevice::create_swap_chain).
#[derive(Clone)]
pub struct SurfaceHandle {
    window: Option<KhoraWindowHandle>,
}

impl SurfaceHandle {
    /// Wraps a native window.
    pub fn from_window(window: KhoraWindowHandle) -> Self {
        Self {
            window: Some(window),
        }
    }

    /// A surface with no window behind it, presented to by backends that render offscreen.
    pub fn headless() -> Self {
        Self { window: None }
    }

    /// The native window, if any.
    pub fn window(&self) -> Option<&KhoraWindowHandle> {
        self.window.as_ref()
    }

    /// Returns `true` when no window backs this surface.
    pub fn is_headless(&self) -> bool {
        self.window.is_none()
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("headless", &self.is_headless())
            .finish()
    }
}

/// How presented images are queued for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PresentMode {
    /// Wait for vertical blank, never tear.
    #[default]
    Fifo,
    /// Replace the queued image, never tear.
    Mailbox,
    /// Present immediately, may tear.
    Immediate,
}

/// Creation parameters of a swap chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapChainDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Backbuffer width.
    pub width: u32,
    /// Backbuffer height.
    pub height: u32,
    /// Requested backbuffer format; `Undefined` lets the backend pick.
    pub format: PixelFormat,
    /// Presentation mode.
    pub present_mode: PresentMode,
    /// Requested number of backbuffers.
    pub back_buffer_count: u32,
}

impl Default for SwapChainDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: PixelFormat::Undefined,
            present_mode: PresentMode::Fifo,
            back_buffer_count: 2,
        }
    }
}

impl SwapChainDescriptor<'_> {
    /// Returns a descriptor that owns its label.
    pub fn into_owned(self) -> SwapChainDescriptor<'static> {
        SwapChainDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            width: self.width,
            height: self.height,
            format: self.format,
            present_mode: self.present_mode,
            back_buffer_count: self.back_buffer_count,
        }
    }
}

/// What a backend actually created for a swap chain request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainConfiguration {
    /// Backend handle of the swap chain.
    pub handle: crate::renderer::api::NativeHandle,
    /// Resolved backbuffer format.
    pub format: PixelFormat,
    /// Resolved present mode.
    pub present_mode: PresentMode,
    /// Resolved number of backbuffers.
    pub back_buffer_count: u32,
}
