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

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{label_or_default, ResourceCore, Texture};
use crate::renderer::api::{
    PixelFormat, PresentMode, ResourceKind, SurfaceHandle, SwapChainDescriptor, TextureDescriptor,
    TextureDimension, TextureUsage,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::{CommandError, SwapChainError};
use crate::renderer::traits::DeviceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackbufferState {
    /// No backbuffer is held.
    Idle,
    /// A backbuffer was acquired and can be rendered to.
    Acquired,
    /// A recorder asked to present the backbuffer; the queue presents it at frame end.
    PresentQueued,
}

/// A chain of presentable backbuffers bound to a platform surface.
///
/// At most one backbuffer is acquired at a time. [`SwapChain::get_current_texture`]
/// acquires it, a recorder queues its presentation with
/// [`CommandRecorder::present`](crate::renderer::CommandRecorder::present), and the
/// device presents it during [`GraphicsDevice::finish_frame`](crate::renderer::GraphicsDevice::finish_frame).
#[derive(Clone)]
pub struct SwapChain {
    inner: Rc<SwapChainInner>,
}

struct SwapChainInner {
    core: ResourceCore,
    format: PixelFormat,
    present_mode: PresentMode,
    back_buffer_count: u32,
    extent: Cell<(u32, u32)>,
    state: Cell<BackbufferState>,
    current: RefCell<Option<Texture>>,
}

impl_gpu_resource!(SwapChain);

impl SwapChain {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        surface: &SurfaceHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<Self, SwapChainError> {
        let max = shared.limits.max_texture_dimension_2d;
        if descriptor.width > max || descriptor.height > max {
            return Err(SwapChainError::InvalidExtent {
                width: descriptor.width,
                height: descriptor.height,
            });
        }
        let mut descriptor = descriptor.clone();
        if descriptor.back_buffer_count < 2 {
            log::warn!(
                "SwapChain {:?}: {} back buffers requested, using 2",
                descriptor.label,
                descriptor.back_buffer_count
            );
            descriptor.back_buffer_count = 2;
        }

        let config = shared
            .backend
            .borrow_mut()
            .create_swap_chain(surface, &descriptor)?;

        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::SwapChain);
        log::info!(
            "SwapChain '{label}': {}x{} {} {:?} with {} back buffers",
            descriptor.width,
            descriptor.height,
            config.format,
            config.present_mode,
            config.back_buffer_count
        );
        Ok(Self {
            inner: Rc::new(SwapChainInner {
                core: ResourceCore::register(shared, ResourceKind::SwapChain, config.handle, &label),
                format: config.format,
                present_mode: config.present_mode,
                back_buffer_count: config.back_buffer_count,
                extent: Cell::new((descriptor.width, descriptor.height)),
                state: Cell::new(BackbufferState::Idle),
                current: RefCell::new(None),
            }),
        })
    }

    /// Returns the backbuffer to render to this frame, acquiring it if needed.
    ///
    /// Returns `Ok(None)` when the surface cannot be rendered to right now (minimized,
    /// being resized) or when this frame's backbuffer was already queued for
    /// presentation. Callers skip drawing for the frame in that case.
    pub fn get_current_texture(&self) -> Result<Option<Texture>, SwapChainError> {
        let inner = &self.inner;
        match inner.state.get() {
            BackbufferState::Acquired => return Ok(inner.current.borrow().clone()),
            BackbufferState::PresentQueued => {
                log::warn!(
                    "SwapChain '{}': backbuffer already queued for presentation this frame",
                    self.label()
                );
                return Ok(None);
            }
            BackbufferState::Idle => {}
        }
        if inner.core.is_destroyed() {
            return Err(SwapChainError::Backend(format!(
                "swap chain '{}' was destroyed",
                self.label()
            )));
        }

        let device = inner.core.device().map_err(|_| SwapChainError::DeviceDropped)?;
        let acquired = device
            .backend
            .borrow_mut()
            .acquire_next_texture(self.native_handle())?;
        let Some(handle) = acquired else {
            log::debug!("SwapChain '{}': no backbuffer available", self.label());
            return Ok(None);
        };

        let (width, height) = inner.extent.get();
        let texture = Texture::wrap_external(
            &device,
            handle,
            TextureDescriptor {
                label: Some(Cow::Owned(format!("{} backbuffer", self.label()))),
                dimension: TextureDimension::D2,
                format: inner.format,
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
                mip_level_count: 1,
                sample_count: 1,
                usage: TextureUsage::RENDER_TARGET,
            },
        );
        *inner.current.borrow_mut() = Some(texture.clone());
        inner.state.set(BackbufferState::Acquired);
        Ok(Some(texture))
    }

    /// Resizes the backbuffers. Only legal while no backbuffer is acquired.
    ///
    /// A `0x0` extent is accepted; no backbuffer is available until the next non-zero
    /// resize.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), SwapChainError> {
        let inner = &self.inner;
        if inner.state.get() != BackbufferState::Idle {
            return Err(SwapChainError::BackbufferAcquired);
        }
        let device = inner.core.device().map_err(|_| SwapChainError::DeviceDropped)?;
        let max = device.limits.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(SwapChainError::InvalidExtent { width, height });
        }
        if inner.extent.get() == (width, height) {
            return Ok(());
        }

        device
            .backend
            .borrow_mut()
            .resize_swap_chain(self.native_handle(), width, height)?;
        inner.extent.set((width, height));
        log::info!("SwapChain '{}': resized to {width}x{height}", self.label());
        Ok(())
    }

    /// Current backbuffer extent.
    pub fn extent(&self) -> (u32, u32) {
        self.inner.extent.get()
    }

    /// Backbuffer format chosen at creation.
    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Present mode the backend settled on, which may differ from the requested one.
    pub fn present_mode(&self) -> PresentMode {
        self.inner.present_mode
    }

    /// Number of backbuffers in the rotation.
    pub fn back_buffer_count(&self) -> u32 {
        self.inner.back_buffer_count
    }

    /// Returns `true` while a backbuffer is acquired or queued for presentation.
    pub fn has_acquired_texture(&self) -> bool {
        self.inner.state.get() != BackbufferState::Idle
    }

    /// Destroys the swap chain, dropping any acquired backbuffer first.
    pub fn destroy(&self) {
        self.release_current_texture();
        self.inner.core.destroy();
    }

    // --- Queue protocol ---

    /// Drops the CPU reference to the acquired backbuffer texture.
    pub(crate) fn release_current_texture(&self) {
        if let Some(texture) = self.inner.current.borrow_mut().take() {
            texture.destroy();
        }
    }

    /// Marks the acquired backbuffer for presentation at frame end.
    pub(crate) fn queue_present(&self) -> Result<(), CommandError> {
        match self.inner.state.get() {
            BackbufferState::Acquired => {
                self.inner.state.set(BackbufferState::PresentQueued);
                Ok(())
            }
            BackbufferState::PresentQueued => Err(CommandError::AlreadyPresented),
            BackbufferState::Idle => Err(CommandError::NoAcquiredBackbuffer),
        }
    }

    /// Reverts a queued present that will not happen.
    pub(crate) fn abandon_present(&self) {
        if self.inner.state.get() != BackbufferState::PresentQueued {
            return;
        }
        let state = if self.inner.current.borrow().is_some() {
            BackbufferState::Acquired
        } else {
            BackbufferState::Idle
        };
        self.inner.state.set(state);
    }

    /// Issues the native present of a queued backbuffer.
    pub(crate) fn present_queued(&self, backend: &mut dyn DeviceBackend) -> Result<(), SwapChainError> {
        if self.inner.state.get() != BackbufferState::PresentQueued {
            return Ok(());
        }
        self.release_current_texture();
        self.inner.state.set(BackbufferState::Idle);
        backend.present(self.native_handle())
    }
}
