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

//! CPU-side wrappers of GPU objects.
//!
//! Each resource is a cheap, clonable handle to a shared inner object. Clones compare
//! equal. Destroying any clone destroys the resource for all of them; the native
//! object is only released once the device's frame-delay rule allows it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::renderer::api::{NativeHandle, ResourceId, ResourceKind};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

/// Implements the accessors every resource shares, forwarding to `self.inner.core`.
macro_rules! impl_gpu_resource {
    ($name:ident) => {
        impl $name {
            /// Identifier of this resource, unique within its device.
            pub fn id(&self) -> $crate::renderer::api::ResourceId {
                self.inner.core.id()
            }

            /// The backend's handle for the native object.
            pub fn native_handle(&self) -> $crate::renderer::api::NativeHandle {
                self.inner.core.handle()
            }

            /// The debug label.
            pub fn label(&self) -> String {
                self.inner.core.label()
            }

            /// Changes the debug label, forwarding it to the native object when the
            /// backend supports debug names.
            pub fn set_label(&self, label: &str) {
                self.inner.core.set_label(label);
            }

            /// Returns `true` once `destroy` was called on any clone.
            pub fn is_destroyed(&self) -> bool {
                self.inner.core.is_destroyed()
            }

            #[allow(dead_code)]
            pub(crate) fn ensure_alive(&self) -> Result<(), $crate::renderer::error::ResourceError> {
                self.inner.core.ensure_alive()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                std::rc::Rc::ptr_eq(&self.inner, &other.inner)
            }
        }

        impl Eq for $name {}

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.inner.core.id())
                    .field("kind", &self.inner.core.kind())
                    .field("label", &self.inner.core.label())
                    .field("handle", &self.inner.core.handle())
                    .field("destroyed", &self.inner.core.is_destroyed())
                    .finish()
            }
        }
    };
    ($name:ident, destroy) => {
        impl_gpu_resource!($name);

        impl $name {
            /// Destroys the resource. The native object is released once every frame
            /// that could still use it has completed. Calling it again does nothing.
            pub fn destroy(&self) {
                self.inner.core.destroy();
            }
        }
    };
}

mod binding;
mod buffer;
mod pipeline;
mod query;
mod sampler;
mod swap_chain;
mod texture;

pub use self::binding::{BindGroup, BindGroupLayout};
pub use self::buffer::Buffer;
pub use self::pipeline::{Pipeline, PipelineLayout};
pub use self::query::QueryHeap;
pub use self::sampler::Sampler;
pub use self::swap_chain::SwapChain;
pub use self::texture::Texture;

/// Identity and lifetime state shared by every resource type.
pub(crate) struct ResourceCore {
    id: ResourceId,
    kind: ResourceKind,
    handle: NativeHandle,
    label: RefCell<String>,
    destroyed: Cell<bool>,
    owns_handle: bool,
    device: Weak<DeviceShared>,
}

impl ResourceCore {
    /// Wraps a freshly created native object and records it as live.
    pub(crate) fn register(
        shared: &Rc<DeviceShared>,
        kind: ResourceKind,
        handle: NativeHandle,
        label: &str,
    ) -> Self {
        let id = shared.register(kind, label);
        log::debug!("GraphicsDevice: Created {kind} '{label}' ({handle})");
        Self {
            id,
            kind,
            handle,
            label: RefCell::new(label.to_owned()),
            destroyed: Cell::new(false),
            owns_handle: true,
            device: Rc::downgrade(shared),
        }
    }

    /// Wraps a native object owned by someone else, such as a swap chain backbuffer.
    /// Destroying it never reaches the backend.
    pub(crate) fn external(
        shared: &Rc<DeviceShared>,
        kind: ResourceKind,
        handle: NativeHandle,
        label: &str,
    ) -> Self {
        Self {
            id: shared.unregistered_id(),
            kind,
            handle,
            label: RefCell::new(label.to_owned()),
            destroyed: Cell::new(false),
            owns_handle: false,
            device: Rc::downgrade(shared),
        }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub(crate) fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub(crate) fn label(&self) -> String {
        self.label.borrow().clone()
    }

    pub(crate) fn set_label(&self, label: &str) {
        *self.label.borrow_mut() = label.to_owned();
        if self.destroyed.get() || !self.owns_handle {
            return;
        }
        if let Some(device) = self.device.upgrade() {
            device.rename(self.id, self.kind, self.handle, label);
        }
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn destroy(&self) {
        if self.destroyed.replace(true) || !self.owns_handle {
            return;
        }
        match self.device.upgrade() {
            Some(device) => {
                device.defer_destroy(self.id, self.kind, self.handle, &self.label.borrow())
            }
            None => log::warn!(
                "{} '{}' destroyed after its device was dropped",
                self.kind,
                self.label.borrow()
            ),
        }
    }

    /// Fails with [`ResourceError::Destroyed`] once the resource is destroyed.
    pub(crate) fn ensure_alive(&self) -> Result<(), ResourceError> {
        if self.destroyed.get() {
            return Err(ResourceError::Destroyed {
                kind: self.kind,
                label: self.label(),
            });
        }
        Ok(())
    }

    /// The owning device, if it still exists.
    pub(crate) fn device(&self) -> Result<Rc<DeviceShared>, ResourceError> {
        self.device.upgrade().ok_or(ResourceError::DeviceDropped)
    }
}

/// The label recorded for a resource created without one.
pub(crate) fn label_or_default(label: Option<&str>, kind: ResourceKind) -> String {
    match label {
        Some(label) if !label.is_empty() => label.to_owned(),
        _ => format!("unnamed {kind}"),
    }
}
