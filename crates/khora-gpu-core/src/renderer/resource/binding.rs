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

use std::collections::HashSet;
use std::rc::Rc;

use super::{label_or_default, ResourceCore};
use crate::renderer::api::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource,
    BindingType, BufferUsage, DeviceLimits, ResourceKind, StorageTextureAccess, TextureUsage,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

/// Describes the resources a shader expects at each binding of one bind group.
#[derive(Clone)]
pub struct BindGroupLayout {
    inner: Rc<BindGroupLayoutInner>,
}

struct BindGroupLayoutInner {
    core: ResourceCore,
    descriptor: BindGroupLayoutDescriptor<'static>,
}

impl_gpu_resource!(BindGroupLayout, destroy);

/// A set of resources bound together, matching a [`BindGroupLayout`].
#[derive(Clone)]
pub struct BindGroup {
    inner: Rc<BindGroupInner>,
}

struct BindGroupInner {
    core: ResourceCore,
    layout: BindGroupLayout,
}

impl_gpu_resource!(BindGroup, destroy);

pub(crate) fn validate_layout(
    descriptor: &BindGroupLayoutDescriptor<'_>,
    limits: &DeviceLimits,
) -> Result<(), ResourceError> {
    if descriptor.entries.len() > limits.max_bindings_per_bind_group as usize {
        return Err(ResourceError::Unsupported(format!(
            "{} bindings exceed the device limit of {}",
            descriptor.entries.len(),
            limits.max_bindings_per_bind_group
        )));
    }
    let mut seen = HashSet::new();
    for entry in descriptor.entries.iter() {
        if entry.binding >= limits.max_bindings_per_bind_group {
            return Err(ResourceError::Unsupported(format!(
                "binding index {} exceeds the device limit of {}",
                entry.binding, limits.max_bindings_per_bind_group
            )));
        }
        if !seen.insert(entry.binding) {
            return Err(ResourceError::InvalidDescriptor(format!(
                "binding {} is declared twice",
                entry.binding
            )));
        }
        if entry.visibility.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "binding {} is visible to no shader stage",
                entry.binding
            )));
        }
    }
    Ok(())
}

fn check_entry(
    layout_entry: &BindGroupLayoutEntry,
    resource: &BindingResource<'_>,
) -> Result<(), ResourceError> {
    let binding = layout_entry.binding;
    let mismatch = |what: &str| {
        Err(ResourceError::InvalidDescriptor(format!(
            "binding {binding}: {what}"
        )))
    };

    match (layout_entry.ty, resource) {
        (
            BindingType::ConstantBuffer {
                min_binding_size, ..
            },
            BindingResource::Buffer {
                buffer,
                offset,
                size,
            },
        ) => {
            buffer.ensure_alive()?;
            if !buffer.usage().contains(BufferUsage::CONSTANT) {
                return mismatch("buffer lacks CONSTANT usage");
            }
            let size = check_buffer_range(binding, buffer.size(), *offset, *size)?;
            if size < min_binding_size {
                return mismatch("buffer range is smaller than the minimum binding size");
            }
            Ok(())
        }
        (
            BindingType::StorageBuffer { read_only, .. },
            BindingResource::Buffer {
                buffer,
                offset,
                size,
            },
        ) => {
            buffer.ensure_alive()?;
            let required = if read_only {
                BufferUsage::SHADER_READ
            } else {
                BufferUsage::SHADER_WRITE
            };
            if !buffer.usage().contains(required) {
                return mismatch("buffer lacks the shader usage the binding needs");
            }
            check_buffer_range(binding, buffer.size(), *offset, *size)?;
            Ok(())
        }
        (BindingType::SampledTexture { multisampled, .. }, BindingResource::Texture(texture)) => {
            texture.ensure_alive()?;
            if !texture.usage().contains(TextureUsage::SHADER_READ) {
                return mismatch("texture lacks SHADER_READ usage");
            }
            if multisampled != (texture.sample_count() > 1) {
                return mismatch("texture sample count does not match the layout");
            }
            Ok(())
        }
        (BindingType::StorageTexture { access, format, .. }, BindingResource::Texture(texture)) => {
            texture.ensure_alive()?;
            let required = match access {
                StorageTextureAccess::ReadOnly => TextureUsage::SHADER_READ,
                StorageTextureAccess::WriteOnly | StorageTextureAccess::ReadWrite => {
                    TextureUsage::SHADER_WRITE
                }
            };
            if !texture.usage().contains(required) {
                return mismatch("texture lacks the shader usage the binding needs");
            }
            if texture.format() != format {
                return mismatch("storage texture format does not match the layout");
            }
            Ok(())
        }
        (BindingType::Sampler(_), BindingResource::Sampler(sampler)) => {
            sampler.ensure_alive()
        }
        _ => mismatch("resource kind does not match the layout"),
    }
}

fn check_buffer_range(
    binding: u32,
    capacity: u64,
    offset: u64,
    size: Option<u64>,
) -> Result<u64, ResourceError> {
    let size = match size {
        Some(size) => size,
        None => capacity.checked_sub(offset).ok_or(ResourceError::OutOfBounds {
            offset,
            size: 0,
            capacity,
        })?,
    };
    if size == 0 || offset.checked_add(size).is_none_or(|end| end > capacity) {
        log::debug!("Bind group binding {binding}: range {offset}+{size} of {capacity}");
        return Err(ResourceError::OutOfBounds {
            offset,
            size,
            capacity,
        });
    }
    Ok(size)
}

impl BindGroupLayout {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        validate_layout(descriptor, &shared.limits)?;
        let handle = shared
            .backend
            .borrow_mut()
            .create_bind_group_layout(descriptor)?;
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::BindGroupLayout);
        Ok(Self {
            inner: Rc::new(BindGroupLayoutInner {
                core: ResourceCore::register(shared, ResourceKind::BindGroupLayout, handle, &label),
                descriptor: descriptor.clone().into_owned(),
            }),
        })
    }

    /// The layout entries, in declaration order.
    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.inner.descriptor.entries
    }
}

impl BindGroup {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &BindGroupDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        let layout = descriptor.layout;
        layout.ensure_alive()?;

        let mut bound = HashSet::new();
        for entry in descriptor.entries {
            let Some(layout_entry) = layout.inner.descriptor.entry(entry.binding) else {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "binding {} is not declared by layout '{}'",
                    entry.binding,
                    layout.label()
                )));
            };
            if !bound.insert(entry.binding) {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "binding {} is bound twice",
                    entry.binding
                )));
            }
            check_entry(layout_entry, &entry.resource)?;
        }
        if let Some(missing) = layout
            .entries()
            .iter()
            .find(|entry| !bound.contains(&entry.binding))
        {
            return Err(ResourceError::InvalidDescriptor(format!(
                "binding {} of layout '{}' has no resource",
                missing.binding,
                layout.label()
            )));
        }

        let handle = shared.backend.borrow_mut().create_bind_group(descriptor)?;
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::BindGroup);
        Ok(Self {
            inner: Rc::new(BindGroupInner {
                core: ResourceCore::register(shared, ResourceKind::BindGroup, handle, &label),
                layout: layout.clone(),
            }),
        })
    }

    /// The layout the group was created against.
    pub fn layout(&self) -> &BindGroupLayout {
        &self.inner.layout
    }

    pub(crate) fn layout_entries(&self) -> &[BindGroupLayoutEntry] {
        self.inner.layout.entries()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::renderer::api::{SamplerBindingType, ShaderStageFlags};

    fn entry(binding: u32) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler(SamplerBindingType::Filtering),
        }
    }

    #[test]
    fn test_duplicate_bindings_are_rejected() {
        let entries = [entry(0), entry(1), entry(0)];
        let desc = BindGroupLayoutDescriptor {
            label: None,
            entries: Cow::Borrowed(&entries),
        };
        assert!(matches!(
            validate_layout(&desc, &DeviceLimits::default()),
            Err(ResourceError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_binding_index_limit() {
        let limits = DeviceLimits::default();
        let entries = [entry(limits.max_bindings_per_bind_group)];
        let desc = BindGroupLayoutDescriptor {
            label: None,
            entries: Cow::Borrowed(&entries),
        };
        assert!(matches!(
            validate_layout(&desc, &limits),
            Err(ResourceError::Unsupported(_))
        ));
    }

    #[test]
    fn test_buffer_ranges() {
        assert_eq!(check_buffer_range(0, 256, 0, None), Ok(256));
        assert_eq!(check_buffer_range(0, 256, 64, None), Ok(192));
        assert_eq!(check_buffer_range(0, 256, 64, Some(64)), Ok(64));
        assert!(check_buffer_range(0, 256, 200, Some(64)).is_err());
        assert!(check_buffer_range(0, 256, 300, None).is_err());
    }
}
