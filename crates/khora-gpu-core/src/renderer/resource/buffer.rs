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

use std::rc::Rc;

use bytemuck::Pod;

use super::{label_or_default, ResourceCore};
use crate::renderer::api::{
    BackendTraits, BufferDescriptor, BufferUsage, CpuAccessMode, DeviceLimits, ResourceKind,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;
use crate::utils::align_up;

/// Usages a backend with exclusive constant buffers refuses to combine with `CONSTANT`.
const NON_CONSTANT_USAGES: BufferUsage = BufferUsage::VERTEX
    .union(BufferUsage::INDEX)
    .union(BufferUsage::INDIRECT)
    .union(BufferUsage::SHADER_READ)
    .union(BufferUsage::SHADER_WRITE);

/// A linear block of GPU memory.
#[derive(Clone)]
pub struct Buffer {
    inner: Rc<BufferInner>,
}

struct BufferInner {
    core: ResourceCore,
    descriptor: BufferDescriptor<'static>,
    allocated_size: u64,
}

impl_gpu_resource!(Buffer, destroy);

/// Checks a buffer descriptor against the device and returns the size to allocate.
pub(crate) fn validate_descriptor(
    descriptor: &BufferDescriptor<'_>,
    initial_data: Option<&[u8]>,
    limits: &DeviceLimits,
    traits: &BackendTraits,
) -> Result<u64, ResourceError> {
    if descriptor.size == 0 {
        return Err(ResourceError::InvalidDescriptor(
            "buffer size must be greater than zero".into(),
        ));
    }
    if descriptor.usage.is_empty() && descriptor.cpu_access == CpuAccessMode::None {
        return Err(ResourceError::InvalidDescriptor(
            "buffer has neither a GPU usage nor CPU access".into(),
        ));
    }
    if traits.exclusive_constant_buffers
        && descriptor.usage.contains(BufferUsage::CONSTANT)
        && descriptor.usage.intersects(NON_CONSTANT_USAGES)
    {
        return Err(ResourceError::Unsupported(format!(
            "this backend cannot combine CONSTANT with {:?}",
            descriptor.usage.intersection(NON_CONSTANT_USAGES)
        )));
    }
    if let Some(data) = initial_data {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::OutOfBounds {
                offset: 0,
                size: data.len() as u64,
                capacity: descriptor.size,
            });
        }
    }

    let alignment = if descriptor.usage.contains(BufferUsage::CONSTANT) {
        traits.constant_buffer_alignment.max(4)
    } else {
        4
    };
    let allocated = align_up(descriptor.size, alignment).ok_or_else(|| {
        ResourceError::Unsupported(format!(
            "buffer of {} bytes cannot be aligned to {alignment} bytes",
            descriptor.size
        ))
    })?;
    if allocated > limits.max_buffer_size {
        return Err(ResourceError::Unsupported(format!(
            "buffer of {allocated} bytes exceeds the device maximum of {}",
            limits.max_buffer_size
        )));
    }
    Ok(allocated)
}

impl Buffer {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &BufferDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<Self, ResourceError> {
        let allocated_size =
            validate_descriptor(descriptor, initial_data, &shared.limits, &shared.traits)?;

        let native_descriptor = BufferDescriptor {
            size: allocated_size,
            ..descriptor.clone()
        };
        let handle = shared
            .backend
            .borrow_mut()
            .create_buffer(&native_descriptor, initial_data)?;

        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::Buffer);
        Ok(Self {
            inner: Rc::new(BufferInner {
                core: ResourceCore::register(shared, ResourceKind::Buffer, handle, &label),
                descriptor: descriptor.clone().into_owned(),
                allocated_size,
            }),
        })
    }

    /// The size requested at creation.
    pub fn size(&self) -> u64 {
        self.inner.descriptor.size
    }

    /// The size actually allocated, after alignment.
    pub fn allocated_size(&self) -> u64 {
        self.inner.allocated_size
    }

    /// GPU usages the buffer was created with.
    pub fn usage(&self) -> BufferUsage {
        self.inner.descriptor.usage
    }

    /// CPU access mode the buffer was created with.
    pub fn cpu_access(&self) -> CpuAccessMode {
        self.inner.descriptor.cpu_access
    }

    /// The descriptor the buffer was created from.
    pub fn descriptor(&self) -> &BufferDescriptor<'static> {
        &self.inner.descriptor
    }

    fn check_cpu_access(
        &self,
        mode: CpuAccessMode,
        operation: &'static str,
        offset: u64,
        size: u64,
    ) -> Result<(), ResourceError> {
        self.inner.core.ensure_alive()?;
        if self.cpu_access() != mode {
            return Err(ResourceError::CpuAccessDenied {
                label: self.label(),
                operation,
            });
        }
        if offset.checked_add(size).is_none_or(|end| end > self.size()) {
            return Err(ResourceError::OutOfBounds {
                offset,
                size,
                capacity: self.size(),
            });
        }
        Ok(())
    }

    /// Writes `data` at `offset`. Requires [`CpuAccessMode::Write`].
    ///
    /// The write is visible to GPU work submitted afterwards.
    pub fn set_data(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.check_cpu_access(CpuAccessMode::Write, "set_data", offset, data.len() as u64)?;
        let device = self.inner.core.device()?;
        let result = device
            .backend
            .borrow_mut()
            .write_buffer(self.native_handle(), offset, data);
        result
    }

    /// Fills `output` with the bytes at `offset`. Requires [`CpuAccessMode::Read`].
    ///
    /// Blocks until the data written by previously submitted GPU work is available.
    pub fn get_data(&self, offset: u64, output: &mut [u8]) -> Result<(), ResourceError> {
        self.check_cpu_access(CpuAccessMode::Read, "get_data", offset, output.len() as u64)?;
        let device = self.inner.core.device()?;
        let result = device
            .backend
            .borrow_mut()
            .read_buffer(self.native_handle(), offset, output);
        result
    }

    /// Reads `count` values of `T` starting at byte `offset`.
    pub fn get_data_as<T: Pod>(&self, offset: u64, count: usize) -> Result<Vec<T>, ResourceError> {
        let mut values = vec![T::zeroed(); count];
        self.get_data(offset, bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::GraphicsBackendType;

    fn descriptor(size: u64, usage: BufferUsage) -> BufferDescriptor<'static> {
        BufferDescriptor::new("test", size, usage)
    }

    #[test]
    fn test_constant_buffers_are_rounded_to_backend_granularity() {
        let limits = DeviceLimits::default();
        let dx11 = GraphicsBackendType::Dx11.default_traits();
        let vulkan = GraphicsBackendType::Vulkan.default_traits();

        let desc = descriptor(20, BufferUsage::CONSTANT);
        assert_eq!(validate_descriptor(&desc, None, &limits, &dx11), Ok(32));
        assert_eq!(validate_descriptor(&desc, None, &limits, &vulkan), Ok(256));
    }

    #[test]
    fn test_plain_buffers_are_rounded_to_four_bytes() {
        let limits = DeviceLimits::default();
        let traits = GraphicsBackendType::Vulkan.default_traits();
        let desc = descriptor(13, BufferUsage::VERTEX);
        assert_eq!(validate_descriptor(&desc, None, &limits, &traits), Ok(16));
    }

    #[test]
    fn test_exclusive_constant_usage_is_rejected() {
        let limits = DeviceLimits::default();
        let dx11 = GraphicsBackendType::Dx11.default_traits();
        let vulkan = GraphicsBackendType::Vulkan.default_traits();
        let desc = descriptor(64, BufferUsage::CONSTANT | BufferUsage::SHADER_READ);

        assert!(matches!(
            validate_descriptor(&desc, None, &limits, &dx11),
            Err(ResourceError::Unsupported(_))
        ));
        assert!(validate_descriptor(&desc, None, &limits, &vulkan).is_ok());
    }

    #[test]
    fn test_invalid_descriptors() {
        let limits = DeviceLimits::default();
        let traits = GraphicsBackendType::Vulkan.default_traits();

        let zero = descriptor(0, BufferUsage::VERTEX);
        assert!(matches!(
            validate_descriptor(&zero, None, &limits, &traits),
            Err(ResourceError::InvalidDescriptor(_))
        ));

        let no_usage = descriptor(16, BufferUsage::EMPTY);
        assert!(validate_descriptor(&no_usage, None, &limits, &traits).is_err());
        let staging = no_usage.with_cpu_access(CpuAccessMode::Write);
        assert!(validate_descriptor(&staging, None, &limits, &traits).is_ok());

        let small = descriptor(4, BufferUsage::VERTEX);
        assert_eq!(
            validate_descriptor(&small, Some(&[0; 8]), &limits, &traits),
            Err(ResourceError::OutOfBounds {
                offset: 0,
                size: 8,
                capacity: 4
            })
        );

        let huge = descriptor(limits.max_buffer_size + 1, BufferUsage::VERTEX);
        assert!(matches!(
            validate_descriptor(&huge, None, &limits, &traits),
            Err(ResourceError::Unsupported(_))
        ));
    }

    #[test]
    fn test_sizes_near_u64_max_are_unsupported() {
        let limits = DeviceLimits {
            max_buffer_size: u64::MAX,
            ..DeviceLimits::default()
        };
        let vulkan = GraphicsBackendType::Vulkan.default_traits();

        let vertex = descriptor(u64::MAX - 1, BufferUsage::VERTEX);
        assert!(matches!(
            validate_descriptor(&vertex, None, &limits, &vulkan),
            Err(ResourceError::Unsupported(_))
        ));
        let constant = descriptor(u64::MAX - 200, BufferUsage::CONSTANT);
        assert!(matches!(
            validate_descriptor(&constant, None, &limits, &vulkan),
            Err(ResourceError::Unsupported(_))
        ));
    }
}
