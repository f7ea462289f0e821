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

use super::{label_or_default, ResourceCore};
use crate::renderer::api::{
    max_mip_levels, mip_extent, BackendTraits, DeviceLimits, Feature, NativeHandle, PixelFormat,
    ResourceKind, TextureAllocation, TextureDescriptor, TextureDimension, TextureUsage,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

/// A GPU image: 1D, 2D, 3D or cube, with mips and array layers.
#[derive(Clone)]
pub struct Texture {
    inner: Rc<TextureInner>,
}

struct TextureInner {
    core: ResourceCore,
    descriptor: TextureDescriptor<'static>,
    allocation: TextureAllocation,
}

impl_gpu_resource!(Texture, destroy);

fn invalid(message: String) -> Result<TextureAllocation, ResourceError> {
    Err(ResourceError::InvalidDescriptor(message))
}

fn check_extent(
    descriptor: &TextureDescriptor<'_>,
    limits: &DeviceLimits,
) -> Result<(), ResourceError> {
    let d = descriptor;
    let within = match d.dimension {
        TextureDimension::D1 => {
            d.width <= limits.max_texture_dimension_1d
                && d.height == 1
                && d.depth_or_array_layers <= limits.max_texture_array_layers
        }
        TextureDimension::D2 => {
            d.width <= limits.max_texture_dimension_2d
                && d.height <= limits.max_texture_dimension_2d
                && d.depth_or_array_layers <= limits.max_texture_array_layers
        }
        TextureDimension::D3 => {
            d.width <= limits.max_texture_dimension_3d
                && d.height <= limits.max_texture_dimension_3d
                && d.depth_or_array_layers <= limits.max_texture_dimension_3d
        }
        TextureDimension::Cube => {
            if d.width != d.height || d.depth_or_array_layers % 6 != 0 {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "cube texture must be square with a multiple of 6 layers, got {}x{}x{}",
                    d.width, d.height, d.depth_or_array_layers
                )));
            }
            d.width <= limits.max_texture_dimension_cube
                && d.depth_or_array_layers <= limits.max_texture_array_layers
        }
    };
    if !within {
        return Err(ResourceError::Unsupported(format!(
            "{:?} texture of {}x{}x{} exceeds the device limits",
            d.dimension, d.width, d.height, d.depth_or_array_layers
        )));
    }
    Ok(())
}

/// Checks a texture descriptor and resolves the formats it is allocated with.
pub(crate) fn validate_descriptor(
    descriptor: &TextureDescriptor<'_>,
    initial_data: Option<&[u8]>,
    limits: &DeviceLimits,
    traits: &BackendTraits,
    has_feature: &dyn Fn(Feature) -> bool,
) -> Result<TextureAllocation, ResourceError> {
    let d = descriptor;
    let format = d.format;

    if d.width == 0 || d.height == 0 || d.depth_or_array_layers == 0 {
        return invalid(format!(
            "texture extent {}x{}x{} has a zero dimension",
            d.width, d.height, d.depth_or_array_layers
        ));
    }
    if matches!(
        format,
        PixelFormat::Undefined
            | PixelFormat::R16Typeless
            | PixelFormat::R24G8Typeless
            | PixelFormat::R32Typeless
            | PixelFormat::R32G8X24Typeless
    ) {
        return invalid(format!("{format} cannot be requested for a texture"));
    }
    if d.usage.is_empty() {
        return invalid("texture has no usage".into());
    }
    check_extent(d, limits)?;

    let max_mips = max_mip_levels(d.width, d.height, d.depth());
    if d.mip_level_count == 0 || d.mip_level_count > max_mips {
        return invalid(format!(
            "mip level count {} outside 1..={max_mips}",
            d.mip_level_count
        ));
    }
    if !matches!(d.sample_count, 1 | 2 | 4 | 8) {
        return invalid(format!("sample count {} is not 1, 2, 4 or 8", d.sample_count));
    }
    if d.sample_count > 1 && (d.mip_level_count != 1 || d.dimension != TextureDimension::D2) {
        return invalid("multisampled textures must be 2D with a single mip".into());
    }
    if format.is_depth_stencil() && d.dimension == TextureDimension::D3 {
        return invalid(format!("{format} cannot be used for a 3D texture"));
    }

    if format.is_compressed() {
        if !has_feature(Feature::TextureCompressionBc) {
            return Err(ResourceError::Unsupported(format!(
                "{format} needs {:?}",
                Feature::TextureCompressionBc
            )));
        }
        let info = format.info();
        if d.width % info.block_width != 0 || d.height % info.block_height != 0 {
            return invalid(format!(
                "{format} texture of {}x{} is not a whole number of blocks",
                d.width, d.height
            ));
        }
    }
    if format == PixelFormat::Depth32FloatStencil8 && !has_feature(Feature::Depth32FloatStencil8) {
        return Err(ResourceError::Unsupported(format!(
            "{format} needs {:?}",
            Feature::Depth32FloatStencil8
        )));
    }

    if let Some(data) = initial_data {
        let needed = d.total_size();
        if (data.len() as u64) < needed {
            return invalid(format!(
                "initial data has {} bytes, the texture needs {needed}",
                data.len()
            ));
        }
    }

    let typeless_storage = if traits.typeless_depth_sampling
        && d.usage.contains(TextureUsage::SHADER_READ)
    {
        format.typeless_depth_format()
    } else {
        None
    };

    Ok(match typeless_storage {
        Some(storage_format) => TextureAllocation {
            storage_format,
            shader_view_format: format.depth_sampling_format().unwrap_or(format),
            typeless: true,
        },
        None => TextureAllocation {
            storage_format: format,
            shader_view_format: format,
            typeless: false,
        },
    })
}

impl Texture {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &TextureDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<Self, ResourceError> {
        let allocation = {
            let backend = shared.backend.borrow();
            validate_descriptor(
                descriptor,
                initial_data,
                &shared.limits,
                &shared.traits,
                &|feature| backend.query_feature(feature),
            )?
        };

        let handle = shared
            .backend
            .borrow_mut()
            .create_texture(descriptor, &allocation, initial_data)?;

        if allocation.typeless {
            log::debug!(
                "Texture {:?}: stored as {} and sampled as {}",
                descriptor.label,
                allocation.storage_format,
                allocation.shader_view_format
            );
        }

        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::Texture);
        Ok(Self {
            inner: Rc::new(TextureInner {
                core: ResourceCore::register(shared, ResourceKind::Texture, handle, &label),
                descriptor: descriptor.clone().into_owned(),
                allocation,
            }),
        })
    }

    /// Wraps a texture owned by the backend, such as a swap chain backbuffer.
    pub(crate) fn wrap_external(
        shared: &Rc<DeviceShared>,
        handle: NativeHandle,
        descriptor: TextureDescriptor<'static>,
    ) -> Self {
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::Texture);
        Self {
            inner: Rc::new(TextureInner {
                core: ResourceCore::external(shared, ResourceKind::Texture, handle, &label),
                allocation: TextureAllocation {
                    storage_format: descriptor.format,
                    shader_view_format: descriptor.format,
                    typeless: false,
                },
                descriptor,
            }),
        }
    }

    /// The descriptor the texture was created from.
    pub fn descriptor(&self) -> &TextureDescriptor<'static> {
        &self.inner.descriptor
    }

    /// The requested format.
    pub fn format(&self) -> PixelFormat {
        self.inner.descriptor.format
    }

    /// Width of mip 0.
    pub fn width(&self) -> u32 {
        self.inner.descriptor.width
    }

    /// Height of mip 0.
    pub fn height(&self) -> u32 {
        self.inner.descriptor.height
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.descriptor.mip_level_count
    }

    pub fn array_layers(&self) -> u32 {
        self.inner.descriptor.array_layers()
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.descriptor.sample_count
    }

    pub fn usage(&self) -> TextureUsage {
        self.inner.descriptor.usage
    }

    /// `(width, height, depth)` of a mip level.
    pub fn mip_extent(&self, mip_level: u32) -> (u32, u32, u32) {
        let d = &self.inner.descriptor;
        mip_extent(d.width, d.height, d.depth(), mip_level)
    }

    /// The storage and shader view formats the texture was allocated with.
    pub fn allocation(&self) -> TextureAllocation {
        self.inner.allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::GraphicsBackendType;

    fn all_features(_: Feature) -> bool {
        true
    }

    fn no_features(_: Feature) -> bool {
        false
    }

    #[test]
    fn test_sampled_depth_is_typeless_on_dx_backends() {
        let limits = DeviceLimits::default();
        let desc = TextureDescriptor::depth_stencil("shadow", PixelFormat::Depth32Float, 512, 512, true);

        let dx11 = GraphicsBackendType::Dx11.default_traits();
        let allocation = validate_descriptor(&desc, None, &limits, &dx11, &all_features).unwrap();
        assert!(allocation.typeless);
        assert_eq!(allocation.storage_format, PixelFormat::R32Typeless);
        assert_eq!(allocation.shader_view_format, PixelFormat::R32Float);

        let vulkan = GraphicsBackendType::Vulkan.default_traits();
        let allocation = validate_descriptor(&desc, None, &limits, &vulkan, &all_features).unwrap();
        assert!(!allocation.typeless);
        assert_eq!(allocation.storage_format, PixelFormat::Depth32Float);
    }

    #[test]
    fn test_unsampled_depth_keeps_its_format() {
        let limits = DeviceLimits::default();
        let desc = TextureDescriptor::depth_stencil("depth", PixelFormat::Depth24UnormStencil8, 64, 64, false);
        let dx11 = GraphicsBackendType::Dx11.default_traits();
        let allocation = validate_descriptor(&desc, None, &limits, &dx11, &all_features).unwrap();
        assert!(!allocation.typeless);
        assert_eq!(allocation.storage_format, PixelFormat::Depth24UnormStencil8);
    }

    #[test]
    fn test_extent_and_mip_validation() {
        let limits = DeviceLimits::default();
        let traits = GraphicsBackendType::Vulkan.default_traits();

        let zero = TextureDescriptor::texture_2d("t", PixelFormat::Rgba8Unorm, 0, 4, TextureUsage::SHADER_READ);
        assert!(matches!(
            validate_descriptor(&zero, None, &limits, &traits, &all_features),
            Err(ResourceError::InvalidDescriptor(_))
        ));

        let too_many_mips = TextureDescriptor::texture_2d("t", PixelFormat::Rgba8Unorm, 8, 8, TextureUsage::SHADER_READ)
            .with_mip_levels(5);
        assert!(validate_descriptor(&too_many_mips, None, &limits, &traits, &all_features).is_err());

        let full_chain = too_many_mips.clone().with_mip_levels(4);
        assert!(validate_descriptor(&full_chain, None, &limits, &traits, &all_features).is_ok());

        let huge = TextureDescriptor::texture_2d(
            "t",
            PixelFormat::Rgba8Unorm,
            limits.max_texture_dimension_2d + 1,
            1,
            TextureUsage::SHADER_READ,
        );
        assert!(matches!(
            validate_descriptor(&huge, None, &limits, &traits, &all_features),
            Err(ResourceError::Unsupported(_))
        ));

        let mut cube = TextureDescriptor::texture_cube("sky", PixelFormat::Rgba8Unorm, 16, 1);
        assert!(validate_descriptor(&cube, None, &limits, &traits, &all_features).is_ok());
        cube.depth_or_array_layers = 4;
        assert!(validate_descriptor(&cube, None, &limits, &traits, &all_features).is_err());
    }

    #[test]
    fn test_compressed_formats_need_the_feature() {
        let limits = DeviceLimits::default();
        let traits = GraphicsBackendType::Vulkan.default_traits();
        let desc = TextureDescriptor::texture_2d("bc", PixelFormat::Bc7RgbaUnorm, 16, 16, TextureUsage::SHADER_READ);

        assert!(matches!(
            validate_descriptor(&desc, None, &limits, &traits, &no_features),
            Err(ResourceError::Unsupported(_))
        ));
        assert!(validate_descriptor(&desc, None, &limits, &traits, &all_features).is_ok());

        let ragged = TextureDescriptor::texture_2d("bc", PixelFormat::Bc7RgbaUnorm, 10, 16, TextureUsage::SHADER_READ);
        assert!(validate_descriptor(&ragged, None, &limits, &traits, &all_features).is_err());
    }

    #[test]
    fn test_initial_data_must_cover_every_subresource() {
        let limits = DeviceLimits::default();
        let traits = GraphicsBackendType::Vulkan.default_traits();
        let desc = TextureDescriptor::texture_2d("t", PixelFormat::Rgba8Unorm, 4, 4, TextureUsage::SHADER_READ)
            .with_mip_levels(3);
        // 64 + 16 + 4 bytes.
        let data = vec![0u8; 84];
        assert!(validate_descriptor(&desc, Some(&data), &limits, &traits, &all_features).is_ok());
        assert!(validate_descriptor(&desc, Some(&data[..80]), &limits, &traits, &all_features).is_err());
    }
}
