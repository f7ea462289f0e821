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

//! Texture and sampler descriptors.

use std::borrow::Cow;

use super::format::PixelFormat;
use crate::gpu_bitflags;

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureDimension {
    /// One-dimensional texture (or array).
    D1,
    /// Two-dimensional texture (or array).
    #[default]
    D2,
    /// Three-dimensional volume.
    D3,
    /// Cube map; array layers are a multiple of six.
    Cube,
}

gpu_bitflags! {
    /// How a texture may be used by the GPU.
    pub struct TextureUsage: u32 {
        /// Source of copy operations.
        const COPY_SRC = 1 << 0;
        /// Destination of copy operations and CPU uploads.
        const COPY_DST = 1 << 1;
        /// Sampled or loaded in shaders.
        const SHADER_READ = 1 << 2;
        /// Written as a storage texture.
        const SHADER_WRITE = 1 << 3;
        /// Color or depth-stencil attachment.
        const RENDER_TARGET = 1 << 4;
    }
}

/// Creation parameters of a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Texel format as seen by views.
    pub format: PixelFormat,
    /// Width in texels.
    pub width: u32,
    /// Height in texels (1 for 1D textures).
    pub height: u32,
    /// Depth for 3D textures, array layer count otherwise.
    pub depth_or_array_layers: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Samples per texel.
    pub sample_count: u32,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl<'a> TextureDescriptor<'a> {
    /// A single-sample 2D texture with one mip level.
    pub fn texture_2d(
        label: &'a str,
        format: PixelFormat,
        width: u32,
        height: u32,
        usage: TextureUsage,
    ) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            dimension: TextureDimension::D2,
            format,
            width,
            height,
            depth_or_array_layers: 1,
            mip_level_count: 1,
            sample_count: 1,
            usage,
        }
    }

    /// A cube map with six faces.
    pub fn texture_cube(label: &'a str, format: PixelFormat, size: u32, mip_level_count: u32) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            dimension: TextureDimension::Cube,
            format,
            width: size,
            height: size,
            depth_or_array_layers: 6,
            mip_level_count,
            sample_count: 1,
            usage: TextureUsage::SHADER_READ | TextureUsage::COPY_DST,
        }
    }

    /// A depth-stencil render target, optionally readable from shaders.
    pub fn depth_stencil(
        label: &'a str,
        format: PixelFormat,
        width: u32,
        height: u32,
        sampled: bool,
    ) -> Self {
        let mut usage = TextureUsage::RENDER_TARGET;
        if sampled {
            usage |= TextureUsage::SHADER_READ;
        }
        Self::texture_2d(label, format, width, height, usage)
    }

    /// Sets the mip level count.
    pub fn with_mip_levels(mut self, mip_level_count: u32) -> Self {
        self.mip_level_count = mip_level_count;
        self
    }

    /// Number of array layers (1 for 3D textures).
    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.depth_or_array_layers,
        }
    }

    /// Depth of a mip level 0 slice (1 unless 3D).
    pub fn depth(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => self.depth_or_array_layers,
            _ => 1,
        }
    }

    /// Size in bytes of one mip level of one array layer, tightly packed.
    pub fn subresource_size(&self, mip_level: u32) -> u64 {
        let (width, height, depth) = mip_extent(self.width, self.height, self.depth(), mip_level);
        let (_, slice_pitch) = self.format.surface_pitch(width, height);
        slice_pitch * depth as u64
    }

    /// Total tightly packed size of every mip of every layer.
    ///
    /// Initial data is laid out layer by layer, each layer holding its mips from
    /// largest to smallest.
    pub fn total_size(&self) -> u64 {
        let per_layer: u64 = (0..self.mip_level_count)
            .map(|mip| self.subresource_size(mip))
            .sum();
        per_layer * self.array_layers() as u64
    }

    /// Returns a descriptor that owns its label.
    pub fn into_owned(self) -> TextureDescriptor<'static> {
        TextureDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            dimension: self.dimension,
            format: self.format,
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
            mip_level_count: self.mip_level_count,
            sample_count: self.sample_count,
            usage: self.usage,
        }
    }
}

/// Returns the extent of `mip_level` for a texture of the given base size.
pub fn mip_extent(width: u32, height: u32, depth: u32, mip_level: u32) -> (u32, u32, u32) {
    (
        (width >> mip_level).max(1),
        (height >> mip_level).max(1),
        (depth >> mip_level).max(1),
    )
}

/// Number of mips in a full chain for the largest of the given dimensions.
pub fn max_mip_levels(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    u32::BITS - largest.leading_zeros()
}

/// How the backend must allocate a texture's storage.
///
/// Resolved by the device from the descriptor and the backend's traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureAllocation {
    /// Format of the underlying memory.
    pub storage_format: PixelFormat,
    /// Format of the default shader-readable view.
    pub shader_view_format: PixelFormat,
    /// The storage is typeless so depth and shader views can alias it.
    pub typeless: bool,
}

/// Layout of texel data inside a buffer, used by buffer-to-texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureDataLayout {
    /// Byte offset of the first texel.
    pub offset: u64,
    /// Bytes between rows of blocks.
    pub bytes_per_row: u32,
    /// Rows per 2D image, used by 3D and array copies.
    pub rows_per_image: u32,
}

/// A box inside one mip level of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    /// Mip level.
    pub mip_level: u32,
    /// Texel origin (x, y, z or array layer).
    pub origin: [u32; 3],
    /// Extent in texels (width, height, depth or layer count).
    pub extent: [u32; 3],
}

/// How a sampler addresses coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
    ClampToBorder,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Comparison used by depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Color returned for [`AddressMode::ClampToBorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Creation parameters of a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Addressing along U.
    pub address_mode_u: AddressMode,
    /// Addressing along V.
    pub address_mode_v: AddressMode,
    /// Addressing along W.
    pub address_mode_w: AddressMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Filter between mip levels.
    pub mipmap_filter: FilterMode,
    /// Smallest LOD.
    pub lod_min_clamp: f32,
    /// Largest LOD.
    pub lod_max_clamp: f32,
    /// Turns the sampler into a comparison sampler.
    pub compare: Option<CompareFunction>,
    /// Anisotropic filtering level, 1 disables it.
    pub max_anisotropy: u16,
    /// Border color for [`AddressMode::ClampToBorder`].
    pub border_color: BorderColor,
}

impl Default for SamplerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            max_anisotropy: 1,
            border_color: BorderColor::TransparentBlack,
        }
    }
}

impl SamplerDescriptor<'_> {
    /// Returns a descriptor that owns its label.
    pub fn into_owned(self) -> SamplerDescriptor<'static> {
        SamplerDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            address_mode_u: self.address_mode_u,
            address_mode_v: self.address_mode_v,
            address_mode_w: self.address_mode_w,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            lod_min_clamp: self.lod_min_clamp,
            lod_max_clamp: self.lod_max_clamp,
            compare: self.compare,
            max_anisotropy: self.max_anisotropy,
            border_color: self.border_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_mip_levels() {
        assert_eq!(max_mip_levels(1, 1, 1), 1);
        assert_eq!(max_mip_levels(256, 256, 1), 9);
        assert_eq!(max_mip_levels(300, 20, 1), 9);
    }

    #[test]
    fn test_total_size_covers_mips_and_layers() {
        let desc = TextureDescriptor {
            depth_or_array_layers: 2,
            ..TextureDescriptor::texture_2d(
                "atlas",
                PixelFormat::Rgba8Unorm,
                4,
                4,
                TextureUsage::SHADER_READ,
            )
            .with_mip_levels(3)
        };
        // 4x4 + 2x2 + 1x1 texels of 4 bytes, for two layers.
        assert_eq!(desc.total_size(), (64 + 16 + 4) * 2);
    }

    #[test]
    fn test_volume_depth_is_not_array_layers() {
        let desc = TextureDescriptor {
            dimension: TextureDimension::D3,
            depth_or_array_layers: 8,
            ..TextureDescriptor::texture_2d("volume", PixelFormat::R8Unorm, 8, 8, TextureUsage::SHADER_READ)
        };
        assert_eq!(desc.array_layers(), 1);
        assert_eq!(desc.depth(), 8);
        assert_eq!(desc.subresource_size(1), 4 * 4 * 4);
    }
}
