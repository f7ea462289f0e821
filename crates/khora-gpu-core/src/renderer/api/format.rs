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

//! Abstract pixel, vertex and index formats together with their layout tables.
//!
//! Every backend translates these enums into its native equivalent; the tables here
//! describe the memory layout that is common to all of them (block size, depth and
//! stencil planes, sRGB encoding) so the core can compute pitches and pick typeless
//! allocations without asking the backend.

use std::fmt;

/// The numeric interpretation of a format's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatKind {
    /// Unsigned normalized integer, read as `[0, 1]`.
    Unorm,
    /// Unsigned normalized integer stored with sRGB encoding.
    UnormSrgb,
    /// Signed normalized integer, read as `[-1, 1]`.
    Snorm,
    /// Unsigned integer.
    Uint,
    /// Signed integer.
    Sint,
    /// Floating point (including packed float formats).
    Float,
    /// Storage-only layout whose interpretation is chosen by the view.
    Typeless,
}

/// Layout description of a [`PixelFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Bytes per texel, or per 4x4 block for compressed formats.
    pub bytes_per_block: u32,
    /// Width of a block in texels (1 for uncompressed formats).
    pub block_width: u32,
    /// Height of a block in texels (1 for uncompressed formats).
    pub block_height: u32,
    /// Channel interpretation.
    pub kind: FormatKind,
    /// The format carries a depth plane.
    pub has_depth: bool,
    /// The format carries a stencil plane.
    pub has_stencil: bool,
}

impl FormatInfo {
    const fn plain(bytes_per_block: u32, kind: FormatKind) -> Self {
        Self {
            bytes_per_block,
            block_width: 1,
            block_height: 1,
            kind,
            has_depth: false,
            has_stencil: false,
        }
    }

    const fn depth_stencil(bytes_per_block: u32, kind: FormatKind, has_stencil: bool) -> Self {
        Self {
            bytes_per_block,
            block_width: 1,
            block_height: 1,
            kind,
            has_depth: true,
            has_stencil,
        }
    }

    const fn compressed(bytes_per_block: u32, kind: FormatKind) -> Self {
        Self {
            bytes_per_block,
            block_width: 4,
            block_height: 4,
            kind,
            has_depth: false,
            has_stencil: false,
        }
    }

    /// Returns `true` for block-compressed layouts.
    pub const fn is_compressed(&self) -> bool {
        self.block_width > 1 || self.block_height > 1
    }
}

/// A texel format for textures, render targets and swap chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum PixelFormat {
    #[default]
    Undefined,
    // 8-bit
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    // 16-bit
    R16Unorm,
    R16Snorm,
    R16Uint,
    R16Sint,
    R16Float,
    Rg8Unorm,
    Rg8Snorm,
    Rg8Uint,
    Rg8Sint,
    // Packed 16-bit
    B5G6R5Unorm,
    Bgr5A1Unorm,
    Bgra4Unorm,
    // 32-bit
    R32Uint,
    R32Sint,
    R32Float,
    Rg16Unorm,
    Rg16Snorm,
    Rg16Uint,
    Rg16Sint,
    Rg16Float,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    // Packed 32-bit
    Rgb9e5Ufloat,
    Rgb10a2Unorm,
    Rgb10a2Uint,
    Rg11b10Float,
    // 64-bit
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba16Unorm,
    Rgba16Snorm,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    // 128-bit
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    // Depth / stencil
    Stencil8,
    Depth16Unorm,
    Depth24UnormStencil8,
    Depth32Float,
    Depth32FloatStencil8,
    // Typeless storage behind sampled depth textures
    R16Typeless,
    R24G8Typeless,
    R32Typeless,
    R32G8X24Typeless,
    // Block compressed
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc2RgbaUnorm,
    Bc2RgbaUnormSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaUnormSrgb,
    Bc4RUnorm,
    Bc4RSnorm,
    Bc5RgUnorm,
    Bc5RgSnorm,
    Bc6hRgbUfloat,
    Bc6hRgbSfloat,
    Bc7RgbaUnorm,
    Bc7RgbaUnormSrgb,
}

impl PixelFormat {
    /// Returns the layout description of this format.
    pub const fn info(self) -> FormatInfo {
        use FormatKind::*;
        use PixelFormat as P;
        match self {
            P::Undefined => FormatInfo::plain(0, Typeless),
            P::R8Unorm => FormatInfo::plain(1, Unorm),
            P::R8Snorm => FormatInfo::plain(1, Snorm),
            P::R8Uint => FormatInfo::plain(1, Uint),
            P::R8Sint => FormatInfo::plain(1, Sint),
            P::R16Unorm | P::Rg8Unorm | P::B5G6R5Unorm | P::Bgr5A1Unorm | P::Bgra4Unorm => {
                FormatInfo::plain(2, Unorm)
            }
            P::R16Snorm | P::Rg8Snorm => FormatInfo::plain(2, Snorm),
            P::R16Uint | P::Rg8Uint => FormatInfo::plain(2, Uint),
            P::R16Sint | P::Rg8Sint => FormatInfo::plain(2, Sint),
            P::R16Float => FormatInfo::plain(2, Float),
            P::R32Uint | P::Rg16Uint | P::Rgba8Uint | P::Rgb10a2Uint => FormatInfo::plain(4, Uint),
            P::R32Sint | P::Rg16Sint | P::Rgba8Sint => FormatInfo::plain(4, Sint),
            P::R32Float | P::Rg16Float | P::Rgb9e5Ufloat | P::Rg11b10Float => {
                FormatInfo::plain(4, Float)
            }
            P::Rg16Unorm | P::Rgba8Unorm | P::Bgra8Unorm | P::Rgb10a2Unorm => {
                FormatInfo::plain(4, Unorm)
            }
            P::Rg16Snorm | P::Rgba8Snorm => FormatInfo::plain(4, Snorm),
            P::Rgba8UnormSrgb | P::Bgra8UnormSrgb => FormatInfo::plain(4, UnormSrgb),
            P::Rg32Uint | P::Rgba16Uint => FormatInfo::plain(8, Uint),
            P::Rg32Sint | P::Rgba16Sint => FormatInfo::plain(8, Sint),
            P::Rg32Float | P::Rgba16Float => FormatInfo::plain(8, Float),
            P::Rgba16Unorm => FormatInfo::plain(8, Unorm),
            P::Rgba16Snorm => FormatInfo::plain(8, Snorm),
            P::Rgba32Uint => FormatInfo::plain(16, Uint),
            P::Rgba32Sint => FormatInfo::plain(16, Sint),
            P::Rgba32Float => FormatInfo::plain(16, Float),
            P::Stencil8 => FormatInfo {
                has_depth: false,
                ..FormatInfo::depth_stencil(1, Uint, true)
            },
            P::Depth16Unorm => FormatInfo::depth_stencil(2, Unorm, false),
            P::Depth24UnormStencil8 => FormatInfo::depth_stencil(4, Unorm, true),
            P::Depth32Float => FormatInfo::depth_stencil(4, Float, false),
            P::Depth32FloatStencil8 => FormatInfo::depth_stencil(8, Float, true),
            P::R16Typeless => FormatInfo::plain(2, Typeless),
            P::R24G8Typeless | P::R32Typeless => FormatInfo::plain(4, Typeless),
            P::R32G8X24Typeless => FormatInfo::plain(8, Typeless),
            P::Bc1RgbaUnorm | P::Bc4RUnorm => FormatInfo::compressed(8, Unorm),
            P::Bc1RgbaUnormSrgb => FormatInfo::compressed(8, UnormSrgb),
            P::Bc4RSnorm => FormatInfo::compressed(8, Snorm),
            P::Bc2RgbaUnorm | P::Bc3RgbaUnorm | P::Bc5RgUnorm | P::Bc7RgbaUnorm => {
                FormatInfo::compressed(16, Unorm)
            }
            P::Bc2RgbaUnormSrgb | P::Bc3RgbaUnormSrgb | P::Bc7RgbaUnormSrgb => {
                FormatInfo::compressed(16, UnormSrgb)
            }
            P::Bc5RgSnorm => FormatInfo::compressed(16, Snorm),
            P::Bc6hRgbUfloat | P::Bc6hRgbSfloat => FormatInfo::compressed(16, Float),
        }
    }

    /// Returns `true` if the format has a depth or a stencil plane.
    pub const fn is_depth_stencil(self) -> bool {
        let info = self.info();
        info.has_depth || info.has_stencil
    }

    /// Returns `true` if the format has a depth plane.
    pub const fn has_depth(self) -> bool {
        self.info().has_depth
    }

    /// Returns `true` if the format has a stencil plane.
    pub const fn has_stencil(self) -> bool {
        self.info().has_stencil
    }

    /// Returns `true` if the texels are sRGB encoded.
    pub const fn is_srgb(self) -> bool {
        matches!(self.info().kind, FormatKind::UnormSrgb)
    }

    /// Returns `true` for block-compressed formats.
    pub const fn is_compressed(self) -> bool {
        self.info().is_compressed()
    }

    /// Returns the typeless storage format a depth texture must be allocated with so that
    /// both a depth-stencil view and a shader-readable view can alias it.
    ///
    /// Returns `None` for formats that are not depth formats.
    pub const fn typeless_depth_format(self) -> Option<PixelFormat> {
        match self {
            PixelFormat::Depth16Unorm => Some(PixelFormat::R16Typeless),
            PixelFormat::Depth24UnormStencil8 => Some(PixelFormat::R24G8Typeless),
            PixelFormat::Depth32Float => Some(PixelFormat::R32Typeless),
            PixelFormat::Depth32FloatStencil8 => Some(PixelFormat::R32G8X24Typeless),
            _ => None,
        }
    }

    /// Returns the color format used by shader views reading the depth plane, when one exists.
    pub const fn depth_sampling_format(self) -> Option<PixelFormat> {
        match self {
            PixelFormat::Depth16Unorm => Some(PixelFormat::R16Unorm),
            PixelFormat::Depth32Float | PixelFormat::Depth32FloatStencil8 => {
                Some(PixelFormat::R32Float)
            }
            _ => None,
        }
    }

    /// Returns the sRGB variant of this format, or itself when it has none.
    pub const fn to_srgb(self) -> PixelFormat {
        match self {
            PixelFormat::Rgba8Unorm => PixelFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm => PixelFormat::Bgra8UnormSrgb,
            PixelFormat::Bc1RgbaUnorm => PixelFormat::Bc1RgbaUnormSrgb,
            PixelFormat::Bc2RgbaUnorm => PixelFormat::Bc2RgbaUnormSrgb,
            PixelFormat::Bc3RgbaUnorm => PixelFormat::Bc3RgbaUnormSrgb,
            PixelFormat::Bc7RgbaUnorm => PixelFormat::Bc7RgbaUnormSrgb,
            other => other,
        }
    }

    /// Computes the tightly packed `(row_pitch, slice_pitch)` in bytes of a surface of
    /// `width` x `height` texels.
    pub const fn surface_pitch(self, width: u32, height: u32) -> (u64, u64) {
        let info = self.info();
        let blocks_wide = max1(width.div_ceil(info.block_width));
        let blocks_high = max1(height.div_ceil(info.block_height));
        let row_pitch = blocks_wide as u64 * info.bytes_per_block as u64;
        (row_pitch, row_pitch * blocks_high as u64)
    }
}

const fn max1(value: u32) -> u32 {
    if value == 0 {
        1
    } else {
        value
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The layout of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Sint8x2,
    Sint8x4,
    Unorm8x2,
    Unorm8x4,
    Snorm8x2,
    Snorm8x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Sint16x4,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Snorm16x4,
    Float16x2,
    Float16x4,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    Unorm10_10_10_2,
}

impl VertexFormat {
    /// Size of one attribute in bytes.
    pub const fn byte_size(self) -> u64 {
        use VertexFormat as V;
        match self {
            V::Uint8x2 | V::Sint8x2 | V::Unorm8x2 | V::Snorm8x2 => 2,
            V::Uint8x4 | V::Sint8x4 | V::Unorm8x4 | V::Snorm8x4 => 4,
            V::Uint16x2 | V::Sint16x2 | V::Unorm16x2 | V::Snorm16x2 | V::Float16x2 => 4,
            V::Uint16x4 | V::Sint16x4 | V::Unorm16x4 | V::Snorm16x4 | V::Float16x4 => 8,
            V::Float32 | V::Uint32 | V::Sint32 | V::Unorm10_10_10_2 => 4,
            V::Float32x2 | V::Uint32x2 | V::Sint32x2 => 8,
            V::Float32x3 | V::Uint32x3 | V::Sint32x3 => 12,
            V::Float32x4 | V::Uint32x4 | V::Sint32x4 => 16,
        }
    }

    /// Number of components in one attribute.
    pub const fn component_count(self) -> u32 {
        use VertexFormat as V;
        match self {
            V::Float32 | V::Uint32 | V::Sint32 => 1,
            V::Uint8x2
            | V::Sint8x2
            | V::Unorm8x2
            | V::Snorm8x2
            | V::Uint16x2
            | V::Sint16x2
            | V::Unorm16x2
            | V::Snorm16x2
            | V::Float16x2
            | V::Float32x2
            | V::Uint32x2
            | V::Sint32x2 => 2,
            V::Float32x3 | V::Uint32x3 | V::Sint32x3 => 3,
            _ => 4,
        }
    }
}

/// The element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn byte_size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats_have_typeless_storage() {
        for format in [
            PixelFormat::Depth16Unorm,
            PixelFormat::Depth24UnormStencil8,
            PixelFormat::Depth32Float,
            PixelFormat::Depth32FloatStencil8,
        ] {
            let typeless = format
                .typeless_depth_format()
                .expect("every depth format has a typeless twin");
            assert_eq!(typeless.info().kind, FormatKind::Typeless);
            assert_eq!(
                typeless.info().bytes_per_block,
                format.info().bytes_per_block,
                "typeless storage of {format} must have the same footprint"
            );
        }
        assert_eq!(PixelFormat::Rgba8Unorm.typeless_depth_format(), None);
    }

    #[test]
    fn test_depth_stencil_classification() {
        assert!(PixelFormat::Depth24UnormStencil8.has_stencil());
        assert!(!PixelFormat::Depth32Float.has_stencil());
        assert!(PixelFormat::Stencil8.is_depth_stencil());
        assert!(!PixelFormat::Stencil8.has_depth());
        assert!(!PixelFormat::R32Float.is_depth_stencil());
    }

    #[test]
    fn test_surface_pitch_uncompressed() {
        assert_eq!(PixelFormat::Rgba8Unorm.surface_pitch(64, 32), (256, 256 * 32));
        assert_eq!(PixelFormat::Rgba32Float.surface_pitch(3, 1), (48, 48));
    }

    #[test]
    fn test_surface_pitch_compressed_rounds_to_blocks() {
        // 10x6 texels is 3x2 blocks of 8 bytes.
        assert_eq!(PixelFormat::Bc1RgbaUnorm.surface_pitch(10, 6), (24, 48));
        // A 1x1 mip still occupies a whole block.
        assert_eq!(PixelFormat::Bc7RgbaUnorm.surface_pitch(1, 1), (16, 16));
    }

    #[test]
    fn test_srgb_helpers() {
        assert!(PixelFormat::Bgra8UnormSrgb.is_srgb());
        assert_eq!(PixelFormat::Bgra8Unorm.to_srgb(), PixelFormat::Bgra8UnormSrgb);
        assert_eq!(PixelFormat::R8Unorm.to_srgb(), PixelFormat::R8Unorm);
    }

    #[test]
    fn test_vertex_format_sizes() {
        assert_eq!(VertexFormat::Float32x3.byte_size(), 12);
        assert_eq!(VertexFormat::Unorm8x4.byte_size(), 4);
        assert_eq!(VertexFormat::Float16x2.component_count(), 2);
        assert_eq!(IndexFormat::Uint16.byte_size(), 2);
    }
}
