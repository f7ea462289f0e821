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

//! CPU storage of the software device's objects.

use khora_gpu_core::renderer::api::{
    mip_extent, Color, CpuAccessMode, NativeHandle, PixelFormat, PresentMode, QueryType, ResourceKind,
    TextureAllocation, TextureDataLayout, TextureDescriptor, TextureRegion,
};

/// A texture's descriptor and its texels, stored layer by layer with mips largest
/// first.
#[derive(Debug, Clone)]
pub(crate) struct TextureStorage {
    pub(crate) descriptor: TextureDescriptor<'static>,
    pub(crate) allocation: TextureAllocation,
    pub(crate) data: Vec<u8>,
    /// Set for swap chain backbuffers, which the swap chain owns.
    pub(crate) backbuffer: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SwapChainStorage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: PixelFormat,
    pub(crate) present_mode: PresentMode,
    pub(crate) buffers: Vec<NativeHandle>,
    pub(crate) next: usize,
    pub(crate) acquired: Option<usize>,
    pub(crate) presents: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum SoftwareObject {
    Buffer {
        data: Vec<u8>,
        cpu_access: CpuAccessMode,
    },
    Texture(TextureStorage),
    Sampler,
    BindGroupLayout,
    BindGroup,
    PipelineLayout,
    RenderPipeline,
    ComputePipeline,
    QueryHeap {
        ty: QueryType,
        results: Vec<u64>,
    },
    SwapChain(SwapChainStorage),
}

impl SoftwareObject {
    pub(crate) fn kind(&self) -> ResourceKind {
        match self {
            SoftwareObject::Buffer { .. } => ResourceKind::Buffer,
            SoftwareObject::Texture(_) => ResourceKind::Texture,
            SoftwareObject::Sampler => ResourceKind::Sampler,
            SoftwareObject::BindGroupLayout => ResourceKind::BindGroupLayout,
            SoftwareObject::BindGroup => ResourceKind::BindGroup,
            SoftwareObject::PipelineLayout => ResourceKind::PipelineLayout,
            SoftwareObject::RenderPipeline => ResourceKind::RenderPipeline,
            SoftwareObject::ComputePipeline => ResourceKind::ComputePipeline,
            SoftwareObject::QueryHeap { .. } => ResourceKind::QueryHeap,
            SoftwareObject::SwapChain(_) => ResourceKind::SwapChain,
        }
    }
}

fn unorm8(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn linear_to_srgb(value: f64) -> f64 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Encodes one texel of a clear color, or `None` for formats the software device
/// cannot clear.
pub(crate) fn encode_clear_color(format: PixelFormat, color: Color) -> Option<Vec<u8>> {
    let srgb = |c: f64| unorm8(linear_to_srgb(c));
    let floats = |channels: &[f64]| {
        channels
            .iter()
            .flat_map(|c| (*c as f32).to_le_bytes())
            .collect::<Vec<u8>>()
    };
    let texel = match format {
        PixelFormat::R8Unorm => vec![unorm8(color.r)],
        PixelFormat::Rg8Unorm => vec![unorm8(color.r), unorm8(color.g)],
        PixelFormat::Rgba8Unorm => vec![
            unorm8(color.r),
            unorm8(color.g),
            unorm8(color.b),
            unorm8(color.a),
        ],
        PixelFormat::Rgba8UnormSrgb => {
            vec![srgb(color.r), srgb(color.g), srgb(color.b), unorm8(color.a)]
        }
        PixelFormat::Bgra8Unorm => vec![
            unorm8(color.b),
            unorm8(color.g),
            unorm8(color.r),
            unorm8(color.a),
        ],
        PixelFormat::Bgra8UnormSrgb => {
            vec![srgb(color.b), srgb(color.g), srgb(color.r), unorm8(color.a)]
        }
        PixelFormat::R32Float => floats(&[color.r]),
        PixelFormat::Rg32Float => floats(&[color.r, color.g]),
        PixelFormat::Rgba32Float => floats(&[color.r, color.g, color.b, color.a]),
        _ => return None,
    };
    Some(texel)
}

/// Encodes one texel of a depth-stencil clear. `depth` and `stencil` are `None` when the
/// plane is loaded instead of cleared; the returned mask marks the bytes to write.
pub(crate) fn encode_clear_depth_stencil(
    format: PixelFormat,
    depth: Option<f32>,
    stencil: Option<u32>,
) -> Option<(Vec<u8>, Vec<bool>)> {
    let depth = depth.map(|d| d.clamp(0.0, 1.0));
    let stencil = stencil.map(|s| s as u8);
    match format {
        PixelFormat::Depth32Float => depth.map(|d| (d.to_le_bytes().to_vec(), vec![true; 4])),
        PixelFormat::Depth16Unorm => depth.map(|d| {
            let value = (d * f32::from(u16::MAX)).round() as u16;
            (value.to_le_bytes().to_vec(), vec![true; 2])
        }),
        PixelFormat::Stencil8 => stencil.map(|s| (vec![s], vec![true])),
        PixelFormat::Depth24UnormStencil8 => {
            let d = depth.map(|d| (d as f64 * f64::from(0x00ff_ffff)).round() as u32);
            let packed = d.unwrap_or(0) | (u32::from(stencil.unwrap_or(0)) << 24);
            let mask = [d.is_some(), d.is_some(), d.is_some(), stencil.is_some()];
            Some((packed.to_le_bytes().to_vec(), mask.to_vec()))
        }
        PixelFormat::Depth32FloatStencil8 => {
            let mut texel = depth.unwrap_or(0.0).to_le_bytes().to_vec();
            texel.extend_from_slice(&[stencil.unwrap_or(0), 0, 0, 0]);
            let mut mask = vec![depth.is_some(); 4];
            mask.extend_from_slice(&[stencil.is_some(), false, false, false]);
            Some((texel, mask))
        }
        _ => None,
    }
}

/// Fills every texel of `data` with `texel`, writing only the bytes set in `mask`.
pub(crate) fn fill_texels(data: &mut [u8], texel: &[u8], mask: Option<&[bool]>) {
    if texel.is_empty() {
        return;
    }
    for chunk in data.chunks_exact_mut(texel.len()) {
        match mask {
            Some(mask) => {
                for ((dst, src), write) in chunk.iter_mut().zip(texel).zip(mask) {
                    if *write {
                        *dst = *src;
                    }
                }
            }
            None => chunk.copy_from_slice(texel),
        }
    }
}

/// Byte offset of a mip level of one layer inside a texture's storage.
pub(crate) fn subresource_offset(descriptor: &TextureDescriptor<'_>, layer: u32, mip_level: u32) -> u64 {
    let per_layer: u64 = (0..descriptor.mip_level_count)
        .map(|mip| descriptor.subresource_size(mip))
        .sum();
    let before: u64 = (0..mip_level)
        .map(|mip| descriptor.subresource_size(mip))
        .sum();
    u64::from(layer) * per_layer + before
}

/// Copies rows of texel blocks from `source` into a texture region. Returns the number
/// of bytes written, or `None` if either side is too small.
pub(crate) fn copy_into_texture(
    texture: &mut TextureStorage,
    source: &[u8],
    layout: &TextureDataLayout,
    region: &TextureRegion,
) -> Option<u64> {
    let descriptor = &texture.descriptor;
    let info = descriptor.format.info();
    let (mip_width, mip_height, _) = mip_extent(
        descriptor.width,
        descriptor.height,
        descriptor.depth(),
        region.mip_level,
    );
    let (mip_row_pitch, mip_slice_pitch) = descriptor.format.surface_pitch(mip_width, mip_height);

    let block_rows = region.extent[1].div_ceil(info.block_height) as u64;
    let row_bytes = region.extent[0].div_ceil(info.block_width) as u64 * u64::from(info.bytes_per_block);
    let rows_per_image = if layout.rows_per_image == 0 {
        block_rows
    } else {
        u64::from(layout.rows_per_image)
    };
    let origin_x = u64::from(region.origin[0] / info.block_width) * u64::from(info.bytes_per_block);
    let origin_y = u64::from(region.origin[1] / info.block_height);
    let is_volume = descriptor.depth() > 1;

    let mut written = 0;
    for z in 0..region.extent[2] {
        let slice = region.origin[2] + z;
        let (layer, depth_slice) = if is_volume { (0, slice) } else { (slice, 0) };
        let base = subresource_offset(descriptor, layer, region.mip_level)
            + u64::from(depth_slice) * mip_slice_pitch;

        for row in 0..block_rows {
            let src = layout.offset
                + u64::from(z) * rows_per_image * u64::from(layout.bytes_per_row)
                + row * u64::from(layout.bytes_per_row);
            let dst = base + (origin_y + row) * mip_row_pitch + origin_x;

            let src_range = src as usize..(src + row_bytes) as usize;
            let dst_range = dst as usize..(dst + row_bytes) as usize;
            let bytes = source.get(src_range)?;
            texture.data.get_mut(dst_range)?.copy_from_slice(bytes);
            written += row_bytes;
        }
    }
    Some(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use khora_gpu_core::renderer::api::TextureUsage;

    fn storage(descriptor: TextureDescriptor<'static>) -> TextureStorage {
        let size = descriptor.total_size() as usize;
        TextureStorage {
            allocation: TextureAllocation {
                storage_format: descriptor.format,
                shader_view_format: descriptor.format,
                typeless: false,
            },
            descriptor,
            data: vec![0; size],
            backbuffer: false,
        }
    }

    #[test]
    fn test_clear_color_encoding() {
        let red = Color::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(encode_clear_color(PixelFormat::Rgba8Unorm, red), Some(vec![255, 0, 0, 255]));
        assert_eq!(encode_clear_color(PixelFormat::Bgra8Unorm, red), Some(vec![0, 0, 255, 255]));
        assert_eq!(
            encode_clear_color(PixelFormat::R32Float, Color::new(0.5, 0.0, 0.0, 0.0)),
            Some(0.5f32.to_le_bytes().to_vec())
        );
        assert_eq!(encode_clear_color(PixelFormat::Bc1RgbaUnorm, red), None);

        let grey = encode_clear_color(PixelFormat::Rgba8UnormSrgb, Color::new(0.5, 0.5, 0.5, 0.5))
            .unwrap();
        assert_eq!(grey[0], 188);
        assert_eq!(grey[3], 128);
    }

    #[test]
    fn test_stencil_only_clear_keeps_depth() {
        let (texel, mask) =
            encode_clear_depth_stencil(PixelFormat::Depth24UnormStencil8, None, Some(7)).unwrap();
        let mut data = vec![0xAA; 8];
        fill_texels(&mut data, &texel, Some(&mask));
        assert_eq!(data, vec![0xAA, 0xAA, 0xAA, 7, 0xAA, 0xAA, 0xAA, 7]);
    }

    #[test]
    fn test_subresource_offsets_are_layer_major() {
        let mut descriptor =
            TextureDescriptor::texture_2d("t", PixelFormat::Rgba8Unorm, 4, 4, TextureUsage::COPY_DST)
                .with_mip_levels(2);
        descriptor.depth_or_array_layers = 2;
        assert_eq!(subresource_offset(&descriptor, 0, 0), 0);
        assert_eq!(subresource_offset(&descriptor, 0, 1), 64);
        assert_eq!(subresource_offset(&descriptor, 1, 0), 80);
        assert_eq!(subresource_offset(&descriptor, 1, 1), 144);
    }

    #[test]
    fn test_copy_into_texture_region() {
        let descriptor =
            TextureDescriptor::texture_2d("t", PixelFormat::R8Unorm, 4, 4, TextureUsage::COPY_DST)
                .into_owned();
        let mut texture = storage(descriptor);
        let source = [1u8, 2, 3, 4];
        let layout = TextureDataLayout {
            offset: 0,
            bytes_per_row: 2,
            rows_per_image: 0,
        };
        let region = TextureRegion {
            mip_level: 0,
            origin: [1, 2, 0],
            extent: [2, 2, 1],
        };

        assert_eq!(copy_into_texture(&mut texture, &source, &layout, &region), Some(4));
        assert_eq!(&texture.data[8..12], &[0, 1, 2, 0]);
        assert_eq!(&texture.data[12..16], &[0, 3, 4, 0]);

        assert_eq!(copy_into_texture(&mut texture, &source[..3], &layout, &region), None);
    }
}
