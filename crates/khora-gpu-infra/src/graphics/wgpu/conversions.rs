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

//! Conversions between `khora-gpu-core` descriptors and their wgpu equivalents.

use std::num::NonZeroU64;

use khora_gpu_core::renderer::api::{
    AdapterInfo, AdapterType, AddressMode, BindingType, BlendComponent, BlendFactor,
    BlendOperation, BlendState, BorderColor, BufferUsage, Color, ColorTargetState, ColorWrites,
    CompareFunction, CpuAccessMode, CullMode, DeviceLimits, Feature, FilterMode, FrontFace,
    GraphicsBackendType, IndexFormat, LoadAction, PixelFormat, PolygonMode, PowerPreference,
    PresentMode, PrimitiveState, PrimitiveTopology, QueryType, SamplerBindingType,
    ShaderStageFlags, StencilFaceState, StencilOperation, StorageTextureAccess, StoreAction,
    TextureDimension, TextureSampleType, TextureUsage, TextureViewDimension, VertexFormat,
    VertexStepMode,
};

/// Converts a core type into its wgpu counterpart.
///
/// A local trait sidesteps the orphan rule while keeping `.into_wgpu()` call sites.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a wgpu type.
    fn into_wgpu(self) -> T;
}

// --- Backends ---

/// The wgpu backend bit serving `backend`, or `None` when wgpu has no such backend.
pub fn backend_bits(backend: GraphicsBackendType) -> Option<wgpu::Backends> {
    match backend {
        GraphicsBackendType::Vulkan => Some(wgpu::Backends::VULKAN),
        GraphicsBackendType::Dx12 => Some(wgpu::Backends::DX12),
        GraphicsBackendType::Metal => Some(wgpu::Backends::METAL),
        GraphicsBackendType::OpenGL => Some(wgpu::Backends::GL),
        GraphicsBackendType::WebGpu => Some(wgpu::Backends::BROWSER_WEBGPU),
        GraphicsBackendType::Dx11 | GraphicsBackendType::Software => None,
    }
}

/// The backend kind of a wgpu adapter.
pub fn from_wgpu_backend(backend: wgpu::Backend) -> Option<GraphicsBackendType> {
    match backend {
        wgpu::Backend::Vulkan => Some(GraphicsBackendType::Vulkan),
        wgpu::Backend::Dx12 => Some(GraphicsBackendType::Dx12),
        wgpu::Backend::Metal => Some(GraphicsBackendType::Metal),
        wgpu::Backend::Gl => Some(GraphicsBackendType::OpenGL),
        wgpu::Backend::BrowserWebGpu => Some(GraphicsBackendType::WebGpu),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Describes a wgpu adapter.
pub fn adapter_info(info: &wgpu::AdapterInfo) -> AdapterInfo {
    let adapter_type = match info.device_type {
        wgpu::DeviceType::IntegratedGpu => AdapterType::IntegratedGpu,
        wgpu::DeviceType::DiscreteGpu => AdapterType::DiscreteGpu,
        wgpu::DeviceType::VirtualGpu => AdapterType::VirtualGpu,
        wgpu::DeviceType::Cpu => AdapterType::Cpu,
        wgpu::DeviceType::Other => AdapterType::Unknown,
    };
    let driver_description = if info.driver_info.is_empty() {
        info.driver.clone()
    } else {
        format!("{} {}", info.driver, info.driver_info)
    };
    AdapterInfo {
        name: info.name.clone(),
        vendor_id: info.vendor,
        device_id: info.device,
        adapter_type,
        backend: from_wgpu_backend(info.backend),
        driver_description,
    }
}

impl IntoWgpu<wgpu::PowerPreference> for PowerPreference {
    fn into_wgpu(self) -> wgpu::PowerPreference {
        match self {
            PowerPreference::Default => wgpu::PowerPreference::None,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

// --- Capabilities ---

/// The wgpu features backing a core feature; empty when wgpu cannot expose it.
pub fn feature_bits(feature: Feature) -> wgpu::Features {
    match feature {
        // Queries are written straight into encoders as well as passes.
        Feature::TimestampQuery => {
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
        }
        Feature::PipelineStatisticsQuery => wgpu::Features::PIPELINE_STATISTICS_QUERY,
        Feature::DepthClipControl => wgpu::Features::DEPTH_CLIP_CONTROL,
        Feature::Depth32FloatStencil8 => wgpu::Features::DEPTH32FLOAT_STENCIL8,
        Feature::TextureCompressionBc => wgpu::Features::TEXTURE_COMPRESSION_BC,
        Feature::TextureCompressionEtc2 => wgpu::Features::TEXTURE_COMPRESSION_ETC2,
        Feature::TextureCompressionAstc => wgpu::Features::TEXTURE_COMPRESSION_ASTC,
        Feature::IndirectFirstInstance => wgpu::Features::INDIRECT_FIRST_INSTANCE,
        Feature::ShaderFloat16 => wgpu::Features::SHADER_F16,
        Feature::PushConstants => wgpu::Features::PUSH_CONSTANTS,
        Feature::ConservativeRasterization => wgpu::Features::CONSERVATIVE_RASTERIZATION,
        Feature::MeshShader | Feature::RayTracing | Feature::SamplerMinMax => {
            wgpu::Features::empty()
        }
    }
}

/// Every core feature the adapter can provide, as wgpu bits to request at device creation.
pub fn requestable_features(available: wgpu::Features) -> wgpu::Features {
    ALL_FEATURES
        .iter()
        .map(|feature| feature_bits(*feature))
        .filter(|bits| !bits.is_empty() && available.contains(*bits))
        .fold(wgpu::Features::empty(), |acc, bits| acc | bits)
}

/// Returns `true` if the enabled wgpu features cover `feature`.
pub fn has_feature(enabled: wgpu::Features, feature: Feature) -> bool {
    let bits = feature_bits(feature);
    !bits.is_empty() && enabled.contains(bits)
}

const ALL_FEATURES: [Feature; 14] = [
    Feature::TimestampQuery,
    Feature::PipelineStatisticsQuery,
    Feature::DepthClipControl,
    Feature::Depth32FloatStencil8,
    Feature::TextureCompressionBc,
    Feature::TextureCompressionEtc2,
    Feature::TextureCompressionAstc,
    Feature::IndirectFirstInstance,
    Feature::ShaderFloat16,
    Feature::PushConstants,
    Feature::MeshShader,
    Feature::RayTracing,
    Feature::SamplerMinMax,
    Feature::ConservativeRasterization,
];

/// Reports wgpu limits through the core's limit table.
pub fn device_limits(limits: &wgpu::Limits) -> DeviceLimits {
    DeviceLimits {
        max_texture_dimension_1d: limits.max_texture_dimension_1d,
        max_texture_dimension_2d: limits.max_texture_dimension_2d,
        max_texture_dimension_3d: limits.max_texture_dimension_3d,
        max_texture_dimension_cube: limits.max_texture_dimension_2d,
        max_texture_array_layers: limits.max_texture_array_layers,
        max_bind_groups: limits.max_bind_groups,
        max_bindings_per_bind_group: limits.max_bindings_per_bind_group,
        max_dynamic_constant_buffers_per_pipeline_layout: limits
            .max_dynamic_uniform_buffers_per_pipeline_layout,
        max_constant_buffer_binding_size: u64::from(limits.max_uniform_buffer_binding_size),
        max_storage_buffer_binding_size: u64::from(limits.max_storage_buffer_binding_size),
        min_constant_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
        max_vertex_buffers: limits.max_vertex_buffers,
        max_vertex_attributes: limits.max_vertex_attributes,
        max_vertex_buffer_array_stride: limits.max_vertex_buffer_array_stride,
        max_push_constant_size: limits.max_push_constant_size,
        max_color_attachments: limits.max_color_attachments,
        max_compute_workgroup_storage_size: limits.max_compute_workgroup_storage_size,
        max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
        max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
        max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
        max_compute_workgroup_size_z: limits.max_compute_workgroup_size_z,
        max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        max_buffer_size: limits.max_buffer_size,
    }
}

// --- Formats ---

/// The wgpu format of a core pixel format. Typeless and 16-bit packed formats have no
/// wgpu equivalent.
pub fn texture_format(format: PixelFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as W;
    use PixelFormat as P;
    let format = match format {
        P::R8Unorm => W::R8Unorm,
        P::R8Snorm => W::R8Snorm,
        P::R8Uint => W::R8Uint,
        P::R8Sint => W::R8Sint,
        P::R16Unorm => W::R16Unorm,
        P::R16Snorm => W::R16Snorm,
        P::R16Uint => W::R16Uint,
        P::R16Sint => W::R16Sint,
        P::R16Float => W::R16Float,
        P::Rg8Unorm => W::Rg8Unorm,
        P::Rg8Snorm => W::Rg8Snorm,
        P::Rg8Uint => W::Rg8Uint,
        P::Rg8Sint => W::Rg8Sint,
        P::R32Uint => W::R32Uint,
        P::R32Sint => W::R32Sint,
        P::R32Float => W::R32Float,
        P::Rg16Unorm => W::Rg16Unorm,
        P::Rg16Snorm => W::Rg16Snorm,
        P::Rg16Uint => W::Rg16Uint,
        P::Rg16Sint => W::Rg16Sint,
        P::Rg16Float => W::Rg16Float,
        P::Rgba8Unorm => W::Rgba8Unorm,
        P::Rgba8UnormSrgb => W::Rgba8UnormSrgb,
        P::Rgba8Snorm => W::Rgba8Snorm,
        P::Rgba8Uint => W::Rgba8Uint,
        P::Rgba8Sint => W::Rgba8Sint,
        P::Bgra8Unorm => W::Bgra8Unorm,
        P::Bgra8UnormSrgb => W::Bgra8UnormSrgb,
        P::Rgb9e5Ufloat => W::Rgb9e5Ufloat,
        P::Rgb10a2Unorm => W::Rgb10a2Unorm,
        P::Rgb10a2Uint => W::Rgb10a2Uint,
        P::Rg11b10Float => W::Rg11b10Ufloat,
        P::Rg32Uint => W::Rg32Uint,
        P::Rg32Sint => W::Rg32Sint,
        P::Rg32Float => W::Rg32Float,
        P::Rgba16Unorm => W::Rgba16Unorm,
        P::Rgba16Snorm => W::Rgba16Snorm,
        P::Rgba16Uint => W::Rgba16Uint,
        P::Rgba16Sint => W::Rgba16Sint,
        P::Rgba16Float => W::Rgba16Float,
        P::Rgba32Uint => W::Rgba32Uint,
        P::Rgba32Sint => W::Rgba32Sint,
        P::Rgba32Float => W::Rgba32Float,
        P::Stencil8 => W::Stencil8,
        P::Depth16Unorm => W::Depth16Unorm,
        P::Depth24UnormStencil8 => W::Depth24PlusStencil8,
        P::Depth32Float => W::Depth32Float,
        P::Depth32FloatStencil8 => W::Depth32FloatStencil8,
        P::Bc1RgbaUnorm => W::Bc1RgbaUnorm,
        P::Bc1RgbaUnormSrgb => W::Bc1RgbaUnormSrgb,
        P::Bc2RgbaUnorm => W::Bc2RgbaUnorm,
        P::Bc2RgbaUnormSrgb => W::Bc2RgbaUnormSrgb,
        P::Bc3RgbaUnorm => W::Bc3RgbaUnorm,
        P::Bc3RgbaUnormSrgb => W::Bc3RgbaUnormSrgb,
        P::Bc4RUnorm => W::Bc4RUnorm,
        P::Bc4RSnorm => W::Bc4RSnorm,
        P::Bc5RgUnorm => W::Bc5RgUnorm,
        P::Bc5RgSnorm => W::Bc5RgSnorm,
        P::Bc6hRgbUfloat => W::Bc6hRgbUfloat,
        P::Bc6hRgbSfloat => W::Bc6hRgbFloat,
        P::Bc7RgbaUnorm => W::Bc7RgbaUnorm,
        P::Bc7RgbaUnormSrgb => W::Bc7RgbaUnormSrgb,
        P::Undefined
        | P::B5G6R5Unorm
        | P::Bgr5A1Unorm
        | P::Bgra4Unorm
        | P::R16Typeless
        | P::R24G8Typeless
        | P::R32Typeless
        | P::R32G8X24Typeless => return None,
    };
    Some(format)
}

/// The core format of a wgpu format, [`PixelFormat::Undefined`] when it has none.
pub fn from_wgpu_texture_format(format: wgpu::TextureFormat) -> PixelFormat {
    use wgpu::TextureFormat as W;
    use PixelFormat as P;
    match format {
        W::Rgba8Unorm => P::Rgba8Unorm,
        W::Rgba8UnormSrgb => P::Rgba8UnormSrgb,
        W::Bgra8Unorm => P::Bgra8Unorm,
        W::Bgra8UnormSrgb => P::Bgra8UnormSrgb,
        W::Rgb10a2Unorm => P::Rgb10a2Unorm,
        W::Rgba16Float => P::Rgba16Float,
        W::Rgba32Float => P::Rgba32Float,
        W::Depth32Float => P::Depth32Float,
        W::Depth24Plus | W::Depth24PlusStencil8 => P::Depth24UnormStencil8,
        _ => P::Undefined,
    }
}

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        use wgpu::VertexFormat as W;
        use VertexFormat as V;
        match self {
            V::Uint8x2 => W::Uint8x2,
            V::Uint8x4 => W::Uint8x4,
            V::Sint8x2 => W::Sint8x2,
            V::Sint8x4 => W::Sint8x4,
            V::Unorm8x2 => W::Unorm8x2,
            V::Unorm8x4 => W::Unorm8x4,
            V::Snorm8x2 => W::Snorm8x2,
            V::Snorm8x4 => W::Snorm8x4,
            V::Uint16x2 => W::Uint16x2,
            V::Uint16x4 => W::Uint16x4,
            V::Sint16x2 => W::Sint16x2,
            V::Sint16x4 => W::Sint16x4,
            V::Unorm16x2 => W::Unorm16x2,
            V::Unorm16x4 => W::Unorm16x4,
            V::Snorm16x2 => W::Snorm16x2,
            V::Snorm16x4 => W::Snorm16x4,
            V::Float16x2 => W::Float16x2,
            V::Float16x4 => W::Float16x4,
            V::Float32 => W::Float32,
            V::Float32x2 => W::Float32x2,
            V::Float32x3 => W::Float32x3,
            V::Float32x4 => W::Float32x4,
            V::Uint32 => W::Uint32,
            V::Uint32x2 => W::Uint32x2,
            V::Uint32x3 => W::Uint32x3,
            V::Uint32x4 => W::Uint32x4,
            V::Sint32 => W::Sint32,
            V::Sint32x2 => W::Sint32x2,
            V::Sint32x3 => W::Sint32x3,
            V::Sint32x4 => W::Sint32x4,
            V::Unorm10_10_10_2 => W::Unorm10_10_10_2,
        }
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

// --- Usages ---

/// wgpu usages of a buffer. CPU-visible buffers get the copy usage their staging path
/// needs.
pub fn buffer_usages(usage: BufferUsage, cpu_access: CpuAccessMode) -> wgpu::BufferUsages {
    let mut usages = wgpu::BufferUsages::empty();
    let table = [
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::CONSTANT, wgpu::BufferUsages::UNIFORM),
        (BufferUsage::SHADER_READ, wgpu::BufferUsages::STORAGE),
        (BufferUsage::SHADER_WRITE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
        (BufferUsage::QUERY_RESOLVE, wgpu::BufferUsages::QUERY_RESOLVE),
    ];
    for (core, native) in table {
        if usage.contains(core) {
            usages |= native;
        }
    }
    match cpu_access {
        CpuAccessMode::None => {}
        CpuAccessMode::Write => usages |= wgpu::BufferUsages::COPY_DST,
        CpuAccessMode::Read => usages |= wgpu::BufferUsages::COPY_SRC,
    }
    usages
}

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        let table = [
            (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
            (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
            (TextureUsage::SHADER_READ, wgpu::TextureUsages::TEXTURE_BINDING),
            (TextureUsage::SHADER_WRITE, wgpu::TextureUsages::STORAGE_BINDING),
            (TextureUsage::RENDER_TARGET, wgpu::TextureUsages::RENDER_ATTACHMENT),
        ];
        for (core, native) in table {
            if self.contains(core) {
                usages |= native;
            }
        }
        usages
    }
}

impl IntoWgpu<wgpu::ShaderStages> for ShaderStageFlags {
    fn into_wgpu(self) -> wgpu::ShaderStages {
        let mut stages = wgpu::ShaderStages::NONE;
        if self.contains(ShaderStageFlags::VERTEX) {
            stages |= wgpu::ShaderStages::VERTEX;
        }
        if self.contains(ShaderStageFlags::FRAGMENT) {
            stages |= wgpu::ShaderStages::FRAGMENT;
        }
        if self.contains(ShaderStageFlags::COMPUTE) {
            stages |= wgpu::ShaderStages::COMPUTE;
        }
        stages
    }
}

// --- Textures and samplers ---

impl IntoWgpu<wgpu::TextureDimension> for TextureDimension {
    fn into_wgpu(self) -> wgpu::TextureDimension {
        match self {
            TextureDimension::D1 => wgpu::TextureDimension::D1,
            TextureDimension::D2 | TextureDimension::Cube => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        }
    }
}

impl IntoWgpu<wgpu::TextureViewDimension> for TextureViewDimension {
    fn into_wgpu(self) -> wgpu::TextureViewDimension {
        match self {
            TextureViewDimension::D1 => wgpu::TextureViewDimension::D1,
            TextureViewDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
            TextureViewDimension::Cube => wgpu::TextureViewDimension::Cube,
            TextureViewDimension::CubeArray => wgpu::TextureViewDimension::CubeArray,
            TextureViewDimension::D3 => wgpu::TextureViewDimension::D3,
        }
    }
}

impl IntoWgpu<wgpu::AddressMode> for AddressMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
            AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl IntoWgpu<wgpu::SamplerBorderColor> for BorderColor {
    fn into_wgpu(self) -> wgpu::SamplerBorderColor {
        match self {
            BorderColor::TransparentBlack => wgpu::SamplerBorderColor::TransparentBlack,
            BorderColor::OpaqueBlack => wgpu::SamplerBorderColor::OpaqueBlack,
            BorderColor::OpaqueWhite => wgpu::SamplerBorderColor::OpaqueWhite,
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

// --- Bindings ---

/// A core binding type as a wgpu layout binding type. `None` when the storage texture
/// format has no wgpu equivalent.
pub fn binding_type(ty: BindingType) -> Option<wgpu::BindingType> {
    let binding = match ty {
        BindingType::ConstantBuffer {
            has_dynamic_offset,
            min_binding_size,
        } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: NonZeroU64::new(min_binding_size),
        },
        BindingType::StorageBuffer {
            read_only,
            has_dynamic_offset,
        } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset,
            min_binding_size: None,
        },
        BindingType::SampledTexture {
            sample_type,
            view_dimension,
            multisampled,
        } => wgpu::BindingType::Texture {
            sample_type: match sample_type {
                TextureSampleType::Float { filterable } => {
                    wgpu::TextureSampleType::Float { filterable }
                }
                TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
                TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
            },
            view_dimension: view_dimension.into_wgpu(),
            multisampled,
        },
        BindingType::StorageTexture {
            access,
            format,
            view_dimension,
        } => wgpu::BindingType::StorageTexture {
            access: match access {
                StorageTextureAccess::ReadOnly => wgpu::StorageTextureAccess::ReadOnly,
                StorageTextureAccess::WriteOnly => wgpu::StorageTextureAccess::WriteOnly,
                StorageTextureAccess::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
            },
            format: texture_format(format)?,
            view_dimension: view_dimension.into_wgpu(),
        },
        BindingType::Sampler(ty) => wgpu::BindingType::Sampler(match ty {
            SamplerBindingType::Filtering => wgpu::SamplerBindingType::Filtering,
            SamplerBindingType::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            SamplerBindingType::Comparison => wgpu::SamplerBindingType::Comparison,
        }),
    };
    Some(binding)
}

// --- Pipelines ---

impl IntoWgpu<wgpu::VertexStepMode> for VertexStepMode {
    fn into_wgpu(self) -> wgpu::VertexStepMode {
        match self {
            VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
            VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

impl IntoWgpu<wgpu::PrimitiveState> for PrimitiveState {
    fn into_wgpu(self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: match self.topology {
                PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
                PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
                PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
                PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            },
            strip_index_format: self.strip_index_format.map(IntoWgpu::into_wgpu),
            front_face: match self.front_face {
                FrontFace::Ccw => wgpu::FrontFace::Ccw,
                FrontFace::Cw => wgpu::FrontFace::Cw,
            },
            cull_mode: match self.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            polygon_mode: match self.polygon_mode {
                PolygonMode::Fill => wgpu::PolygonMode::Fill,
                PolygonMode::Line => wgpu::PolygonMode::Line,
                PolygonMode::Point => wgpu::PolygonMode::Point,
            },
            unclipped_depth: self.unclipped_depth,
            conservative: false,
        }
    }
}

impl IntoWgpu<wgpu::StencilFaceState> for StencilFaceState {
    fn into_wgpu(self) -> wgpu::StencilFaceState {
        let op = |op: StencilOperation| match op {
            StencilOperation::Keep => wgpu::StencilOperation::Keep,
            StencilOperation::Zero => wgpu::StencilOperation::Zero,
            StencilOperation::Replace => wgpu::StencilOperation::Replace,
            StencilOperation::Invert => wgpu::StencilOperation::Invert,
            StencilOperation::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
            StencilOperation::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
            StencilOperation::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
            StencilOperation::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
        };
        wgpu::StencilFaceState {
            compare: self.compare.into_wgpu(),
            fail_op: op(self.fail_op),
            depth_fail_op: op(self.depth_fail_op),
            pass_op: op(self.pass_op),
        }
    }
}

impl IntoWgpu<wgpu::BlendComponent> for BlendComponent {
    fn into_wgpu(self) -> wgpu::BlendComponent {
        let factor = |factor: BlendFactor| match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::Src => wgpu::BlendFactor::Src,
            BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::Dst => wgpu::BlendFactor::Dst,
            BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
            BlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
            BlendFactor::Constant => wgpu::BlendFactor::Constant,
            BlendFactor::OneMinusConstant => wgpu::BlendFactor::OneMinusConstant,
        };
        wgpu::BlendComponent {
            src_factor: factor(self.src_factor),
            dst_factor: factor(self.dst_factor),
            operation: match self.operation {
                BlendOperation::Add => wgpu::BlendOperation::Add,
                BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
                BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
                BlendOperation::Min => wgpu::BlendOperation::Min,
                BlendOperation::Max => wgpu::BlendOperation::Max,
            },
        }
    }
}

impl IntoWgpu<wgpu::BlendState> for BlendState {
    fn into_wgpu(self) -> wgpu::BlendState {
        wgpu::BlendState {
            color: self.color.into_wgpu(),
            alpha: self.alpha.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::ColorWrites> for ColorWrites {
    fn into_wgpu(self) -> wgpu::ColorWrites {
        wgpu::ColorWrites::from_bits_truncate(self.bits())
    }
}

/// A color target, `None` when its format has no wgpu equivalent.
pub fn color_target(target: &ColorTargetState) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format: texture_format(target.format)?,
        blend: target.blend.map(IntoWgpu::into_wgpu),
        write_mask: target.write_mask.into_wgpu(),
    })
}

// --- Passes ---

impl IntoWgpu<wgpu::Color> for Color {
    fn into_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r,
            g: self.g,
            b: self.b,
            a: self.a,
        }
    }
}

/// Load and store operations of an attachment.
pub fn operations<V, W: Default>(
    load: LoadAction<V>,
    store: StoreAction,
    clear: impl FnOnce(V) -> W,
) -> wgpu::Operations<W> {
    wgpu::Operations {
        load: match load {
            LoadAction::Load => wgpu::LoadOp::Load,
            LoadAction::Clear(value) => wgpu::LoadOp::Clear(clear(value)),
            // wgpu has no "don't care" load; clearing is the cheapest defined option.
            LoadAction::DontCare => wgpu::LoadOp::Clear(W::default()),
        },
        store: match store {
            StoreAction::Store => wgpu::StoreOp::Store,
            StoreAction::Discard => wgpu::StoreOp::Discard,
        },
    }
}

// --- Queries and swap chains ---

impl IntoWgpu<wgpu::QueryType> for QueryType {
    fn into_wgpu(self) -> wgpu::QueryType {
        match self {
            QueryType::Timestamp => wgpu::QueryType::Timestamp,
            QueryType::Occlusion | QueryType::BinaryOcclusion => wgpu::QueryType::Occlusion,
            QueryType::PipelineStatistics => wgpu::QueryType::PipelineStatistics(
                wgpu::PipelineStatisticsTypes::VERTEX_SHADER_INVOCATIONS
                    | wgpu::PipelineStatisticsTypes::CLIPPER_INVOCATIONS
                    | wgpu::PipelineStatisticsTypes::CLIPPER_PRIMITIVES_OUT
                    | wgpu::PipelineStatisticsTypes::FRAGMENT_SHADER_INVOCATIONS
                    | wgpu::PipelineStatisticsTypes::COMPUTE_SHADER_INVOCATIONS,
            ),
        }
    }
}

impl IntoWgpu<wgpu::PresentMode> for PresentMode {
    fn into_wgpu(self) -> wgpu::PresentMode {
        match self {
            PresentMode::Fifo => wgpu::PresentMode::Fifo,
            PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
            PresentMode::Immediate => wgpu::PresentMode::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_round_trip() {
        for backend in GraphicsBackendType::ALL {
            if let Some(bits) = backend_bits(backend) {
                assert_eq!(bits.iter().count(), 1, "{backend} maps to one wgpu backend");
            }
        }
        assert_eq!(backend_bits(GraphicsBackendType::Dx11), None);
        assert_eq!(
            from_wgpu_backend(wgpu::Backend::Gl),
            Some(GraphicsBackendType::OpenGL)
        );
    }

    #[test]
    fn test_typeless_formats_have_no_wgpu_equivalent() {
        assert_eq!(texture_format(PixelFormat::R32Typeless), None);
        assert_eq!(texture_format(PixelFormat::Undefined), None);
        assert_eq!(
            texture_format(PixelFormat::Depth24UnormStencil8),
            Some(wgpu::TextureFormat::Depth24PlusStencil8)
        );
        assert_eq!(
            from_wgpu_texture_format(wgpu::TextureFormat::Bgra8UnormSrgb),
            PixelFormat::Bgra8UnormSrgb
        );
    }

    #[test]
    fn test_cpu_access_adds_staging_usage() {
        let readback = buffer_usages(BufferUsage::QUERY_RESOLVE, CpuAccessMode::Read);
        assert_eq!(
            readback,
            wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC
        );
        let upload = buffer_usages(BufferUsage::CONSTANT, CpuAccessMode::Write);
        assert_eq!(upload, wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST);
        assert_eq!(
            buffer_usages(
                BufferUsage::SHADER_READ | BufferUsage::SHADER_WRITE,
                CpuAccessMode::None
            ),
            wgpu::BufferUsages::STORAGE
        );
    }

    #[test]
    fn test_texture_usages() {
        let usages: wgpu::TextureUsages =
            (TextureUsage::SHADER_READ | TextureUsage::RENDER_TARGET).into_wgpu();
        assert_eq!(
            usages,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT
        );
    }

    #[test]
    fn test_timestamp_feature_needs_encoder_writes() {
        let timestamps = feature_bits(Feature::TimestampQuery);
        assert!(has_feature(timestamps, Feature::TimestampQuery));
        assert!(!has_feature(
            wgpu::Features::TIMESTAMP_QUERY,
            Feature::TimestampQuery
        ));
        assert!(!has_feature(wgpu::Features::all(), Feature::MeshShader));
    }

    #[test]
    fn test_dont_care_load_clears() {
        let ops = operations(LoadAction::<f32>::DontCare, StoreAction::Discard, |d| d);
        assert_eq!(ops.load, wgpu::LoadOp::Clear(0.0));
        assert_eq!(ops.store, wgpu::StoreOp::Discard);
    }
}
