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

//! Backend identities, device capabilities and the per-backend behavior table.

use std::fmt;
use std::str::FromStr;

/// A native graphics API a device can be created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GraphicsBackendType {
    /// Vulkan.
    Vulkan,
    /// Direct3D 12.
    Dx12,
    /// Direct3D 11.
    Dx11,
    /// Apple Metal.
    Metal,
    /// OpenGL / OpenGL ES.
    OpenGL,
    /// WebGPU running in a browser.
    WebGpu,
    /// CPU reference device with an immediate-context execution model.
    Software,
}

impl GraphicsBackendType {
    /// Every backend kind, in declaration order.
    pub const ALL: [GraphicsBackendType; 7] = [
        GraphicsBackendType::Vulkan,
        GraphicsBackendType::Dx12,
        GraphicsBackendType::Dx11,
        GraphicsBackendType::Metal,
        GraphicsBackendType::OpenGL,
        GraphicsBackendType::WebGpu,
        GraphicsBackendType::Software,
    ];

    /// Position of this backend in [`GraphicsBackendType::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// How commands reach the GPU on this backend.
    pub const fn execution_model(self) -> ExecutionModel {
        match self {
            GraphicsBackendType::Dx11
            | GraphicsBackendType::OpenGL
            | GraphicsBackendType::Software => ExecutionModel::Immediate,
            _ => ExecutionModel::CommandBuffer,
        }
    }

    /// The behavior table the core applies when talking to this backend.
    pub const fn default_traits(self) -> BackendTraits {
        match self {
            GraphicsBackendType::Dx11 | GraphicsBackendType::Software => BackendTraits {
                execution_model: ExecutionModel::Immediate,
                constant_buffer_alignment: 16,
                exclusive_constant_buffers: true,
                typeless_depth_sampling: true,
                debug_labels: true,
            },
            GraphicsBackendType::Dx12 => BackendTraits {
                execution_model: ExecutionModel::CommandBuffer,
                constant_buffer_alignment: 256,
                exclusive_constant_buffers: false,
                typeless_depth_sampling: true,
                debug_labels: true,
            },
            GraphicsBackendType::OpenGL => BackendTraits {
                execution_model: ExecutionModel::Immediate,
                constant_buffer_alignment: 256,
                exclusive_constant_buffers: false,
                typeless_depth_sampling: false,
                debug_labels: false,
            },
            _ => BackendTraits {
                execution_model: ExecutionModel::CommandBuffer,
                constant_buffer_alignment: 256,
                exclusive_constant_buffers: false,
                typeless_depth_sampling: false,
                debug_labels: true,
            },
        }
    }
}

impl fmt::Display for GraphicsBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphicsBackendType::Vulkan => "Vulkan",
            GraphicsBackendType::Dx12 => "Direct3D 12",
            GraphicsBackendType::Dx11 => "Direct3D 11",
            GraphicsBackendType::Metal => "Metal",
            GraphicsBackendType::OpenGL => "OpenGL",
            GraphicsBackendType::WebGpu => "WebGPU",
            GraphicsBackendType::Software => "Software",
        };
        f.write_str(name)
    }
}

impl FromStr for GraphicsBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(GraphicsBackendType::Vulkan),
            "dx12" | "d3d12" => Ok(GraphicsBackendType::Dx12),
            "dx11" | "d3d11" => Ok(GraphicsBackendType::Dx11),
            "metal" | "mtl" => Ok(GraphicsBackendType::Metal),
            "opengl" | "gl" => Ok(GraphicsBackendType::OpenGL),
            "webgpu" => Ok(GraphicsBackendType::WebGpu),
            "software" | "null" | "cpu" => Ok(GraphicsBackendType::Software),
            other => Err(format!("unknown graphics backend '{other}'")),
        }
    }
}

/// How a backend executes recorded work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionModel {
    /// A single context executes commands; recorded lists are replayed on it at submission.
    Immediate,
    /// Commands are recorded into native command buffers and submitted to queues.
    CommandBuffer,
}

/// Per-backend rules the core enforces while creating resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendTraits {
    /// How recorded commands reach the GPU.
    pub execution_model: ExecutionModel,
    /// Constant buffer byte sizes are rounded up to this granularity.
    pub constant_buffer_alignment: u64,
    /// A constant buffer cannot carry any other bind usage (indirect, storage, vertex, index).
    pub exclusive_constant_buffers: bool,
    /// Sampled depth textures need a typeless allocation to alias depth and shader views.
    pub typeless_depth_sampling: bool,
    /// Debug names are forwarded to the native objects.
    pub debug_labels: bool,
}

/// Which physical adapter to favor when several are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerPreference {
    /// Let the backend decide.
    #[default]
    Default,
    /// Prefer an integrated, power-efficient adapter.
    LowPower,
    /// Prefer a discrete, high-performance adapter.
    HighPerformance,
}

/// How much native validation the backend enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationMode {
    /// No validation layers.
    Disabled,
    /// Standard validation and leak tracking.
    Enabled,
    /// Validation with verbose diagnostics. In debug builds, resources still live
    /// when the device is dropped fail an assertion.
    Verbose,
    /// Validation plus GPU-assisted checks, with the same teardown assertion as
    /// [`ValidationMode::Verbose`].
    Gpu,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ValidationMode::Enabled
        } else {
            ValidationMode::Disabled
        }
    }
}

/// The hardware queue a command batch is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueType {
    /// Graphics, compute and copy work.
    Graphics,
    /// Compute and copy work.
    Compute,
    /// Copy work only.
    Copy,
}

impl QueueType {
    /// Every queue type, in submission order.
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    /// Position of this queue in [`QueueType::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Optional device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Feature {
    TimestampQuery,
    PipelineStatisticsQuery,
    DepthClipControl,
    Depth32FloatStencil8,
    TextureCompressionBc,
    TextureCompressionEtc2,
    TextureCompressionAstc,
    IndirectFirstInstance,
    ShaderFloat16,
    PushConstants,
    MeshShader,
    RayTracing,
    SamplerMinMax,
    ConservativeRasterization,
}

/// Numeric limits of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub struct DeviceLimits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_dimension_cube: u32,
    pub max_texture_array_layers: u32,
    pub max_bind_groups: u32,
    pub max_bindings_per_bind_group: u32,
    pub max_dynamic_constant_buffers_per_pipeline_layout: u32,
    pub max_constant_buffer_binding_size: u64,
    pub max_storage_buffer_binding_size: u64,
    pub min_constant_buffer_offset_alignment: u32,
    pub min_storage_buffer_offset_alignment: u32,
    pub max_vertex_buffers: u32,
    pub max_vertex_attributes: u32,
    pub max_vertex_buffer_array_stride: u32,
    pub max_push_constant_size: u32,
    pub max_color_attachments: u32,
    pub max_compute_workgroup_storage_size: u32,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroup_size_y: u32,
    pub max_compute_workgroup_size_z: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    /// A conservative baseline every supported backend meets.
    fn default() -> Self {
        Self {
            max_texture_dimension_1d: 8192,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 2048,
            max_texture_dimension_cube: 8192,
            max_texture_array_layers: 256,
            max_bind_groups: 4,
            max_bindings_per_bind_group: 1000,
            max_dynamic_constant_buffers_per_pipeline_layout: 8,
            max_constant_buffer_binding_size: 64 << 10,
            max_storage_buffer_binding_size: 128 << 20,
            min_constant_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            max_vertex_buffers: 8,
            max_vertex_attributes: 16,
            max_vertex_buffer_array_stride: 2048,
            max_push_constant_size: 128,
            max_color_attachments: 8,
            max_compute_workgroup_storage_size: 16384,
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_workgroups_per_dimension: 65535,
            max_buffer_size: 256 << 20,
        }
    }
}

/// The broad class of a physical adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdapterType {
    /// A GPU sharing memory with the CPU.
    IntegratedGpu,
    /// A dedicated GPU.
    DiscreteGpu,
    /// A virtualized GPU.
    VirtualGpu,
    /// A CPU rasterizer.
    Cpu,
    /// Anything the backend could not classify.
    #[default]
    Unknown,
}

/// Hardware vendor decoded from a PCI vendor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum GpuVendor {
    Amd,
    Nvidia,
    Intel,
    Arm,
    Qualcomm,
    ImgTec,
    Apple,
    Microsoft,
    Unknown,
}

impl GpuVendor {
    /// Decodes a PCI vendor id.
    pub const fn from_vendor_id(vendor_id: u32) -> Self {
        match vendor_id {
            0x1002 | 0x1022 => GpuVendor::Amd,
            0x10DE => GpuVendor::Nvidia,
            0x8086 => GpuVendor::Intel,
            0x13B5 => GpuVendor::Arm,
            0x5143 => GpuVendor::Qualcomm,
            0x1010 => GpuVendor::ImgTec,
            0x106B => GpuVendor::Apple,
            0x1414 => GpuVendor::Microsoft,
            _ => GpuVendor::Unknown,
        }
    }
}

/// Identification of the adapter a device runs on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdapterInfo {
    /// Human readable adapter name.
    pub name: String,
    /// PCI vendor id, 0 when unknown.
    pub vendor_id: u32,
    /// PCI device id, 0 when unknown.
    pub device_id: u32,
    /// Adapter class.
    pub adapter_type: AdapterType,
    /// Backend the adapter was opened with.
    pub backend: Option<GraphicsBackendType>,
    /// Driver name and version, when the backend exposes it.
    pub driver_description: String,
}

impl AdapterInfo {
    /// Decodes [`AdapterInfo::vendor_id`].
    pub const fn vendor(&self) -> GpuVendor {
        GpuVendor::from_vendor_id(self.vendor_id)
    }
}

/// Ordered backend preferences used when the requested backend cannot be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelectionConfig {
    /// Backends to try, first to last.
    pub preferred_backends: Vec<GraphicsBackendType>,
}

impl Default for BackendSelectionConfig {
    fn default() -> Self {
        let preferred_backends = if cfg!(target_os = "windows") {
            vec![
                GraphicsBackendType::Dx12,
                GraphicsBackendType::Vulkan,
                GraphicsBackendType::Dx11,
                GraphicsBackendType::OpenGL,
                GraphicsBackendType::Software,
            ]
        } else if cfg!(any(target_os = "macos", target_os = "ios")) {
            vec![GraphicsBackendType::Metal, GraphicsBackendType::Software]
        } else if cfg!(target_arch = "wasm32") {
            vec![GraphicsBackendType::WebGpu, GraphicsBackendType::OpenGL]
        } else {
            vec![
                GraphicsBackendType::Vulkan,
                GraphicsBackendType::OpenGL,
                GraphicsBackendType::Software,
            ]
        };
        Self { preferred_backends }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_models() {
        assert_eq!(
            GraphicsBackendType::Dx11.execution_model(),
            ExecutionModel::Immediate
        );
        assert_eq!(
            GraphicsBackendType::Vulkan.execution_model(),
            ExecutionModel::CommandBuffer
        );
        for backend in GraphicsBackendType::ALL {
            assert_eq!(
                backend.default_traits().execution_model,
                backend.execution_model(),
                "{backend} traits disagree with its execution model"
            );
        }
    }

    #[test]
    fn test_backend_index_matches_table_position() {
        for (position, backend) in GraphicsBackendType::ALL.iter().enumerate() {
            assert_eq!(backend.index(), position);
        }
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("VK".parse(), Ok(GraphicsBackendType::Vulkan));
        assert_eq!("d3d11".parse(), Ok(GraphicsBackendType::Dx11));
        assert_eq!("null".parse(), Ok(GraphicsBackendType::Software));
        assert!("glide".parse::<GraphicsBackendType>().is_err());
    }

    #[test]
    fn test_vendor_decoding() {
        let info = AdapterInfo {
            vendor_id: 0x10DE,
            ..Default::default()
        };
        assert_eq!(info.vendor(), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0xFFFF), GpuVendor::Unknown);
    }

    #[test]
    fn test_default_selection_ends_with_fallback() {
        let config = BackendSelectionConfig::default();
        assert!(!config.preferred_backends.is_empty());
    }
}
