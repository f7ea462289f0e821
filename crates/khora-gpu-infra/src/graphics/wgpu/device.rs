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

//! The wgpu implementation of [`DeviceBackend`].

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::rc::Rc;

use khora_gpu_core::renderer::api::{
    mip_extent, AdapterInfo, AddressMode, BackendTraits, BindGroupDescriptor, BindGroupLayoutDescriptor,
    BindingResource, BufferDescriptor, ComputePipelineDescriptor, CpuAccessMode, DeviceLimits,
    ExecutionModel, Feature, FilterMode, GraphicsBackendType, KhoraWindowHandle, NativeHandle, PipelineLayoutDescriptor,
    PixelFormat, PresentMode, QueryHeapDescriptor, QueueType, RenderPipelineDescriptor, ResourceKind,
    SamplerDescriptor, ShaderSource, SurfaceHandle, SwapChainConfiguration, SwapChainDescriptor,
    TextureAllocation, TextureDescriptor, TextureDimension, TextureUsage,
};
use khora_gpu_core::renderer::traits::{CommandEncoder, DeviceBackend, NativeCommandBatch};
use khora_gpu_core::renderer::{DeviceError, ResourceError, SwapChainError};

use super::command::{WgpuCommandEncoder, WgpuCommandList};
use super::context::{LostFlag, WgpuContext};
use super::conversions::{
    binding_type, buffer_usages, color_target, from_wgpu_texture_format, has_feature,
    texture_format, IntoWgpu,
};
use super::objects::{BufferEntry, SwapChainTarget, TextureEntry, WgpuObject, WgpuObjects};

/// A device backend driving Vulkan, Direct3D 12, Metal or OpenGL through wgpu.
///
/// wgpu exposes a single queue; every [`QueueType`] submits to it in call order.
pub struct WgpuDevice {
    backend: GraphicsBackendType,
    context: WgpuContext,
    objects: Rc<RefCell<WgpuObjects>>,
    swap_chains: HashMap<NativeHandle, SwapChainTarget>,
    lost: LostFlag,
    /// Last submission of each frame slot.
    frame_fences: Vec<Option<wgpu::SubmissionIndex>>,
    frame_index: u32,
}

impl WgpuDevice {
    pub(crate) fn new(backend: GraphicsBackendType, context: WgpuContext, lost: LostFlag) -> Self {
        log::info!(
            "WgpuDevice: {} device ready on \"{}\"",
            backend,
            context.adapter_info.name
        );
        Self {
            backend,
            context,
            objects: Rc::new(RefCell::new(WgpuObjects::default())),
            swap_chains: HashMap::new(),
            lost,
            frame_fences: Vec::new(),
            frame_index: 0,
        }
    }

    /// The native context, for interop with code that talks to wgpu directly.
    pub fn context(&self) -> &WgpuContext {
        &self.context
    }

    /// Number of native objects alive, swap chains excluded.
    pub fn live_object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    fn check_lost(&self) -> Result<(), DeviceError> {
        match self.lost.lock().ok().and_then(|flag| flag.clone()) {
            Some(reason) => Err(DeviceError::DeviceLost(reason)),
            None => Ok(()),
        }
    }

    /// Runs `create` inside validation and out-of-memory error scopes.
    ///
    /// wgpu reports creation errors asynchronously; the scopes turn them back into a
    /// `Result` for the caller.
    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, ResourceError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(device);
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(ResourceError::Backend(error.to_string())),
            None => Ok(value),
        }
    }

    fn shader_module(
        &self,
        label: Option<&str>,
        source: &ShaderSource<'_>,
    ) -> Result<wgpu::ShaderModule, ResourceError> {
        let source = match source {
            ShaderSource::Wgsl(code) => wgpu::ShaderSource::Wgsl(Cow::Borrowed(code.as_ref())),
            ShaderSource::SpirV(words) => wgpu::ShaderSource::SpirV(Cow::Borrowed(words.as_ref())),
        };
        self.validated(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor { label, source })
        })
    }

    fn pipeline_layout(&self, handle: NativeHandle) -> Result<wgpu::PipelineLayout, ResourceError> {
        self.objects
            .borrow()
            .pipeline_layout(handle)
            .cloned()
            .ok_or_else(|| ResourceError::Backend(format!("pipeline layout {handle} does not exist")))
    }

    /// Creates the default and attachment views of a texture.
    fn texture_entry(
        texture: wgpu::Texture,
        format: PixelFormat,
        dimension: TextureDimension,
        attachment: bool,
    ) -> TextureEntry {
        let layers = texture.depth_or_array_layers();
        let view_dimension = match dimension {
            TextureDimension::D1 => wgpu::TextureViewDimension::D1,
            TextureDimension::D2 if layers > 1 => wgpu::TextureViewDimension::D2Array,
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::D3 => wgpu::TextureViewDimension::D3,
            TextureDimension::Cube if layers > 6 => wgpu::TextureViewDimension::CubeArray,
            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
        };
        // Combined depth-stencil formats are sampled through their depth aspect.
        let aspect = if format.has_depth() && format.has_stencil() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            aspect,
            ..Default::default()
        });
        let attachment_view = attachment.then(|| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2),
                mip_level_count: Some(1),
                array_layer_count: Some(1),
                ..Default::default()
            })
        });
        TextureEntry {
            texture,
            format,
            view,
            attachment_view,
        }
    }

    /// Uploads tightly packed initial data, layer by layer and mip by mip.
    fn upload_texture(
        &self,
        texture: &wgpu::Texture,
        descriptor: &TextureDescriptor<'_>,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut offset = 0usize;
        for layer in 0..descriptor.array_layers() {
            for mip in 0..descriptor.mip_level_count {
                let (width, height, depth) =
                    mip_extent(descriptor.width, descriptor.height, descriptor.depth(), mip);
                let (row_pitch, slice_pitch) = descriptor.format.surface_pitch(width, height);
                let size = descriptor.subresource_size(mip) as usize;
                let bytes = data.get(offset..offset + size).ok_or_else(|| {
                    ResourceError::InvalidDescriptor(format!(
                        "initial data ends before layer {layer} mip {mip}"
                    ))
                })?;
                self.context.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: mip,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytes,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(row_pitch as u32),
                        rows_per_image: Some((slice_pitch / row_pitch) as u32),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: depth,
                    }
                    .physical_size(texture.format()),
                );
                offset += size;
            }
        }
        Ok(())
    }

    fn create_backbuffers(
        &self,
        count: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Vec<NativeHandle>, SwapChainError> {
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let native_format = texture_format(format).ok_or_else(|| {
            SwapChainError::UnsupportedSurface(format!("{format:?} cannot be a backbuffer"))
        })?;
        let mut buffers = Vec::with_capacity(count as usize);
        for index in 0..count {
            let label = format!("backbuffer {index}");
            let texture = self
                .validated(|device| {
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some(&label),
                        size: wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: native_format,
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                            | wgpu::TextureUsages::TEXTURE_BINDING
                            | wgpu::TextureUsages::COPY_SRC,
                        view_formats: &[],
                    })
                })
                .map_err(|e| SwapChainError::Backend(e.to_string()))?;
            let entry = Self::texture_entry(texture, format, TextureDimension::D2, true);
            buffers.push(self.objects.borrow_mut().insert(WgpuObject::Texture(entry)));
        }
        Ok(buffers)
    }

    fn destroy_texture(&self, handle: NativeHandle) {
        if let Some(WgpuObject::Texture(entry)) = self.objects.borrow_mut().remove(handle) {
            entry.texture.destroy();
        }
    }

    fn configure_surface(
        &self,
        surface: &wgpu::Surface<'static>,
        config: &wgpu::SurfaceConfiguration,
    ) -> Result<(), SwapChainError> {
        self.validated(|device| surface.configure(device, config))
            .map_err(|e| SwapChainError::Backend(e.to_string()))
    }

    fn create_surface_swap_chain(
        &self,
        window: &KhoraWindowHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<(SwapChainTarget, PixelFormat, wgpu::PresentMode), SwapChainError> {
        // --- 1. Create Surface ---
        let surface_target = unsafe {
            wgpu::SurfaceTargetUnsafe::from_window(window).map_err(|e| {
                SwapChainError::UnsupportedSurface(format!("failed to create surface target: {e}"))
            })?
        };
        let surface = unsafe { self.context.instance.create_surface_unsafe(surface_target) }
            .map_err(|e| SwapChainError::UnsupportedSurface(e.to_string()))?;

        // --- 2. Pick format and present mode ---
        let caps = surface.get_capabilities(&self.context.adapter);
        let Some(&fallback_format) = caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or(caps.formats.first())
        else {
            return Err(SwapChainError::UnsupportedSurface(
                "the adapter cannot present to this surface".into(),
            ));
        };
        let format = match texture_format(descriptor.format) {
            Some(format) if caps.formats.contains(&format) => format,
            Some(format) => {
                log::warn!("WgpuDevice: surface does not support {format:?}, using {fallback_format:?}");
                fallback_format
            }
            None => fallback_format,
        };
        let requested_mode = descriptor.present_mode.into_wgpu();
        let present_mode = if caps.present_modes.contains(&requested_mode) {
            requested_mode
        } else {
            log::warn!("WgpuDevice: {requested_mode:?} unavailable, presenting with Fifo");
            wgpu::PresentMode::Fifo // Fifo is guaranteed to be supported
        };

        // --- 3. Configure Surface ---
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: descriptor.width,
            height: descriptor.height,
            present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: descriptor.back_buffer_count.saturating_sub(1).max(1),
        };
        let suspended = descriptor.width == 0 || descriptor.height == 0;
        if !suspended {
            self.configure_surface(&surface, &config)?;
        }
        Ok((
            SwapChainTarget::Surface {
                surface,
                config,
                _window: window.clone(),
                suspended,
                frame: None,
            },
            from_wgpu_texture_format(format),
            present_mode,
        ))
    }

    fn swap_chain_mut(
        &mut self,
        swap_chain: NativeHandle,
    ) -> Result<&mut SwapChainTarget, SwapChainError> {
        self.swap_chains
            .get_mut(&swap_chain)
            .ok_or_else(|| SwapChainError::Backend(format!("{swap_chain} is not a swap chain")))
    }
}

impl DeviceBackend for WgpuDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        self.backend
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.context.adapter_info
    }

    fn limits(&self) -> &DeviceLimits {
        &self.context.limits
    }

    fn traits(&self) -> BackendTraits {
        // wgpu records command buffers and has no typeless formats on any API.
        BackendTraits {
            execution_model: ExecutionModel::CommandBuffer,
            typeless_depth_sampling: false,
            exclusive_constant_buffers: false,
            ..self.backend.default_traits()
        }
    }

    fn query_feature(&self, feature: Feature) -> bool {
        has_feature(self.context.features, feature)
    }

    fn timestamp_frequency(&self) -> u64 {
        self.context.timestamp_frequency
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor<'_>,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError> {
        let size = descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.validated(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size,
                usage: buffer_usages(descriptor.usage, descriptor.cpu_access),
                mapped_at_creation: initial_data.is_some(),
            })
        })?;
        if let Some(data) = initial_data {
            buffer.slice(..).get_mapped_range_mut()[..data.len()].copy_from_slice(data);
            buffer.unmap();
        }

        let shadow = match descriptor.cpu_access {
            CpuAccessMode::Write => {
                let mut shadow = vec![0; size as usize];
                if let Some(data) = initial_data {
                    shadow[..data.len()].copy_from_slice(data);
                }
                shadow
            }
            _ => Vec::new(),
        };
        Ok(self.objects.borrow_mut().insert(WgpuObject::Buffer(BufferEntry {
            buffer,
            cpu_access: descriptor.cpu_access,
            size: descriptor.size,
            shadow,
        })))
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor<'_>,
        allocation: &TextureAllocation,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeHandle, ResourceError> {
        let format = texture_format(allocation.storage_format).ok_or_else(|| {
            ResourceError::Unsupported(format!(
                "{:?} has no wgpu equivalent",
                allocation.storage_format
            ))
        })?;
        if initial_data.is_some() && descriptor.format.is_depth_stencil() {
            return Err(ResourceError::Unsupported(
                "initial data for depth-stencil textures".into(),
            ));
        }

        let mut usage: wgpu::TextureUsages = descriptor.usage.into_wgpu();
        if initial_data.is_some() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        let texture = self.validated(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: descriptor.label.as_deref(),
                size: wgpu::Extent3d {
                    width: descriptor.width,
                    height: descriptor.height,
                    depth_or_array_layers: descriptor.depth_or_array_layers,
                },
                mip_level_count: descriptor.mip_level_count,
                sample_count: descriptor.sample_count.max(1),
                dimension: descriptor.dimension.into_wgpu(),
                format,
                usage,
                view_formats: &[],
            })
        })?;
        if let Some(data) = initial_data {
            self.upload_texture(&texture, descriptor, data)?;
        }

        let attachment = descriptor.usage.contains(TextureUsage::RENDER_TARGET);
        let entry = Self::texture_entry(texture, descriptor.format, descriptor.dimension, attachment);
        Ok(self.objects.borrow_mut().insert(WgpuObject::Texture(entry)))
    }

    fn create_sampler(
        &mut self,
        descriptor: &SamplerDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let modes = [
            descriptor.address_mode_u,
            descriptor.address_mode_v,
            descriptor.address_mode_w,
        ];
        let uses_border = modes
            .iter()
            .any(|mode| *mode == AddressMode::ClampToBorder);
        let all_linear = [
            descriptor.mag_filter,
            descriptor.min_filter,
            descriptor.mipmap_filter,
        ]
        .iter()
        .all(|filter| *filter == FilterMode::Linear);
        // Anisotropic filtering is only valid with linear filters.
        let anisotropy_clamp = if all_linear {
            descriptor.max_anisotropy.clamp(1, 16)
        } else {
            1
        };
        let sampler = self.validated(|device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: descriptor.label.as_deref(),
                address_mode_u: descriptor.address_mode_u.into_wgpu(),
                address_mode_v: descriptor.address_mode_v.into_wgpu(),
                address_mode_w: descriptor.address_mode_w.into_wgpu(),
                mag_filter: descriptor.mag_filter.into_wgpu(),
                min_filter: descriptor.min_filter.into_wgpu(),
                mipmap_filter: descriptor.mipmap_filter.into_wgpu(),
                lod_min_clamp: descriptor.lod_min_clamp,
                lod_max_clamp: descriptor.lod_max_clamp,
                compare: descriptor.compare.map(IntoWgpu::into_wgpu),
                anisotropy_clamp,
                border_color: uses_border.then(|| descriptor.border_color.into_wgpu()),
            })
        })?;
        Ok(self.objects.borrow_mut().insert(WgpuObject::Sampler(sampler)))
    }

    fn create_bind_group_layout(
        &mut self,
        descriptor: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let entries = descriptor
            .entries
            .iter()
            .map(|entry| {
                let ty = binding_type(entry.ty).ok_or_else(|| {
                    ResourceError::Unsupported(format!(
                        "binding {} of type {:?}",
                        entry.binding, entry.ty
                    ))
                })?;
                Ok(wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility: entry.visibility.into_wgpu(),
                    ty,
                    count: None,
                })
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;
        let layout = self.validated(|device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label.as_deref(),
                entries: &entries,
            })
        })?;
        Ok(self
            .objects
            .borrow_mut()
            .insert(WgpuObject::BindGroupLayout(layout)))
    }

    fn create_bind_group(
        &mut self,
        descriptor: &BindGroupDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let group = {
            let objects = self.objects.borrow();
            let layout_handle = descriptor.layout.native_handle();
            let layout = objects.bind_group_layout(layout_handle).ok_or_else(|| {
                ResourceError::Backend(format!("bind group layout {layout_handle} does not exist"))
            })?;
            let missing = |what: &str, handle: NativeHandle| {
                ResourceError::Backend(format!("{what} {handle} does not exist"))
            };
            let entries = descriptor
                .entries
                .iter()
                .map(|entry| {
                    let resource = match entry.resource {
                        BindingResource::Buffer {
                            buffer,
                            offset,
                            size,
                        } => {
                            let handle = buffer.native_handle();
                            let native = objects
                                .buffer(handle)
                                .ok_or_else(|| missing("buffer", handle))?;
                            wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &native.buffer,
                                offset,
                                size: size.and_then(NonZeroU64::new),
                            })
                        }
                        BindingResource::Texture(texture) => {
                            let handle = texture.native_handle();
                            let native = objects
                                .texture(handle)
                                .ok_or_else(|| missing("texture", handle))?;
                            wgpu::BindingResource::TextureView(&native.view)
                        }
                        BindingResource::Sampler(sampler) => {
                            let handle = sampler.native_handle();
                            let native = objects
                                .sampler(handle)
                                .ok_or_else(|| missing("sampler", handle))?;
                            wgpu::BindingResource::Sampler(native)
                        }
                    };
                    Ok(wgpu::BindGroupEntry {
                        binding: entry.binding,
                        resource,
                    })
                })
                .collect::<Result<Vec<_>, ResourceError>>()?;
            self.validated(|device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: descriptor.label.as_deref(),
                    layout,
                    entries: &entries,
                })
            })?
        };
        Ok(self.objects.borrow_mut().insert(WgpuObject::BindGroup(group)))
    }

    fn create_pipeline_layout(
        &mut self,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let layout = {
            let objects = self.objects.borrow();
            let group_layouts = descriptor
                .bind_group_layouts
                .iter()
                .map(|layout| {
                    let handle = layout.native_handle();
                    objects.bind_group_layout(handle).ok_or_else(|| {
                        ResourceError::Backend(format!("bind group layout {handle} does not exist"))
                    })
                })
                .collect::<Result<Vec<_>, ResourceError>>()?;
            let push_constant_ranges: Vec<wgpu::PushConstantRange> = descriptor
                .push_constant_ranges
                .iter()
                .map(|range| wgpu::PushConstantRange {
                    stages: range.stages.into_wgpu(),
                    range: range.range.clone(),
                })
                .collect();
            self.validated(|device| {
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: descriptor.label.as_deref(),
                    bind_group_layouts: &group_layouts,
                    push_constant_ranges: &push_constant_ranges,
                })
            })?
        };
        Ok(self
            .objects
            .borrow_mut()
            .insert(WgpuObject::PipelineLayout(layout)))
    }

    fn create_render_pipeline(
        &mut self,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let label = descriptor.label.as_deref();
        log::debug!("WgpuDevice: Creating render pipeline with label: {label:?}");
        let layout = self.pipeline_layout(descriptor.layout.native_handle())?;
        let vertex_module = self.shader_module(label, &descriptor.vertex.source)?;
        let fragment_module = match &descriptor.fragment {
            Some(stage) => Some(self.shader_module(label, &stage.source)?),
            None => None,
        };

        // --- Vertex Buffers ---
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: attribute.format.into_wgpu(),
                        offset: attribute.offset,
                        shader_location: attribute.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        // --- Targets ---
        let targets = descriptor
            .color_targets
            .iter()
            .map(|target| {
                color_target(target).map(Some).ok_or_else(|| {
                    ResourceError::Unsupported(format!("color target format {:?}", target.format))
                })
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;
        let depth_stencil = match &descriptor.depth_stencil {
            Some(state) => Some(wgpu::DepthStencilState {
                format: texture_format(state.format).ok_or_else(|| {
                    ResourceError::Unsupported(format!("depth format {:?}", state.format))
                })?,
                depth_write_enabled: state.depth_write_enabled,
                depth_compare: state.depth_compare.into_wgpu(),
                stencil: wgpu::StencilState {
                    front: state.stencil_front.into_wgpu(),
                    back: state.stencil_back.into_wgpu(),
                    read_mask: state.stencil_read_mask,
                    write_mask: state.stencil_write_mask,
                },
                bias: wgpu::DepthBiasState {
                    constant: state.depth_bias,
                    slope_scale: f32::from_bits(state.depth_bias_slope_scale),
                    clamp: f32::from_bits(state.depth_bias_clamp),
                },
            }),
            None => None,
        };

        let pipeline = self.validated(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label,
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(descriptor.vertex.entry_point.as_ref()),
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: descriptor
                    .fragment
                    .as_ref()
                    .zip(fragment_module.as_ref())
                    .map(|(stage, module)| wgpu::FragmentState {
                        module,
                        entry_point: Some(stage.entry_point.as_ref()),
                        compilation_options: Default::default(),
                        targets: &targets,
                    }),
                primitive: descriptor.primitive.into_wgpu(),
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count.max(1),
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
        })?;
        Ok(self
            .objects
            .borrow_mut()
            .insert(WgpuObject::RenderPipeline(pipeline)))
    }

    fn create_compute_pipeline(
        &mut self,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let label = descriptor.label.as_deref();
        let layout = self.pipeline_layout(descriptor.layout.native_handle())?;
        let module = self.shader_module(label, &descriptor.shader.source)?;
        let pipeline = self.validated(|device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label,
                layout: Some(&layout),
                module: &module,
                entry_point: Some(descriptor.shader.entry_point.as_ref()),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;
        Ok(self
            .objects
            .borrow_mut()
            .insert(WgpuObject::ComputePipeline(pipeline)))
    }

    fn create_query_heap(
        &mut self,
        descriptor: &QueryHeapDescriptor<'_>,
    ) -> Result<NativeHandle, ResourceError> {
        let set = self.validated(|device| {
            device.create_query_set(&wgpu::QuerySetDescriptor {
                label: descriptor.label.as_deref(),
                ty: descriptor.ty.into_wgpu(),
                count: descriptor.count,
            })
        })?;
        Ok(self.objects.borrow_mut().insert(WgpuObject::QuerySet {
            set,
            ty: descriptor.ty,
        }))
    }

    fn destroy(&mut self, kind: ResourceKind, handle: NativeHandle) {
        if kind == ResourceKind::SwapChain {
            match self.swap_chains.remove(&handle) {
                Some(SwapChainTarget::Offscreen { buffers, .. }) => {
                    for buffer in buffers {
                        self.destroy_texture(buffer);
                    }
                }
                Some(SwapChainTarget::Surface { frame, .. }) => {
                    if let Some((_, texture)) = frame {
                        self.objects.borrow_mut().remove(texture);
                    }
                }
                None => log::error!("WgpuDevice: destroy of unknown swap chain {handle}"),
            }
            return;
        }

        let Some(object) = self.objects.borrow_mut().remove(handle) else {
            log::error!("WgpuDevice: destroy of unknown {kind} {handle}");
            return;
        };
        if object.kind() != kind {
            log::error!(
                "WgpuDevice: {handle} destroyed as {kind} but is a {}",
                object.kind()
            );
        }
        match object {
            WgpuObject::Buffer(entry) => entry.buffer.destroy(),
            WgpuObject::Texture(entry) => entry.texture.destroy(),
            _ => {}
        }
        log::trace!("WgpuDevice: destroyed {kind} {handle}");
    }

    fn set_label(&mut self, kind: ResourceKind, handle: NativeHandle, label: &str) {
        // wgpu labels are fixed at creation.
        log::trace!("WgpuDevice: {kind} {handle} is now known as '{label}'");
    }

    fn write_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut objects = self.objects.borrow_mut();
        let entry = objects
            .buffer_mut(buffer)
            .ok_or_else(|| ResourceError::Backend(format!("{buffer} is not a buffer")))?;
        if entry.cpu_access != CpuAccessMode::Write {
            return Err(ResourceError::Backend(format!("{buffer} is not CPU-writable")));
        }
        let end = offset + data.len() as u64;
        if end > entry.size {
            return Err(ResourceError::OutOfBounds {
                offset,
                size: data.len() as u64,
                capacity: entry.size,
            });
        }
        entry.shadow[offset as usize..end as usize].copy_from_slice(data);

        // Queue writes work in 4-byte units; widen the range from the host copy.
        let start = offset - offset % wgpu::COPY_BUFFER_ALIGNMENT;
        let end = end.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if start < end {
            self.context.queue.write_buffer(
                &entry.buffer,
                start,
                &entry.shadow[start as usize..end as usize],
            );
        }
        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: NativeHandle,
        offset: u64,
        output: &mut [u8],
    ) -> Result<(), ResourceError> {
        let source = {
            let objects = self.objects.borrow();
            let entry = objects
                .buffer(buffer)
                .ok_or_else(|| ResourceError::Backend(format!("{buffer} is not a buffer")))?;
            if entry.cpu_access != CpuAccessMode::Read {
                return Err(ResourceError::Backend(format!("{buffer} is not CPU-readable")));
            }
            if offset + output.len() as u64 > entry.size {
                return Err(ResourceError::OutOfBounds {
                    offset,
                    size: output.len() as u64,
                    capacity: entry.size,
                });
            }
            entry.buffer.clone()
        };
        if output.is_empty() {
            return Ok(());
        }

        // --- 1. Copy into a mappable staging buffer ---
        let start = offset - offset % wgpu::COPY_BUFFER_ALIGNMENT;
        let end = (offset + output.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let device = &self.context.device;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Khora Readback Staging"),
            size: end - start,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Khora Readback"),
        });
        encoder.copy_buffer_to_buffer(&source, start, &staging, 0, end - start);
        self.context.queue.submit(Some(encoder.finish()));

        // --- 2. Map and wait ---
        let slice = staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ResourceError::Backend(format!("readback wait failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| ResourceError::Backend(format!("readback callback dropped: {e}")))?
            .map_err(|e| ResourceError::Backend(format!("readback mapping failed: {e}")))?;

        {
            let mapped = slice.get_mapped_range();
            let skip = (offset - start) as usize;
            output.copy_from_slice(&mapped[skip..skip + output.len()]);
        }
        staging.unmap();
        staging.destroy();
        Ok(())
    }

    fn create_swap_chain(
        &mut self,
        surface: &SurfaceHandle,
        descriptor: &SwapChainDescriptor<'_>,
    ) -> Result<SwapChainConfiguration, SwapChainError> {
        let (target, format, present_mode) = match surface.window() {
            Some(window) => {
                let (target, format, mode) = self.create_surface_swap_chain(window, descriptor)?;
                let present_mode = match mode {
                    wgpu::PresentMode::Mailbox => PresentMode::Mailbox,
                    wgpu::PresentMode::Immediate => PresentMode::Immediate,
                    _ => PresentMode::Fifo,
                };
                (target, format, present_mode)
            }
            None => {
                let format = match descriptor.format {
                    PixelFormat::Undefined => PixelFormat::Bgra8UnormSrgb,
                    format => format,
                };
                let buffers = self.create_backbuffers(
                    descriptor.back_buffer_count,
                    descriptor.width,
                    descriptor.height,
                    format,
                )?;
                let target = SwapChainTarget::Offscreen {
                    format,
                    count: descriptor.back_buffer_count,
                    buffers,
                    next: 0,
                    acquired: None,
                };
                (target, format, descriptor.present_mode)
            }
        };
        let handle = self.objects.borrow_mut().reserve();
        self.swap_chains.insert(handle, target);
        log::info!(
            "WgpuDevice: swap chain {handle} created ({}x{}, {format:?}, {present_mode:?})",
            descriptor.width,
            descriptor.height
        );
        Ok(SwapChainConfiguration {
            handle,
            format,
            present_mode,
            back_buffer_count: descriptor.back_buffer_count,
        })
    }

    fn acquire_next_texture(
        &mut self,
        swap_chain: NativeHandle,
    ) -> Result<Option<NativeHandle>, SwapChainError> {
        let device = self.context.device.clone();
        let objects = Rc::clone(&self.objects);
        match self.swap_chain_mut(swap_chain)? {
            SwapChainTarget::Offscreen {
                buffers,
                next,
                acquired,
                ..
            } => {
                if buffers.is_empty() {
                    return Ok(None);
                }
                let index = *acquired.get_or_insert(*next);
                Ok(Some(buffers[index]))
            }
            SwapChainTarget::Surface {
                surface,
                config,
                suspended,
                frame,
                ..
            } => {
                if let Some((_, texture)) = frame {
                    return Ok(Some(*texture));
                }
                if *suspended {
                    return Ok(None);
                }
                let surface_texture = match surface.get_current_texture() {
                    Ok(surface_texture) => surface_texture,
                    Err(wgpu::SurfaceError::Timeout) => {
                        return Ok(None)
                    }
                    Err(e @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                        log::debug!("WgpuDevice: surface {e}, reconfiguring");
                        surface.configure(&device, config);
                        return Ok(None);
                    }
                    Err(e) => return Err(SwapChainError::Backend(e.to_string())),
                };
                if surface_texture.suboptimal {
                    log::debug!("WgpuDevice: surface texture is suboptimal");
                }
                let format = from_wgpu_texture_format(config.format);
                let entry = Self::texture_entry(
                    surface_texture.texture.clone(),
                    format,
                    TextureDimension::D2,
                    true,
                );
                let texture = objects.borrow_mut().insert(WgpuObject::Texture(entry));
                *frame = Some((surface_texture, texture));
                Ok(Some(texture))
            }
        }
    }

    fn resize_swap_chain(
        &mut self,
        swap_chain: NativeHandle,
        width: u32,
        height: u32,
    ) -> Result<(), SwapChainError> {
        let target = self.swap_chain_mut(swap_chain)?;
        if target.has_acquired() {
            return Err(SwapChainError::BackbufferAcquired);
        }
        match target {
            SwapChainTarget::Offscreen {
                format,
                count,
                buffers,
                ..
            } => {
                let (format, count, old) = (*format, *count, std::mem::take(buffers));
                for buffer in old {
                    self.destroy_texture(buffer);
                }
                let fresh = self.create_backbuffers(count, width, height, format)?;
                if let SwapChainTarget::Offscreen { buffers, next, .. } =
                    self.swap_chain_mut(swap_chain)?
                {
                    *buffers = fresh;
                    *next = 0;
                }
            }
            SwapChainTarget::Surface {
                config, suspended, ..
            } => {
                config.width = width;
                config.height = height;
                *suspended = width == 0 || height == 0;
                if *suspended {
                    log::info!("WgpuDevice: swap chain {swap_chain} suspended at zero size");
                    return Ok(());
                }
                let config = config.clone();
                if let Some(SwapChainTarget::Surface { surface, .. }) =
                    self.swap_chains.get(&swap_chain)
                {
                    self.configure_surface(surface, &config)?;
                }
            }
        }
        log::info!("WgpuDevice: resized swap chain {swap_chain} to {width}x{height}");
        Ok(())
    }

    fn present(&mut self, swap_chain: NativeHandle) -> Result<(), SwapChainError> {
        let objects = Rc::clone(&self.objects);
        match self.swap_chain_mut(swap_chain)? {
            SwapChainTarget::Offscreen {
                buffers,
                next,
                acquired,
                ..
            } => {
                let index = acquired.take().ok_or_else(|| {
                    SwapChainError::Backend(format!(
                        "present on {swap_chain} without an acquired backbuffer"
                    ))
                })?;
                *next = (index + 1) % buffers.len();
            }
            SwapChainTarget::Surface { frame, .. } => {
                let (surface_texture, texture) = frame.take().ok_or_else(|| {
                    SwapChainError::Backend(format!(
                        "present on {swap_chain} without an acquired backbuffer"
                    ))
                })?;
                objects.borrow_mut().remove(texture);
                surface_texture.present();
            }
        }
        log::trace!("WgpuDevice: presented {swap_chain}");
        Ok(())
    }

    fn create_command_encoder(
        &mut self,
        queue: QueueType,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        Ok(Box::new(WgpuCommandEncoder::new(
            queue,
            self.context.device.clone(),
            Rc::clone(&self.objects),
            self.context.features,
        )))
    }

    fn submit(
        &mut self,
        queue: QueueType,
        batches: Vec<NativeCommandBatch>,
    ) -> Result<(), DeviceError> {
        self.check_lost()?;
        if batches.is_empty() {
            return Ok(());
        }
        let buffers = batches
            .into_iter()
            .map(|batch| {
                let list = batch.downcast::<WgpuCommandList>().map_err(|_| {
                    DeviceError::SubmissionFailed("batch was not recorded by a wgpu encoder".into())
                })?;
                if list.queue != queue {
                    return Err(DeviceError::SubmissionFailed(format!(
                        "batch recorded for {:?} submitted to {queue:?}",
                        list.queue
                    )));
                }
                Ok(list.buffer)
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;
        let index = self.context.queue.submit(buffers);

        let slot = self.frame_index as usize;
        if self.frame_fences.len() <= slot {
            self.frame_fences.resize_with(slot + 1, || None);
        }
        self.frame_fences[slot] = Some(index);
        self.check_lost()
    }

    fn begin_frame(&mut self, frame_index: u32) -> Result<(), DeviceError> {
        self.check_lost()?;
        self.frame_index = frame_index;
        if let Some(index) = self
            .frame_fences
            .get_mut(frame_index as usize)
            .and_then(Option::take)
        {
            self.context
                .device
                .poll(wgpu::PollType::WaitForSubmissionIndex(index))
                .map_err(|e| DeviceError::SubmissionFailed(format!("frame wait failed: {e}")))?;
        }
        self.check_lost()
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.check_lost()?;
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| DeviceError::SubmissionFailed(format!("idle wait failed: {e}")))?;
        self.frame_fences.iter_mut().for_each(|fence| *fence = None);
        self.check_lost()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        // Presentable textures must be released before their surfaces.
        for target in self.swap_chains.values_mut() {
            if let SwapChainTarget::Surface { frame, .. } = target {
                frame.take();
            }
        }
        self.swap_chains.clear();
        if let Err(e) = self.context.device.poll(wgpu::PollType::Wait) {
            log::warn!("Failed to poll device during shutdown: {e:?}");
        }
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("backend", &self.backend)
            .field("adapter", &self.context.adapter_info.name)
            .field("objects", &self.objects.borrow().len())
            .field("swap_chains", &self.swap_chains.len())
            .finish_non_exhaustive()
    }
}
