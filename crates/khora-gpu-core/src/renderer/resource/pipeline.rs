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

use super::{label_or_default, BindGroupLayout, ResourceCore};
use crate::renderer::api::{
    push_constant_size, ComputePipelineDescriptor, DeviceLimits, Feature, PipelineKind,
    PipelineLayoutDescriptor, PushConstantRange, RenderPipelineDescriptor, ResourceKind,
};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

/// The bind group layouts and push-constant ranges a pipeline is built against.
#[derive(Clone)]
pub struct PipelineLayout {
    inner: Rc<PipelineLayoutInner>,
}

struct PipelineLayoutInner {
    core: ResourceCore,
    bind_group_layouts: Vec<BindGroupLayout>,
    push_constant_ranges: Vec<PushConstantRange>,
    push_constant_size: u32,
}

impl_gpu_resource!(PipelineLayout, destroy);

/// A compiled render or compute pipeline.
#[derive(Clone)]
pub struct Pipeline {
    inner: Rc<PipelineInner>,
}

struct PipelineInner {
    core: ResourceCore,
    kind: PipelineKind,
    layout: PipelineLayout,
}

impl_gpu_resource!(Pipeline, destroy);

/// Checks push-constant ranges and returns the bytes they span.
pub(crate) fn validate_push_constants(
    ranges: &[PushConstantRange],
    limits: &DeviceLimits,
) -> Result<u32, ResourceError> {
    for range in ranges {
        let r = &range.range;
        if r.start >= r.end || r.start % 4 != 0 || r.end % 4 != 0 {
            return Err(ResourceError::InvalidDescriptor(format!(
                "push constant range {r:?} must be non-empty and 4-byte aligned"
            )));
        }
        if range.stages.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "push constant range {r:?} is visible to no shader stage"
            )));
        }
    }
    let size = push_constant_size(ranges);
    if size > limits.max_push_constant_size {
        return Err(ResourceError::Unsupported(format!(
            "push constants need {size} bytes, the device allows {}",
            limits.max_push_constant_size
        )));
    }
    Ok(size)
}

pub(crate) fn validate_render_pipeline(
    descriptor: &RenderPipelineDescriptor<'_>,
    limits: &DeviceLimits,
    has_feature: &dyn Fn(Feature) -> bool,
) -> Result<(), ResourceError> {
    let d = descriptor;
    if d.color_targets.is_empty() && d.depth_stencil.is_none() {
        return Err(ResourceError::InvalidDescriptor(
            "render pipeline has neither color targets nor a depth-stencil state".into(),
        ));
    }
    if d.color_targets.len() > limits.max_color_attachments as usize {
        return Err(ResourceError::Unsupported(format!(
            "{} color targets exceed the device limit of {}",
            d.color_targets.len(),
            limits.max_color_attachments
        )));
    }
    if let Some(target) = d
        .color_targets
        .iter()
        .find(|target| target.format.is_depth_stencil())
    {
        return Err(ResourceError::InvalidDescriptor(format!(
            "{} cannot be used as a color target",
            target.format
        )));
    }
    if let Some(depth) = &d.depth_stencil {
        if !depth.format.is_depth_stencil() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "{} is not a depth-stencil format",
                depth.format
            )));
        }
    }
    if !d.color_targets.is_empty() && d.fragment.is_none() {
        return Err(ResourceError::InvalidDescriptor(
            "render pipeline with color targets needs a fragment stage".into(),
        ));
    }
    if d.vertex_buffers.len() > limits.max_vertex_buffers as usize {
        return Err(ResourceError::Unsupported(format!(
            "{} vertex buffers exceed the device limit of {}",
            d.vertex_buffers.len(),
            limits.max_vertex_buffers
        )));
    }
    let attributes: usize = d.vertex_buffers.iter().map(|b| b.attributes.len()).sum();
    if attributes > limits.max_vertex_attributes as usize {
        return Err(ResourceError::Unsupported(format!(
            "{attributes} vertex attributes exceed the device limit of {}",
            limits.max_vertex_attributes
        )));
    }
    for layout in d.vertex_buffers {
        if layout.array_stride > u64::from(limits.max_vertex_buffer_array_stride) {
            return Err(ResourceError::Unsupported(format!(
                "vertex stride {} exceeds the device limit of {}",
                layout.array_stride, limits.max_vertex_buffer_array_stride
            )));
        }
        for attribute in layout.attributes.iter() {
            if attribute.offset + attribute.format.byte_size() > layout.array_stride
                && layout.array_stride != 0
            {
                return Err(ResourceError::InvalidDescriptor(format!(
                    "vertex attribute at location {} overruns its stride of {}",
                    attribute.shader_location, layout.array_stride
                )));
            }
        }
    }
    if !matches!(d.sample_count, 1 | 2 | 4 | 8) {
        return Err(ResourceError::InvalidDescriptor(format!(
            "sample count {} is not 1, 2, 4 or 8",
            d.sample_count
        )));
    }
    if d.primitive.unclipped_depth && !has_feature(Feature::DepthClipControl) {
        return Err(ResourceError::Unsupported(format!(
            "unclipped depth needs {:?}",
            Feature::DepthClipControl
        )));
    }
    Ok(())
}

impl PipelineLayout {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &PipelineLayoutDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        if descriptor.bind_group_layouts.len() > shared.limits.max_bind_groups as usize {
            return Err(ResourceError::Unsupported(format!(
                "{} bind groups exceed the device limit of {}",
                descriptor.bind_group_layouts.len(),
                shared.limits.max_bind_groups
            )));
        }
        for layout in descriptor.bind_group_layouts {
            layout.ensure_alive()?;
        }
        let push_constant_size =
            validate_push_constants(descriptor.push_constant_ranges, &shared.limits)?;

        let handle = shared
            .backend
            .borrow_mut()
            .create_pipeline_layout(descriptor)?;
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::PipelineLayout);
        Ok(Self {
            inner: Rc::new(PipelineLayoutInner {
                core: ResourceCore::register(shared, ResourceKind::PipelineLayout, handle, &label),
                bind_group_layouts: descriptor
                    .bind_group_layouts
                    .iter()
                    .map(|layout| (*layout).clone())
                    .collect(),
                push_constant_ranges: descriptor.push_constant_ranges.to_vec(),
                push_constant_size,
            }),
        })
    }

    /// The bind group layouts, indexed by group.
    pub fn bind_group_layouts(&self) -> &[BindGroupLayout] {
        &self.inner.bind_group_layouts
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.inner.push_constant_ranges
    }

    /// Bytes of push constants pipelines built on this layout may write.
    pub fn push_constant_size(&self) -> u32 {
        self.inner.push_constant_size
    }
}

impl Pipeline {
    pub(crate) fn create_render(
        shared: &Rc<DeviceShared>,
        descriptor: &RenderPipelineDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        descriptor.layout.ensure_alive()?;
        validate_push_constants(descriptor.layout.push_constant_ranges(), &shared.limits)?;
        {
            let backend = shared.backend.borrow();
            validate_render_pipeline(descriptor, &shared.limits, &|feature| {
                backend.query_feature(feature)
            })?;
        }

        let handle = shared
            .backend
            .borrow_mut()
            .create_render_pipeline(descriptor)?;
        Ok(Self::wrap(
            shared,
            PipelineKind::Render,
            handle,
            descriptor.label.as_deref(),
            descriptor.layout,
        ))
    }

    pub(crate) fn create_compute(
        shared: &Rc<DeviceShared>,
        descriptor: &ComputePipelineDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        descriptor.layout.ensure_alive()?;
        validate_push_constants(descriptor.layout.push_constant_ranges(), &shared.limits)?;

        let handle = shared
            .backend
            .borrow_mut()
            .create_compute_pipeline(descriptor)?;
        Ok(Self::wrap(
            shared,
            PipelineKind::Compute,
            handle,
            descriptor.label.as_deref(),
            descriptor.layout,
        ))
    }

    fn wrap(
        shared: &Rc<DeviceShared>,
        kind: PipelineKind,
        handle: crate::renderer::api::NativeHandle,
        label: Option<&str>,
        layout: &PipelineLayout,
    ) -> Self {
        let resource_kind = match kind {
            PipelineKind::Render => ResourceKind::RenderPipeline,
            PipelineKind::Compute => ResourceKind::ComputePipeline,
        };
        let label = label_or_default(label, resource_kind);
        Self {
            inner: Rc::new(PipelineInner {
                core: ResourceCore::register(shared, resource_kind, handle, &label),
                kind,
                layout: layout.clone(),
            }),
        }
    }

    /// Render or compute.
    pub fn kind(&self) -> PipelineKind {
        self.inner.kind
    }

    /// The layout the pipeline was built on.
    pub fn layout(&self) -> &PipelineLayout {
        &self.inner.layout
    }

    /// Bytes of push constants this pipeline accepts.
    pub fn push_constant_size(&self) -> u32 {
        self.inner.layout.push_constant_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::ShaderStageFlags;

    fn range(stages: ShaderStageFlags, start: u32, end: u32) -> PushConstantRange {
        PushConstantRange {
            stages,
            range: start..end,
        }
    }

    #[test]
    fn test_push_constant_size_is_the_furthest_end() {
        let limits = DeviceLimits::default();
        let ranges = [
            range(ShaderStageFlags::VERTEX, 0, 64),
            range(ShaderStageFlags::FRAGMENT, 64, 96),
        ];
        assert_eq!(validate_push_constants(&ranges, &limits), Ok(96));
        assert_eq!(validate_push_constants(&[], &limits), Ok(0));
    }

    #[test]
    fn test_push_constants_over_the_limit_are_unsupported() {
        let limits = DeviceLimits::default();
        let ranges = [range(
            ShaderStageFlags::VERTEX,
            0,
            limits.max_push_constant_size + 4,
        )];
        assert!(matches!(
            validate_push_constants(&ranges, &limits),
            Err(ResourceError::Unsupported(_))
        ));
    }

    #[test]
    fn test_misaligned_push_constant_ranges() {
        let limits = DeviceLimits::default();
        assert!(validate_push_constants(&[range(ShaderStageFlags::VERTEX, 2, 8)], &limits).is_err());
        assert!(validate_push_constants(&[range(ShaderStageFlags::VERTEX, 8, 8)], &limits).is_err());
        assert!(validate_push_constants(&[range(ShaderStageFlags::EMPTY, 0, 8)], &limits).is_err());
    }
}
