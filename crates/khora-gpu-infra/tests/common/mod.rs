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

//! Shared helpers for the software-backed integration tests.

#![allow(dead_code)]

use khora_gpu_core::renderer::api::{
    ColorTargetState, GraphicsBackendType, NativeHandle, PipelineLayoutDescriptor, PixelFormat,
    PrimitiveState, PushConstantRange, RenderPipelineDescriptor, ShaderSource,
    ShaderStageDescriptor, ValidationMode,
};
use khora_gpu_core::renderer::{
    DeviceDescriptor, DeviceEventBus, GraphicsDevice, Pipeline, PipelineLayout,
};
use khora_gpu_infra::{SoftwareDevice, SoftwareDeviceConfig};

const SHADER: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

/// Creates a device on the software backend.
pub fn software_device(max_frames_in_flight: u32) -> GraphicsDevice {
    software_device_with(max_frames_in_flight, SoftwareDeviceConfig::default())
}

/// Creates a device on the software backend with a custom configuration.
pub fn software_device_with(max_frames_in_flight: u32, config: SoftwareDeviceConfig) -> GraphicsDevice {
    khora_gpu_infra::logging::init_for_tests();
    let descriptor = DeviceDescriptor {
        max_frames_in_flight,
        ..DeviceDescriptor::with_backend(GraphicsBackendType::Software)
    };
    let events = DeviceEventBus::new();
    let backend = SoftwareDevice::new(config, events.sender());
    GraphicsDevice::from_backend(&descriptor, Box::new(backend), events)
}

/// Creates a device on the software backend with an explicit validation mode.
pub fn software_device_with_validation(max_frames_in_flight: u32, validation_mode: ValidationMode) -> GraphicsDevice {
    khora_gpu_infra::logging::init_for_tests();
    let descriptor = DeviceDescriptor {
        max_frames_in_flight,
        validation_mode,
        ..DeviceDescriptor::with_backend(GraphicsBackendType::Software)
    };
    let events = DeviceEventBus::new();
    let backend = SoftwareDevice::new(SoftwareDeviceConfig::default(), events.sender());
    GraphicsDevice::from_backend(&descriptor, Box::new(backend), events)
}

/// Runs `f` against the software device behind `device`.
pub fn inspect<R>(device: &GraphicsDevice, f: impl FnOnce(&SoftwareDevice) -> R) -> R {
    device.with_backend(|backend| {
        let software = backend
            .as_any()
            .downcast_ref::<SoftwareDevice>()
            .expect("device is not a software device");
        f(software)
    })
}

/// Returns `true` while the native object exists.
pub fn is_alive(device: &GraphicsDevice, handle: NativeHandle) -> bool {
    inspect(device, |software| software.is_alive(handle))
}

/// A pipeline layout with an optional push-constant block.
pub fn pipeline_layout(device: &GraphicsDevice, push_constant_ranges: &[PushConstantRange]) -> PipelineLayout {
    device
        .create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("test layout".into()),
            bind_group_layouts: &[],
            push_constant_ranges,
        })
        .expect("pipeline layout")
}

/// A render pipeline drawing into one RGBA8 target.
pub fn render_pipeline(device: &GraphicsDevice, layout: &PipelineLayout) -> Pipeline {
    let color_targets = [ColorTargetState::opaque(PixelFormat::Rgba8Unorm)];
    device
        .create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("test pipeline".into()),
            layout,
            vertex: ShaderStageDescriptor {
                source: ShaderSource::Wgsl(SHADER.into()),
                entry_point: "vs_main".into(),
            },
            fragment: Some(ShaderStageDescriptor {
                source: ShaderSource::Wgsl(SHADER.into()),
                entry_point: "fs_main".into(),
            }),
            vertex_buffers: &[],
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            color_targets: &color_targets,
            sample_count: 1,
        })
        .expect("render pipeline")
}
