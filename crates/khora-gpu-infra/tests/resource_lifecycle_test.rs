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

//! Integration tests for resource creation and deferred destruction on the software
//! backend.

mod common;

use common::{
    inspect, is_alive, pipeline_layout, software_device, software_device_with,
    software_device_with_validation,
};
use khora_gpu_core::renderer::api::{
    BufferDescriptor, BufferUsage, CpuAccessMode, GraphicsBackendType, PixelFormat,
    PushConstantRange, ResourceKind, ShaderStageFlags, TextureDescriptor, TextureUsage,
    ValidationMode,
};
use khora_gpu_core::renderer::{DeviceError, DeviceEvent, ResourceError};
use khora_gpu_infra::SoftwareDeviceConfig;

fn vertex_buffer(device: &khora_gpu_core::GraphicsDevice, label: &str) -> khora_gpu_core::renderer::Buffer {
    device
        .create_buffer(&BufferDescriptor::new(label, 64, BufferUsage::VERTEX), None)
        .unwrap()
}

#[test]
fn test_destroyed_objects_outlive_the_frames_in_flight() {
    for frames_in_flight in 1..=3u32 {
        // --- 1. ARRANGE ---
        let device = software_device(frames_in_flight);
        let buffer = vertex_buffer(&device, "vertices");
        let handle = buffer.native_handle();

        // --- 2. ACT ---
        buffer.destroy();

        // --- 3. ASSERT ---
        assert!(buffer.is_destroyed());
        assert_eq!(device.pending_deletions(), 1);
        for frame in 1..frames_in_flight {
            device.finish_frame().unwrap();
            assert!(
                is_alive(&device, handle),
                "released after {frame} of {frames_in_flight} frames"
            );
            assert_eq!(device.pending_deletions(), 1);
        }

        let stats = device.finish_frame().unwrap();
        assert_eq!(stats.frame_count, u64::from(frames_in_flight));
        assert_eq!(stats.destroyed_resources, 1);
        assert!(!is_alive(&device, handle));
        assert_eq!(device.pending_deletions(), 0);
    }
}

#[test]
fn test_frame_index_wraps_at_frames_in_flight() {
    let device = software_device(3);
    let mut seen = Vec::new();
    for _ in 0..5 {
        device.finish_frame().unwrap();
        seen.push(device.frame_index());
    }
    assert_eq!(seen, vec![1, 2, 0, 1, 2]);
    assert_eq!(device.frame_count(), 5);
    assert_eq!(inspect(&device, |sw| sw.stats().frames_begun), 5);
}

#[test]
fn test_double_destroy_is_a_no_op() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let buffer = vertex_buffer(&device, "twice");
    let alias = buffer.clone();

    // --- 2. ACT ---
    buffer.destroy();
    alias.destroy();
    device.finish_frame().unwrap();
    device.finish_frame().unwrap();
    buffer.destroy();
    device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    let stats = inspect(&device, |sw| sw.stats());
    assert_eq!(stats.destroyed_objects, 1);
    assert_eq!(stats.invalid_destroys, 0);
}

#[test]
fn test_live_resources_report_leaks() {
    let device = software_device(2);
    let kept = vertex_buffer(&device, "kept");
    let dropped = vertex_buffer(&device, "dropped");
    let texture = device
        .create_texture(
            &TextureDescriptor::texture_2d("albedo", PixelFormat::Rgba8Unorm, 4, 4, TextureUsage::SHADER_READ),
            None,
        )
        .unwrap();
    assert_eq!(device.live_resource_count(), 3);

    dropped.destroy();
    texture.set_label("albedo (renamed)");

    let live = device.live_resources();
    assert_eq!(live.len(), 2);
    assert!(live.iter().any(|r| r.kind == ResourceKind::Buffer && r.label == "kept"));
    assert!(live.iter().any(|r| r.kind == ResourceKind::Texture && r.label == "albedo (renamed)"));
    assert_eq!(
        inspect(&device, |sw| sw.label_of(texture.native_handle()).map(str::to_owned)),
        Some("albedo (renamed)".to_owned())
    );
    kept.destroy();
    texture.destroy();
    assert!(device.live_resources().is_empty());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "resources were never destroyed")]
fn test_verbose_validation_asserts_on_leaks_at_teardown() {
    let device = software_device_with_validation(2, ValidationMode::Verbose);
    let _leaked = vertex_buffer(&device, "leaked");
    drop(device);
}

#[test]
fn test_clean_teardown_passes_verbose_validation() {
    // --- 1. ARRANGE ---
    let device = software_device_with_validation(2, ValidationMode::Verbose);
    let buffer = vertex_buffer(&device, "vertices");
    device.finish_frame().unwrap();

    // --- 2. ACT ---
    buffer.destroy();

    // --- 3. ASSERT ---
    // Still queued for deletion; teardown flushes it before checking for leaks.
    assert!(is_alive(&device, buffer.native_handle()));
    drop(device);
}

#[test]
fn test_buffer_sizes_that_overflow_alignment_are_unsupported() {
    let device = software_device(2);
    for usage in [BufferUsage::VERTEX, BufferUsage::CONSTANT] {
        let result = device.create_buffer(&BufferDescriptor::new("huge", u64::MAX - 1, usage), None);
        assert!(matches!(result, Err(ResourceError::Unsupported(_))));
    }
    assert_eq!(device.live_resource_count(), 0);
}

#[test]
fn test_cpu_access_is_checked_before_the_backend() {
    let device = software_device(2);
    let gpu_only = vertex_buffer(&device, "gpu only");
    let upload = device
        .create_buffer(
            &BufferDescriptor::new("upload", 16, BufferUsage::COPY_SRC)
                .with_cpu_access(CpuAccessMode::Write),
            None,
        )
        .unwrap();

    assert!(matches!(
        gpu_only.set_data(0, &[1, 2, 3, 4]),
        Err(ResourceError::CpuAccessDenied { operation: "set_data", .. })
    ));
    assert!(matches!(
        upload.set_data(12, &[0; 8]),
        Err(ResourceError::OutOfBounds { offset: 12, size: 8, capacity: 16 })
    ));
    upload.set_data(4, &[7; 4]).unwrap();
    assert_eq!(
        inspect(&device, |sw| sw.buffer_data(upload.native_handle()).map(|d| d[4..8].to_vec())),
        Some(vec![7; 4])
    );

    upload.destroy();
    assert!(matches!(
        upload.set_data(0, &[0; 4]),
        Err(ResourceError::Destroyed { .. })
    ));
}

#[test]
fn test_exclusive_constant_buffers_on_dx11_rules() {
    let device = software_device_with(2, SoftwareDeviceConfig::emulating(GraphicsBackendType::Dx11));
    let mixed = BufferDescriptor::new("mixed", 64, BufferUsage::CONSTANT | BufferUsage::SHADER_READ);
    assert!(matches!(
        device.create_buffer(&mixed, None),
        Err(ResourceError::Unsupported(_))
    ));

    let constants = device
        .create_buffer(&BufferDescriptor::new("constants", 20, BufferUsage::CONSTANT), None)
        .unwrap();
    assert_eq!(constants.size(), 20);
    assert_eq!(constants.allocated_size(), 32);
    assert_eq!(
        inspect(&device, |sw| sw.buffer_data(constants.native_handle()).map(<[u8]>::len)),
        Some(32)
    );
}

#[test]
fn test_sampled_depth_uses_typeless_storage_where_required() {
    let descriptor =
        TextureDescriptor::depth_stencil("shadow map", PixelFormat::Depth32Float, 64, 64, true);

    let dx11 = software_device_with(2, SoftwareDeviceConfig::emulating(GraphicsBackendType::Dx11));
    let shadow = dx11.create_texture(&descriptor, None).unwrap();
    let allocation = shadow.allocation();
    assert!(allocation.typeless);
    assert_eq!(allocation.storage_format, PixelFormat::R32Typeless);
    assert_eq!(allocation.shader_view_format, PixelFormat::R32Float);
    assert_eq!(
        inspect(&dx11, |sw| sw.texture_allocation(shadow.native_handle())),
        Some(allocation)
    );

    let vulkan = software_device_with(2, SoftwareDeviceConfig::emulating(GraphicsBackendType::Vulkan));
    let shadow = vulkan.create_texture(&descriptor, None).unwrap();
    assert!(!shadow.allocation().typeless);
    assert_eq!(shadow.allocation().storage_format, PixelFormat::Depth32Float);
}

#[test]
fn test_push_constant_budget_is_enforced_at_layout_creation() {
    let device = software_device(2);
    let max = device.limits().max_push_constant_size;

    let layout = pipeline_layout(
        &device,
        &[PushConstantRange {
            stages: ShaderStageFlags::VERTEX,
            range: 0..max,
        }],
    );
    assert_eq!(layout.push_constant_size(), max);

    let result = device.create_pipeline_layout(&khora_gpu_core::renderer::api::PipelineLayoutDescriptor {
        label: Some("too big".into()),
        bind_group_layouts: &[],
        push_constant_ranges: &[PushConstantRange {
            stages: ShaderStageFlags::VERTEX,
            range: 0..max + 4,
        }],
    });
    assert!(matches!(result, Err(ResourceError::Unsupported(_))));
}

#[test]
fn test_device_loss_is_latched() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let events = device.events();

    // --- 2. ACT ---
    device.with_backend_mut(|backend| {
        backend
            .as_any_mut()
            .downcast_mut::<khora_gpu_infra::SoftwareDevice>()
            .unwrap()
            .simulate_device_loss("driver reset");
    });
    let first = device.finish_frame();

    // --- 3. ASSERT ---
    assert!(matches!(events.try_recv(), Ok(DeviceEvent::Lost { reason }) if reason == "driver reset"));
    assert!(matches!(first, Err(DeviceError::DeviceLost(_))));
    assert!(matches!(device.finish_frame(), Err(DeviceError::DeviceLost(_))));
    assert!(matches!(
        device.acquire_command_buffer(khora_gpu_core::renderer::api::QueueType::Graphics, None),
        Err(DeviceError::DeviceLost(_))
    ));
}
