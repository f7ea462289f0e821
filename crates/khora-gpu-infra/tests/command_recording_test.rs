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

//! Integration tests for command recording, submission and presentation on the
//! software backend.

mod common;

use common::{inspect, pipeline_layout, render_pipeline, software_device};
use khora_gpu_core::renderer::api::{
    BufferDescriptor, BufferUsage, Color, CpuAccessMode, LoadAction, PixelFormat, PresentMode,
    QueryHeapDescriptor, QueryType, QueueType, RenderPassColorAttachment, RenderPassDescriptor,
    StoreAction, SurfaceHandle, SwapChainDescriptor, TextureDataLayout, TextureDescriptor,
    TextureRegion, TextureUsage,
};
use khora_gpu_core::renderer::{CommandError, RecorderState, SwapChainError, Texture};
use khora_gpu_core::GraphicsDevice;

fn clear_pass<'a>(attachments: &'a [RenderPassColorAttachment<'a>]) -> RenderPassDescriptor<'a> {
    RenderPassDescriptor {
        label: Some("clear".into()),
        color_attachments: attachments,
        depth_stencil_attachment: None,
        occlusion_query_heap: None,
    }
}

fn color_attachment(texture: &Texture, color: Color) -> RenderPassColorAttachment<'_> {
    RenderPassColorAttachment {
        texture,
        resolve_target: None,
        load: LoadAction::Clear(color),
        store: StoreAction::Store,
    }
}

fn render_target(device: &GraphicsDevice, width: u32, height: u32) -> Texture {
    device
        .create_texture(
            &TextureDescriptor::texture_2d(
                "target",
                PixelFormat::Rgba8Unorm,
                width,
                height,
                TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST,
            ),
            None,
        )
        .unwrap()
}

#[test]
fn test_buffer_round_trip_through_a_gpu_copy() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let values: [u32; 4] = [1, 2, 3, 0xDEAD_BEEF];
    let source = device
        .create_buffer_from_slice(
            &BufferDescriptor::new("source", 0, BufferUsage::COPY_SRC),
            &values,
        )
        .unwrap();
    let readback = device
        .create_buffer(
            &BufferDescriptor::new("readback", 16, BufferUsage::COPY_DST)
                .with_cpu_access(CpuAccessMode::Read),
            None,
        )
        .unwrap();

    // --- 2. ACT ---
    let mut recorder = device
        .acquire_command_buffer(QueueType::Copy, Some("upload"))
        .unwrap();
    recorder
        .copy_buffer_to_buffer(&source, 0, &readback, 0, 16)
        .unwrap();
    recorder.flush().unwrap();
    let stats = device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(stats.submitted_batches, 1);
    assert_eq!(readback.get_data_as::<u32>(0, 4).unwrap(), values.to_vec());
    assert_eq!(inspect(&device, |sw| sw.stats().copies), 1);
}

#[test]
fn test_commands_wait_for_finish_frame() {
    let device = software_device(2);
    let source = device
        .create_buffer_from_slice(&BufferDescriptor::new("source", 0, BufferUsage::COPY_SRC), &[5u32; 2])
        .unwrap();
    let readback = device
        .create_buffer(
            &BufferDescriptor::new("readback", 8, BufferUsage::COPY_DST)
                .with_cpu_access(CpuAccessMode::Read),
            None,
        )
        .unwrap();

    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.copy_buffer_to_buffer(&source, 0, &readback, 0, 8).unwrap();
    recorder.flush().unwrap();
    assert_eq!(readback.get_data_as::<u32>(0, 2).unwrap(), vec![0, 0]);

    device.finish_frame().unwrap();
    assert_eq!(readback.get_data_as::<u32>(0, 2).unwrap(), vec![5, 5]);
}

#[test]
fn test_render_pass_clears_its_attachment() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let target = render_target(&device, 4, 4);
    let attachments = [color_attachment(
        &target,
        Color {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    )];

    // --- 2. ACT ---
    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.begin_render_pass(&clear_pass(&attachments)).unwrap();
    assert_eq!(recorder.state(), RecorderState::InRenderPass);
    assert_eq!(recorder.render_area(), Some((4, 4)));
    recorder.end_render_pass().unwrap();
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    let texels = inspect(&device, |sw| sw.texture_data(target.native_handle()).map(<[u8]>::to_vec))
        .unwrap();
    assert_eq!(texels.len(), 4 * 4 * 4);
    assert!(texels.chunks_exact(4).all(|texel| texel == [255, 0, 0, 255]));
}

#[test]
fn test_render_pass_state_is_validated() {
    let device = software_device(2);
    let target = render_target(&device, 8, 8);
    let staging = device
        .create_buffer(&BufferDescriptor::new("staging", 16, BufferUsage::COPY_SRC | BufferUsage::COPY_DST), None)
        .unwrap();
    let attachments = [color_attachment(&target, Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 })];

    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    assert_eq!(recorder.draw(0..3, 0..1), Err(CommandError::NotInRenderPass("draw")));
    assert_eq!(recorder.end_render_pass(), Err(CommandError::NotInRenderPass("end_render_pass")));

    recorder.begin_render_pass(&clear_pass(&attachments)).unwrap();
    assert_eq!(
        recorder.begin_render_pass(&clear_pass(&attachments)),
        Err(CommandError::AlreadyInRenderPass)
    );
    assert!(matches!(
        recorder.copy_buffer_to_buffer(&staging, 0, &staging, 8, 8),
        Err(CommandError::InRenderPass(_))
    ));
    assert!(matches!(recorder.draw(0..3, 0..1), Err(CommandError::NoPipelineBound(_))));
    recorder.flush().unwrap();

    let mut copy = device.acquire_command_buffer(QueueType::Copy, None).unwrap();
    assert!(matches!(
        copy.begin_render_pass(&clear_pass(&attachments)),
        Err(CommandError::QueueMismatch(_))
    ));
    copy.flush().unwrap();
    device.finish_frame().unwrap();
}

#[test]
fn test_redundant_pipeline_binds_are_skipped() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let layout = pipeline_layout(&device, &[]);
    let pipeline = render_pipeline(&device, &layout);
    let target = render_target(&device, 4, 4);
    let attachments = [color_attachment(&target, Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 })];

    // --- 2. ACT ---
    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.begin_render_pass(&clear_pass(&attachments)).unwrap();
    recorder.set_pipeline(&pipeline).unwrap();
    recorder.set_pipeline(&pipeline).unwrap();
    recorder.draw(0..3, 0..1).unwrap();
    recorder.set_pipeline(&pipeline).unwrap();
    recorder.draw(0..3, 0..1).unwrap();
    let recorded = recorder.stats();
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(recorded.pipeline_binds, 1);
    assert_eq!(recorded.redundant_pipeline_binds, 2);
    assert_eq!(recorded.draws, 2);
    let executed = inspect(&device, |sw| sw.stats());
    assert_eq!(executed.pipeline_binds, 1);
    assert_eq!(executed.draws, 2);
}

#[test]
fn test_destroyed_pipeline_cannot_be_bound() {
    let device = software_device(2);
    let layout = pipeline_layout(&device, &[]);
    let pipeline = render_pipeline(&device, &layout);
    let target = render_target(&device, 4, 4);
    let attachments = [color_attachment(&target, Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 })];
    pipeline.destroy();

    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.begin_render_pass(&clear_pass(&attachments)).unwrap();
    assert!(matches!(
        recorder.set_pipeline(&pipeline),
        Err(CommandError::InvalidResource(_))
    ));
    recorder.flush().unwrap();
}

#[test]
fn test_debug_groups_must_balance() {
    let device = software_device(2);
    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, Some("frame")).unwrap();

    assert_eq!(recorder.pop_debug_group(), Err(CommandError::DebugGroupUnderflow));
    recorder.push_debug_group("shadows").unwrap();
    recorder.push_debug_group("cascade 0").unwrap();
    recorder.insert_debug_marker("split").unwrap();
    assert_eq!(recorder.debug_group_depth(), 2);
    recorder.pop_debug_group().unwrap();
    assert_eq!(recorder.debug_group_depth(), 1);

    // The open group is closed by flush.
    recorder.flush().unwrap();
    device.finish_frame().unwrap();
}

#[test]
fn test_swap_chain_presents_once_per_frame() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let swap_chain = device
        .create_swap_chain(
            &SurfaceHandle::headless(),
            &SwapChainDescriptor {
                label: Some("main".into()),
                width: 4,
                height: 4,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(swap_chain.format(), PixelFormat::Bgra8UnormSrgb);
    assert_eq!(swap_chain.present_mode(), PresentMode::Fifo);
    assert_eq!(swap_chain.back_buffer_count(), 2);

    // --- 2. ACT & 3. ASSERT ---
    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    assert_eq!(recorder.present(&swap_chain), Err(CommandError::NoAcquiredBackbuffer));

    let backbuffer = swap_chain.get_current_texture().unwrap().unwrap();
    let again = swap_chain.get_current_texture().unwrap().unwrap();
    assert_eq!(backbuffer.native_handle(), again.native_handle());
    assert!(swap_chain.has_acquired_texture());
    assert!(matches!(swap_chain.resize(8, 8), Err(SwapChainError::BackbufferAcquired)));

    recorder.present(&swap_chain).unwrap();
    assert_eq!(recorder.present(&swap_chain), Err(CommandError::AlreadyPresented));
    assert!(swap_chain.get_current_texture().unwrap().is_none());
    recorder.flush().unwrap();

    let stats = device.finish_frame().unwrap();
    assert_eq!(stats.presented_swap_chains, 1);
    assert_eq!(inspect(&device, |sw| sw.present_count(swap_chain.native_handle())), Some(1));
    assert_eq!(inspect(&device, |sw| sw.stats().acquires), 1);

    // The next frame acquires the other backbuffer.
    let next = swap_chain.get_current_texture().unwrap().unwrap();
    assert_ne!(next.native_handle(), backbuffer.native_handle());
}

#[test]
fn test_swap_chain_resize_and_minimize() {
    let device = software_device(2);
    let swap_chain = device
        .create_swap_chain(&SurfaceHandle::headless(), &SwapChainDescriptor::default())
        .unwrap();

    swap_chain.resize(0, 0).unwrap();
    assert!(swap_chain.get_current_texture().unwrap().is_none());

    swap_chain.resize(16, 9).unwrap();
    assert_eq!(swap_chain.extent(), (16, 9));
    let backbuffer = swap_chain.get_current_texture().unwrap().unwrap();
    assert_eq!((backbuffer.width(), backbuffer.height()), (16, 9));
}

#[test]
fn test_occlusion_query_resolves_drawn_samples() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let layout = pipeline_layout(&device, &[]);
    let pipeline = render_pipeline(&device, &layout);
    let target = render_target(&device, 4, 4);
    let heap = device
        .create_query_heap(&QueryHeapDescriptor {
            label: Some("occlusion".into()),
            ty: QueryType::Occlusion,
            count: 2,
        })
        .unwrap();
    let results = device
        .create_buffer(
            &BufferDescriptor::new("results", 16, BufferUsage::QUERY_RESOLVE | BufferUsage::COPY_SRC),
            None,
        )
        .unwrap();
    let readback = device
        .create_buffer(
            &BufferDescriptor::new("readback", 16, BufferUsage::COPY_DST)
                .with_cpu_access(CpuAccessMode::Read),
            None,
        )
        .unwrap();
    let attachments = [color_attachment(&target, Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 })];
    let pass = RenderPassDescriptor {
        occlusion_query_heap: Some(&heap),
        ..clear_pass(&attachments)
    };

    // --- 2. ACT ---
    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.begin_render_pass(&pass).unwrap();
    recorder.set_pipeline(&pipeline).unwrap();
    recorder.begin_query(&heap, 1).unwrap();
    recorder.draw(0..3, 0..2).unwrap();
    recorder.end_query(&heap, 1).unwrap();
    recorder.end_render_pass().unwrap();
    recorder.resolve_query_heap(&heap, 0..2, &results, 0).unwrap();
    recorder.copy_buffer_to_buffer(&results, 0, &readback, 0, 16).unwrap();
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(readback.get_data_as::<u64>(0, 2).unwrap(), vec![0, 6]);
}

#[test]
fn test_timestamps_are_rejected_inside_render_passes() {
    let device = software_device(2);
    let target = render_target(&device, 4, 4);
    let heap = device
        .create_query_heap(&QueryHeapDescriptor {
            label: None,
            ty: QueryType::Timestamp,
            count: 2,
        })
        .unwrap();
    let attachments = [color_attachment(&target, Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 })];

    let mut recorder = device.acquire_command_buffer(QueueType::Graphics, None).unwrap();
    recorder.write_timestamp(&heap, 0).unwrap();
    assert!(matches!(recorder.begin_query(&heap, 0), Err(CommandError::InvalidResource(_))));
    recorder.begin_render_pass(&clear_pass(&attachments)).unwrap();
    assert!(matches!(recorder.write_timestamp(&heap, 1), Err(CommandError::InRenderPass(_))));
    recorder.end_render_pass().unwrap();
    assert!(matches!(recorder.write_timestamp(&heap, 2), Err(CommandError::InvalidResource(_))));
    recorder.flush().unwrap();
}

#[test]
fn test_buffer_to_texture_copy_fills_a_region() {
    let device = software_device(2);
    let target = render_target(&device, 4, 4);
    let texels = [0x11u8; 2 * 2 * 4];
    let source = device
        .create_buffer_from_slice(&BufferDescriptor::new("texels", 0, BufferUsage::COPY_SRC), &texels)
        .unwrap();

    let mut recorder = device.acquire_command_buffer(QueueType::Copy, None).unwrap();
    recorder
        .copy_buffer_to_texture(
            &source,
            &TextureDataLayout {
                offset: 0,
                bytes_per_row: 8,
                rows_per_image: 2,
            },
            &target,
            &TextureRegion {
                mip_level: 0,
                origin: [2, 2, 0],
                extent: [2, 2, 1],
            },
        )
        .unwrap();
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    let data = inspect(&device, |sw| sw.texture_data(target.native_handle()).map(<[u8]>::to_vec))
        .unwrap();
    let row_pitch = 4 * 4;
    assert_eq!(&data[2 * row_pitch..2 * row_pitch + 8], &[0; 8]);
    assert_eq!(&data[2 * row_pitch + 8..3 * row_pitch], &[0x11; 8]);
    assert_eq!(&data[3 * row_pitch + 8..4 * row_pitch], &[0x11; 8]);
}

#[test]
fn test_buffer_to_texture_copy_rejects_bad_regions() {
    // --- 1. ARRANGE ---
    let device = software_device(2);
    let target = render_target(&device, 4, 4);
    let tiny = device
        .create_buffer_from_slice(&BufferDescriptor::new("tiny", 0, BufferUsage::COPY_SRC), &[0xAA; 4])
        .unwrap();
    let texels = device
        .create_buffer_from_slice(&BufferDescriptor::new("texels", 0, BufferUsage::COPY_SRC), &[0x22; 64])
        .unwrap();
    let tight = TextureDataLayout {
        offset: 0,
        bytes_per_row: 16,
        rows_per_image: 0,
    };
    let region = |mip_level, origin, extent| TextureRegion {
        mip_level,
        origin,
        extent,
    };
    let is_invalid = |result: Result<(), CommandError>| matches!(result, Err(CommandError::InvalidResource(_)));

    // --- 2. ACT ---
    let mut recorder = device.acquire_command_buffer(QueueType::Copy, None).unwrap();
    let undersized = recorder.copy_buffer_to_texture(&tiny, &tight, &target, &region(0, [0, 0, 0], [4, 4, 1]));
    let overflowing =
        recorder.copy_buffer_to_texture(&texels, &tight, &target, &region(0, [u32::MAX, 0, 0], [2, 1, 1]));
    let outside = recorder.copy_buffer_to_texture(&texels, &tight, &target, &region(0, [2, 0, 0], [4, 1, 1]));
    let missing_mip = recorder.copy_buffer_to_texture(&texels, &tight, &target, &region(1, [0, 0, 0], [1, 1, 1]));
    let offset_past_end = recorder.copy_buffer_to_texture(
        &texels,
        &TextureDataLayout { offset: 4, ..tight },
        &target,
        &region(0, [0, 0, 0], [4, 4, 1]),
    );
    let short_images = recorder.copy_buffer_to_texture(
        &texels,
        &TextureDataLayout {
            rows_per_image: 2,
            ..tight
        },
        &target,
        &region(0, [0, 0, 0], [4, 4, 1]),
    );
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    // --- 3. ASSERT ---
    assert!(is_invalid(undersized));
    assert!(is_invalid(overflowing));
    assert!(is_invalid(outside));
    assert!(is_invalid(missing_mip));
    assert!(is_invalid(offset_past_end));
    assert!(is_invalid(short_images));
    assert_eq!(inspect(&device, |sw| sw.stats().copies), 0);
    let data = inspect(&device, |sw| sw.texture_data(target.native_handle()).map(<[u8]>::to_vec))
        .unwrap();
    assert!(data.iter().all(|&byte| byte == 0));
}

#[test]
fn test_buffer_to_texture_copy_reads_exactly_its_footprint() {
    let device = software_device(2);
    let target = render_target(&device, 4, 4);
    // Three padded rows plus one tight final row.
    let source = device
        .create_buffer_from_slice(
            &BufferDescriptor::new("padded", 0, BufferUsage::COPY_SRC),
            &[0x33; 3 * 32 + 16],
        )
        .unwrap();

    let mut recorder = device.acquire_command_buffer(QueueType::Copy, None).unwrap();
    recorder
        .copy_buffer_to_texture(
            &source,
            &TextureDataLayout {
                offset: 0,
                bytes_per_row: 32,
                rows_per_image: 0,
            },
            &target,
            &TextureRegion {
                mip_level: 0,
                origin: [0, 0, 0],
                extent: [4, 4, 1],
            },
        )
        .unwrap();
    recorder.flush().unwrap();
    device.finish_frame().unwrap();

    let data = inspect(&device, |sw| sw.texture_data(target.native_handle()).map(<[u8]>::to_vec))
        .unwrap();
    assert!(data.iter().all(|&byte| byte == 0x33));
}
