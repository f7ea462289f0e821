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

// Khora GPU Sandbox
// Creates a device, uploads and reads back a buffer, then renders a few headless frames.
//
// Usage: sandbox [backend] [frames]

use anyhow::{Context, Result};
use khora_gpu_core::renderer::api::{
    BufferDescriptor, BufferUsage, Color, CpuAccessMode, GraphicsBackendType, LoadAction,
    QueueType, RenderPassColorAttachment, RenderPassDescriptor, StoreAction, SurfaceHandle,
    SwapChainDescriptor,
};
use khora_gpu_core::renderer::DeviceDescriptor;
use khora_gpu_core::GraphicsDevice;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Particle {
    position: [f32; 2],
    velocity: [f32; 2],
}

const PARTICLES: &[Particle] = &[
    Particle {
        position: [0.0, 0.5],
        velocity: [0.1, 0.0],
    },
    Particle {
        position: [-0.5, -0.5],
        velocity: [0.0, 0.1],
    },
    Particle {
        position: [0.5, -0.5],
        velocity: [-0.1, -0.1],
    },
];

fn main() -> Result<()> {
    khora_gpu_infra::logging::init();

    let mut args = std::env::args().skip(1);
    let mut descriptor = DeviceDescriptor {
        label: Some("sandbox".to_owned()),
        ..Default::default()
    };
    if let Some(backend) = args.next() {
        let backend: GraphicsBackendType = backend.parse().map_err(anyhow::Error::msg)?;
        descriptor.preferred_backend = Some(backend);
    }
    let frames: u32 = match args.next() {
        Some(frames) => frames.parse().context("frame count must be a number")?,
        None => 3,
    };

    // --- 1. Device ---
    let providers = khora_gpu_infra::providers();
    let device = GraphicsDevice::create(&descriptor, &providers)?;
    let info = device.adapter_info();
    log::info!(
        "Sandbox: running on {} ({}, {:?})",
        info.name,
        device.backend_type(),
        info.adapter_type
    );

    round_trip(&device)?;
    render_frames(&device, frames)?;

    log::info!("Sandbox: {} live resources at exit", device.live_resource_count());
    Ok(())
}

/// Uploads a few particles, copies them on the GPU and reads them back.
fn round_trip(device: &GraphicsDevice) -> Result<()> {
    let source = device.create_buffer_from_slice(
        &BufferDescriptor::new("particles", 0, BufferUsage::COPY_SRC | BufferUsage::VERTEX),
        PARTICLES,
    )?;
    let size = source.size();
    let readback = device.create_buffer(
        &BufferDescriptor::new("particles readback", size, BufferUsage::COPY_DST)
            .with_cpu_access(CpuAccessMode::Read),
        None,
    )?;

    let mut recorder = device.acquire_command_buffer(QueueType::Copy, Some("readback"))?;
    recorder.copy_buffer_to_buffer(&source, 0, &readback, 0, size)?;
    recorder.flush()?;
    device.finish_frame()?;

    let particles = readback.get_data_as::<Particle>(0, PARTICLES.len())?;
    anyhow::ensure!(particles == PARTICLES, "GPU copy returned {particles:?}");
    log::info!("Sandbox: read back {} particles", particles.len());

    source.destroy();
    readback.destroy();
    Ok(())
}

/// Clears and presents a headless swap chain for `frames` frames.
fn render_frames(device: &GraphicsDevice, frames: u32) -> Result<()> {
    let swap_chain = device.create_swap_chain(
        &SurfaceHandle::headless(),
        &SwapChainDescriptor {
            label: Some("sandbox swap chain".into()),
            width: 320,
            height: 240,
            ..Default::default()
        },
    )?;

    for frame in 0..frames {
        let Some(backbuffer) = swap_chain.get_current_texture()? else {
            log::warn!("Sandbox: no backbuffer for frame {frame}, skipping");
            device.finish_frame()?;
            continue;
        };

        let t = f64::from(frame) / f64::from(frames.max(1));
        let attachments = [RenderPassColorAttachment {
            texture: &backbuffer,
            resolve_target: None,
            load: LoadAction::Clear(Color {
                r: t,
                g: 0.2,
                b: 1.0 - t,
                a: 1.0,
            }),
            store: StoreAction::Store,
        }];

        let mut recorder = device.acquire_command_buffer(QueueType::Graphics, Some("frame"))?;
        recorder.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear".into()),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
            occlusion_query_heap: None,
        })?;
        recorder.end_render_pass()?;
        recorder.present(&swap_chain)?;
        recorder.flush()?;

        let stats = device.finish_frame()?;
        log::info!(
            "Sandbox: frame {} submitted {} batches, presented {}, released {}",
            stats.frame_count,
            stats.submitted_batches,
            stats.presented_swap_chains,
            stats.destroyed_resources
        );
    }

    swap_chain.destroy();
    device.wait_idle()?;
    Ok(())
}
