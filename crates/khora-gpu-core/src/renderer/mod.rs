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

//! The backend-agnostic GPU layer.
//!
//! [`GraphicsDevice`] is the entry point: it creates resources, hands out
//! [`CommandRecorder`]s from its queues and drives the frame lifecycle. Native APIs
//! plug in underneath through the [`traits`] module; the `khora-gpu-infra` crate
//! provides the implementations.

pub mod api;
pub mod backend_support;
pub mod command;
pub mod device;
pub mod error;
pub mod events;
pub mod resource;
pub mod traits;

// Re-export the types most callers need.
pub use self::api::*;
pub use self::command::{CommandQueue, CommandRecorder, QueueSubmission, RecorderState, RecorderStats};
pub use self::device::{DeviceDescriptor, FrameStats, GraphicsDevice, LiveResource};
pub use self::error::{CommandError, DeviceError, ResourceError, SwapChainError};
pub use self::events::{DeviceEvent, DeviceEventBus};
pub use self::resource::{
    BindGroup, BindGroupLayout, Buffer, Pipeline, PipelineLayout, QueryHeap, Sampler, SwapChain,
    Texture,
};
pub use self::traits::{BackendProvider, CommandEncoder, DeviceBackend, NativeCommandBatch};
