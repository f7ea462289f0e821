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

//! Buffer descriptors and usage flags.

use std::borrow::Cow;

use crate::gpu_bitflags;

gpu_bitflags! {
    /// How a buffer may be bound or used by the GPU.
    pub struct BufferUsage: u32 {
        /// Source of copy operations.
        const COPY_SRC = 1 << 0;
        /// Destination of copy operations and CPU uploads.
        const COPY_DST = 1 << 1;
        /// Vertex input.
        const VERTEX = 1 << 2;
        /// Index input.
        const INDEX = 1 << 3;
        /// Constant (uniform) buffer binding.
        const CONSTANT = 1 << 4;
        /// Read-only storage buffer binding.
        const SHADER_READ = 1 << 5;
        /// Read-write storage buffer binding.
        const SHADER_WRITE = 1 << 6;
        /// Source of indirect draw and dispatch arguments.
        const INDIRECT = 1 << 7;
        /// Destination of query heap resolves.
        const QUERY_RESOLVE = 1 << 8;
    }
}

/// How the CPU may access a buffer's memory after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CpuAccessMode {
    /// GPU-only memory; only the initial data can be provided by the CPU.
    #[default]
    None,
    /// Upload memory the CPU writes with [`Buffer::set_data`](crate::renderer::Buffer::set_data).
    Write,
    /// Readback memory the CPU reads with [`Buffer::get_data`](crate::renderer::Buffer::get_data).
    Read,
}

/// Creation parameters of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Requested size in bytes.
    pub size: u64,
    /// Allowed GPU usages.
    pub usage: BufferUsage,
    /// Allowed CPU access.
    pub cpu_access: CpuAccessMode,
}

impl<'a> BufferDescriptor<'a> {
    /// Creates a GPU-only buffer descriptor.
    pub fn new(label: &'a str, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage,
            cpu_access: CpuAccessMode::None,
        }
    }

    /// Sets the CPU access mode.
    pub fn with_cpu_access(mut self, cpu_access: CpuAccessMode) -> Self {
        self.cpu_access = cpu_access;
        self
    }

    /// Returns a descriptor that owns its label.
    pub fn into_owned(self) -> BufferDescriptor<'static> {
        BufferDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            size: self.size,
            usage: self.usage,
            cpu_access: self.cpu_access,
        }
    }
}
