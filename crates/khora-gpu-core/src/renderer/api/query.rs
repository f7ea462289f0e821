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

//! GPU query heaps.

use std::borrow::Cow;

/// What a query heap measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueryType {
    /// GPU timestamps in ticks of [`GraphicsDevice::timestamp_frequency`](crate::renderer::GraphicsDevice::timestamp_frequency).
    Timestamp,
    /// Number of samples passing depth and stencil tests.
    Occlusion,
    /// Whether any sample passed depth and stencil tests.
    BinaryOcclusion,
    /// Pipeline statistics counters.
    PipelineStatistics,
}

impl QueryType {
    /// Bytes written per query by a resolve.
    pub const fn result_size(self) -> u64 {
        match self {
            // Vertex, primitive, clipper, fragment and compute invocation counters.
            QueryType::PipelineStatistics => 5 * 8,
            _ => 8,
        }
    }
}

/// Creation parameters of a query heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHeapDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Query type.
    pub ty: QueryType,
    /// Number of queries.
    pub count: u32,
}

impl QueryHeapDescriptor<'_> {
    /// Returns a descriptor that owns its label.
    pub fn into_owned(self) -> QueryHeapDescriptor<'static> {
        QueryHeapDescriptor {
            label: self.label.map(|label| Cow::Owned(label.into_owned())),
            ty: self.ty,
            count: self.count,
        }
    }
}
