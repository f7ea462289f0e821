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

use super::{label_or_default, ResourceCore};
use crate::renderer::api::{Feature, QueryHeapDescriptor, QueryType, ResourceKind};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

/// Upper bound on the number of queries in one heap.
pub const MAX_QUERY_COUNT: u32 = 4096;

/// A fixed-size array of GPU queries of one type.
#[derive(Clone)]
pub struct QueryHeap {
    inner: Rc<QueryHeapInner>,
}

struct QueryHeapInner {
    core: ResourceCore,
    ty: QueryType,
    count: u32,
}

impl_gpu_resource!(QueryHeap, destroy);

impl QueryHeap {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &QueryHeapDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        if descriptor.count == 0 || descriptor.count > MAX_QUERY_COUNT {
            return Err(ResourceError::InvalidDescriptor(format!(
                "query count {} outside 1..={MAX_QUERY_COUNT}",
                descriptor.count
            )));
        }
        let required = match descriptor.ty {
            QueryType::Timestamp => Some(Feature::TimestampQuery),
            QueryType::PipelineStatistics => Some(Feature::PipelineStatisticsQuery),
            QueryType::Occlusion | QueryType::BinaryOcclusion => None,
        };
        if let Some(feature) = required {
            if !shared.backend.borrow().query_feature(feature) {
                return Err(ResourceError::Unsupported(format!(
                    "{:?} queries need {feature:?}",
                    descriptor.ty
                )));
            }
        }

        let handle = shared.backend.borrow_mut().create_query_heap(descriptor)?;
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::QueryHeap);
        Ok(Self {
            inner: Rc::new(QueryHeapInner {
                core: ResourceCore::register(shared, ResourceKind::QueryHeap, handle, &label),
                ty: descriptor.ty,
                count: descriptor.count,
            }),
        })
    }

    /// The type of every query in the heap.
    pub fn ty(&self) -> QueryType {
        self.inner.ty
    }

    /// Number of queries.
    pub fn count(&self) -> u32 {
        self.inner.count
    }

    /// Bytes written per query by a resolve.
    pub fn result_size(&self) -> u64 {
        self.inner.ty.result_size()
    }
}
