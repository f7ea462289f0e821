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

//! Bookkeeping of live resources, used to report leaks at device teardown.

use std::collections::BTreeMap;

use crate::renderer::api::{ResourceId, ResourceKind};

/// A resource that was created and not yet destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveResource {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Its current label.
    pub label: String,
}

#[derive(Debug, Default)]
pub(crate) struct LiveResourceRegistry {
    entries: BTreeMap<ResourceId, LiveResource>,
}

impl LiveResourceRegistry {
    pub(crate) fn insert(&mut self, id: ResourceId, kind: ResourceKind, label: &str) {
        self.entries.insert(
            id,
            LiveResource {
                kind,
                label: label.to_owned(),
            },
        );
    }

    pub(crate) fn rename(&mut self, id: ResourceId, label: &str) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.label = label.to_owned();
        }
    }

    pub(crate) fn remove(&mut self, id: ResourceId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<LiveResource> {
        self.entries.values().cloned().collect()
    }
}
