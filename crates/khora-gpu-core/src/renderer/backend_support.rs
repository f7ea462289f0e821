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

//! Process-wide table of which backends can run on this machine.
//!
//! Probing a backend may load drivers, so it happens once, explicitly, through
//! [`initialize`]. Every later query reads the cached table.

use std::sync::OnceLock;

use crate::renderer::api::GraphicsBackendType;
use crate::renderer::traits::BackendProvider;

/// Availability of every [`GraphicsBackendType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSupport {
    supported: [bool; GraphicsBackendType::ALL.len()],
}

impl BackendSupport {
    /// Returns `true` if the backend was probed successfully.
    pub fn is_supported(&self, backend: GraphicsBackendType) -> bool {
        self.supported[backend.index()]
    }

    /// Iterates over the supported backends.
    pub fn supported_backends(&self) -> impl Iterator<Item = GraphicsBackendType> + '_ {
        GraphicsBackendType::ALL
            .into_iter()
            .filter(|backend| self.is_supported(*backend))
    }
}

static SUPPORT: OnceLock<BackendSupport> = OnceLock::new();

/// Probes every provider and stores the result. Only the first call probes; later
/// calls return the table built by the first one.
///
/// ## Arguments
/// * `providers` - The backend factories linked into the application.
pub fn initialize(providers: &[Box<dyn BackendProvider>]) -> &'static BackendSupport {
    SUPPORT.get_or_init(|| {
        let mut supported = [false; GraphicsBackendType::ALL.len()];
        for provider in providers {
            let backend = provider.backend_type();
            if supported[backend.index()] {
                continue;
            }
            supported[backend.index()] = provider.is_supported();
            log::info!(
                "Backend probe: {backend} is {}",
                if supported[backend.index()] {
                    "available"
                } else {
                    "unavailable"
                }
            );
        }
        BackendSupport { supported }
    })
}

/// Returns the probed table, or `None` if [`initialize`] has not run.
pub fn get() -> Option<&'static BackendSupport> {
    SUPPORT.get()
}

/// Returns `true` if `backend` was probed as available.
///
/// Always `false` before [`initialize`].
pub fn is_supported(backend: GraphicsBackendType) -> bool {
    match SUPPORT.get() {
        Some(table) => table.is_supported(backend),
        None => {
            log::warn!("Backend support queried for {backend} before probing");
            false
        }
    }
}
