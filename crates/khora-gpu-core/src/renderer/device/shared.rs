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

//! State shared between a device and the objects it created.

use std::cell::{Cell, RefCell};

use super::deletion_queue::DeletionQueue;
use super::registry::LiveResourceRegistry;
use super::FrameStats;
use crate::renderer::api::{
    AdapterInfo, BackendTraits, DeviceLimits, GraphicsBackendType, NativeHandle, QueueType,
    ResourceId, ResourceKind, ValidationMode,
};
use crate::renderer::command::CommandQueue;
use crate::renderer::error::DeviceError;
use crate::renderer::events::DeviceEventBus;
use crate::renderer::traits::DeviceBackend;

pub(crate) type DeferredDestroy = Box<dyn FnOnce(&mut dyn DeviceBackend)>;

/// Everything a device owns. Resources and recorders hold a `Weak` to it.
pub(crate) struct DeviceShared {
    pub(crate) backend: RefCell<Box<dyn DeviceBackend>>,
    pub(crate) backend_type: GraphicsBackendType,
    pub(crate) adapter_info: AdapterInfo,
    pub(crate) limits: DeviceLimits,
    pub(crate) traits: BackendTraits,
    pub(crate) validation: ValidationMode,
    pub(crate) max_frames_in_flight: u32,
    pub(crate) queues: [RefCell<CommandQueue>; QueueType::ALL.len()],
    pub(crate) events: DeviceEventBus,
    frame_count: Cell<u64>,
    frame_index: Cell<u32>,
    deletion_queue: RefCell<DeletionQueue<DeferredDestroy>>,
    registry: RefCell<LiveResourceRegistry>,
    next_resource_id: Cell<u64>,
    shutting_down: Cell<bool>,
    lost: RefCell<Option<String>>,
    last_stats: Cell<FrameStats>,
}

impl DeviceShared {
    pub(crate) fn new(
        backend: Box<dyn DeviceBackend>,
        validation: ValidationMode,
        max_frames_in_flight: u32,
        events: DeviceEventBus,
    ) -> Self {
        Self {
            backend_type: backend.backend_type(),
            adapter_info: backend.adapter_info().clone(),
            limits: backend.limits().clone(),
            traits: backend.traits(),
            backend: RefCell::new(backend),
            validation,
            max_frames_in_flight,
            queues: QueueType::ALL.map(|queue| RefCell::new(CommandQueue::new(queue))),
            events,
            frame_count: Cell::new(0),
            frame_index: Cell::new(0),
            deletion_queue: RefCell::new(DeletionQueue::new()),
            registry: RefCell::new(LiveResourceRegistry::default()),
            next_resource_id: Cell::new(1),
            shutting_down: Cell::new(false),
            lost: RefCell::new(None),
            last_stats: Cell::new(FrameStats::default()),
        }
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count.get()
    }

    pub(crate) fn frame_index(&self) -> u32 {
        self.frame_index.get()
    }

    pub(crate) fn queue(&self, queue: QueueType) -> &RefCell<CommandQueue> {
        &self.queues[queue.index()]
    }

    pub(crate) fn last_stats(&self) -> FrameStats {
        self.last_stats.get()
    }

    pub(crate) fn set_last_stats(&self, stats: FrameStats) {
        self.last_stats.set(stats);
    }

    pub(crate) fn check_lost(&self) -> Result<(), DeviceError> {
        match self.lost.borrow().as_ref() {
            Some(reason) => Err(DeviceError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    /// Latches device loss so every later frame fails fast.
    pub(crate) fn note_error(&self, error: &DeviceError) {
        if let DeviceError::DeviceLost(reason) = error {
            log::error!("GraphicsDevice: device lost: {reason}");
            *self.lost.borrow_mut() = Some(reason.clone());
        }
    }

    pub(crate) fn pending_deletions(&self) -> usize {
        self.deletion_queue.borrow().len()
    }

    // --- Resource bookkeeping ---

    pub(crate) fn register(&self, kind: ResourceKind, label: &str) -> ResourceId {
        let id = ResourceId(self.next_resource_id.get());
        self.next_resource_id.set(id.0 + 1);
        self.registry.borrow_mut().insert(id, kind, label);
        id
    }

    /// An id for objects the device does not own, such as swap chain backbuffers.
    pub(crate) fn unregistered_id(&self) -> ResourceId {
        let id = ResourceId(self.next_resource_id.get());
        self.next_resource_id.set(id.0 + 1);
        id
    }

    pub(crate) fn live_resource_count(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) fn live_resources(&self) -> Vec<super::LiveResource> {
        self.registry.borrow().snapshot()
    }

    pub(crate) fn rename(&self, id: ResourceId, kind: ResourceKind, handle: NativeHandle, label: &str) {
        self.registry.borrow_mut().rename(id, label);
        if self.traits.debug_labels {
            self.backend.borrow_mut().set_label(kind, handle, label);
        }
    }

    /// Schedules the native object for release once no in-flight frame can use it.
    pub(crate) fn defer_destroy(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        handle: NativeHandle,
        label: &str,
    ) {
        self.registry.borrow_mut().remove(id);

        if self.shutting_down.get() {
            log::debug!("GraphicsDevice: Destroying {kind} '{label}' immediately during shutdown");
            self.backend.borrow_mut().destroy(kind, handle);
            return;
        }

        let frame = self.frame_count.get();
        log::trace!("GraphicsDevice: {kind} '{label}' ({handle}) queued for deletion at frame {frame}");
        self.deletion_queue.borrow_mut().push(
            frame,
            Box::new(move |backend: &mut dyn DeviceBackend| backend.destroy(kind, handle)),
        );
    }

    /// Runs every deferred destroy that has become safe and returns how many ran.
    pub(crate) fn drain_deletion_queue(&self) -> usize {
        let ready = self
            .deletion_queue
            .borrow_mut()
            .drain_ready(self.frame_count.get(), self.max_frames_in_flight);
        if ready.is_empty() {
            return 0;
        }

        let count = ready.len();
        let mut backend = self.backend.borrow_mut();
        for destroy in ready {
            destroy(&mut **backend);
        }
        log::trace!("GraphicsDevice: released {count} deferred objects");
        count
    }

    /// Moves to the next frame slot.
    pub(crate) fn advance_frame(&self) {
        self.frame_index
            .set((self.frame_index.get() + 1) % self.max_frames_in_flight);
        self.frame_count.set(self.frame_count.get().saturating_add(1));
    }

    /// Switches to immediate destruction and flushes everything still queued.
    pub(crate) fn shut_down(&self) -> usize {
        self.shutting_down.set(true);
        self.frame_count.set(u64::MAX);
        self.drain_deletion_queue()
    }
}
