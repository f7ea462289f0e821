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

//! Per-queue recorder pool, submit list and present list.

use crate::renderer::api::QueueType;
use crate::renderer::error::{DeviceError, ResourceError};
use crate::renderer::resource::SwapChain;
use crate::renderer::traits::{CommandEncoder, DeviceBackend, NativeCommandBatch};

/// A native encoder checked out of a queue's pool.
pub(crate) struct PooledEncoder {
    pub(crate) slot: usize,
    pub(crate) encoder: Box<dyn CommandEncoder>,
}

/// What one queue submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSubmission {
    /// Batches handed to the backend.
    pub batches: usize,
    /// Swap chains presented.
    pub presents: usize,
}

/// A hardware queue as seen by the device.
///
/// Recorders are pooled and never freed: a recorder handed back with
/// [`CommandRecorder::flush`](super::CommandRecorder::flush) stays reserved until the
/// queue is submitted, then returns to the pool for the next frame.
pub struct CommandQueue {
    queue_type: QueueType,
    idle: Vec<PooledEncoder>,
    submitted: Vec<PooledEncoder>,
    allocated: usize,
    pending: Vec<NativeCommandBatch>,
    presents: Vec<SwapChain>,
}

impl CommandQueue {
    pub(crate) fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            idle: Vec::new(),
            submitted: Vec::new(),
            allocated: 0,
            pending: Vec::new(),
            presents: Vec::new(),
        }
    }

    /// The queue type.
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Number of recorders ever allocated by this queue.
    pub fn recorder_count(&self) -> usize {
        self.allocated
    }

    /// Number of batches waiting for the next submission.
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Takes an idle recorder, growing the pool if none is left.
    pub(crate) fn acquire(
        &mut self,
        backend: &mut dyn DeviceBackend,
    ) -> Result<PooledEncoder, ResourceError> {
        if let Some(pooled) = self.idle.pop() {
            return Ok(pooled);
        }

        let encoder = backend.create_command_encoder(self.queue_type)?;
        let slot = self.allocated;
        self.allocated += 1;
        log::debug!(
            "CommandQueue({:?}): allocated recorder #{slot}",
            self.queue_type
        );
        Ok(PooledEncoder { slot, encoder })
    }

    /// Appends a finished batch, and the swap chains it presents, to this frame's lists.
    ///
    /// The swap chains drop their CPU reference to the backbuffer texture here; the
    /// native present happens at [`CommandQueue::submit`].
    pub(crate) fn commit(
        &mut self,
        pooled: PooledEncoder,
        batch: NativeCommandBatch,
        presents: Vec<SwapChain>,
    ) {
        log::trace!(
            "CommandQueue({:?}): committed batch of {} commands from recorder #{}",
            self.queue_type,
            batch.command_count(),
            pooled.slot
        );
        self.pending.push(batch);
        for swap_chain in presents {
            swap_chain.release_current_texture();
            self.presents.push(swap_chain);
        }
        self.submitted.push(pooled);
    }

    /// Returns a recorder whose commands were discarded.
    pub(crate) fn recycle(&mut self, pooled: PooledEncoder) {
        self.idle.push(pooled);
    }

    /// Submits every pending batch in commit order, then presents every queued swap chain
    /// in queue order, then resets both lists and returns recorders to the pool.
    pub(crate) fn submit(
        &mut self,
        backend: &mut dyn DeviceBackend,
    ) -> Result<QueueSubmission, DeviceError> {
        let batches = std::mem::take(&mut self.pending);
        let presents = std::mem::take(&mut self.presents);
        self.idle.append(&mut self.submitted);

        let mut submission = QueueSubmission {
            batches: batches.len(),
            presents: 0,
        };

        if !batches.is_empty() {
            if let Err(e) = backend.submit(self.queue_type, batches) {
                for swap_chain in &presents {
                    swap_chain.abandon_present();
                }
                return Err(e);
            }
        }

        for swap_chain in presents {
            match swap_chain.present_queued(backend) {
                Ok(()) => submission.presents += 1,
                Err(e) => log::error!(
                    "CommandQueue({:?}): failed to present swap chain '{}': {e}",
                    self.queue_type,
                    swap_chain.label()
                ),
            }
        }
        Ok(submission)
    }

    /// Drops unsubmitted work; used at device teardown.
    pub(crate) fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "CommandQueue({:?}): discarding {} unsubmitted batches",
                self.queue_type,
                self.pending.len()
            );
        }
        self.pending.clear();
        for swap_chain in self.presents.drain(..) {
            swap_chain.abandon_present();
        }
        self.idle.append(&mut self.submitted);
    }
}
