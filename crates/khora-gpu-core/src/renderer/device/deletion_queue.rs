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

//! Deferred destruction of GPU objects.

use std::collections::VecDeque;

/// An ordered queue of objects waiting for the GPU to stop using them.
///
/// Entries are stamped with the device frame count at the time they are enqueued. An
/// entry becomes ready once `frame_count - enqueued_frame >= max_frames_in_flight`:
/// by then every submission that could reference it belongs to a frame slot the device
/// has waited on.
#[derive(Debug)]
pub struct DeletionQueue<T> {
    entries: VecDeque<(u64, T)>,
}

impl<T> DeletionQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Enqueues an item destroyed during frame `frame_count`.
    pub fn push(&mut self, frame_count: u64, item: T) {
        debug_assert!(
            self.entries.back().is_none_or(|(last, _)| *last <= frame_count),
            "deletion queue entries must be pushed in frame order"
        );
        self.entries.push_back((frame_count, item));
    }

    /// Number of items waiting.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns, oldest first, every item whose frame has retired.
    ///
    /// ## Arguments
    /// * `frame_count` - The current device frame count. `u64::MAX` drains everything.
    /// * `max_frames_in_flight` - How many frames the GPU may lag behind the CPU.
    pub fn drain_ready(&mut self, frame_count: u64, max_frames_in_flight: u32) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((enqueued, _)) = self.entries.front() {
            if frame_count.saturating_sub(*enqueued) < u64::from(max_frames_in_flight) {
                break;
            }
            if let Some((_, item)) = self.entries.pop_front() {
                ready.push(item);
            }
        }
        ready
    }
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_waits_for_max_frames_in_flight() {
        for frames_in_flight in 1..=4u32 {
            let mut queue = DeletionQueue::new();
            let destroyed_at = 10;
            queue.push(destroyed_at, "buffer");

            for elapsed in 0..u64::from(frames_in_flight) {
                assert!(
                    queue.drain_ready(destroyed_at + elapsed, frames_in_flight).is_empty(),
                    "freed after {elapsed} frames with {frames_in_flight} in flight"
                );
            }
            assert_eq!(
                queue.drain_ready(destroyed_at + u64::from(frames_in_flight), frames_in_flight),
                vec!["buffer"]
            );
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn test_drain_preserves_order_and_stops_at_first_young_entry() {
        let mut queue = DeletionQueue::new();
        queue.push(1, 'a');
        queue.push(1, 'b');
        queue.push(2, 'c');
        queue.push(5, 'd');

        assert_eq!(queue.drain_ready(4, 2), vec!['a', 'b', 'c']);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_max_frame_count_forces_full_drain() {
        let mut queue = DeletionQueue::new();
        queue.push(0, 1);
        queue.push(u64::MAX - 1, 2);
        queue.push(u64::MAX, 3);

        assert_eq!(queue.drain_ready(u64::MAX, 0), vec![1, 2, 3]);
    }
}
