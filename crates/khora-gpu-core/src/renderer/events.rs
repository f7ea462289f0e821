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

//! Device-level notifications published by backends.

/// Something the application must react to outside the normal call flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The native device was lost. Every object created from it is unusable and the
    /// device has to be recreated.
    Lost {
        /// Backend-provided reason.
        reason: String,
    },
    /// The backend reported an asynchronous validation or runtime error.
    Error {
        /// Backend-provided message.
        message: String,
    },
}

/// The channel backends use to publish [`DeviceEvent`]s.
///
/// The sender half is handed to the backend at creation and may be moved to native
/// callback threads; the receiver stays with the device.
#[derive(Debug)]
pub struct DeviceEventBus {
    sender: flume::Sender<DeviceEvent>,
    receiver: flume::Receiver<DeviceEvent>,
}

impl DeviceEventBus {
    /// Creates a bus over an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Publishes an event, logging if nobody can receive it anymore.
    ///
    /// ## Arguments
    /// * `event` - The event to send.
    pub fn publish(&self, event: DeviceEvent) {
        log::trace!("DeviceEventBus: publishing {event:?}");
        if let Err(e) = self.sender.send(event) {
            log::error!("Failed to publish device event: {e}. Receiver likely disconnected.");
        }
    }

    /// Returns a clone of the sender end of the channel.
    pub fn sender(&self) -> flume::Sender<DeviceEvent> {
        self.sender.clone()
    }

    /// Returns the receiver end of the channel.
    pub fn receiver(&self) -> &flume::Receiver<DeviceEvent> {
        &self.receiver
    }
}

impl Default for DeviceEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_events_cross_threads() {
        let bus = DeviceEventBus::new();
        let sender = bus.sender();

        let handle = thread::spawn(move || {
            sender
                .send(DeviceEvent::Lost {
                    reason: "driver reset".into(),
                })
                .is_ok()
        });
        assert!(handle.join().unwrap_or(false));

        assert_eq!(
            bus.receiver().try_recv(),
            Ok(DeviceEvent::Lost {
                reason: "driver reset".into()
            })
        );
        assert!(bus.receiver().is_empty());
    }

    #[test]
    fn test_publish_and_drain() {
        let bus = DeviceEventBus::default();
        bus.publish(DeviceEvent::Error {
            message: "validation".into(),
        });
        let drained: Vec<_> = bus.receiver().try_iter().collect();
        assert_eq!(drained.len(), 1);
    }
}
