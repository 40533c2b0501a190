/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Event bus for session events.
//!
//! A MPMC (multi-producer, multi-consumer) broadcast channel. Each session
//! owns its own bus, so two sessions in one process (or two tests running in
//! parallel) never see each other's events.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new(256);
//! let mut rx = bus.subscribe();
//! bus.emit(SessionEvent::LocalMediaReleased);
//! assert_eq!(rx.try_recv().unwrap(), SessionEvent::LocalMediaReleased);
//! ```

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};

use crate::constants::EVENT_BUS_CAPACITY;
use crate::events::SessionEvent;

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<SessionEvent>,
    // Keeps the channel open while nobody is subscribed
    _keepalive: InactiveReceiver<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = broadcast(capacity.max(1));
        // Slow subscribers lose the oldest events instead of blocking emitters
        sender.set_overflow(true);
        Self {
            sender,
            _keepalive: receiver.deactivate(),
        }
    }

    /// Returns a receiver that will see all future events.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.new_receiver()
    }

    /// Emits an event to all subscribers.
    ///
    /// Non-blocking. With no active subscriber the event is dropped.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.try_broadcast(event);
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_broadcast::TryRecvError;

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit(SessionEvent::VideoSuspended);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_every_subscriber_gets_every_event() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.emit(SessionEvent::PeerConnected("b".into()));
        assert_eq!(rx1.try_recv().unwrap(), SessionEvent::PeerConnected("b".into()));
        assert_eq!(rx2.try_recv().unwrap(), SessionEvent::PeerConnected("b".into()));
    }

    #[test]
    fn test_late_subscriber_misses_past_events() {
        let bus = EventBus::new(8);
        bus.emit(SessionEvent::VideoResumed);
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        bus.emit(SessionEvent::PeerClosed("1".into()));
        bus.emit(SessionEvent::PeerClosed("2".into()));
        bus.emit(SessionEvent::PeerClosed("3".into()));
        let mut seen = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => seen.push(event),
                Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                SessionEvent::PeerClosed("2".into()),
                SessionEvent::PeerClosed("3".into())
            ]
        );
    }
}
