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

//! Registry of inbound media, keyed by remote peer id.
//!
//! The UI reads it to render remote participants; only the
//! [`PeerConnectionManager`](crate::PeerConnectionManager) writes it, and
//! each connection only ever writes its own peer's key.

mod ordered_map;

use std::cell::RefCell;
use std::rc::Rc;

use classroom_types::MediaKind;
use web_time::Instant;

use ordered_map::OrderedMap;

/// An inbound media stream as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub kinds: Vec<MediaKind>,
}

impl RemoteStream {
    pub fn new(stream_id: impl Into<String>, kinds: Vec<MediaKind>) -> Self {
        Self {
            stream_id: stream_id.into(),
            kinds,
        }
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteStreamEntry {
    pub peer_id: String,
    pub stream: RemoteStream,
    pub received_at: Instant,
}

/// Shared, cloneable view of the remote streams of the session.
#[derive(Debug, Clone, Default)]
pub struct RemoteStreamRegistry {
    entries: Rc<RefCell<OrderedMap<String, RemoteStreamEntry>>>,
}

impl RemoteStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer_id: &str) -> Option<RemoteStreamEntry> {
        self.entries.borrow().get(peer_id).cloned()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.entries.borrow().contains_key(peer_id)
    }

    /// Peer ids with a stream, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        self.entries.borrow().ordered_keys().to_vec()
    }

    /// Snapshot of all entries in peer id order.
    pub fn entries(&self) -> Vec<RemoteStreamEntry> {
        self.entries.borrow().ordered_values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    // Registers the stream for a peer, replacing any prior entry.
    pub(crate) fn insert(&self, peer_id: &str, stream: RemoteStream) -> Option<RemoteStreamEntry> {
        let entry = RemoteStreamEntry {
            peer_id: peer_id.to_string(),
            stream,
            received_at: Instant::now(),
        };
        self.entries.borrow_mut().insert(peer_id.to_string(), entry)
    }

    pub(crate) fn remove(&self, peer_id: &str) -> Option<RemoteStreamEntry> {
        self.entries.borrow_mut().remove(peer_id)
    }
}
