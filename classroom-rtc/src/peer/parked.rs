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

//! Candidates that arrive from a peer before any record exists for it.
//!
//! Relays do not promise ordering across messages, so a candidate can overtake
//! the offer it belongs to. Those are held here until the offer shows up. A
//! candidate can also trail behind a session that was already torn down; the
//! peer is remembered as retired so such stragglers are recognised and never
//! handed to the next, unrelated session.

use std::collections::{HashMap, VecDeque};

use classroom_types::{IceCandidate, SessionDescription};
use log::{debug, warn};

use crate::constants::{MAX_PARKED_CANDIDATES_PER_PEER, MAX_PARKED_PEERS, MAX_RETIRED_PEERS};

#[derive(Debug, Default)]
pub(crate) struct ParkedCandidates {
    by_peer: HashMap<String, VecDeque<IceCandidate>>,
    // Peers in the order they first parked something, oldest first
    arrival: VecDeque<String>,
    retired: VecDeque<String>,
}

impl ParkedCandidates {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Holds `candidate` for `peer_id`. Returns false if it was dropped.
    pub(crate) fn park(&mut self, peer_id: &str, candidate: IceCandidate) -> bool {
        if candidate.ufrag().is_none() && self.is_retired(peer_id) {
            debug!(
                "dropping untagged candidate from closed session with {}",
                peer_id
            );
            return false;
        }
        if let Some(queue) = self.by_peer.get_mut(peer_id) {
            if queue.len() >= MAX_PARKED_CANDIDATES_PER_PEER {
                warn!(
                    "{} already has {} parked candidates, dropping one more",
                    peer_id,
                    queue.len()
                );
                return false;
            }
            queue.push_back(candidate);
            return true;
        }

        if self.by_peer.len() >= MAX_PARKED_PEERS {
            if let Some(oldest) = self.arrival.pop_front() {
                let evicted = self.by_peer.remove(&oldest).map(|q| q.len()).unwrap_or(0);
                warn!(
                    "too many peers with parked candidates, evicting {} ({} dropped)",
                    oldest, evicted
                );
            }
        }
        self.arrival.push_back(peer_id.to_string());
        self.by_peer
            .insert(peer_id.to_string(), VecDeque::from([candidate]));
        true
    }

    /// Hands over what was parked for the session `offer` opens, in arrival order.
    ///
    /// Candidates tagged with a username fragment the offer does not carry
    /// belong to another session and are dropped.
    pub(crate) fn take_for_offer(
        &mut self,
        peer_id: &str,
        offer: &SessionDescription,
    ) -> Vec<IceCandidate> {
        self.retired.retain(|id| id != peer_id);
        let Some(parked) = self.remove(peer_id) else {
            return Vec::new();
        };
        let ufrags = offer.ice_ufrags();
        let total = parked.len();
        let kept: Vec<IceCandidate> = parked
            .into_iter()
            .filter(|candidate| match candidate.ufrag() {
                Some(ufrag) if !ufrags.is_empty() => ufrags.contains(&ufrag),
                _ => true,
            })
            .collect();
        if kept.len() < total {
            debug!(
                "dropped {} parked candidates from another session with {}",
                total - kept.len(),
                peer_id
            );
        }
        kept
    }

    /// Forgets `peer_id`'s parked candidates and marks its session as closed.
    pub(crate) fn retire(&mut self, peer_id: &str) {
        if let Some(dropped) = self.remove(peer_id) {
            debug!("discarded {} parked candidates from {}", dropped.len(), peer_id);
        }
        if self.is_retired(peer_id) {
            return;
        }
        if self.retired.len() >= MAX_RETIRED_PEERS {
            self.retired.pop_front();
        }
        self.retired.push_back(peer_id.to_string());
    }

    pub(crate) fn clear(&mut self) {
        self.by_peer.clear();
        self.arrival.clear();
    }

    pub(crate) fn len(&self, peer_id: &str) -> usize {
        self.by_peer.get(peer_id).map(|q| q.len()).unwrap_or(0)
    }

    #[cfg(test)]
    fn peer_count(&self) -> usize {
        self.by_peer.len()
    }

    fn is_retired(&self, peer_id: &str) -> bool {
        self.retired.iter().any(|id| id == peer_id)
    }

    fn remove(&mut self, peer_id: &str) -> Option<VecDeque<IceCandidate>> {
        let parked = self.by_peer.remove(peer_id)?;
        self.arrival.retain(|id| id != peer_id);
        Some(parked)
    }
}
