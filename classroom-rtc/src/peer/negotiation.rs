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

use std::collections::VecDeque;
use std::fmt;

use classroom_types::IceCandidate;

use crate::errors::PeerError;

/// Negotiation state of one peer connection.
///
/// ```text
/// Idle -> Negotiating -> Connected -> Failed
///   \________\______________\__________\____-> Closed (teardown, terminal)
/// ```
///
/// A negotiation that breaks before the transport connects goes
/// Negotiating -> Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl NegotiationState {
    pub fn can_transition_to(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Negotiating, Connected)
                | (Negotiating, Failed)
                | (Connected, Failed)
                | (Idle | Negotiating | Connected | Failed, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == NegotiationState::Closed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NegotiationState::Idle => write!(f, "idle"),
            NegotiationState::Negotiating => write!(f, "negotiating"),
            NegotiationState::Connected => write!(f, "connected"),
            NegotiationState::Failed => write!(f, "failed"),
            NegotiationState::Closed => write!(f, "closed"),
        }
    }
}

/// Which side of the offer/answer exchange this record is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Offerer,
    Answerer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// Created locally, waiting for the transport to open it.
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannel {
    pub label: String,
    pub state: DataChannelState,
}

/// What happened to an inbound candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    /// Held until the remote description is set.
    Queued,
}

/// Bookkeeping for one remote peer.
#[derive(Debug, Clone)]
pub struct PeerConnectionRecord {
    pub(crate) peer_id: String,
    pub(crate) role: NegotiationRole,
    pub(crate) state: NegotiationState,
    pub(crate) pending_ice_candidates: VecDeque<IceCandidate>,
    pub(crate) data_channel: Option<DataChannel>,
    pub(crate) local_description_set: bool,
    pub(crate) remote_description_set: bool,
    pub(crate) transport_connected: bool,
    pub(crate) applied_candidates: usize,
}

impl PeerConnectionRecord {
    pub(crate) fn new(peer_id: &str, role: NegotiationRole) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            role,
            state: NegotiationState::Idle,
            pending_ice_candidates: VecDeque::new(),
            data_channel: None,
            local_description_set: false,
            remote_description_set: false,
            transport_connected: false,
            applied_candidates: 0,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn pending_ice_candidates(&self) -> &VecDeque<IceCandidate> {
        &self.pending_ice_candidates
    }

    pub fn data_channel(&self) -> Option<&DataChannel> {
        self.data_channel.as_ref()
    }

    pub fn is_data_channel_open(&self) -> bool {
        matches!(
            self.data_channel,
            Some(DataChannel {
                state: DataChannelState::Open,
                ..
            })
        )
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn applied_candidates(&self) -> usize {
        self.applied_candidates
    }

    pub(crate) fn advance(&mut self, next: NegotiationState) -> Result<(), PeerError> {
        if !self.state.can_transition_to(next) {
            return Err(PeerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Both descriptions are in place and the transport reported connectivity.
    pub(crate) fn ready_to_connect(&self) -> bool {
        self.state == NegotiationState::Negotiating
            && self.local_description_set
            && self.remote_description_set
            && self.transport_connected
    }

    pub(crate) fn set_data_channel_state(&mut self, label: &str, state: DataChannelState) {
        match self.data_channel.as_mut() {
            Some(channel) => channel.state = state,
            None => {
                self.data_channel = Some(DataChannel {
                    label: label.to_string(),
                    state,
                })
            }
        }
    }
}
