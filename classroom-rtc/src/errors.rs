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

//! Error taxonomy of the media core.
//!
//! Both enums are `Clone` so the same value can be returned to the caller and
//! broadcast on the [`EventBus`](crate::EventBus).

use classroom_types::{MediaKind, SignalKind};

use crate::peer::NegotiationState;

/// Failure to obtain local capture hardware.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// The user or the OS refused access. Retrying without user action is pointless.
    #[error("{kind} permission denied: {reason}")]
    PermissionDenied { kind: MediaKind, reason: String },

    /// The device is missing or claimed by another application.
    #[error("{kind} unavailable: {reason}")]
    DeviceUnavailable { kind: MediaKind, reason: String },
}

impl MediaError {
    pub fn permission_denied(kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            kind,
            reason: reason.into(),
        }
    }

    pub fn device_unavailable(kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            kind,
            reason: reason.into(),
        }
    }

    /// Which device the error refers to.
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::PermissionDenied { kind, .. } | Self::DeviceUnavailable { kind, .. } => *kind,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }
}

/// Failure of a peer connection or a signaling exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// SDP exchange or ICE failed before the connection was established.
    #[error("negotiation with {peer_id} failed: {reason}")]
    NegotiationFailed { peer_id: String, reason: String },

    /// An established connection dropped.
    #[error("transport to {peer_id} disconnected: {reason}")]
    TransportDisconnected { peer_id: String, reason: String },

    /// A signaling message that the record cannot accept in its current state.
    #[error("unexpected {kind} from {peer_id} while {state}")]
    UnexpectedSignal {
        peer_id: String,
        kind: SignalKind,
        state: NegotiationState,
    },

    /// A signaling message addressed to someone else.
    #[error("signaling message for {to} delivered to {local}")]
    Misrouted { to: String, local: String },

    #[error("illegal negotiation transition {from} -> {to}")]
    InvalidTransition {
        from: NegotiationState,
        to: NegotiationState,
    },
}

impl PeerError {
    pub fn negotiation_failed(peer_id: &str, reason: impl Into<String>) -> Self {
        Self::NegotiationFailed {
            peer_id: peer_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transport_disconnected(peer_id: &str, reason: impl Into<String>) -> Self {
        Self::TransportDisconnected {
            peer_id: peer_id.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the two errors that tear the record down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NegotiationFailed { .. } | Self::TransportDisconnected { .. }
        )
    }
}
