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

// Standard tier: hd
pub const STANDARD_VIDEO_WIDTH: u32 = 1280u32;
pub const STANDARD_VIDEO_HEIGHT: u32 = 720u32;
pub const STANDARD_FRAME_RATE: u32 = 30u32;

// Constrained tier: 360p at half rate keeps encode cost low on weak laptops
pub const CONSTRAINED_VIDEO_WIDTH: u32 = 640u32;
pub const CONSTRAINED_VIDEO_HEIGHT: u32 = 360u32;
pub const CONSTRAINED_FRAME_RATE: u32 = 15u32;

/// RTP clock rate for every video payload.
pub const VIDEO_CLOCK_RATE: u32 = 90000u32;

pub const AUDIO_CHANNELS: u32 = 1u32;
pub const AUDIO_SAMPLE_RATE: u32 = 48000u32;

/// Label of the application data channel carrying whiteboard/chat sync payloads.
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "sync";

/// Capacity of the session event bus channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Candidates held for one peer that has not sent its offer yet.
pub const MAX_PARKED_CANDIDATES_PER_PEER: usize = 32;

/// Peers with parked candidates. The oldest is evicted past this.
pub const MAX_PARKED_PEERS: usize = 64;

/// Closed sessions remembered so that their late candidates are recognised.
pub const MAX_RETIRED_PEERS: usize = 64;
