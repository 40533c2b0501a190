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

//! Session configuration.
//!
//! Loaded from a YAML file (`CLASSROOM_CONFIG_PATH`) or, failing that, from
//! individual `CLASSROOM_*` environment variables with defaults.

use anyhow::{anyhow, Result};
use classroom_types::{truthy, QualityTier};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::constants::{
    AUDIO_CHANNELS, AUDIO_SAMPLE_RATE, CONSTRAINED_FRAME_RATE, CONSTRAINED_VIDEO_HEIGHT,
    CONSTRAINED_VIDEO_WIDTH, DEFAULT_DATA_CHANNEL_LABEL, DEFAULT_STUN_SERVER, EVENT_BUS_CAPACITY,
    STANDARD_FRAME_RATE, STANDARD_VIDEO_HEIGHT, STANDARD_VIDEO_WIDTH,
};

/// Which side of the classroom this process is.
///
/// Students are the polite side of an offer collision: they drop their own
/// pending offer and answer the teacher's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Teacher,
    #[default]
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProfile {
    pub sample_rate: u32,
    pub channels: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            channels: AUDIO_CHANNELS,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Capture ceilings per [`QualityTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProfiles {
    pub standard: VideoProfile,
    pub constrained: VideoProfile,
    #[serde(default)]
    pub audio: AudioProfile,
}

impl Default for MediaProfiles {
    fn default() -> Self {
        Self {
            standard: VideoProfile {
                width: STANDARD_VIDEO_WIDTH,
                height: STANDARD_VIDEO_HEIGHT,
                frame_rate: STANDARD_FRAME_RATE,
            },
            constrained: VideoProfile {
                width: CONSTRAINED_VIDEO_WIDTH,
                height: CONSTRAINED_VIDEO_HEIGHT,
                frame_rate: CONSTRAINED_FRAME_RATE,
            },
            audio: AudioProfile::default(),
        }
    }
}

impl MediaProfiles {
    pub fn video_for(&self, tier: QualityTier) -> VideoProfile {
        match tier {
            QualityTier::Standard => self.standard,
            QualityTier::Constrained => self.constrained,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Id this participant signs outbound signaling messages with.
    pub local_peer_id: String,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,
    #[serde(default)]
    pub media: MediaProfiles,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_ice_servers() -> Vec<String> {
    vec![DEFAULT_STUN_SERVER.to_string()]
}

fn default_data_channel_label() -> String {
    DEFAULT_DATA_CHANNEL_LABEL.to_string()
}

fn default_event_bus_capacity() -> usize {
    EVENT_BUS_CAPACITY
}

impl SessionConfig {
    /// Defaults for everything except the peer id.
    pub fn new(local_peer_id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            local_peer_id: local_peer_id.into(),
            role,
            ice_servers: default_ice_servers(),
            data_channel_label: default_data_channel_label(),
            media: MediaProfiles::default(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // A config file wins over individual variables
        if let Some(config_path) = lookup("CLASSROOM_CONFIG_PATH") {
            return Self::from_file(&config_path);
        }

        let local_peer_id = lookup("CLASSROOM_PEER_ID")
            .unwrap_or_else(|| format!("peer-{}", uuid::Uuid::new_v4().simple()));

        let role = match lookup("CLASSROOM_ROLE").as_deref() {
            Some(r) if r.eq_ignore_ascii_case("teacher") => ParticipantRole::Teacher,
            Some(r) if r.eq_ignore_ascii_case("student") => ParticipantRole::Student,
            Some(other) => return Err(anyhow!("Invalid CLASSROOM_ROLE: {other:?}")),
            None => ParticipantRole::default(),
        };

        let ice_servers = lookup("CLASSROOM_ICE_SERVERS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(default_ice_servers);

        let data_channel_label =
            lookup("CLASSROOM_DATA_CHANNEL_LABEL").unwrap_or_else(default_data_channel_label);

        let event_bus_capacity = match lookup("CLASSROOM_EVENT_BUS_CAPACITY") {
            Some(s) => s
                .parse::<usize>()
                .map_err(|e| anyhow!("Invalid CLASSROOM_EVENT_BUS_CAPACITY {s:?}: {e}"))?,
            None => default_event_bus_capacity(),
        };

        let mut media = MediaProfiles::default();
        if let Some(value) = lookup("CLASSROOM_ECHO_CANCELLATION") {
            media.audio.echo_cancellation = truthy(Some(&value));
        }
        if let Some(value) = lookup("CLASSROOM_NOISE_SUPPRESSION") {
            media.audio.noise_suppression = truthy(Some(&value));
        }

        let config = SessionConfig {
            local_peer_id,
            role,
            ice_servers,
            data_channel_label,
            media,
            event_bus_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_peer_id.trim().is_empty() {
            return Err(anyhow!("local_peer_id must not be empty"));
        }
        if self.data_channel_label.is_empty() {
            return Err(anyhow!("data_channel_label must not be empty"));
        }
        if self.event_bus_capacity == 0 {
            return Err(anyhow!("event_bus_capacity must be positive"));
        }
        for (name, profile) in [
            ("standard", &self.media.standard),
            ("constrained", &self.media.constrained),
        ] {
            if profile.width == 0 || profile.height == 0 || profile.frame_rate == 0 {
                return Err(anyhow!("{name} video profile has a zero dimension: {profile:?}"));
            }
        }
        Ok(())
    }
}
