//! Typed lifecycle events emitted by a media transport.
//!
//! Remote track events carry a `subscription_id` assigned by the transport
//! from a monotonic counter, so a controller can tell a late event for a
//! replaced subscription apart from one for the current subscription.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Playback {
    Playing,
    Paused,
    Ended,
}

/// A subscribed remote track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrackInfo {
    pub track_sid: String,
    pub participant_identity: String,
    pub kind: TrackKind,
    pub subscription_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MediaEvent {
    Connected,
    Reconnecting,
    Reconnected,
    Disconnected {
        reason: String,
    },
    TrackSubscribed {
        track: RemoteTrackInfo,
    },
    TrackUnsubscribed {
        track: RemoteTrackInfo,
    },
    TrackPlayback {
        track_sid: String,
        subscription_id: u64,
        playback: Playback,
    },
    ParticipantJoined {
        identity: String,
    },
    ParticipantLeft {
        identity: String,
    },
    LocalTrackPublished {
        track_sid: String,
        kind: TrackKind,
    },
}
