use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Keeps the notice list from growing without bound over a long session.
pub const MAX_NOTICES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

impl SessionState {
    /// Idle and Failed both accept a new connect attempt.
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MicrophoneState {
    pub enabled: bool,
}

/// One rendered remote audio track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAudioOutput {
    pub track_sid: String,
    pub participant_identity: String,
    pub subscription_id: u64,
    pub playing: bool,
    pub muted: bool,
}

/// Immutable view of everything the UI can observe. Each transition
/// publishes a fresh snapshot; nothing mutates a published one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Bumped on every published transition.
    pub revision: u64,
    pub state: SessionState,
    pub status_text: String,
    pub microphone: MicrophoneState,
    pub speaker_enabled: bool,
    pub local_speaking: bool,
    pub remote_speaking: bool,
    pub agent_present: bool,
    pub room: Option<String>,
    pub identity: Option<String>,
    pub outputs: BTreeMap<String, RemoteAudioOutput>,
    pub last_error: Option<String>,
    pub notices: Vec<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            state: SessionState::Idle,
            status_text: "Disconnected".to_string(),
            microphone: MicrophoneState::default(),
            speaker_enabled: true,
            local_speaking: false,
            remote_speaking: false,
            agent_present: false,
            room: None,
            identity: None,
            outputs: BTreeMap::new(),
            last_error: None,
            notices: Vec::new(),
        }
    }
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    pub fn last_notice(&self) -> Option<&str> {
        self.notices.last().map(String::as_str)
    }

    /// Drops everything tied to one session; speaker preference survives.
    pub(crate) fn clear_session(&mut self) {
        self.microphone = MicrophoneState::default();
        self.local_speaking = false;
        self.remote_speaking = false;
        self.agent_present = false;
        self.room = None;
        self.identity = None;
        self.outputs.clear();
    }

    pub(crate) fn recompute_remote_speaking(&mut self) {
        self.remote_speaking = self.outputs.values().any(|output| output.playing);
    }
}
