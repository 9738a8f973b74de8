//! Presentation derived from a [`SessionSnapshot`].
//!
//! Both surfaces render from the same snapshot; neither keeps state of its
//! own, so switching surfaces never changes session behavior.

use serde::Serialize;

use crate::state::{SessionSnapshot, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Surface {
    /// Button row with a status line.
    Classic,
    /// Avatar-centered layout with an agent status card.
    Avatar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonView {
    pub label: String,
    pub enabled: bool,
    /// Highlighted (connect button: "end session" styling).
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub title: String,
    pub subtitle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub surface: Surface,
    pub connect_button: ButtonView,
    pub mic_button: ButtonView,
    pub speaker_button: ButtonView,
    pub status_text: String,
    pub status_connected: bool,
    pub avatar_talking: bool,
    pub avatar_listening: bool,
    /// Only the avatar surface shows an agent card.
    pub agent_status: Option<AgentStatus>,
}

impl ViewModel {
    pub fn render(snapshot: &SessionSnapshot, surface: Surface, agent_name: &str) -> Self {
        let connected = snapshot.is_connected();
        let transitional = matches!(
            snapshot.state,
            SessionState::Connecting | SessionState::Disconnecting
        );

        let connect_label = match (surface, connected) {
            (Surface::Classic, true) => "Disconnect".to_string(),
            (Surface::Classic, false) => format!("Connect to {}", agent_name),
            (Surface::Avatar, true) => "End Conversation".to_string(),
            (Surface::Avatar, false) => "Start Conversation".to_string(),
        };

        let mic_enabled = connected && snapshot.microphone.enabled;
        let mic_button = ButtonView {
            label: if connected && !mic_enabled {
                "Muted".to_string()
            } else {
                "Microphone".to_string()
            },
            enabled: connected,
            active: mic_enabled,
        };

        let speaker_button = ButtonView {
            label: if snapshot.speaker_enabled {
                "Speaker".to_string()
            } else {
                "Muted".to_string()
            },
            enabled: connected,
            active: snapshot.speaker_enabled,
        };

        let agent_status = match surface {
            Surface::Classic => None,
            Surface::Avatar => Some(agent_status(snapshot, agent_name)),
        };

        Self {
            surface,
            connect_button: ButtonView {
                label: connect_label,
                enabled: !transitional,
                active: connected,
            },
            mic_button,
            speaker_button,
            status_text: snapshot.status_text.clone(),
            status_connected: connected,
            avatar_talking: connected && snapshot.remote_speaking,
            avatar_listening: connected && !snapshot.remote_speaking,
            agent_status,
        }
    }
}

fn agent_status(snapshot: &SessionSnapshot, agent_name: &str) -> AgentStatus {
    let (title, subtitle) = match snapshot.state {
        SessionState::Idle => (
            "Ready to chat".to_string(),
            format!("Click to start conversation with {}", agent_name),
        ),
        SessionState::Connecting => (
            "Connecting...".to_string(),
            format!("Establishing connection to {}", agent_name),
        ),
        SessionState::Disconnecting => (
            "Disconnecting...".to_string(),
            "Ending conversation".to_string(),
        ),
        SessionState::Failed => (
            "Connection failed".to_string(),
            "Please try again".to_string(),
        ),
        SessionState::Connected if snapshot.remote_speaking => (
            "Speaking".to_string(),
            format!("{} is responding", agent_name),
        ),
        SessionState::Connected if snapshot.local_speaking => (
            "Listening".to_string(),
            "Processing your voice".to_string(),
        ),
        SessionState::Connected => (
            "Listening".to_string(),
            "Waiting for your voice".to_string(),
        ),
    };
    AgentStatus { title, subtitle }
}
