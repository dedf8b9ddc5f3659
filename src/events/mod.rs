//! Events module for controller transitions
//!
//! Structured events broadcast by the interaction controller and pushed to
//! subscribed IPC clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{DeliveryStatus, Utterance};
use crate::state::{InteractionState, ListeningMode};

/// Events emitted by the interaction controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Controller moved between states
    StateChanged {
        from: InteractionState,
        to: InteractionState,
        /// Time spent in the previous state
        duration_ms: u64,
    },

    ListeningModeChanged { mode: ListeningMode },

    WakeWordDetected,

    /// Host cannot recognise speech; voice input disabled until it can
    RecognitionUnavailable,

    SpeakingStarted,

    SpeakingFinished,

    UtteranceAdded { utterance: Utterance },

    UtteranceUpdated { id: Uuid, status: DeliveryStatus },

    HotkeyChanged { key: String },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::StateChanged { from, to, duration_ms } => {
                write!(f, "STATE_CHANGED ({} -> {}, {}ms)", from, to, duration_ms)
            }
            StateEvent::ListeningModeChanged { mode } => write!(f, "LISTENING_MODE_CHANGED ({})", mode),
            StateEvent::WakeWordDetected => write!(f, "WAKE_WORD_DETECTED"),
            StateEvent::RecognitionUnavailable => write!(f, "RECOGNITION_UNAVAILABLE"),
            StateEvent::SpeakingStarted => write!(f, "SPEAKING_STARTED"),
            StateEvent::SpeakingFinished => write!(f, "SPEAKING_FINISHED"),
            StateEvent::UtteranceAdded { utterance } => write!(f, "UTTERANCE_ADDED ({})", utterance.id),
            StateEvent::UtteranceUpdated { id, status } => {
                write!(f, "UTTERANCE_UPDATED ({} {:?})", id, status)
            }
            StateEvent::HotkeyChanged { key } => write!(f, "HOTKEY_CHANGED ({})", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StateEvent::StateChanged {
            from: InteractionState::Idle,
            to: InteractionState::AwaitingWakeWord,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("state_changed"));
        assert!(json.contains("awaiting_wake_word"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"listening_mode_changed","mode":"continuous"}"#;
        let event: StateEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            StateEvent::ListeningModeChanged { mode: ListeningMode::Continuous }
        ));
    }

    #[test]
    fn test_display() {
        let event = StateEvent::HotkeyChanged { key: "F9".to_string() };
        assert_eq!(event.to_string(), "HOTKEY_CHANGED (F9)");
    }
}
