//! Inputs consumed by the interaction controller

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::command::Reply;
use crate::conversation::Utterance;
use crate::hotkey::{HotkeyEvent, KeyCode};
use crate::voice::PlatformEvent;

/// Everything the controller reacts to, delivered over one channel
#[derive(Debug)]
pub enum ControllerInput {
    Hotkey(HotkeyEvent),
    User(UserAction),
    Platform(PlatformEvent),
    /// A backend round trip finished
    Reply(PendingReply),
    Query(Query),
}

/// Explicit user actions from the UI
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    PressMic,
    SetAlwaysListening(bool),
    ToggleAlwaysListening,
    SubmitText(String),
    SetHotkey(KeyCode),
    SelectVoice(Option<String>),
    StopSpeaking,
}

#[derive(Debug)]
pub struct PendingReply {
    /// The user utterance being answered
    pub utterance_id: Uuid,
    pub is_voice: bool,
    pub reply: Reply,
}

#[derive(Debug)]
pub enum Query {
    Conversation(oneshot::Sender<Vec<Utterance>>),
}
