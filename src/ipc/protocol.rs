//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::backend::UserMemory;
use crate::conversation::Utterance;
use crate::events::StateEvent;
use crate::state::{InteractionState, ListeningMode};
use crate::voice::{PlatformCommand, PlatformEvent};

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI and host clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to state event notifications
    Subscribe,

    /// Register this connection as the speech host
    AttachHost {
        recognition: bool,
        synthesis: bool,
        #[serde(default)]
        voices: Vec<String>,
    },

    /// Callback from the attached host's speech engines
    Platform { event: PlatformEvent },

    PressMic,

    SetAlwaysListening { enabled: bool },

    ToggleAlwaysListening,

    SubmitText { text: String },

    /// Rebind the always-listening hotkey (DOM key code)
    SetHotkey { key: String },

    /// Key press forwarded by a host without a native hotkey listener
    KeyPressed { key: String },

    SelectVoice {
        #[serde(default)]
        voice: Option<String>,
    },

    StopSpeaking,

    GetConversation,

    GetMemory,
}

/// Responses from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Host registration confirmed
    Attached,

    /// Input handed to the controller
    Accepted,

    Conversation { utterances: Vec<Utterance> },

    Memory(UserMemory),

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// For subscribed clients
    StateEvent { event: StateEvent },
    /// For the attached host
    PlatformCommand { command: PlatformCommand },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub state: InteractionState,

    pub listening_mode: ListeningMode,

    /// Bound hotkey as a DOM key code
    pub hotkey: String,

    /// Whether the native hotkey listener is running
    pub hotkey_registered: bool,

    pub host_attached: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn new(hotkey: &str) -> Self {
        Self {
            hotkey: hotkey.to_string(),
            ..Self::default()
        }
    }

    /// Fold a controller event into the snapshot
    pub fn apply(&mut self, event: &StateEvent) {
        match event {
            StateEvent::StateChanged { to, .. } => self.state = *to,
            StateEvent::ListeningModeChanged { mode } => self.listening_mode = *mode,
            StateEvent::HotkeyChanged { key } => self.hotkey = key.clone(),
            _ => {}
        }
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: InteractionState::default(),
            listening_mode: ListeningMode::default(),
            hotkey: "Space".to_string(),
            hotkey_registered: false,
            host_attached: false,
            uptime_secs: 0,
        }
    }
}
