//! Host speech capabilities
//!
//! Recognition and synthesis are provided by the host platform. The daemon
//! talks to them through the [`Recognizer`] and [`Synthesizer`] traits and
//! receives their asynchronous callbacks as [`PlatformEvent`]s.

use serde::{Deserialize, Serialize};

/// Which recognition session a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Captures a full command or chat utterance
    Dictation,
    /// Passive listening for the activation phrase
    WakeWord,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Dictation => write!(f, "dictation"),
            SessionKind::WakeWord => write!(f, "wake_word"),
        }
    }
}

/// Identifies one platform recognition handle within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one synthesis utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeechId(pub u64);

/// Parameters for a platform recognition start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    pub session: SessionKind,
    pub handle: HandleId,
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
}

/// Parameters for a platform synthesis utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub speech_id: SpeechId,
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
}

/// Speech recognition capability of the host
pub trait Recognizer: Send {
    fn recognition_supported(&self) -> bool;
    fn start_recognition(&mut self, request: &RecognitionRequest);
    fn stop_recognition(&mut self, session: SessionKind, handle: HandleId);
}

/// Speech synthesis capability of the host
pub trait Synthesizer: Send {
    fn synthesis_supported(&self) -> bool;
    fn speak(&mut self, request: &SpeechRequest);
    fn cancel(&mut self);
}

/// Commands the daemon issues to the host platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlatformCommand {
    StartRecognition(RecognitionRequest),
    StopRecognition { session: SessionKind, handle: HandleId },
    Speak(SpeechRequest),
    CancelSpeech,
}

/// Callbacks from the host platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    RecognitionStarted {
        session: SessionKind,
        handle: HandleId,
    },
    RecognitionResult {
        session: SessionKind,
        handle: HandleId,
        transcript: String,
        #[serde(default = "default_final")]
        is_final: bool,
    },
    RecognitionError {
        session: SessionKind,
        handle: HandleId,
        code: String,
    },
    RecognitionEnded {
        session: SessionKind,
        handle: HandleId,
    },
    SpeechEnded {
        speech_id: SpeechId,
    },
    SpeechFailed {
        speech_id: SpeechId,
        error: String,
    },
    /// A host with speech capabilities attached
    HostAttached {
        #[serde(default)]
        voices: Vec<String>,
    },
    /// The attached host went away
    HostDetached,
}

fn default_final() -> bool {
    true
}
