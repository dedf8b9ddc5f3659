//! Voice module: recognition sessions, wake word gating and speech output
//!
//! Recognition and synthesis engines belong to the host platform; this
//! module owns their lifecycle and the rule that the two never overlap.

mod bridge;
mod platform;
mod recognition;
mod speech;
mod wake_word;

pub use bridge::{HostBridge, HostCapabilities};
pub use platform::{
    HandleId, PlatformCommand, PlatformEvent, RecognitionRequest, Recognizer, SessionKind,
    SpeechId, SpeechRequest, Synthesizer,
};
pub use recognition::{EndOutcome, RecognitionSession, SessionError};
pub use speech::SpeechOutputController;
pub use wake_word::WakeWordGate;
