//! State module for the interaction controller
//!
//! The controller is the single owner of listening mode, the hotkey binding,
//! both recognition sessions and speech output:
//! - Idle: nothing listening or speaking
//! - ListeningSingleShot: one push-to-talk utterance
//! - ListeningContinuous: dictation restarts after each utterance
//! - AwaitingWakeWord: passive listening for the activation phrase
//! - Speaking: a reply is being voiced, recognition is held off

mod input;
mod machine;

pub use input::{ControllerInput, Query, UserAction};
pub use machine::{InteractionController, InteractionState, ListeningMode, Platform};
