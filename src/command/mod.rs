//! Command module: grammar, dispatch and the reply pipeline
//!
//! Voice input is parsed into a structured command first; anything the
//! grammar does not recognise, and all typed input, goes to chat.

pub(crate) mod dispatcher;
mod format;
mod grammar;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, BackendError};

pub use dispatcher::{CommandDispatcher, CommandResult};
pub use grammar::parse;

/// Assistant answer to one user utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub display: String,
    /// Text to voice, if the reply should be spoken
    pub speech: Option<String>,
    pub is_command: bool,
    pub is_error: bool,
}

impl From<CommandResult> for Reply {
    fn from(result: CommandResult) -> Self {
        Self {
            display: result.display_message,
            speech: Some(result.speech_message),
            is_command: true,
            is_error: !result.success,
        }
    }
}

/// Produce the assistant reply for `text`
pub async fn respond(backend: Arc<dyn Backend>, text: &str, is_voice: bool) -> Reply {
    if is_voice {
        let parsed = parse(text);
        let dispatcher = CommandDispatcher::new(Arc::clone(&backend));
        if let Some(result) = dispatcher.dispatch(&parsed).await {
            return result.into();
        }
    }

    match backend.chat(text).await {
        Ok(reply) => {
            debug!(chars = reply.reply.len(), "chat reply received");
            Reply {
                speech: is_voice.then(|| reply.reply.clone()),
                display: reply.reply,
                is_command: false,
                is_error: false,
            }
        }
        Err(err) => {
            warn!(error = %err, "chat request failed");
            let display = match &err {
                BackendError::Timeout => "Request timed out".to_string(),
                BackendError::Status { detail, .. } => format!("Error: {}", detail),
                other => format!("Error: {}", other),
            };
            Reply {
                display,
                speech: None,
                is_command: false,
                is_error: true,
            }
        }
    }
}
