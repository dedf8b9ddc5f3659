//! Conversation log
//!
//! Ordered record of user and assistant utterances for the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Ai,
}

/// Delivery of a user utterance to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    pub sender: Author,
    pub timestamp: DateTime<Utc>,
    pub is_voice_input: bool,
    pub is_command: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
}

impl Utterance {
    pub fn user(text: &str, is_voice_input: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            sender: Author::User,
            timestamp: Utc::now(),
            is_voice_input,
            is_command: false,
            is_error: false,
            status: Some(DeliveryStatus::Pending),
        }
    }

    pub fn assistant(text: &str, is_command: bool, is_error: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            sender: Author::Ai,
            timestamp: Utc::now(),
            is_voice_input: false,
            is_command,
            is_error,
            status: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    utterances: Vec<Utterance>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    /// Attach a delivery status; the only mutation an utterance allows
    pub fn set_status(&mut self, id: Uuid, status: DeliveryStatus) -> bool {
        match self.utterances.iter_mut().find(|u| u.id == id) {
            Some(utterance) => {
                utterance.status = Some(status);
                true
            }
            None => false,
        }
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }
}
