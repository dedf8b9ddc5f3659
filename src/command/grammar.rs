//! Voice command grammar
//!
//! Maps an utterance to a structured command with an ordered list of
//! heuristic rules; the first rule that matches wins and anything else is
//! chat. Parsing never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::HttpMethod;

static FILLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:please|can you|could you|would you|i want to|i need to|a|an|the)\b").unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static ADD_TASK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:add|create|new|make|set)(?:\s+(?:a|new))?\s+task(?:\s+(?:for|to))?\s+(.+)").unwrap()
});
static REMIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:remind me(?: to)?|i should|i must|remember to)\s+(.+)").unwrap()
});
static TASK_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btask\s+(?:to|for)\s+(.+)").unwrap());
static TASK_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:add|create|new|make|set)(?:\s+(?:a|new))?\s+(?:task|reminder)(?:\s+(?:for|to))?|remind me(?: to)?|i should|i must|remember to)\b[\s:,-]*(.*)",
    )
    .unwrap()
});

static OPEN_APP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:open|launch|start|run)(?:\s+(?:the|my))?\s+(.+)").unwrap()
});
static APP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:open|launch|start|run)\b[\s:,-]*(.*)").unwrap());

static STATS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:cpu|usage|stats|statistics|system|performance|resource)").unwrap()
});

/// Parsed intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    AddTask { content: String },
    OpenApp { name: String },
    GetStats,
    Chat { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    AddTask,
    OpenApp,
    GetStats,
    Chat,
}

impl CommandKind {
    /// Lowercase label used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::AddTask => "add task",
            CommandKind::OpenApp => "open app",
            CommandKind::GetStats => "get stats",
            CommandKind::Chat => "chat",
        }
    }
}

/// A command ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub command: Command,
    pub target_endpoint: &'static str,
    pub method: HttpMethod,
    /// The utterance exactly as received
    pub original: String,
}

impl ParsedCommand {
    fn new(command: Command, original: &str) -> Self {
        let (target_endpoint, method) = match command {
            Command::AddTask { .. } => ("/tasks", HttpMethod::Post),
            Command::OpenApp { .. } => ("/system/open", HttpMethod::Post),
            Command::GetStats => ("/system/stats", HttpMethod::Get),
            Command::Chat { .. } => ("/chat", HttpMethod::Post),
        };
        Self {
            command,
            target_endpoint,
            method,
            original: original.to_string(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self.command {
            Command::AddTask { .. } => CommandKind::AddTask,
            Command::OpenApp { .. } => CommandKind::OpenApp,
            Command::GetStats => CommandKind::GetStats,
            Command::Chat { .. } => CommandKind::Chat,
        }
    }

    pub fn is_chat(&self) -> bool {
        self.kind() == CommandKind::Chat
    }

    /// Request body; both field spellings are sent so either backend
    /// schema accepts it
    pub fn body(&self) -> Option<Value> {
        match &self.command {
            Command::AddTask { content } => Some(json!({ "content": content, "title": content })),
            Command::OpenApp { name } => Some(json!({ "app_name": name, "application": name })),
            Command::GetStats => None,
            Command::Chat { message } => Some(json!({ "text": message })),
        }
    }
}

/// Lowercase, trim, drop filler words and collapse whitespace
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let stripped = FILLER.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Map an utterance to a command
pub fn parse(text: &str) -> ParsedCommand {
    let cleaned = normalize(text);

    let command = parse_task(&cleaned)
        .map(|content| Command::AddTask { content })
        .or_else(|| parse_app(&cleaned).map(|name| Command::OpenApp { name }))
        .or_else(|| STATS.is_match(&cleaned).then_some(Command::GetStats))
        .unwrap_or_else(|| Command::Chat {
            message: text.to_string(),
        });

    debug!(original = text, cleaned = %cleaned, ?command, "parsed utterance");
    ParsedCommand::new(command, text)
}

fn parse_task(cleaned: &str) -> Option<String> {
    let matched = ADD_TASK.is_match(cleaned) || REMIND.is_match(cleaned);
    let captured = if matched {
        [&*ADD_TASK, &*REMIND, &*TASK_TAIL]
            .into_iter()
            .find_map(|re| capture(re, cleaned))
    } else {
        None
    };
    captured.or_else(|| capture(&TASK_PREFIX, cleaned))
}

fn parse_app(cleaned: &str) -> Option<String> {
    capture(&OPEN_APP, cleaned).or_else(|| capture(&APP_PREFIX, cleaned))
}

/// Tidied first capture group, if it carries real content
fn capture(re: &Regex, cleaned: &str) -> Option<String> {
    let text = tidy(re.captures(cleaned)?.get(1)?.as_str());
    let connective = matches!(text.as_str(), "for" | "to" | "task" | "reminder");
    (text.chars().any(char::is_alphanumeric) && !connective).then_some(text)
}

fn tidy(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
        .trim()
        .to_string()
}
