//! Buffered conversation turns and the pairing rule for durable storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of every conversation identifier derived from buffered turns.
const CONVERSATION_PREFIX: &str = "mem-buffer-";

/// Role of the speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => f.write_str("user"),
            TurnRole::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single buffered conversation record, kept exactly as the producer
/// wrote it.
///
/// Any JSON value is a turn. The usual shape is an object with `role`,
/// `content`, `turn` and `timestamp`, but fields are only interpreted when
/// pairs are built, so entries with unexpected roles or field types still
/// reach the file backup untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Turn(Value);

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("role".into(), Value::from(role.to_string()));
        fields.insert("content".into(), Value::from(content.into()));
        Self(Value::Object(fields))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn with_turn(self, turn: u64) -> Self {
        self.with_field("turn", Value::from(turn))
    }

    pub fn with_timestamp(self, timestamp: impl Into<String>) -> Self {
        self.with_field("timestamp", Value::from(timestamp.into()))
    }

    /// Set a field. No-op when the turn is not a JSON object.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        if let Value::Object(fields) = &mut self.0 {
            fields.insert(name.to_string(), value);
        }
        self
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The role, when it is `"user"` or `"assistant"`.
    pub fn role(&self) -> Option<TurnRole> {
        self.field("role").and_then(Value::as_str).and_then(TurnRole::parse)
    }

    /// The message text, when `content` is a string.
    pub fn content(&self) -> Option<&str> {
        self.field("content").and_then(Value::as_str)
    }

    /// The producer's sequence number, whatever its JSON type.
    pub fn turn(&self) -> Option<&Value> {
        self.field("turn")
    }

    /// The capture time, when `timestamp` is a string.
    pub fn timestamp(&self) -> Option<&str> {
        self.field("timestamp").and_then(Value::as_str)
    }

    /// Short label used in previews and logs, e.g. `Turn 3: user`.
    pub fn label(&self) -> String {
        format!(
            "Turn {}: {}",
            display_field(self.field("turn")),
            display_field(self.field("role"))
        )
    }
}

fn display_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}

/// A user message and the assistant reply that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPair {
    pub user_message: String,

    /// Empty when the user turn had no assistant reply after it.
    pub ai_response: String,

    pub user_id: String,

    /// The turn's own `turn` value as written, or its position in the buffer.
    pub turn_number: Value,

    pub conversation_id: String,
}

/// Conversation identifier for a turn: `mem-buffer-` plus the first ten
/// characters of its timestamp (the calendar date of an ISO-8601 value).
pub fn conversation_id(timestamp: Option<&str>) -> String {
    let date: String = timestamp.unwrap_or("unknown").chars().take(10).collect();
    format!("{CONVERSATION_PREFIX}{date}")
}

/// Pair every user turn with the assistant turn directly after it.
///
/// Assistant turns that do not follow a user turn are not submitted on their
/// own, and neither are user turns without text content. A user turn without
/// a reply gets an empty response. Turns without a `turn` field use their
/// position in `turns`; a timestamp that is not a string counts as missing.
pub fn pair_turns(turns: &[Turn], user_id: &str) -> Vec<TurnPair> {
    turns
        .iter()
        .enumerate()
        .filter(|(_, turn)| turn.role() == Some(TurnRole::User))
        .filter_map(|(i, turn)| {
            let user_message = turn.content()?.to_string();
            let ai_response = match turns.get(i + 1) {
                Some(next) if next.role() == Some(TurnRole::Assistant) => {
                    next.content().unwrap_or_default().to_string()
                }
                _ => String::new(),
            };

            Some(TurnPair {
                user_message,
                ai_response,
                user_id: user_id.to_string(),
                turn_number: turn.turn().cloned().unwrap_or_else(|| Value::from(i)),
                conversation_id: conversation_id(turn.timestamp()),
            })
        })
        .collect()
}
