//! Chat history supplied by callers of the generation endpoints.
//!
//! History lives only for the duration of one request; conversation
//! continuity is the caller's job.

use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One text fragment of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    pub text: String,
}

/// A prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub parts: Vec<HistoryPart>,
}

impl HistoryEntry {
    pub fn new(role: Role, texts: &[&str]) -> Self {
        Self {
            role,
            parts: texts
                .iter()
                .map(|text| HistoryPart {
                    text: text.to_string(),
                })
                .collect(),
        }
    }
}
