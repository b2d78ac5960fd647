//! Core data models for the assistant router

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of most-recent turns included when building any prompt.
/// Full history is preserved in the session store; this cap applies to
/// prompt construction only.
pub const HISTORY_WINDOW: usize = 10;

//
// ================= Intent =================
//

/// Closed classification label describing what the user wants done.
/// Deserializing any label outside this enumeration is a hard error,
/// never coerced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Summarize,
    Sentiment,
    CodeExplain,
    GeneralChat,
    Ambiguous,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Summarize,
        Intent::Sentiment,
        Intent::CodeExplain,
        Intent::GeneralChat,
        Intent::Ambiguous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Summarize => "summarize",
            Intent::Sentiment => "sentiment",
            Intent::CodeExplain => "code_explain",
            Intent::GeneralChat => "general_chat",
            Intent::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Conversation =================
//

/// Role of a turn's author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// A single ordered message in a session. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }
}

/// Message handed to the generation service
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: TurnRole,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for PromptMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

//
// ================= Request Context =================
//

/// Per-invocation routing state. Built once from a snapshot of session
/// history, threaded through the flow by value, never shared across
/// concurrent invocations.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_query: String,
    pub extracted_text: String,
    pub chat_history: Vec<ConversationTurn>,
    pub intent: Option<Intent>,
    pub final_response: Option<String>,
}

impl RequestContext {
    pub fn new(
        user_query: impl Into<String>,
        chat_history: Vec<ConversationTurn>,
        extracted_text: impl Into<String>,
    ) -> Self {
        Self {
            user_query: user_query.into(),
            extracted_text: extracted_text.into(),
            chat_history,
            intent: None,
            final_response: None,
        }
    }

    /// Most recent `count` turns, oldest first
    pub fn recent_history(&self, count: usize) -> &[ConversationTurn] {
        let start = self.chat_history.len().saturating_sub(count);
        &self.chat_history[start..]
    }

    pub fn with_intent(self, intent: Intent) -> Self {
        Self {
            intent: Some(intent),
            ..self
        }
    }

    pub fn with_response(self, final_response: String) -> Self {
        Self {
            final_response: Some(final_response),
            ..self
        }
    }
}

/// Terminal output of one router invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub final_response: String,
    pub intent: Intent,
}

//
// ================= Prompt Helpers =================
//

/// First `max_chars` characters of `text`, cut on a char boundary.
/// Truncated, not summarized.
pub fn snippet(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Render turns as plain `Role: content` lines for prompt embedding
pub fn render_history(turns: &[ConversationTurn]) -> String {
    let mut rendered = String::new();

    for turn in turns {
        let role_str = match turn.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
            TurnRole::System => "System",
        };

        rendered.push_str(&format!("{}: {}\n", role_str, turn.content));
    }

    rendered
}
