//! Generation service trait and implementations
//!
//! The flow components never talk to an LLM directly; they hold an injected
//! `GenerationService`. `GeminiGenerator` backs production, the scripted
//! implementation keeps the system functional without an LLM dependency.

use crate::models::{Intent, PromptMessage};
use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiGenerator;

/// Trait for text generation (LLM boundary)
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Free-text generation
    async fn generate(&self, system_prompt: &str, messages: &[PromptMessage]) -> Result<String>;

    /// Structured generation constrained to the intent enumeration
    async fn classify_intent(
        &self,
        system_prompt: &str,
        messages: &[PromptMessage],
    ) -> Result<Intent>;
}

/// Deterministic generator for development & testing
///
/// Classification follows the same decision policy the real prompt encodes;
/// generation returns canned text conforming to each response template.
pub struct ScriptedGenerator;

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

const VAGUE_QUERIES: &[&str] = &["check this", "analyze", "what is this?"];

fn scripted_intent(query: &str) -> Intent {
    let query = query.trim().to_lowercase();

    if query.is_empty() || VAGUE_QUERIES.contains(&query.as_str()) {
        return Intent::Ambiguous;
    }

    if query.contains("summar") {
        Intent::Summarize
    } else if query.contains("sentiment") || query.contains("feel about") {
        Intent::Sentiment
    } else if query.contains("code") || query.contains("function") || query.contains("bug") {
        Intent::CodeExplain
    } else {
        Intent::GeneralChat
    }
}

/// Pull the raw query back out of the classifier's user message
fn query_from_messages(messages: &[PromptMessage]) -> String {
    let content = messages.last().map(|m| m.content.as_str()).unwrap_or("");

    content
        .trim()
        .trim_start_matches("User query:")
        .trim()
        .trim_matches('\'')
        .to_string()
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, system_prompt: &str, _messages: &[PromptMessage]) -> Result<String> {
        let response = if system_prompt.contains("follow-up question") {
            "Could you clarify whether you want a summary, sentiment analysis, or a code explanation?"
                .to_string()
        } else if system_prompt.contains("Summarize the provided text") {
            "\
One-line summary of the provided text.

- First key detail drawn from the text.
- Second key detail drawn from the text.
- Third key detail drawn from the text.

The text opens by laying out its central subject. It then develops the \
main argument in concrete terms. Supporting details reinforce the key \
points along the way. The later sections address implications and open \
questions. It closes by restating the core takeaway."
                .to_string()
        } else if system_prompt.contains("sentiment of the text") {
            "\
Label: Neutral
Confidence: 75%
Justification: The text carries no strongly positive or negative language."
                .to_string()
        } else if system_prompt.contains("Explain the provided code snippet") {
            "\
Explanation: The code reads its input, transforms it, and returns the result.

Bug report:
1. Input length is never validated before indexing.
2. The error path silently swallows the underlying failure."
                .to_string()
        } else if system_prompt.contains("Answer the user's question directly") {
            "Hi there! What would you like to work on today?".to_string()
        } else {
            "Processed the request.".to_string()
        };

        Ok(response)
    }

    async fn classify_intent(
        &self,
        _system_prompt: &str,
        messages: &[PromptMessage],
    ) -> Result<Intent> {
        Ok(scripted_intent(&query_from_messages(messages)))
    }
}
