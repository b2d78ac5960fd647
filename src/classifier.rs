//! Intent classification step
//!
//! Turns (query, extracted text, recent history) into exactly one label from
//! the closed intent enumeration. A generation failure or an out-of-enum
//! label fails the invocation; the classifier never guesses.

use crate::generation::GenerationService;
use crate::models::{render_history, snippet, ConversationTurn, Intent, PromptMessage};
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Extracted text is capped to this many characters for the classification
/// prompt. The execution step applies its own, independent cap.
pub const CLASSIFY_SNIPPET_CHARS: usize = 800;

pub struct IntentClassifier {
    generator: Arc<dyn GenerationService>,
}

impl IntentClassifier {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self { generator }
    }

    /// Classify the user's intent. No side effects; the session store is
    /// never touched here.
    pub async fn classify(
        &self,
        query: &str,
        extracted_text: &str,
        recent_history: &[ConversationTurn],
    ) -> Result<Intent> {
        let system_prompt = build_classification_prompt(extracted_text, recent_history);
        let messages = vec![PromptMessage::user(format!("User query: '{}'", query))];

        let intent = self
            .generator
            .classify_intent(&system_prompt, &messages)
            .await?;

        info!(%intent, query_len = query.len(), "Intent classified");

        Ok(intent)
    }
}

fn build_classification_prompt(
    extracted_text: &str,
    recent_history: &[ConversationTurn],
) -> String {
    format!(
        r#"You are the brain of a multimodal file assistant.
Your job is to classify the user's intent based on their query and the file content.

Context:
- File snippet: {}
- Recent chat history:
{}
Possible intents:
1. 'summarize' (the user wants a summary)
2. 'sentiment' (the user wants sentiment analysis)
3. 'code_explain' (the user wants code explanation or debugging)
4. 'general_chat' (the user is saying hello or asking something unrelated to the file)
5. 'ambiguous' (the goal is unclear)

Critical rules:
- If the user provides a file but no query (or an empty query), return 'ambiguous'.
- If the user says vague things like "check this", "analyze", "what is this?", return 'ambiguous'.
- If multiple tasks are equally plausible, return 'ambiguous'.

Return exactly one intent from the list above."#,
        snippet(extracted_text, CLASSIFY_SNIPPET_CHARS),
        render_history(recent_history),
    )
}
