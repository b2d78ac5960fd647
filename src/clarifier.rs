//! Clarification step
//!
//! Runs when intent is ambiguous. Produces a single short follow-up
//! question; it never attempts to answer the original query.

use crate::generation::GenerationService;
use crate::models::{render_history, ConversationTurn, PromptMessage};
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub struct Clarifier {
    generator: Arc<dyn GenerationService>,
}

impl Clarifier {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self { generator }
    }

    pub async fn clarify(
        &self,
        user_query: &str,
        recent_history: &[ConversationTurn],
    ) -> Result<String> {
        let system_prompt = build_clarification_prompt(recent_history);
        let messages = vec![PromptMessage::user(user_query)];

        let question = self.generator.generate(&system_prompt, &messages).await?;

        info!(question_len = question.len(), "Clarification question generated");

        Ok(question)
    }
}

fn build_clarification_prompt(recent_history: &[ConversationTurn]) -> String {
    format!(
        r#"The user has provided input but the goal is unclear.
Generate a polite, short (one sentence) follow-up question.

Examples:
- "Could you clarify if you want a summary or sentiment analysis?"
- "What specific part of this code would you like me to explain?"
- "Do you want me to summarize this audio file?"

Recent chat history:
{}"#,
        render_history(recent_history),
    )
}
