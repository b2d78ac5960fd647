//! Execution step
//!
//! Performs the resolved task with a fixed, intent-keyed output template.
//! Template conformance is advisory: the generated text is checked against
//! the template's required shape and mismatches are logged, never rejected.

use crate::generation::GenerationService;
use crate::models::{snippet, ConversationTurn, Intent, PromptMessage};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Extracted text is capped to this many characters for the execution
/// prompt, independent of the classifier's cap.
pub const EXECUTE_SNIPPET_CHARS: usize = 1000;

pub struct Executor {
    generator: Arc<dyn GenerationService>,
}

impl Executor {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self { generator }
    }

    /// Execute the task for a resolved intent. The caller appends the
    /// result to session history; nothing is persisted here.
    pub async fn execute(
        &self,
        intent: Intent,
        extracted_text: &str,
        recent_history: &[ConversationTurn],
    ) -> Result<String> {
        let system_prompt = format!(
            "{}\n\nContext:\n{}",
            template_for(intent),
            snippet(extracted_text, EXECUTE_SNIPPET_CHARS),
        );

        let mut messages: Vec<PromptMessage> =
            recent_history.iter().map(PromptMessage::from).collect();

        // History normally carries the current user turn; a bare library
        // call with no history still needs one message.
        if messages.is_empty() {
            messages.push(PromptMessage::user(
                "Please complete the task on the provided context.",
            ));
        }

        info!(%intent, context_chars = extracted_text.len(), "Executing intent");

        let response = self.generator.generate(&system_prompt, &messages).await?;

        if let Some(gap) = shape_gap(intent, &response) {
            warn!(%intent, gap = %gap, "Generated text does not match the response template");
        }

        Ok(response)
    }
}

/// Fixed output template keyed by intent. `Ambiguous` is unreachable
/// through the router branch and gets the generic fallback instruction.
fn template_for(intent: Intent) -> &'static str {
    match intent {
        Intent::Summarize => {
            r#"Task: Summarize the provided text.

Required output format:
1. A 1-line summary.
2. Exactly 3 bullet points highlighting key details.
3. A 5-sentence summary paragraph."#
        }
        Intent::Sentiment => {
            r#"Task: Analyze the sentiment of the text.

Required output format:
1. Label (Positive / Negative / Neutral).
2. Confidence score (estimate between 0-100%).
3. A one-line justification for this label."#
        }
        Intent::CodeExplain => {
            r#"Task: Explain the provided code snippet.

Required output format:
1. Explanation: what does the code do?
2. Bug report: detect and list any potential bugs or security issues."#
        }
        Intent::GeneralChat => "You are a helpful assistant. Answer the user's question directly.",
        Intent::Ambiguous => "Process the request.",
    }
}

/// Advisory template-shape check. Returns a description of the first
/// mismatch, or None when the text conforms.
fn shape_gap(intent: Intent, text: &str) -> Option<String> {
    match intent {
        Intent::Summarize => {
            let bullets = text
                .lines()
                .filter(|line| {
                    let line = line.trim_start();
                    line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ")
                })
                .count();

            (bullets != 3).then(|| format!("expected exactly 3 bullet points, found {}", bullets))
        }
        Intent::Sentiment => {
            let has_label = ["Positive", "Negative", "Neutral"]
                .iter()
                .any(|label| text.contains(label));

            (!has_label).then(|| "missing sentiment label (Positive / Negative / Neutral)".to_string())
        }
        Intent::CodeExplain => {
            let lowered = text.to_lowercase();
            let has_sections = lowered.contains("explanation") && lowered.contains("bug");

            (!has_sections).then(|| "missing explanation or bug-report section".to_string())
        }
        Intent::GeneralChat | Intent::Ambiguous => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ScriptedGenerator;
    use crate::models::ConversationTurn;

    #[test]
    fn test_template_selection_per_intent() {
        assert!(template_for(Intent::Summarize).contains("Exactly 3 bullet points"));
        assert!(template_for(Intent::Sentiment).contains("Positive / Negative / Neutral"));
        assert!(template_for(Intent::CodeExplain).contains("Bug report"));
        assert!(template_for(Intent::GeneralChat).contains("directly"));
        assert_eq!(template_for(Intent::Ambiguous), "Process the request.");
    }

    #[test]
    fn test_shape_gap_summary_bullets() {
        let conforming = "Summary line.\n- one\n- two\n- three\nParagraph.";
        assert!(shape_gap(Intent::Summarize, conforming).is_none());

        let short = "Summary line.\n- one\n- two\nParagraph.";
        let gap = shape_gap(Intent::Summarize, short).unwrap();
        assert!(gap.contains("found 2"));
    }

    #[test]
    fn test_shape_gap_sentiment_label() {
        assert!(shape_gap(Intent::Sentiment, "Label: Positive\nConfidence: 90%").is_none());
        assert!(shape_gap(Intent::Sentiment, "the text is upbeat").is_some());
    }

    #[test]
    fn test_shape_gap_code_explain_sections() {
        let conforming = "Explanation: parses input.\nBug report:\n1. off-by-one";
        assert!(shape_gap(Intent::CodeExplain, conforming).is_none());
        assert!(shape_gap(Intent::CodeExplain, "it parses input").is_some());
    }

    #[test]
    fn test_shape_gap_ignores_unconstrained_templates() {
        assert!(shape_gap(Intent::GeneralChat, "anything at all").is_none());
        assert!(shape_gap(Intent::Ambiguous, "anything at all").is_none());
    }

    #[tokio::test]
    async fn test_execute_is_deterministic_for_identical_inputs() {
        let executor = Executor::new(Arc::new(ScriptedGenerator::new()));
        let history = vec![ConversationTurn::user("Summarize this for me")];

        let first = executor
            .execute(Intent::Summarize, "article text", &history)
            .await
            .unwrap();
        let second = executor
            .execute(Intent::Summarize, "article text", &history)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(shape_gap(Intent::Summarize, &first).is_none());
    }

    #[tokio::test]
    async fn test_execute_with_empty_history_still_sends_a_message() {
        let executor = Executor::new(Arc::new(ScriptedGenerator::new()));

        let response = executor
            .execute(Intent::GeneralChat, "", &[])
            .await
            .unwrap();
        assert!(!response.is_empty());
    }
}
