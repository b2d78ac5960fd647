//! Intent-routing state machine
//!
//! One invocation is a single branch traversal:
//!
//! START → CLASSIFY → {CLARIFY | EXECUTE} → DONE
//!
//! The classifier always runs first; the branch is a pure function of the
//! resulting intent, evaluated once. There is no loop and no fallback
//! between branches: a classification failure fails the whole run.

use crate::clarifier::Clarifier;
use crate::classifier::IntentClassifier;
use crate::error::RouterError;
use crate::executor::Executor;
use crate::generation::GenerationService;
use crate::models::{
    ConversationTurn, Intent, RequestContext, RouteOutcome, HISTORY_WINDOW,
};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Terminal step chosen after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Clarify,
    Execute(Intent),
}

/// The only branch point in the flow. Pure function of the intent.
pub fn decide(intent: Intent) -> Branch {
    match intent {
        Intent::Ambiguous => Branch::Clarify,
        resolved => Branch::Execute(resolved),
    }
}

/// Drives one request through classify → branch → terminal step.
/// Stateless and reentrant; holds only shared read-only components.
pub struct IntentRouter {
    classifier: IntentClassifier,
    clarifier: Clarifier,
    executor: Executor,
}

impl IntentRouter {
    pub fn new(generator: Arc<dyn GenerationService>) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&generator)),
            clarifier: Clarifier::new(Arc::clone(&generator)),
            executor: Executor::new(generator),
        }
    }

    /// Run the flow to completion for one request.
    ///
    /// `history` is a snapshot of the session at call time; the router
    /// never writes it back. Deterministic given a deterministic
    /// generation service.
    pub async fn run(
        &self,
        user_query: &str,
        history: Vec<ConversationTurn>,
        extracted_text: &str,
    ) -> Result<RouteOutcome> {
        let ctx = RequestContext::new(user_query, history, extracted_text);

        info!(
            query_len = ctx.user_query.len(),
            extracted_len = ctx.extracted_text.len(),
            history_turns = ctx.chat_history.len(),
            "Router: run started"
        );

        let intent = self
            .classifier
            .classify(
                &ctx.user_query,
                &ctx.extracted_text,
                ctx.recent_history(HISTORY_WINDOW),
            )
            .await?;

        let ctx = ctx.with_intent(intent);
        let branch = decide(intent);
        debug!(%intent, ?branch, "Router: branch decided");

        let response = match branch {
            Branch::Clarify => {
                self.clarifier
                    .clarify(&ctx.user_query, ctx.recent_history(HISTORY_WINDOW))
                    .await?
            }
            Branch::Execute(resolved) => {
                self.executor
                    .execute(
                        resolved,
                        &ctx.extracted_text,
                        ctx.recent_history(HISTORY_WINDOW),
                    )
                    .await?
            }
        };

        let ctx = ctx.with_response(response);

        match (ctx.intent, ctx.final_response) {
            (Some(intent), Some(final_response)) => {
                info!(%intent, "Router: run complete");
                Ok(RouteOutcome {
                    final_response,
                    intent,
                })
            }
            // Unreachable by construction; kept as a hard error rather
            // than a panic.
            _ => Err(RouterError::GenerationError(
                "flow terminated without a response".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationService, ScriptedGenerator};
    use crate::models::PromptMessage;
    use async_trait::async_trait;

    fn test_router() -> IntentRouter {
        IntentRouter::new(Arc::new(ScriptedGenerator::new()))
    }

    #[test]
    fn test_branch_coverage_is_exhaustive() {
        assert_eq!(decide(Intent::Ambiguous), Branch::Clarify);
        assert_eq!(decide(Intent::Summarize), Branch::Execute(Intent::Summarize));
        assert_eq!(decide(Intent::Sentiment), Branch::Execute(Intent::Sentiment));
        assert_eq!(
            decide(Intent::CodeExplain),
            Branch::Execute(Intent::CodeExplain)
        );
        assert_eq!(
            decide(Intent::GeneralChat),
            Branch::Execute(Intent::GeneralChat)
        );
    }

    #[tokio::test]
    async fn test_summarize_scenario() {
        let router = test_router();

        let outcome = router
            .run(
                "Summarize this for me",
                vec![ConversationTurn::user("Summarize this for me")],
                &"long article text ".repeat(50),
            )
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::Summarize);
        let bullets = outcome
            .final_response
            .lines()
            .filter(|l| l.trim_start().starts_with("- "))
            .count();
        assert_eq!(bullets, 3);

        let paragraph = outcome.final_response.lines().last().unwrap();
        assert_eq!(paragraph.matches(". ").count() + 1, 5);
    }

    #[tokio::test]
    async fn test_empty_query_with_file_clarifies() {
        let router = test_router();

        let outcome = router
            .run("", vec![], "PDF text extracted from an upload")
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::Ambiguous);
        assert!(outcome.final_response.ends_with('?'));
        assert!(!outcome.final_response.contains("Summary line"));
    }

    #[tokio::test]
    async fn test_greeting_gets_direct_reply() {
        let router = test_router();

        let outcome = router.run("hello", vec![], "").await.unwrap();

        assert_eq!(outcome.intent, Intent::GeneralChat);
        assert!(!outcome.final_response.is_empty());
        assert!(!outcome.final_response.contains("- "));
    }

    #[tokio::test]
    async fn test_code_question_gets_explanation_and_bug_report() {
        let router = test_router();

        let outcome = router
            .run(
                "what's wrong with this function",
                vec![],
                "fn main() { let v = vec![]; v[0] }",
            )
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::CodeExplain);
        assert!(outcome.final_response.contains("Explanation:"));
        assert!(outcome.final_response.to_lowercase().contains("bug"));
    }

    #[tokio::test]
    async fn test_run_is_deterministic() {
        let router = test_router();

        let first = router.run("hello", vec![], "").await.unwrap();
        let second = router.run("hello", vec![], "").await.unwrap();

        assert_eq!(first.final_response, second.final_response);
        assert_eq!(first.intent, second.intent);
    }

    /// Captures every system prompt it is handed
    struct RecordingGenerator {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationService for RecordingGenerator {
        async fn generate(
            &self,
            system_prompt: &str,
            _messages: &[PromptMessage],
        ) -> crate::Result<String> {
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            Ok("ok".to_string())
        }

        async fn classify_intent(
            &self,
            system_prompt: &str,
            _messages: &[PromptMessage],
        ) -> crate::Result<Intent> {
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            Ok(Intent::Summarize)
        }
    }

    #[tokio::test]
    async fn test_prompt_caps_apply_independently() {
        let generator = Arc::new(RecordingGenerator {
            prompts: std::sync::Mutex::new(Vec::new()),
        });
        let router = IntentRouter::new(Arc::clone(&generator) as Arc<dyn GenerationService>);

        let history: Vec<ConversationTurn> = (0..15)
            .map(|i| ConversationTurn::user(format!("turn {}", i)))
            .collect();
        let text = "a".repeat(2000);

        router
            .run("Summarize this for me", history, &text)
            .await
            .unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);

        // Classification sees 800 chars of text and only the last 10 turns
        let classify_prompt = &prompts[0];
        let classify_snippet = classify_prompt
            .split("File snippet: ")
            .nth(1)
            .unwrap()
            .lines()
            .next()
            .unwrap();
        assert_eq!(classify_snippet.chars().count(), 800);
        assert!(classify_prompt.contains("turn 5"));
        assert!(!classify_prompt.contains("turn 4"));

        // Execution sees 1000 chars, independently of the classifier cap
        let execute_prompt = &prompts[1];
        let execute_snippet = execute_prompt.split("Context:\n").nth(1).unwrap().trim();
        assert_eq!(execute_snippet.chars().count(), 1000);
    }

    struct FailingGenerator;

    #[async_trait]
    impl GenerationService for FailingGenerator {
        async fn generate(
            &self,
            _system_prompt: &str,
            _messages: &[PromptMessage],
        ) -> crate::Result<String> {
            Err(RouterError::GenerationError("service down".to_string()))
        }

        async fn classify_intent(
            &self,
            _system_prompt: &str,
            _messages: &[PromptMessage],
        ) -> crate::Result<Intent> {
            Err(RouterError::ClassificationError("service down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_classification_failure_fails_the_run() {
        let router = IntentRouter::new(Arc::new(FailingGenerator));

        let result = router.run("Summarize this", vec![], "text").await;
        assert!(matches!(
            result,
            Err(RouterError::ClassificationError(_))
        ));
    }
}
