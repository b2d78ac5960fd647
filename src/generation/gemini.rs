//! Gemini-backed generation service

use crate::gemini::GeminiClient;
use crate::generation::GenerationService;
use crate::models::{Intent, PromptMessage};
use crate::Result;
use async_trait::async_trait;

pub struct GeminiGenerator {
    client: GeminiClient,
}

impl GeminiGenerator {
    pub fn new(api_key: String) -> Self {
        Self {
            client: GeminiClient::new(api_key),
        }
    }
}

#[async_trait]
impl GenerationService for GeminiGenerator {
    async fn generate(&self, system_prompt: &str, messages: &[PromptMessage]) -> Result<String> {
        self.client.generate(system_prompt, messages).await
    }

    async fn classify_intent(
        &self,
        system_prompt: &str,
        messages: &[PromptMessage],
    ) -> Result<Intent> {
        self.client.generate_intent(system_prompt, messages).await
    }
}
