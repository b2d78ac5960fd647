//! Gemini API client
//!
//! Free-text generation plus a schema-constrained structured variant for
//! intent classification. Uses a long-lived reqwest::Client for connection
//! pooling; every request carries a hard timeout so a hung generation call
//! cannot block a session.

use crate::error::RouterError;
use crate::models::{Intent, PromptMessage, TurnRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        }
    }

    /// Generate a free-text response
    pub async fn generate(
        &self,
        system_prompt: &str,
        messages: &[PromptMessage],
    ) -> crate::Result<String> {
        let request = build_request(system_prompt, messages, None);

        info!("Calling Gemini API");

        let raw = self.call(&request).await?;
        Ok(raw)
    }

    /// Generate an intent label, constrained to the five-value enumeration
    /// via a response schema. Any output outside the enumeration is a
    /// classification error, never coerced.
    pub async fn generate_intent(
        &self,
        system_prompt: &str,
        messages: &[PromptMessage],
    ) -> crate::Result<Intent> {
        let request = build_request(system_prompt, messages, Some(intent_response_schema()));

        info!("Calling Gemini API for intent classification");

        let raw = self.call(&request).await.map_err(|e| {
            RouterError::ClassificationError(format!("classification call failed: {}", e))
        })?;

        parse_intent_response(&raw)
    }

    async fn call(&self, request: &GeminiRequest) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(RouterError::GenerationError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                RouterError::GenerationError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(RouterError::GenerationError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            RouterError::GenerationError(format!("Gemini parse error: {}", e))
        })?;

        if gemini_response.candidates.is_empty() {
            return Err(RouterError::GenerationError(
                "No response from Gemini API".to_string(),
            ));
        }

        let text = gemini_response.candidates[0]
            .content
            .parts
            .first()
            .ok_or_else(|| {
                RouterError::GenerationError("Empty response from Gemini".to_string())
            })?
            .text
            .clone();

        Ok(text)
    }
}

fn build_request(
    system_prompt: &str,
    messages: &[PromptMessage],
    response_schema: Option<Value>,
) -> GeminiRequest {
    let mut contents: Vec<Content> = messages
        .iter()
        .map(|m| Content {
            role: role_str(m.role).to_string(),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    // The API rejects an empty contents list
    if contents.is_empty() {
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: "Proceed with the task described above.".to_string(),
            }],
        });
    }

    let structured = response_schema.is_some();

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            // Classification must be deterministic; free text follows the
            // usual conversational temperature.
            temperature: if structured { 0.0 } else { 0.3 },
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type: structured.then(|| "application/json".to_string()),
            response_schema,
        },
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: system_prompt.to_string(),
            }],
        },
    }
}

fn role_str(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "model",
        // Gemini has no system role inside contents; system text lives in
        // system_instruction, stray system turns degrade to user.
        TurnRole::System => "user",
    }
}

/// Response schema constraining output to the intent enumeration
fn intent_response_schema() -> Value {
    let labels: Vec<&str> = Intent::ALL.iter().map(|i| i.as_str()).collect();

    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "intent": {
                "type": "STRING",
                "enum": labels
            }
        },
        "required": ["intent"]
    })
}

#[derive(Debug, Deserialize)]
struct IntentEnvelope {
    intent: Intent,
}

/// Parse the structured classification payload. Markdown fences are
/// stripped defensively before parsing.
fn parse_intent_response(raw: &str) -> crate::Result<Intent> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let envelope: IntentEnvelope = serde_json::from_str(cleaned).map_err(|e| {
        RouterError::ClassificationError(format!(
            "intent outside enumeration or unparseable: {} | raw={}",
            e, raw
        ))
    })?;

    Ok(envelope.intent)
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromptMessage;

    #[test]
    fn test_request_serialization() {
        let messages = vec![PromptMessage::user("Summarize this for me")];
        let request = build_request("You are a file assistant", &messages, None);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Summarize this for me"));
        assert!(json.contains("You are a file assistant"));
        assert!(!json.contains("response_schema"));
    }

    #[test]
    fn test_structured_request_carries_schema() {
        let messages = vec![PromptMessage::user("User query: 'hello'")];
        let request = build_request("Classify the intent", &messages, Some(intent_response_schema()));

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("application/json"));
        assert!(json.contains("code_explain"));
        assert!(json.contains("ambiguous"));
    }

    #[test]
    fn test_empty_messages_get_placeholder_content() {
        let request = build_request("Do the task", &[], None);
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].role, "user");
    }

    #[test]
    fn test_parse_intent_response() {
        let intent = parse_intent_response(r#"{"intent": "summarize"}"#).unwrap();
        assert_eq!(intent, Intent::Summarize);

        let fenced = parse_intent_response("```json\n{\"intent\": \"sentiment\"}\n```").unwrap();
        assert_eq!(fenced, Intent::Sentiment);
    }

    #[test]
    fn test_parse_intent_rejects_unknown_label() {
        let result = parse_intent_response(r#"{"intent": "translate"}"#);
        assert!(matches!(
            result,
            Err(RouterError::ClassificationError(_))
        ));
    }
}
