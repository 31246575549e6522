// Google Gemini adapter (Generative Language API)
// API Reference: https://ai.google.dev/api/generate-content
//
// Gemini has no "system" or "assistant" roles in `contents`: system text goes
// into `systemInstruction` and assistant turns are sent with role "model".

use crate::llm::provider::LLMAdapter;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Finish reasons that mean the answer was withheld rather than finished.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

// Request types for the Gemini API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// Response types for the Gemini API
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, GOOGLE_API_BASE)
    }

    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, model)
    }

    fn build_request(request: &LLMRequest) -> GenerateContentRequest {
        let mut system_parts: Vec<GeminiPart> = request
            .system_instruction
            .iter()
            .map(|text| GeminiPart {
                text: Some(text.clone()),
            })
            .collect();

        let mut contents = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            let part = GeminiPart {
                text: Some(message.content.clone()),
            };
            match message.role.as_str() {
                "system" => system_parts.push(part),
                "assistant" | "model" => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts: vec![part],
                }),
                _ => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![part],
                }),
            }
        }

        let generation_config = (request.max_tokens.is_some() || request.temperature.is_some())
            .then(|| GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            });

        GenerateContentRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system_parts,
            }),
            generation_config,
        }
    }

    fn into_llm_response(response: GenerateContentResponse) -> LLMResponse {
        let usage = response.usage_metadata.unwrap_or_default();
        let usage = TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        };

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return LLMResponse {
                content: String::new(),
                finish_reason: "BLOCKED".to_string(),
                block_reason: Some(reason),
                usage,
            };
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            return LLMResponse {
                content: String::new(),
                finish_reason: "NO_CANDIDATES".to_string(),
                block_reason: None,
                usage,
            };
        };

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let finish_reason = candidate.finish_reason.unwrap_or_else(|| "STOP".to_string());
        let block_reason = BLOCKING_FINISH_REASONS
            .contains(&finish_reason.as_str())
            .then(|| finish_reason.clone());

        LLMResponse {
            content,
            finish_reason,
            block_reason,
            usage,
        }
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = self.endpoint(&request.model);
        let body = Self::build_request(request);
        debug!(model = %request.model, messages = request.messages.len(), "Gemini generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<GoogleErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Gemini API error ({}): {} (status: {})",
                    status,
                    error_response.error.message,
                    error_response.error.status.unwrap_or_default()
                )));
            }

            return Err(AppError::LLMApi(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        Ok(Self::into_llm_response(gemini_response))
    }
}
