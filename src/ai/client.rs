//! Gemini client.
//!
//! One prompt in, one text response out over the `generateContent` REST API.
//! No streaming, no retry; callers treat any failure as a request failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("request to the model failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model returned an empty response")]
    EmptyResponse,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
        }
    }

    /// Build a client from `GOOGLE_API_KEY` and `GEMINI_MODEL`.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model)
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        )
    }

    /// Send one prompt and return the concatenated candidate text.
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![ContentPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                // Thinking is disabled; extraction wants the contract JSON only.
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let response = self.client.post(self.api_url()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let payload: GenerateContentResponse = response.json().await?;
        payload.text().ok_or(AiError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "thinkingConfig")]
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    thinking_budget: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}
