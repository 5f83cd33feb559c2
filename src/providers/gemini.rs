/*!
 * Google Gemini backend.
 *
 * Thin client over the `models/{model}:generateContent` REST call. Only the
 * first candidate's text parts are used.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::key_rotation::Credential;
use super::TranslationBackend;

/// Gemini client
#[derive(Debug, Clone)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`
    endpoint: String,
    /// Model name
    model: String,
    /// Sampling temperature
    temperature: f32,
    /// Client-side request timeout
    timeout_secs: u64,
}

/// generateContent request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// generateContent response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
    pub finish_reason: Option<String>,
}

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

impl GeminiRequest {
    /// Build a request for one prompt; the output budget grows with the prompt
    pub fn new(prompt: &str, temperature: f32) -> Self {
        let max_output_tokens = (prompt.chars().count() as u32 * 3 + 200).min(8192);
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
                top_p: 0.8,
                top_k: 30,
            },
            // Comic dialogue routinely trips default filters
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting { category: *category, threshold: "BLOCK_NONE" })
                .collect(),
        }
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, temperature: f32, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
            timeout_secs,
        }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    /// Extract text from the first candidate
    pub fn extract_text(response: &GeminiResponse) -> Result<String, ProviderError> {
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| ProviderError::ParseError("No candidates in response".to_string()))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "Response blocked by safety filters".to_string(),
            });
        }

        let text: String = candidate
            .content
            .as_ref()
            .map(|content| content.parts.iter().map(|part| part.text.as_str()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::ParseError("Candidate holds no text".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl TranslationBackend for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn call(&self, credential: Option<&Credential>, prompt: &str) -> Result<String, ProviderError> {
        let credential = credential.ok_or(ProviderError::NoCredential)?;

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &credential.key_secret)
            .json(&GeminiRequest::new(prompt, self.temperature))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    ProviderError::ConnectionError(e.to_string())
                } else {
                    ProviderError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text);
            if error_text.contains("RESOURCE_EXHAUSTED") && error_text.to_lowercase().contains("quota") {
                return Err(ProviderError::QuotaExceeded(error_text));
            }
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let gemini_response = response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Self::extract_text(&gemini_response)
    }
}
