use std::time::Duration;
use serde::{Serialize, Deserialize};
use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::{Client, header};
use log::{debug, error};
use url::Url;

use crate::app_config::ProviderConfig;
use crate::credentials::CredentialLease;
use crate::errors::ProviderError;
use crate::providers::CompletionProvider;

/// Gemini client for the Generative Language API
#[derive(Debug)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// Base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`
    endpoint: Url,
    /// Model name
    model: String,
    /// Sampling settings sent with every request
    generation_config: GenerationConfig,
}

/// generateContent request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    /// The conversation turns
    contents: Vec<GeminiContent>,

    /// Generation settings
    generation_config: GenerationConfig,

    /// Safety thresholds
    safety_settings: Vec<SafetySetting>,
}

/// One conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    /// Role of the sender (user, model)
    #[serde(default)]
    pub role: String,

    /// Content parts
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// Text part of a turn
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: String,
}

/// Sampling settings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: String,
}

/// Safety threshold for one harm category
#[derive(Debug, Serialize)]
pub struct SafetySetting {
    category: String,
    threshold: String,
}

/// generateContent response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// One generated candidate
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Feedback about the prompt itself
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Finish reasons that mean the content was refused
const BLOCKED_FINISH_REASONS: [&str; 4] = ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

impl GeminiRequest {
    /// Create a single-turn request
    pub fn new(prompt: impl Into<String>, generation_config: GenerationConfig) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: prompt.into() }],
            }],
            generation_config,
            // Subtitles routinely contain violence and profanity
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: "BLOCK_NONE".to_string(),
                })
                .collect(),
        }
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .with_context(|| format!("Invalid provider endpoint: {}", config.endpoint))?;
        let client = Client::builder()
            .timeout(config.request_timeout() + Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: "text/plain".to_string(),
            },
        })
    }

    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint.as_str().trim_end_matches('/'), self.model)
    }

    /// Map a non-success HTTP response to a provider error
    fn classify_failure(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
        if body.contains("API_KEY_INVALID") {
            return ProviderError::Authentication(body.to_string());
        }
        match ProviderError::from_status(status, body) {
            ProviderError::RateLimited { message, .. } => ProviderError::RateLimited { message, retry_after },
            other => other,
        }
    }

    /// Extract text from a Gemini response
    pub fn extract_text_from_response(response: &GeminiResponse) -> Result<String, ProviderError> {
        if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            return Err(ProviderError::Permanent(format!("prompt blocked: {}", reason)));
        }

        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| ProviderError::Transient("response has no candidates".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKED_FINISH_REASONS.contains(&reason) {
                return Err(ProviderError::Permanent(format!("response blocked: {}", reason)));
            }
        }

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .map(|p| p.text.as_str())
            .collect();
        Ok(text)
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionProvider for Gemini {
    async fn complete(&self, credential: &CredentialLease, prompt: &str) -> Result<String, ProviderError> {
        let request = GeminiRequest::new(prompt, self.generation_config.clone());

        let response = self
            .client
            .post(self.api_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", credential.secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to send request to Gemini API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}) with credential {}", status, credential.label());
            debug!("Gemini error body: {}", error_text);
            return Err(Self::classify_failure(status.as_u16(), retry_after, &error_text));
        }

        let gemini_response = response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to parse Gemini API response: {}", e)))?;

        Self::extract_text_from_response(&gemini_response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
