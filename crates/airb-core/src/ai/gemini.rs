use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{InferenceClient, EMPTY_RESPONSE_FALLBACK};
use crate::config::Settings;
use crate::error::InferenceError;
use crate::prompt::{GeneratedPrompt, PromptPart};

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    timeout: Option<Duration>,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout: settings.request_timeout,
        }
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_request(prompt: &GeneratedPrompt) -> Result<GeminiRequest, InferenceError> {
        let mut parts = Vec::with_capacity(prompt.parts.len());
        for part in &prompt.parts {
            match part {
                PromptPart::Image(image) => {
                    let jpeg = image.to_jpeg().map_err(|e| {
                        InferenceError::Other(format!("failed to encode image: {}", e))
                    })?;
                    parts.push(GeminiPart::Inline {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: BASE64.encode(jpeg),
                        },
                    });
                }
                PromptPart::Text(text) => parts.push(GeminiPart::Text { text: text.clone() }),
            }
        }

        Ok(GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
        })
    }

    async fn round_trip(&self, request: &GeminiRequest) -> Result<String, InferenceError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message: extract_api_error(&payload),
            });
        }

        parse_response(&payload)
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate(&self, prompt: &GeneratedPrompt) -> Result<String, InferenceError> {
        let request = Self::build_request(prompt)?;
        info!(model = %self.model, "calling Gemini");

        let text = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(&request))
                .await
                .map_err(|_| InferenceError::Timeout(limit.as_secs()))??,
            None => self.round_trip(&request).await?,
        };

        debug!(chars = text.chars().count(), "Gemini responded");
        Ok(text)
    }
}

/// Pull the generated text out of a `generateContent` response body.
///
/// A well-formed response without any text is not an error: it yields
/// [`EMPTY_RESPONSE_FALLBACK`].
fn parse_response(payload: &str) -> Result<String, InferenceError> {
    let parsed: GeminiResponse = serde_json::from_str(payload)
        .map_err(|e| InferenceError::Malformed(e.to_string()))?;

    let block_reason = parsed
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        if let Some(reason) = block_reason {
            return Err(InferenceError::Blocked(reason));
        }
        return Ok(EMPTY_RESPONSE_FALLBACK.to_string());
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(InferenceError::Blocked("response stopped for safety".to_string()));
        }
        return Ok(EMPTY_RESPONSE_FALLBACK.to_string());
    }

    Ok(text)
}

fn extract_api_error(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        if let Some(err) = parsed.error {
            let message = err.message.unwrap_or_else(|| "unknown error".to_string());
            return match err.status {
                Some(status) => format!("{} ({})", message, status),
                None => message,
            };
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error body".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}
