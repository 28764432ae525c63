//! Gemini (Google) image generation and editing.

use crate::error::{
    extract_error_message, parse_retry_after, sanitize_error_message, Result, TimeLensError,
};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.5 Flash Image (fast, economical).
    #[default]
    Flash,
    /// Gemini 3 Pro Image (highest quality).
    Pro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash => "gemini-2.5-flash-image",
            Self::Pro => "gemini-3-pro-image-preview",
        }
    }
}

impl std::str::FromStr for GeminiModel {
    type Err = TimeLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "flash" | "gemini-2.5-flash-image" => Ok(Self::Flash),
            "pro" | "gemini-3-pro-image-preview" => Ok(Self::Pro),
            other => Err(TimeLensError::Config(format!("unknown Gemini model: {other}"))),
        }
    }
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    client: Option<reqwest::Client>,
    timeout: Option<Duration>,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Reuses an existing HTTP client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets a per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or(TimeLensError::MissingCredential)?;

        Ok(GeminiProvider {
            client: self.client.unwrap_or_default(),
            api_key,
            model: self.model,
            timeout: self.timeout,
        })
    }
}

/// Gemini image generation provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    timeout: Option<Duration>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn generate_impl(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let start = Instant::now();
        let url = format!("{}/{}:generateContent", API_BASE, self.model.as_str());
        let body = GeminiRequest::from_generation_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            edit = request.is_edit(),
            "submitting Gemini image request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let inline_data = gemini_response.into_image()?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&inline_data.data)
            .map_err(|e| TimeLensError::Decode(e.to_string()))?;
        let format = ImageFormat::from_mime_type(&inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(duration_ms, bytes = data.len(), "Gemini image request complete");

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::Gemini,
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
                revised_prompt: None,
            },
        ))
    }

    fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> TimeLensError {
        let message =
            sanitize_error_message(&extract_error_message(text).unwrap_or_else(|| text.to_string()));
        if status == 402 {
            return TimeLensError::Billing(message);
        }
        if status == 404 {
            return TimeLensError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            );
        }
        if status == 429 {
            if let Some(retry) = parse_retry_after(headers) {
                return TimeLensError::RateLimited {
                    retry_after: Some(Duration::from_secs(retry)),
                    message,
                };
            }
            // Quota exhaustion carries no retry hint; keep the service's wording.
            return TimeLensError::Api { status, message };
        }
        if status == 401 || status == 403 {
            return TimeLensError::Auth(message);
        }
        if status == 400 && message.to_lowercase().contains("api key") {
            return TimeLensError::Auth(message);
        }
        let lower = message.to_lowercase();
        if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
            return TimeLensError::ContentBlocked(message);
        }
        TimeLensError::Api { status, message }
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        self.generate_impl(request).await
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Gemini
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/{}", API_BASE, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            400 | 401 | 403 => Err(TimeLensError::Auth("Invalid API key".into())),
            404 => Err(TimeLensError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(TimeLensError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl GeminiRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        let mut parts = Vec::new();

        // The image to edit goes first, the instruction after it.
        if let Some(ref image_data) = req.input_image {
            let mime_type = ImageFormat::from_magic_bytes(image_data)
                .unwrap_or_default()
                .mime_type()
                .to_string();
            parts.push(GeminiRequestPart::InlineData {
                inline_data: InlineData {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(image_data),
                },
            });
        }

        parts.push(GeminiRequestPart::Text {
            text: req.prompt.clone(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
                seed: req.seed,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GeminiResponse {
    /// Pulls the first inline image out of a successful response.
    fn into_image(self) -> Result<InlineData> {
        // Prompt blocks arrive as HTTP 200.
        if let Some(reason) = self.prompt_feedback.and_then(|f| {
            f.block_reason
                .map(|r| f.block_reason_message.unwrap_or_else(|| format!("Prompt blocked: {r}")))
        }) {
            return Err(TimeLensError::ContentBlocked(reason));
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            TimeLensError::UnexpectedResponse("No candidates in Gemini response".into())
        })?;

        match candidate.finish_reason.as_deref() {
            Some(
                reason @ ("SAFETY" | "IMAGE_SAFETY" | "IMAGE_PROHIBITED_CONTENT" | "RECITATION"
                | "IMAGE_RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST"),
            ) => {
                return Err(TimeLensError::ContentBlocked(format!(
                    "Content blocked by Gemini safety filter: {reason}"
                )));
            }
            Some(reason @ ("IMAGE_OTHER" | "NO_IMAGE")) => {
                return Err(TimeLensError::UnexpectedResponse(format!(
                    "Generation failed: {reason}. Try a different prompt."
                )));
            }
            _ => {}
        }

        candidate
            .content
            .into_iter()
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .ok_or_else(|| {
                TimeLensError::UnexpectedResponse("No image data in Gemini response".into())
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}
