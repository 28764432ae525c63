//! OpenAI image generation provider (gpt-image-1).

use crate::error::{
    extract_error_message, parse_retry_after, sanitize_error_message, Result, TimeLensError,
};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProviderKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const GENERATIONS_URL: &str = "https://api.openai.com/v1/images/generations";
const EDITS_URL: &str = "https://api.openai.com/v1/images/edits";
const MODELS_URL: &str = "https://api.openai.com/v1/models";

/// Scenes are rendered landscape, like a street photograph.
const SCENE_SIZE: &str = "1536x1024";

/// OpenAI image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenAiImageModel {
    /// GPT Image 1.
    #[default]
    GptImage1,
    /// GPT Image 1 Mini (cheaper, lower fidelity).
    GptImage1Mini,
}

impl OpenAiImageModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GptImage1 => "gpt-image-1",
            Self::GptImage1Mini => "gpt-image-1-mini",
        }
    }
}

impl std::str::FromStr for OpenAiImageModel {
    type Err = TimeLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "gpt-image-1" => Ok(Self::GptImage1),
            "gpt-image-1-mini" | "mini" => Ok(Self::GptImage1Mini),
            other => Err(TimeLensError::Config(format!("unknown OpenAI model: {other}"))),
        }
    }
}

/// Builder for OpenAiImageProvider.
#[derive(Debug, Clone, Default)]
pub struct OpenAiImageProviderBuilder {
    api_key: Option<String>,
    model: OpenAiImageModel,
    quality: Option<String>,
    client: Option<reqwest::Client>,
    timeout: Option<Duration>,
}

impl OpenAiImageProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `OPENAI_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the OpenAI image model variant.
    pub fn model(mut self, model: OpenAiImageModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the quality: "low", "medium", "high" (default: "auto").
    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
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
    pub fn build(self) -> Result<OpenAiImageProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or(TimeLensError::MissingCredential)?;

        Ok(OpenAiImageProvider {
            client: self.client.unwrap_or_default(),
            api_key,
            model: self.model,
            quality: self.quality,
            timeout: self.timeout,
        })
    }
}

/// OpenAI image generation provider.
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    api_key: String,
    model: OpenAiImageModel,
    quality: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAiImageProvider {
    /// Creates a new `OpenAiImageProviderBuilder`.
    pub fn builder() -> OpenAiImageProviderBuilder {
        OpenAiImageProviderBuilder::new()
    }

    fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> TimeLensError {
        let message =
            sanitize_error_message(&extract_error_message(text).unwrap_or_else(|| text.to_string()));
        if status == 402 {
            return TimeLensError::Billing(message);
        }
        if status == 413 {
            return TimeLensError::InvalidRequest(
                "Image too large. Reduce image size and try again.".into(),
            );
        }
        if status == 429 {
            // insufficient_quota is not transient, unlike a plain rate limit
            if text.contains("insufficient_quota") || message.contains("exceeded your current quota") {
                return TimeLensError::Billing(message);
            }
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return TimeLensError::RateLimited {
                retry_after,
                message,
            };
        }
        if status == 401 || status == 403 {
            return TimeLensError::Auth(message);
        }
        let lower = message.to_lowercase();
        if lower.contains("safety") || lower.contains("blocked") || lower.contains("content_policy")
        {
            return TimeLensError::ContentBlocked(message);
        }
        TimeLensError::Api { status, message }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, start: Instant) -> Result<GeneratedImage> {
        let mut builder = builder.bearer_auth(&self.api_key);
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

        let openai_response: OpenAiImageResponse = response.json().await?;
        let image_data = openai_response.data.into_iter().next().ok_or_else(|| {
            TimeLensError::UnexpectedResponse("No images in OpenAI response".into())
        })?;

        let data = match (image_data.b64_json, image_data.url) {
            (Some(b64), _) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(&b64)
                    .map_err(|e| TimeLensError::Decode(e.to_string()))?
            }
            (None, Some(url)) => {
                let img_response = self.client.get(&url).send().await?;
                if !img_response.status().is_success() {
                    return Err(TimeLensError::Api {
                        status: img_response.status().as_u16(),
                        message: "Failed to download image from URL".into(),
                    });
                }
                img_response.bytes().await?.to_vec()
            }
            (None, None) => {
                return Err(TimeLensError::UnexpectedResponse(
                    "OpenAI response contained no image data".into(),
                ));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let format = ImageFormat::from_magic_bytes(&data).unwrap_or_default();
        tracing::debug!(duration_ms, bytes = data.len(), "OpenAI image request complete");

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::OpenAI,
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
                revised_prompt: image_data.revised_prompt,
            },
        ))
    }

    /// Edits the input image via the multipart edits endpoint.
    async fn generate_edit(&self, input_image: &[u8], prompt: &str) -> Result<GeneratedImage> {
        let start = Instant::now();
        let format = ImageFormat::from_magic_bytes(input_image).unwrap_or_default();

        let image_part = reqwest::multipart::Part::bytes(input_image.to_vec())
            .file_name(format!("scene.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|e| TimeLensError::InvalidRequest(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.as_str())
            .text("prompt", prompt.to_string())
            .text("size", SCENE_SIZE)
            .part("image", image_part);
        if let Some(ref quality) = self.quality {
            form = form.text("quality", quality.clone());
        }

        tracing::debug!(model = self.model.as_str(), "submitting OpenAI image edit");
        self.send(self.client.post(EDITS_URL).multipart(form), start)
            .await
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        if let Some(ref input_image) = request.input_image {
            return self.generate_edit(input_image, &request.prompt).await;
        }

        let start = Instant::now();
        let body = OpenAiImageRequest::new(request, &self.model, &self.quality);
        tracing::debug!(model = self.model.as_str(), "submitting OpenAI image generation");
        self.send(self.client.post(GENERATIONS_URL).json(&body), start)
            .await
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::OpenAI
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/{}", MODELS_URL, self.model.as_str()))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(TimeLensError::Auth("Invalid API key".into())),
            s if !(200..300).contains(&s) => Err(TimeLensError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: &'static str,
    prompt: String,
    n: u32,
    size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
}

impl OpenAiImageRequest {
    fn new(req: &GenerationRequest, model: &OpenAiImageModel, quality: &Option<String>) -> Self {
        Self {
            model: model.as_str(),
            prompt: req.prompt.clone(),
            n: 1,
            size: SCENE_SIZE,
            quality: quality.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_as_str() {
        assert_eq!(OpenAiImageModel::GptImage1.as_str(), "gpt-image-1");
        assert_eq!(
            "mini".parse::<OpenAiImageModel>().unwrap(),
            OpenAiImageModel::GptImage1Mini
        );
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = OpenAiImageProviderBuilder::new()
            .api_key("sk-test")
            .quality("high")
            .build()
            .unwrap();
        assert_eq!(provider.model, OpenAiImageModel::GptImage1);
        assert_eq!(provider.quality.as_deref(), Some("high"));
        assert_eq!(provider.kind(), ImageProviderKind::OpenAI);
    }

    #[test]
    fn test_request_serialization() {
        let req = GenerationRequest::new("A sunset");
        let json =
            serde_json::to_value(OpenAiImageRequest::new(&req, &OpenAiImageModel::GptImage1, &None))
                .unwrap();

        assert_eq!(json["prompt"], "A sunset");
        assert_eq!(json["model"], "gpt-image-1");
        assert_eq!(json["n"], 1);
        assert_eq!(json["size"], "1536x1024");
        assert!(json.get("quality").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"data": [{"b64_json": "AQID", "revised_prompt": "A sunset over the sea"}]}"#;
        let resp: OpenAiImageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].b64_json.as_deref(), Some("AQID"));
        assert!(resp.data[0].url.is_none());
        assert!(resp.data[0].revised_prompt.is_some());
    }

    #[test]
    fn test_parse_error_quota_is_billing() {
        let headers = reqwest::header::HeaderMap::new();
        let body = r#"{"error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}}"#;
        let err = OpenAiImageProvider::parse_error(429, body, &headers);
        assert!(matches!(err, TimeLensError::Billing(ref m) if m == "You exceeded your current quota"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_error_plain_rate_limit_is_retryable() {
        let headers = reqwest::header::HeaderMap::new();
        let err = OpenAiImageProvider::parse_error(429, "slow down", &headers);
        assert!(err.is_retryable());
        assert_eq!(err.notification_message(), "slow down");
    }

    #[test]
    fn test_parse_error_rate_limit_keeps_service_message() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        let body = r#"{"error": {"message": "Rate limit reached for gpt-image-1 on images per minute", "type": "requests"}}"#;
        let err = OpenAiImageProvider::parse_error(429, body, &headers);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));

        let notification = crate::notify::Notification::failed(&err);
        assert_eq!(notification.title, "Generation Failed");
        assert_eq!(
            notification.description,
            "Rate limit reached for gpt-image-1 on images per minute"
        );
    }

    #[test]
    fn test_parse_error_content_policy() {
        let headers = reqwest::header::HeaderMap::new();
        let body = r#"{"error": {"message": "Rejected by content_policy", "code": "content_policy_violation"}}"#;
        assert!(matches!(
            OpenAiImageProvider::parse_error(400, body, &headers),
            TimeLensError::ContentBlocked(_)
        ));
    }
}
