//! The two-operation image service the orchestrator talks to.

use crate::credential::Credential;
use crate::error::Result;
#[cfg(not(all(feature = "gemini", feature = "openai")))]
use crate::error::TimeLensError;
use crate::image::{GeneratedImage, GenerationRequest, ImageProvider, ImageProviderKind};
use async_trait::async_trait;
use std::time::Duration;

/// A remote image service: text-to-image and image editing.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Renders `prompt` from scratch.
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<GeneratedImage>;

    /// Applies `instruction` to `base`.
    async fn edit(
        &self,
        base: &GeneratedImage,
        instruction: &str,
        credential: &Credential,
    ) -> Result<GeneratedImage>;
}

#[async_trait]
impl<T: ImageService + ?Sized> ImageService for std::sync::Arc<T> {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<GeneratedImage> {
        (**self).generate(prompt, credential).await
    }

    async fn edit(
        &self,
        base: &GeneratedImage,
        instruction: &str,
        credential: &Credential,
    ) -> Result<GeneratedImage> {
        (**self).edit(base, instruction, credential).await
    }
}

/// [`ImageService`] backed by one of the built-in providers.
///
/// A provider is built per call so the session's current credential is used;
/// the HTTP connection pool is shared across calls.
#[derive(Debug, Clone)]
pub struct ProviderService {
    kind: ImageProviderKind,
    model: Option<String>,
    quality: Option<String>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl ProviderService {
    /// Creates a service for `kind` using its default model.
    pub fn new(kind: ImageProviderKind) -> Self {
        Self {
            kind,
            model: None,
            quality: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Selects a provider-specific model by name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the render quality; ignored by providers without a quality knob.
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Sets the HTTP-level timeout for each call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The backend this service calls.
    pub fn kind(&self) -> ImageProviderKind {
        self.kind
    }

    /// Builds a provider authenticated with `credential`.
    pub fn provider(&self, credential: &Credential) -> Result<Box<dyn ImageProvider>> {
        match self.kind {
            #[cfg(feature = "gemini")]
            ImageProviderKind::Gemini => {
                let mut builder = crate::image::providers::GeminiProvider::builder()
                    .api_key(credential.expose())
                    .client(self.client.clone());
                if let Some(ref model) = self.model {
                    builder = builder.model(model.parse()?);
                }
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                Ok(Box::new(builder.build()?))
            }
            #[cfg(feature = "openai")]
            ImageProviderKind::OpenAI => {
                let mut builder = crate::image::providers::OpenAiImageProvider::builder()
                    .api_key(credential.expose())
                    .client(self.client.clone());
                if let Some(ref model) = self.model {
                    builder = builder.model(model.parse()?);
                }
                if let Some(ref quality) = self.quality {
                    builder = builder.quality(quality);
                }
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                Ok(Box::new(builder.build()?))
            }
            #[cfg(not(all(feature = "gemini", feature = "openai")))]
            other => {
                let _ = credential;
                Err(TimeLensError::Config(format!(
                    "provider not enabled in this build: {other}"
                )))
            }
        }
    }
}

#[async_trait]
impl ImageService for ProviderService {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<GeneratedImage> {
        let provider = self.provider(credential)?;
        provider.generate(&GenerationRequest::new(prompt)).await
    }

    async fn edit(
        &self,
        base: &GeneratedImage,
        instruction: &str,
        credential: &Credential,
    ) -> Result<GeneratedImage> {
        let provider = self.provider(credential)?;
        provider.edit(base, instruction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "gemini")]
    #[test]
    fn test_builds_gemini_provider_with_session_key() {
        let service = ProviderService::new(ImageProviderKind::Gemini).with_model("flash");
        let provider = service
            .provider(&Credential::new("session-key").unwrap())
            .unwrap();
        assert_eq!(provider.kind(), ImageProviderKind::Gemini);
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_builds_openai_provider() {
        let service = ProviderService::new(ImageProviderKind::OpenAI)
            .with_quality("high")
            .with_timeout(Duration::from_secs(10));
        assert_eq!(service.quality.as_deref(), Some("high"));
        let provider = service.provider(&Credential::new("sk-test").unwrap()).unwrap();
        assert_eq!(provider.name(), "OpenAI (gpt-image)");
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn test_unknown_model_is_config_error() {
        let service = ProviderService::new(ImageProviderKind::Gemini).with_model("dall-e-3");
        assert!(matches!(
            service.provider(&Credential::new("k").unwrap()),
            Err(crate::error::TimeLensError::Config(_))
        ));
    }
}
