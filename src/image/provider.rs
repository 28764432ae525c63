//! Image provider trait.

use crate::error::Result;
use crate::image::types::{GeneratedImage, GenerationRequest, ImageProviderKind};
use async_trait::async_trait;

/// Trait for image generation providers.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates an image from the given request.
    ///
    /// Requests carrying an input image are edits of that image.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;

    /// Edits `base` according to `instruction`.
    async fn edit(&self, base: &GeneratedImage, instruction: &str) -> Result<GeneratedImage> {
        let request = GenerationRequest::new(instruction).with_input_image(base.data.clone());
        self.generate(&request).await
    }

    /// Returns the kind of this provider.
    fn kind(&self) -> ImageProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        match self.kind() {
            ImageProviderKind::Gemini => "Gemini (Google)",
            ImageProviderKind::OpenAI => "OpenAI (gpt-image)",
        }
    }

    /// Checks if the provider is reachable and the key is accepted.
    async fn health_check(&self) -> Result<()>;
}
