#![warn(missing_docs)]
//! TimeLens - render one street scene across a century of eras.
//!
//! A scene is first rendered in the present day from a text prompt. That
//! render becomes the base image, and every other era is produced by asking
//! the image service to edit the base, so the composition stays the same
//! while vehicles, clothing and architecture change.
//!
//! # Quick Start
//!
//! ```no_run
//! use timelens::{ImageProviderKind, ProviderService, SceneOrchestrator, TracingNotifier};
//!
//! #[tokio::main]
//! async fn main() -> timelens::Result<()> {
//!     let service = ProviderService::new(ImageProviderKind::Gemini);
//!     let session = SceneOrchestrator::new(service, TracingNotifier);
//!     session.set_credential("your-api-key");
//!
//!     session.set_prompt("A busy city street with shops and pedestrians");
//!     let _ = session.generate().await;
//!     let _ = session.change_era(0).await;
//!     session.download(".")?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini image models (Google)
//! - `openai`: gpt-image models (OpenAI)
//! - `cli`: the `timelens` command-line interface

pub mod config;
pub mod credential;
pub mod era;
mod error;
pub mod image;
pub mod notify;
pub mod orchestrator;
pub mod service;
pub mod session;

pub use config::Settings;
pub use credential::{
    Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    GEMINI_CREDENTIAL_KEY,
};
pub use era::{Era, ERAS, EXAMPLE_PROMPTS, MODERN_ERA_INDEX};
pub use error::{ErrorKind, Result, TimeLensError, GENERIC_FAILURE_MESSAGE};
pub use image::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProvider,
    ImageProviderKind,
};
pub use notify::{ChannelNotifier, Notification, Notifier, Severity, TracingNotifier};
pub use orchestrator::{GenerationOutcome, SceneOrchestrator, SkipReason};
pub use service::{ImageService, ProviderService};
pub use session::{Phase, SessionState};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder};

#[cfg(feature = "openai")]
pub use image::providers::{OpenAiImageModel, OpenAiImageProvider, OpenAiImageProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, TimeLensError};
    pub use crate::era::{Era, ERAS};
    pub use crate::image::{GeneratedImage, ImageProvider};
    pub use crate::notify::{Notification, Notifier};
    pub use crate::orchestrator::{GenerationOutcome, SceneOrchestrator};
    pub use crate::service::{ImageService, ProviderService};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiProvider;

    #[cfg(feature = "openai")]
    pub use crate::image::providers::OpenAiImageProvider;
}
