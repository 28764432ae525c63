//! Core types shared by the image providers.

use crate::era::Era;
use crate::error::{Result, TimeLensError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Parses a MIME type as reported by a provider.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Which backend produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    /// Google Gemini image models.
    #[default]
    Gemini,
    /// OpenAI image models (gpt-image-1).
    OpenAI,
}

impl ImageProviderKind {
    /// Environment variable conventionally holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }

    /// Key under which this provider's credential is stored.
    pub fn credential_key(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini_api_key",
            Self::OpenAI => "openai_api_key",
        }
    }
}

impl std::fmt::Display for ImageProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for ImageProviderKind {
    type Err = TimeLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            other => Err(TimeLensError::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Prompt as rewritten by the service, if it reports one.
    pub revised_prompt: Option<String>,
}

/// A request to generate or edit an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt or edit instruction.
    pub prompt: String,
    /// Seed for deterministic generation, where supported.
    pub seed: Option<u64>,
    /// Image to edit (raw bytes).
    #[serde(skip)]
    pub input_image: Option<Vec<u8>>,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seed: None,
            input_image: None,
        }
    }

    /// Sets the seed for deterministic generation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets an input image, turning the request into an edit.
    pub fn with_input_image(mut self, image: Vec<u8>) -> Self {
        self.input_image = Some(image);
        self
    }

    /// Returns true if this is an image editing request.
    pub fn is_edit(&self) -> bool {
        self.input_image.is_some()
    }
}

/// A generated image with its data and metadata.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "generated image should be displayed or saved"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Provider that generated this image.
    pub provider: ImageProviderKind,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(
        data: Vec<u8>,
        format: ImageFormat,
        provider: ImageProviderKind,
        metadata: GenerationMetadata,
    ) -> Self {
        Self {
            data,
            format,
            provider,
            metadata,
        }
    }

    /// Creates a new generated image, detecting format from magic bytes.
    pub fn from_bytes(
        data: Vec<u8>,
        provider: ImageProviderKind,
        metadata: GenerationMetadata,
    ) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| TimeLensError::Decode("Unknown image format".into()))?;
        Ok(Self::new(data, format, provider, metadata))
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// File name a download of this image gets when shown for `era`.
    pub fn download_file_name(&self, era: &Era) -> String {
        format!("scene-{}.{}", era.year, self.format.extension())
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Saves the image into `dir` under its download name for `era`.
    pub fn save_for_era(&self, dir: impl AsRef<Path>, era: &Era) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.download_file_name(era));
        self.save(&path)?;
        Ok(path)
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            self.to_base64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::era::ERAS;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
    }

    #[test]
    fn test_format_from_mime_type() {
        assert_eq!(
            ImageFormat::from_mime_type("image/JPEG"),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_mime_type("text/plain"), None);
    }

    #[test]
    fn test_provider_kind_round_trip() {
        assert_eq!(ImageProviderKind::Gemini.to_string(), "gemini");
        assert_eq!(
            "OpenAI".parse::<ImageProviderKind>().unwrap(),
            ImageProviderKind::OpenAI
        );
        assert!("flux".parse::<ImageProviderKind>().is_err());
        assert_eq!(ImageProviderKind::Gemini.credential_key(), "gemini_api_key");
    }

    #[test]
    fn test_download_file_name_uses_era_year() {
        let image = GeneratedImage::new(
            JPEG_MAGIC.to_vec(),
            ImageFormat::Jpeg,
            ImageProviderKind::Gemini,
            GenerationMetadata::default(),
        );
        assert_eq!(image.download_file_name(&ERAS[0]), "scene-1900.jpg");
        assert_eq!(image.download_file_name(&ERAS[5]), "scene-2050.jpg");
    }

    #[test]
    fn test_from_bytes_rejects_unknown_data() {
        let result = GeneratedImage::from_bytes(
            vec![0; 16],
            ImageProviderKind::Gemini,
            GenerationMetadata::default(),
        );
        assert!(matches!(result, Err(TimeLensError::Decode(_))));
    }

    #[test]
    fn test_save_for_era() {
        let dir = tempfile::tempdir().unwrap();
        let image = GeneratedImage::from_bytes(
            PNG_MAGIC.to_vec(),
            ImageProviderKind::Gemini,
            GenerationMetadata::default(),
        )
        .unwrap();
        let path = image.save_for_era(dir.path().join("out"), &ERAS[3]).unwrap();
        assert_eq!(path.file_name().unwrap(), "scene-1950.png");
        assert_eq!(std::fs::read(path).unwrap(), PNG_MAGIC.to_vec());
    }

    #[test]
    fn test_data_url() {
        let image = GeneratedImage::new(
            vec![1, 2, 3],
            ImageFormat::Png,
            ImageProviderKind::Gemini,
            GenerationMetadata::default(),
        );
        assert_eq!(image.to_data_url(), "data:image/png;base64,AQID");
    }
}
