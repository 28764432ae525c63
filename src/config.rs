//! Settings: config file, then environment, then command-line overrides.

use crate::error::{Result, TimeLensError};
use crate::image::ImageProviderKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "timelens";
const CONFIG_FILE: &str = "config.toml";

/// Default upper bound on a single image service call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Which image service to call.
    pub provider: ImageProviderKind,
    /// Provider-specific model name; `None` uses the provider default.
    pub model: Option<String>,
    /// Render quality for providers that support it (`low`, `medium`, `high`).
    pub quality: Option<String>,
    /// Upper bound on a single service call.
    pub request_timeout: Duration,
    /// Where downloads are written.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ImageProviderKind::Gemini,
            model: None,
            quality: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    provider: Option<String>,
    model: Option<String>,
    quality: Option<String>,
    request_timeout_secs: Option<u64>,
    output_dir: Option<PathBuf>,
}

/// Directory holding the config and credential files.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

impl Settings {
    /// Loads settings from the default config file and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();
        if let Some(dir) = config_dir() {
            settings.apply_file(&dir.join(CONFIG_FILE))?;
        }
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Overlays values from the TOML file at `path`, if it exists.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(());
        }
        let file: FileSettings = toml::from_str(&content).map_err(|e| {
            TimeLensError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        if let Some(provider) = file.provider {
            self.provider = provider.parse()?;
        }
        if file.model.is_some() {
            self.model = file.model;
        }
        if file.quality.is_some() {
            self.quality = file.quality;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = timeout_from_secs(secs)?;
        }
        if let Some(dir) = file.output_dir {
            self.output_dir = dir;
        }
        Ok(())
    }

    /// Overlays `TIMELENS_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("TIMELENS_PROVIDER") {
            self.provider = v.parse()?;
        }
        if let Some(v) = lookup("TIMELENS_MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = lookup("TIMELENS_QUALITY") {
            self.quality = Some(v);
        }
        if let Some(v) = lookup("TIMELENS_TIMEOUT_SECS") {
            let secs = v.trim().parse().map_err(|_| {
                TimeLensError::Config(format!("TIMELENS_TIMEOUT_SECS is not a number: {v}"))
            })?;
            self.request_timeout = timeout_from_secs(secs)?;
        }
        if let Some(v) = lookup("TIMELENS_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

fn timeout_from_secs(secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(TimeLensError::Config(
            "request timeout must be at least one second".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider, ImageProviderKind::Gemini);
        assert_eq!(settings.request_timeout, Duration::from_secs(120));
        assert!(settings.model.is_none());
    }

    #[test]
    fn test_missing_and_empty_file_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.apply_file(&dir.path().join("absent.toml")).unwrap();

        let empty = dir.path().join(CONFIG_FILE);
        fs::write(&empty, "\n").unwrap();
        settings.apply_file(&empty).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_values_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "provider = \"openai\"\nmodel = \"gpt-image-1\"\nquality = \"high\"\nrequest_timeout_secs = 30\noutput_dir = \"scenes\"\n",
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.apply_file(&path).unwrap();
        assert_eq!(settings.provider, ImageProviderKind::OpenAI);
        assert_eq!(settings.model.as_deref(), Some("gpt-image-1"));
        assert_eq!(settings.quality.as_deref(), Some("high"));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.output_dir, PathBuf::from("scenes"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "colour = \"blue\"\n").unwrap();
        let mut settings = Settings::default();
        assert!(matches!(
            settings.apply_file(&path),
            Err(TimeLensError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TIMELENS_PROVIDER", "openai"),
            ("TIMELENS_TIMEOUT_SECS", "45"),
            ("TIMELENS_QUALITY", "low"),
            ("TIMELENS_OUTPUT_DIR", "/tmp/scenes"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.provider, ImageProviderKind::OpenAI);
        assert_eq!(settings.request_timeout, Duration::from_secs(45));
        assert_eq!(settings.quality.as_deref(), Some("low"));
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/scenes"));
    }

    #[test]
    fn test_env_rejects_bad_timeout() {
        let mut settings = Settings::default();
        let result = settings.apply_env(|name| {
            (name == "TIMELENS_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());

        let result =
            settings.apply_env(|name| (name == "TIMELENS_TIMEOUT_SECS").then(|| "0".to_string()));
        assert!(result.is_err());
    }
}
