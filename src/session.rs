//! State of one scene-editing session.

use crate::credential::Credential;
use crate::era::{Era, MODERN_ERA_INDEX};
use crate::image::GeneratedImage;
use std::sync::Arc;

/// Whether a generation sequence is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in flight.
    Idle,
    /// Waiting on the image service.
    Generating,
}

/// Everything the presentation layer reads.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Scene description as typed.
    pub prompt: String,
    /// Index into [`crate::era::ERAS`].
    pub selected_era: usize,
    /// The unmodified modern render for the current prompt.
    pub base_image: Option<Arc<GeneratedImage>>,
    /// What is currently shown.
    pub displayed_image: Option<Arc<GeneratedImage>>,
    /// Era the displayed image was rendered for.
    pub displayed_era: Option<usize>,
    /// True while a sequence is waiting on the service.
    pub is_generating: bool,
    /// API key, if configured.
    pub credential: Option<Credential>,
    /// Token of the most recently issued request.
    pub request_token: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            selected_era: MODERN_ERA_INDEX,
            base_image: None,
            displayed_image: None,
            displayed_era: None,
            is_generating: false,
            credential: None,
            request_token: 0,
        }
    }
}

impl SessionState {
    /// Current phase of the generation state machine.
    pub fn phase(&self) -> Phase {
        if self.is_generating {
            Phase::Generating
        } else {
            Phase::Idle
        }
    }

    /// The selected era.
    pub fn era(&self) -> &'static Era {
        Era::get(self.selected_era).unwrap_or_else(Era::modern)
    }

    /// True once a credential is configured.
    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// True when the prompt has visible text.
    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// Whether an era change should re-render the scene.
    pub fn can_travel(&self) -> bool {
        self.displayed_image.is_some() && self.has_prompt() && self.base_image.is_some()
    }

    /// Prompt entry and era selection are locked while busy or without a key.
    pub fn controls_disabled(&self) -> bool {
        self.is_generating || !self.has_credential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = SessionState::default();
        assert_eq!(state.selected_era, 4);
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.era().is_modern());
        assert!(!state.can_travel());
        assert!(state.controls_disabled());
    }

    #[test]
    fn test_whitespace_prompt_is_empty() {
        let state = SessionState {
            prompt: " \t ".into(),
            ..Default::default()
        };
        assert!(!state.has_prompt());
    }
}
