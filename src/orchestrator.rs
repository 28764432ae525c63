//! Sequencing of image service calls for one session.
//!
//! The first render of a prompt always happens in the modern era and is kept
//! as the base image. Every other era is an edit of that base, so the scene
//! keeps its composition as it travels through time.
//!
//! Only one sequence is meant to be in flight. `generate` and `regenerate`
//! refuse to start while busy; an era change supersedes whatever is running.
//! Every request carries a token, and a response whose token is no longer the
//! latest is dropped without touching the session.

use crate::credential::{Credential, CredentialStore};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::era::{era_edit_instruction, modern_scene_prompt, Era, ERAS};
use crate::error::{Result, TimeLensError};
use crate::image::GeneratedImage;
use crate::notify::{Notification, Notifier, Severity};
use crate::service::ImageService;
use crate::session::SessionState;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Why a call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The prompt is empty or whitespace.
    EmptyPrompt,
    /// A sequence is already running.
    Busy,
    /// An era change with no scene to carry over.
    NoScene,
    /// The era index is outside the catalog.
    UnknownEra,
}

/// Result of one call into the orchestrator.
#[derive(Debug)]
#[must_use]
pub enum GenerationOutcome {
    /// A new image is displayed.
    Completed {
        /// Era the image was rendered for.
        era: &'static Era,
        /// The displayed image.
        image: Arc<GeneratedImage>,
    },
    /// The sequence failed; the session is unchanged apart from the busy flag.
    Failed(TimeLensError),
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// A newer request took over before this one finished.
    Superseded,
}

impl GenerationOutcome {
    /// True if a new image was displayed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

enum Job {
    Generate {
        prompt: String,
        /// Trimmed scene text the render belongs to.
        scene: String,
    },
    Edit {
        base: Arc<GeneratedImage>,
        instruction: String,
    },
}

/// Drives one session against an [`ImageService`].
pub struct SceneOrchestrator<S, N> {
    service: S,
    notifier: N,
    store: Option<(Arc<dyn CredentialStore>, String)>,
    request_timeout: Duration,
    state: Mutex<SessionState>,
}

impl<S: ImageService, N: Notifier> SceneOrchestrator<S, N> {
    /// Creates an idle session with default state and no credential.
    pub fn new(service: S, notifier: N) -> Self {
        Self {
            service,
            notifier,
            store: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Backs the credential with `store` under `key`, reading it once now.
    pub fn with_credential_store(
        self,
        store: Arc<dyn CredentialStore>,
        key: impl Into<String>,
    ) -> Result<Self> {
        let key = key.into();
        let credential = store.load(&key)?;
        self.lock().credential = credential;
        Ok(Self {
            store: Some((store, key)),
            ..self
        })
    }

    /// Uses `credential` without persisting it, e.g. one taken from the environment.
    pub fn with_credential(self, credential: Option<Credential>) -> Self {
        if credential.is_some() {
            self.lock().credential = credential;
        }
        self
    }

    /// Upper bound on each service call; elapsed calls fail with [`TimeLensError::Timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A copy of the current session state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// The selected era.
    pub fn selected_era(&self) -> &'static Era {
        self.lock().era()
    }

    /// The image currently shown, if any.
    pub fn displayed_image(&self) -> Option<Arc<GeneratedImage>> {
        self.lock().displayed_image.clone()
    }

    /// The cached modern render, if any.
    pub fn base_image(&self) -> Option<Arc<GeneratedImage>> {
        self.lock().base_image.clone()
    }

    /// True while a sequence is waiting on the service.
    pub fn is_generating(&self) -> bool {
        self.lock().is_generating
    }

    /// True once a credential is configured.
    pub fn has_credential(&self) -> bool {
        self.lock().has_credential()
    }

    /// True while prompt entry and era selection should be locked.
    pub fn controls_disabled(&self) -> bool {
        self.lock().controls_disabled()
    }

    /// Replaces the prompt.
    ///
    /// A different scene description invalidates the cached base image, so
    /// the next era change cannot edit a render of the old prompt. The
    /// displayed image stays on screen until something replaces it.
    pub fn set_prompt(&self, text: impl Into<String>) {
        let text = text.into();
        let mut state = self.lock();
        if state.base_image.is_some() && state.prompt.trim() != text.trim() {
            tracing::debug!("prompt changed, dropping cached base image");
            state.base_image = None;
        }
        state.prompt = text;
    }

    /// Replaces the credential; a blank value clears it.
    ///
    /// The backing store, if any, is updated as well. A store failure is
    /// reported as a notification and leaves the in-memory value in place.
    pub fn set_credential(&self, value: &str) {
        let credential = Credential::new(value);
        let persisted = match (&self.store, &credential) {
            (Some((store, key)), Some(credential)) => store.store(key, credential),
            (Some((store, key)), None) => store.remove(key),
            (None, _) => Ok(()),
        };
        if let Err(e) = persisted {
            tracing::warn!("failed to persist credential: {e}");
            self.notifier.notify(Notification {
                title: "Could not save API key".into(),
                description: e.notification_message(),
                severity: Severity::Failure,
            });
        }
        self.lock().credential = credential;
    }

    /// Selects era `index`, re-rendering the scene when there is one to carry over.
    pub async fn change_era(&self, index: usize) -> GenerationOutcome {
        self.run_sequence(|state| {
            if index >= ERAS.len() {
                return Some(SkipReason::UnknownEra);
            }
            state.selected_era = index;
            (!state.can_travel()).then_some(SkipReason::NoScene)
        })
        .await
    }

    /// Renders the prompt in the selected era.
    pub async fn generate(&self) -> GenerationOutcome {
        self.run_sequence(|state| {
            if !state.has_prompt() {
                Some(SkipReason::EmptyPrompt)
            } else if state.is_generating {
                Some(SkipReason::Busy)
            } else {
                None
            }
        })
        .await
    }

    /// Renders the current prompt and era again.
    pub async fn regenerate(&self) -> GenerationOutcome {
        self.generate().await
    }

    /// Writes the displayed image to `dir` as `scene-{year}.{ext}`.
    pub fn download(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let (image, era) = {
            let state = self.lock();
            let image = state
                .displayed_image
                .clone()
                .ok_or(TimeLensError::MissingImage)?;
            let era = state
                .displayed_era
                .and_then(Era::get)
                .unwrap_or_else(|| state.era());
            (image, era)
        };
        image.save_for_era(dir, era)
    }

    /// Runs one generation sequence.
    ///
    /// `admit` runs under the same lock that issues the request token and may
    /// veto the call.
    async fn run_sequence(
        &self,
        admit: impl FnOnce(&mut SessionState) -> Option<SkipReason>,
    ) -> GenerationOutcome {
        let (credential, era, job, in_flight) = {
            let mut state = self.lock();
            if let Some(reason) = admit(&mut *state) {
                return GenerationOutcome::Skipped(reason);
            }
            let Some(credential) = state.credential.clone() else {
                drop(state);
                return self.fail(TimeLensError::MissingCredential);
            };
            let era = state.era();
            let job = if era.is_modern() {
                Job::Generate {
                    prompt: modern_scene_prompt(&state.prompt),
                    scene: state.prompt.trim().to_string(),
                }
            } else if let Some(base) = state.base_image.clone() {
                Job::Edit {
                    base,
                    instruction: era_edit_instruction(era),
                }
            } else {
                drop(state);
                return self.fail(TimeLensError::MissingBaseImage);
            };
            state.request_token += 1;
            state.is_generating = true;
            let in_flight = InFlight {
                state: &self.state,
                token: state.request_token,
            };
            (credential, era, job, in_flight)
        };

        tracing::debug!(era = era.label, token = in_flight.token, "starting generation");
        let call = async {
            match &job {
                Job::Generate { prompt, .. } => self.service.generate(prompt, &credential).await,
                Job::Edit { base, instruction } => {
                    self.service.edit(base, instruction, &credential).await
                }
            }
        };
        let result = tokio::time::timeout(self.request_timeout, call)
            .await
            .unwrap_or(Err(TimeLensError::Timeout(self.request_timeout)));

        let applied = {
            let mut state = self.lock();
            if state.request_token != in_flight.token {
                tracing::warn!(
                    era = era.label,
                    token = in_flight.token,
                    latest = state.request_token,
                    "discarding superseded response"
                );
                return GenerationOutcome::Superseded;
            }
            state.is_generating = false;
            result.map(|image| {
                let image = Arc::new(image);
                match &job {
                    // A render of a prompt that has since been replaced is shown
                    // but never becomes the base for era edits.
                    Job::Generate { scene, .. } if state.prompt.trim() == scene.as_str() => {
                        state.base_image = Some(Arc::clone(&image));
                    }
                    Job::Generate { .. } => {
                        tracing::debug!("prompt changed during generation, not caching base image");
                    }
                    Job::Edit { .. } => {}
                }
                state.displayed_image = Some(Arc::clone(&image));
                state.displayed_era = Some(era.index);
                image
            })
        };
        drop(in_flight);

        match applied {
            Ok(image) => {
                tracing::info!(era = era.label, bytes = image.size(), "scene generated");
                self.notifier.notify(Notification::generated(era));
                GenerationOutcome::Completed { era, image }
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, error: TimeLensError) -> GenerationOutcome {
        tracing::warn!(kind = ?error.kind(), "generation failed: {error}");
        self.notifier.notify(Notification::failed(&error));
        GenerationOutcome::Failed(error)
    }
}

/// Clears the busy flag when a sequence ends, including by cancellation or
/// panic, unless a newer request owns it.
struct InFlight<'a> {
    state: &'a Mutex<SessionState>,
    token: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.request_token == self.token {
            state.is_generating = false;
        }
    }
}
