pub mod image;
pub mod outcome;
pub mod video;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::error::AuraError;
use crate::genai::GenerationBackend;
use crate::model_registry::{GenerationKind, ModelRegistry, ModelSelection};
use crate::retry::RetryPolicy;
use crate::runtime_config::RuntimeFlags;

pub use video::{covered_seconds, extension_steps, playable_url, CompiledVideo, VideoClip};

/// Result of a generation call whose response arrived but may not hold
/// everything that was asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation<T> {
    Complete(T),
    Partial { value: T, missing: Vec<String> },
    Failed { reason: String },
}

impl<T> Generation<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Generation::Complete(_))
    }

    /// Complete values pass through; anything else becomes
    /// `GenerationFailed` naming what was produced.
    pub fn into_complete(self, what: &str) -> Result<T, AuraError> {
        match self {
            Generation::Complete(value) => Ok(value),
            Generation::Partial { missing, .. } => Err(AuraError::GenerationFailed(format!(
                "{what} is missing {}",
                missing.join(", ")
            ))),
            Generation::Failed { reason } => {
                Err(AuraError::GenerationFailed(format!("{what}: {reason}")))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioSettings {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub resolution: String,
}

impl StudioSettings {
    pub fn from_flags(flags: &RuntimeFlags) -> Self {
        Self {
            retry: RetryPolicy::from_flags(flags),
            poll_interval: flags.video_poll_interval(),
            poll_timeout: flags.video_poll_timeout(),
            resolution: flags.video_resolution.clone(),
        }
    }
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self::from_flags(&RuntimeFlags::default())
    }
}

/// Outcome, image and video generators over one backend.
pub struct Studio {
    backend: Arc<dyn GenerationBackend>,
    registry: ModelRegistry,
    credentials: Arc<CredentialStore>,
    settings: StudioSettings,
}

impl Studio {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        registry: ModelRegistry,
        credentials: Arc<CredentialStore>,
        settings: StudioSettings,
    ) -> Self {
        Self {
            backend,
            registry,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &StudioSettings {
        &self.settings
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn model(&self, kind: GenerationKind) -> ModelSelection {
        self.registry.resolve(kind)
    }
}

pub(crate) async fn until_cancelled<T, F>(cancel: &CancellationToken, work: F) -> Result<T, AuraError>
where
    F: Future<Output = Result<T, AuraError>>,
{
    if cancel.is_cancelled() {
        return Err(AuraError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AuraError::Cancelled),
        result = work => result,
    }
}
