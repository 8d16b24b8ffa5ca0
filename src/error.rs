use std::time::Duration;

use thiserror::Error;

const QUOTA_MARKER: &str = "quota";
const RESOURCE_EXHAUSTED: &str = "resource_exhausted";
const ENTITY_NOT_FOUND_MARKERS: &[&str] = &["requested entity was not found", "entity not found"];

#[derive(Debug, Error)]
pub enum AuraError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("generation quota exhausted (status {status:?}): {message}")]
    Quota { status: Option<u16>, message: String },

    #[error("generation credential rejected: {0}")]
    Credential(String),

    #[error("generation service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("generation service unreachable: {0}")]
    Transport(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("video operation '{operation}' did not finish within {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("a campaign run is already in progress for this session")]
    RunInProgress,

    #[error("outcome '{0}' already has an operation in flight")]
    OutcomeBusy(String),

    #[error("outcome '{0}' not found")]
    OutcomeNotFound(String),

    #[error("outcome '{id}' changed during refinement (expected version {expected}, found {found})")]
    StaleOutcome { id: String, expected: u64, found: u64 },

    #[error("swarm preset '{0}' not found")]
    PresetNotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AuraError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AuraError::InvalidInput(message.into())
    }

    /// Rate-limit or quota condition: HTTP 429, `RESOURCE_EXHAUSTED`, or a
    /// "quota" marker anywhere in the message.
    pub fn is_quota(&self) -> bool {
        match self {
            AuraError::Quota { .. } => true,
            AuraError::Api { status: 429, .. } => true,
            AuraError::Api { message, .. }
            | AuraError::Transport(message)
            | AuraError::GenerationFailed(message) => {
                let lowered = message.to_ascii_lowercase();
                lowered.contains(QUOTA_MARKER) || lowered.contains(RESOURCE_EXHAUSTED)
            }
            _ => false,
        }
    }

    /// "Entity not found" from the generation service usually means the
    /// selected API key is invalid or expired.
    pub fn is_credential(&self) -> bool {
        match self {
            AuraError::Credential(_) => true,
            AuraError::Api { message, .. } => is_entity_not_found(message),
            _ => false,
        }
    }
}

pub(crate) fn is_entity_not_found(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    ENTITY_NOT_FOUND_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

impl From<reqwest::Error> for AuraError {
    fn from(error: reqwest::Error) -> Self {
        AuraError::Transport(error.to_string())
    }
}
