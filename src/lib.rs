pub mod agents;
pub mod campaign;
pub mod cli;
pub mod commands;
pub mod credentials;
pub mod db;
pub mod error;
pub mod export;
pub mod genai;
pub mod model_registry;
pub mod retry;
pub mod runtime_config;
pub mod session;
pub mod studio;

#[cfg(test)]
mod test_helpers;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agents::orchestrator::CampaignOrchestrator;
use credentials::CredentialStore;
use error::AuraError;
use genai::{GeminiClient, GenerationBackend};
use model_registry::ModelRegistry;
use runtime_config::RuntimeFlags;
use session::SessionHandle;
use studio::{Studio, StudioSettings};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub model_registry: ModelRegistry,
    pub runtime_flags: Arc<RwLock<RuntimeFlags>>,
    pub credentials: Arc<CredentialStore>,
    pub orchestrator: CampaignOrchestrator,
    pub session: SessionHandle,
    pub active_run: Mutex<Option<CancellationToken>>,
    pub http: reqwest::Client,
    pub app_data_dir: PathBuf,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        backend: Arc<dyn GenerationBackend>,
        model_registry: ModelRegistry,
        runtime_flags: RuntimeFlags,
        credentials: Arc<CredentialStore>,
        app_data_dir: PathBuf,
    ) -> Self {
        let studio = Studio::new(
            backend,
            model_registry.clone(),
            credentials.clone(),
            StudioSettings::from_flags(&runtime_flags),
        );

        Self {
            db_pool,
            model_registry,
            runtime_flags: Arc::new(RwLock::new(runtime_flags)),
            credentials,
            orchestrator: CampaignOrchestrator::new(Arc::new(studio)),
            session: SessionHandle::default(),
            active_run: Mutex::new(None),
            http: reqwest::Client::new(),
            app_data_dir,
        }
    }
}

pub fn resolve_workspace_root() -> Result<PathBuf, AuraError> {
    std::env::current_dir().map_err(|error| {
        AuraError::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to determine workspace root: {error}"),
        ))
    })
}

/// Loads env files, config and credentials, opens the local store and wires
/// the HTTP generation backend.
pub async fn initialize_state(data_dir: Option<PathBuf>) -> Result<AppState, AuraError> {
    let workspace_root = resolve_workspace_root()?;
    load_env_files(workspace_root.as_path());

    let app_data_dir = data_dir.unwrap_or_else(runtime_config::resolve_data_dir);
    fs::create_dir_all(&app_data_dir)?;

    let runtime_flags = RuntimeFlags::from_env();
    let model_registry = ModelRegistry::load(&workspace_root);
    if let Some(load_error) = model_registry.snapshot().load_error {
        warn!(%load_error, "model registry fell back to defaults");
    }
    let credentials = Arc::new(CredentialStore::from_env());
    let backend = GeminiClient::new(
        &runtime_flags.api_base_url,
        runtime_flags.request_timeout(),
        credentials.clone(),
    )?;

    let db_pool = db::connect_pool(&app_data_dir.join(db::DATABASE_FILE_NAME)).await?;
    db::run_migrations(&db_pool).await?;
    info!(data_dir = %app_data_dir.display(), "application state initialized");

    Ok(AppState::new(
        db_pool,
        Arc::new(backend),
        model_registry,
        runtime_flags,
        credentials,
        app_data_dir,
    ))
}

pub(crate) fn load_env_files(workspace_root: &Path) {
    let root_env = workspace_root.join(".env");
    let root_local = workspace_root.join(".env.local");
    let _ = dotenvy::from_path(root_env);
    let _ = dotenvy::from_path(root_local);
}

/// `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
}

pub async fn run() -> std::process::ExitCode {
    cli::run().await
}
