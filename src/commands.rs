use std::path::PathBuf;
use std::sync::PoisonError;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::agents::orchestrator::RunOptions;
use crate::agents::Agent;
use crate::campaign::{CampaignOutcome, CampaignRequest, ReferenceAsset, VideoBrief};
use crate::credentials::CredentialStatus;
use crate::db::presets::{self, SavePresetInput, SwarmPreset};
use crate::error::AuraError;
use crate::export::{self, ExportReport};
use crate::model_registry::ModelRegistrySnapshot;
use crate::runtime_config::{RuntimeFlags, RuntimeFlagsUpdateResult, SetRuntimeFlagsInput};
use crate::session::SessionSnapshot;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCampaignInput {
    pub objective: String,
    pub target_audience: String,
    /// Replaces the session roster when present.
    pub agent_roster: Option<Vec<Agent>>,
    pub reference_asset: Option<ReferenceAsset>,
    pub fast_mode: Option<bool>,
    pub video: Option<VideoBrief>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineVisualInput {
    pub outcome_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcomeInput {
    pub outcome_id: String,
    pub directory: Option<PathBuf>,
}

fn read_flags(state: &AppState) -> RuntimeFlags {
    state
        .runtime_flags
        .read()
        .map(|flags| flags.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

pub async fn run_campaign(
    state: &AppState,
    input: RunCampaignInput,
) -> Result<CampaignOutcome, AuraError> {
    // A supplied roster becomes the session roster so events land on it.
    if let Some(roster) = input.agent_roster {
        state.session.set_roster(roster)?;
    }
    let _guard = state.session.begin_run()?;
    let flags = read_flags(state);
    let request = CampaignRequest {
        objective: input.objective,
        target_audience: input.target_audience,
        agent_roster: state.session.roster(),
        reference_asset: input.reference_asset,
        fast_mode: input.fast_mode.unwrap_or(flags.fast_mode),
        video: input.video,
    };

    let cancel = CancellationToken::new();
    *state
        .active_run
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

    let result = state
        .orchestrator
        .run(&request, &RunOptions::from_flags(&flags), &state.session, &cancel)
        .await;

    state
        .active_run
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    result
}

/// Cancels the active run, if any. Returns whether one was running.
pub fn cancel_campaign(state: &AppState) -> bool {
    match state
        .active_run
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        Some(token) => {
            token.cancel();
            true
        }
        None => false,
    }
}

pub async fn refine_visual(
    state: &AppState,
    input: RefineVisualInput,
) -> Result<CampaignOutcome, AuraError> {
    state
        .orchestrator
        .refine_visual(
            &state.session,
            input.outcome_id.trim(),
            &input.description,
            &state.session,
        )
        .await
}

pub fn get_session_snapshot(state: &AppState) -> SessionSnapshot {
    state.session.snapshot()
}

pub fn set_agent_roster(state: &AppState, agents: Vec<Agent>) -> Result<Vec<Agent>, AuraError> {
    state.session.set_roster(agents)?;
    Ok(state.session.roster())
}

pub async fn list_swarm_presets(state: &AppState) -> Result<Vec<SwarmPreset>, AuraError> {
    presets::list_presets(&state.db_pool).await
}

pub async fn save_swarm_preset(
    state: &AppState,
    input: SavePresetInput,
) -> Result<SwarmPreset, AuraError> {
    presets::save_preset(&state.db_pool, input).await
}

/// Loads a preset and makes its roster the session roster.
pub async fn load_swarm_preset(state: &AppState, preset_id: &str) -> Result<SwarmPreset, AuraError> {
    let preset = presets::load_preset(&state.db_pool, preset_id).await?;
    state.session.set_roster(preset.agents.clone())?;
    Ok(preset)
}

pub async fn delete_swarm_preset(state: &AppState, preset_id: &str) -> Result<(), AuraError> {
    presets::delete_preset(&state.db_pool, preset_id).await
}

pub async fn export_outcome(
    state: &AppState,
    input: ExportOutcomeInput,
) -> Result<ExportReport, AuraError> {
    let outcome = state
        .session
        .outcome(input.outcome_id.trim())
        .ok_or_else(|| AuraError::OutcomeNotFound(input.outcome_id.clone()))?;
    let directory = input
        .directory
        .unwrap_or_else(|| state.app_data_dir.join("exports"));
    let api_key = state.credentials.active_key().ok();
    export::export_outcome(&outcome, &directory, &state.http, api_key.as_deref()).await
}

pub fn get_model_registry(state: &AppState) -> ModelRegistrySnapshot {
    state.model_registry.snapshot()
}

pub fn get_runtime_flags(state: &AppState) -> RuntimeFlags {
    read_flags(state)
}

pub fn set_runtime_flags(state: &AppState, input: SetRuntimeFlagsInput) -> RuntimeFlagsUpdateResult {
    let mut flags = state
        .runtime_flags
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let restart_required = flags.apply_update(input);
    RuntimeFlagsUpdateResult {
        flags: flags.clone(),
        restart_required,
    }
}

pub fn get_credential_status(state: &AppState) -> CredentialStatus {
    state.credentials.status()
}

pub fn acknowledge_credential_reselection(state: &AppState) -> CredentialStatus {
    state.credentials.acknowledge_reselection();
    state.credentials.status()
}
