use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::kv;
use crate::agents::{self, Agent, AgentStatus, TaskStatus};
use crate::error::AuraError;

pub const PRESETS_KEY: &str = "auragrowth_swarm_configs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmPreset {
    pub id: String,
    pub name: String,
    pub agents: Vec<Agent>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePresetInput {
    pub name: String,
    pub agents: Vec<Agent>,
}

pub async fn list_presets(pool: &SqlitePool) -> Result<Vec<SwarmPreset>, AuraError> {
    match stored_presets(pool).await {
        Err(AuraError::Json(error)) => {
            warn!(%error, "stored swarm presets are unreadable; treating as empty");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Strict read used before writing back, so an unreadable store is never
/// overwritten.
async fn stored_presets(pool: &SqlitePool) -> Result<Vec<SwarmPreset>, AuraError> {
    let Some(raw) = kv::get(pool, PRESETS_KEY).await? else {
        return Ok(Vec::new());
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Stores a snapshot of the roster with run state cleared, newest first.
pub async fn save_preset(pool: &SqlitePool, input: SavePresetInput) -> Result<SwarmPreset, AuraError> {
    if input.name.trim().is_empty() {
        return Err(AuraError::invalid("name is required"));
    }
    agents::validate_roster(&input.agents)?;

    let preset = SwarmPreset {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        agents: input.agents.into_iter().map(at_rest).collect(),
        timestamp: Utc::now().timestamp_millis(),
    };

    let mut presets = stored_presets(pool).await?;
    presets.insert(0, preset.clone());
    kv::put(pool, PRESETS_KEY, &serde_json::to_string(&presets)?).await?;
    info!(preset_id = preset.id.as_str(), name = preset.name.as_str(), "swarm preset saved");

    Ok(preset)
}

pub async fn load_preset(pool: &SqlitePool, preset_id: &str) -> Result<SwarmPreset, AuraError> {
    list_presets(pool)
        .await?
        .into_iter()
        .find(|preset| preset.id == preset_id.trim())
        .ok_or_else(|| AuraError::PresetNotFound(preset_id.to_string()))
}

pub async fn delete_preset(pool: &SqlitePool, preset_id: &str) -> Result<(), AuraError> {
    let mut presets = stored_presets(pool).await?;
    let before = presets.len();
    presets.retain(|preset| preset.id != preset_id.trim());
    if presets.len() == before {
        return Err(AuraError::PresetNotFound(preset_id.to_string()));
    }
    kv::put(pool, PRESETS_KEY, &serde_json::to_string(&presets)?).await?;
    Ok(())
}

fn at_rest(mut agent: Agent) -> Agent {
    agent.status = AgentStatus::Idle;
    for task in &mut agent.tasks {
        task.status = TaskStatus::Pending;
    }
    agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_roster;
    use crate::db::setup_test_pool;

    #[tokio::test]
    async fn saved_preset_loads_an_equal_roster() {
        let pool = setup_test_pool().await;
        let mut roster = default_roster();
        roster[1].name = "Nexus Prime II".to_string();
        roster[1].instruction = "Prioritise annual plans.".to_string();

        let saved = save_preset(
            &pool,
            SavePresetInput {
                name: "Annual push".to_string(),
                agents: roster.clone(),
            },
        )
        .await
        .expect("preset should save");

        let loaded = load_preset(&pool, &saved.id).await.expect("preset should load");
        assert_eq!(loaded.name, "Annual push");
        assert_eq!(loaded.agents, roster);
    }

    #[tokio::test]
    async fn newest_preset_is_listed_first_and_delete_removes_it() {
        let pool = setup_test_pool().await;
        let first = save_preset(
            &pool,
            SavePresetInput {
                name: "First".to_string(),
                agents: default_roster(),
            },
        )
        .await
        .expect("first preset should save");
        let second = save_preset(
            &pool,
            SavePresetInput {
                name: "Second".to_string(),
                agents: default_roster(),
            },
        )
        .await
        .expect("second preset should save");

        let listed = list_presets(&pool).await.expect("list should work");
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        delete_preset(&pool, &second.id).await.expect("delete should work");
        assert!(matches!(
            load_preset(&pool, &second.id).await,
            Err(AuraError::PresetNotFound(_))
        ));
        assert!(delete_preset(&pool, &second.id).await.is_err());
        assert_eq!(list_presets(&pool).await.expect("list should work").len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_roster_and_tolerates_corrupt_store() {
        let pool = setup_test_pool().await;
        let mut roster = default_roster();
        roster.pop();
        assert!(save_preset(
            &pool,
            SavePresetInput {
                name: "Broken".to_string(),
                agents: roster,
            },
        )
        .await
        .is_err());

        kv::put(&pool, PRESETS_KEY, "{not json").await.expect("put should work");
        assert!(list_presets(&pool).await.expect("list should work").is_empty());
    }

    #[tokio::test]
    async fn save_refuses_to_overwrite_an_unreadable_store() {
        let pool = setup_test_pool().await;
        kv::put(&pool, PRESETS_KEY, "{not json").await.expect("put should work");

        let error = save_preset(
            &pool,
            SavePresetInput {
                name: "Fresh".to_string(),
                agents: default_roster(),
            },
        )
        .await
        .expect_err("save must not clobber unreadable presets");
        assert!(matches!(error, AuraError::Json(_)));
        assert!(matches!(
            delete_preset(&pool, "any").await,
            Err(AuraError::Json(_))
        ));
        assert_eq!(
            kv::get(&pool, PRESETS_KEY).await.expect("get should work").as_deref(),
            Some("{not json")
        );
    }
}
