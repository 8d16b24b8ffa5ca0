use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "auragrowth_models.json";
const CONFIG_PATH_ENV: &str = "AURA_MODEL_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    OutcomeFast,
    OutcomeQuality,
    Image,
    VideoFast,
    VideoFull,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 5] = [
        GenerationKind::OutcomeFast,
        GenerationKind::OutcomeQuality,
        GenerationKind::Image,
        GenerationKind::VideoFast,
        GenerationKind::VideoFull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GenerationKind::OutcomeFast => "outcome_fast",
            GenerationKind::OutcomeQuality => "outcome_quality",
            GenerationKind::Image => "image",
            GenerationKind::VideoFast => "video_fast",
            GenerationKind::VideoFull => "video_full",
        }
    }

    fn default_model_id(self) -> &'static str {
        match self {
            GenerationKind::OutcomeFast => "gemini-3-flash-preview",
            GenerationKind::OutcomeQuality => "gemini-3-pro-preview",
            GenerationKind::Image => "gemini-2.5-flash-image",
            GenerationKind::VideoFast => "veo-3.1-fast-generate-preview",
            GenerationKind::VideoFull => "veo-3.1-generate-preview",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    pub model_id: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRoutingConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub models: HashMap<String, ModelProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    pub kind: GenerationKind,
    pub model_id: String,
    pub temperature: Option<f32>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRegistrySnapshot {
    pub config_path: String,
    pub loaded_from_file: bool,
    pub load_error: Option<String>,
    pub config: ModelRoutingConfig,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    config_path: PathBuf,
    loaded_from_file: bool,
    load_error: Option<String>,
    config: ModelRoutingConfig,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE_NAME),
            loaded_from_file: false,
            load_error: None,
            config: default_config(),
        }
    }
}

impl ModelRegistry {
    pub fn load(workspace_root: &Path) -> Self {
        let config_path = resolve_config_path(workspace_root);
        if !config_path.exists() {
            return Self {
                config_path,
                ..Self::default()
            };
        }

        match fs::read_to_string(&config_path) {
            Ok(raw) => match serde_json::from_str::<ModelRoutingConfig>(&raw) {
                Ok(parsed) => Self {
                    config_path,
                    loaded_from_file: true,
                    load_error: None,
                    config: sanitize_config(parsed),
                },
                Err(error) => Self {
                    config_path,
                    loaded_from_file: false,
                    load_error: Some(format!(
                        "Failed to parse {CONFIG_FILE_NAME}; using defaults: {error}"
                    )),
                    config: default_config(),
                },
            },
            Err(error) => Self {
                config_path,
                loaded_from_file: false,
                load_error: Some(format!(
                    "Failed to read {CONFIG_FILE_NAME}; using defaults: {error}"
                )),
                config: default_config(),
            },
        }
    }

    pub fn snapshot(&self) -> ModelRegistrySnapshot {
        ModelRegistrySnapshot {
            config_path: self.config_path.to_string_lossy().to_string(),
            loaded_from_file: self.loaded_from_file,
            load_error: self.load_error.clone(),
            config: self.config.clone(),
        }
    }

    pub fn resolve(&self, kind: GenerationKind) -> ModelSelection {
        if let Some(profile) = self.config.models.get(kind.as_str()) {
            let source = if self.loaded_from_file {
                "config"
            } else {
                "default"
            };
            return ModelSelection {
                kind,
                model_id: profile.model_id.clone(),
                temperature: profile.temperature,
                source: source.to_string(),
            };
        }

        ModelSelection {
            kind,
            model_id: kind.default_model_id().to_string(),
            temperature: None,
            source: "default".to_string(),
        }
    }
}

fn resolve_config_path(workspace_root: &Path) -> PathBuf {
    if let Some(override_path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(override_path);
    }
    workspace_root.join(CONFIG_FILE_NAME)
}

fn sanitize_config(config: ModelRoutingConfig) -> ModelRoutingConfig {
    let mut models = HashMap::new();
    for kind in GenerationKind::ALL {
        let fallback = default_profile(kind);
        let normalized = config
            .models
            .get(kind.as_str())
            .cloned()
            .map(|profile| normalize_profile(profile, &fallback))
            .unwrap_or(fallback);
        models.insert(kind.as_str().to_string(), normalized);
    }

    ModelRoutingConfig {
        version: if config.version == 0 {
            default_version()
        } else {
            config.version
        },
        models,
    }
}

fn normalize_profile(profile: ModelProfile, fallback: &ModelProfile) -> ModelProfile {
    let model_id = if profile.model_id.trim().is_empty() {
        fallback.model_id.clone()
    } else {
        profile.model_id.trim().to_string()
    };

    ModelProfile {
        model_id,
        temperature: profile.temperature.map(|value| value.clamp(0.0, 2.0)),
    }
}

fn default_config() -> ModelRoutingConfig {
    ModelRoutingConfig {
        version: default_version(),
        models: GenerationKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), default_profile(*kind)))
            .collect(),
    }
}

fn default_profile(kind: GenerationKind) -> ModelProfile {
    ModelProfile {
        model_id: kind.default_model_id().to_string(),
        temperature: None,
    }
}

fn default_version() -> u32 {
    1
}
