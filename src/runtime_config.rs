use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DATA_DIR_ENV: &str = "AURA_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFlags {
    pub fast_mode: bool,
    pub narration_enabled: bool,
    pub require_visual: bool,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub video_poll_interval_secs: u64,
    pub video_poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub video_resolution: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFlagsUpdateResult {
    pub flags: RuntimeFlags,
    pub restart_required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRuntimeFlagsInput {
    pub fast_mode: Option<bool>,
    pub narration_enabled: Option<bool>,
    pub require_visual: Option<bool>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub video_poll_interval_secs: Option<u64>,
    pub video_poll_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub video_resolution: Option<String>,
    pub api_base_url: Option<String>,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            fast_mode: false,
            narration_enabled: true,
            require_visual: true,
            retry_attempts: 3,
            retry_base_delay_ms: 2_000,
            video_poll_interval_secs: 10,
            video_poll_timeout_secs: 900,
            request_timeout_secs: 120,
            video_resolution: "720p".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl RuntimeFlags {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fast_mode: env_bool("AURA_FAST_MODE", defaults.fast_mode),
            narration_enabled: env_bool("AURA_NARRATION", defaults.narration_enabled),
            require_visual: env_bool("AURA_REQUIRE_VISUAL", defaults.require_visual),
            retry_attempts: env_u32("AURA_RETRY_ATTEMPTS", defaults.retry_attempts, 0, 10),
            retry_base_delay_ms: env_u64(
                "AURA_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
                1,
                60_000,
            ),
            video_poll_interval_secs: env_u64(
                "AURA_VIDEO_POLL_INTERVAL_SECS",
                defaults.video_poll_interval_secs,
                1,
                120,
            ),
            video_poll_timeout_secs: env_u64(
                "AURA_VIDEO_POLL_TIMEOUT_SECS",
                defaults.video_poll_timeout_secs,
                30,
                7_200,
            ),
            request_timeout_secs: env_u64(
                "AURA_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
                5,
                600,
            ),
            video_resolution: env_string("AURA_VIDEO_RESOLUTION")
                .filter(|value| matches!(value.as_str(), "720p" | "1080p"))
                .unwrap_or(defaults.video_resolution),
            api_base_url: env_string("AURA_API_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
        }
    }

    /// Applies a partial update. Returns true when a changed field is baked
    /// into the generation studio and only takes effect after a restart.
    pub fn apply_update(&mut self, input: SetRuntimeFlagsInput) -> bool {
        let before = self.clone();

        if let Some(value) = input.fast_mode {
            self.fast_mode = value;
        }
        if let Some(value) = input.narration_enabled {
            self.narration_enabled = value;
        }
        if let Some(value) = input.require_visual {
            self.require_visual = value;
        }
        if let Some(value) = input.retry_attempts {
            self.retry_attempts = value.min(10);
        }
        if let Some(value) = input.retry_base_delay_ms {
            self.retry_base_delay_ms = value.clamp(1, 60_000);
        }
        if let Some(value) = input.video_poll_interval_secs {
            self.video_poll_interval_secs = value.clamp(1, 120);
        }
        if let Some(value) = input.video_poll_timeout_secs {
            self.video_poll_timeout_secs = value.clamp(30, 7_200);
        }
        if let Some(value) = input.request_timeout_secs {
            self.request_timeout_secs = value.clamp(5, 600);
        }
        if let Some(value) = input.video_resolution {
            let trimmed = value.trim();
            if matches!(trimmed, "720p" | "1080p") {
                self.video_resolution = trimmed.to_string();
            }
        }
        if let Some(value) = input.api_base_url {
            let trimmed = value.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                self.api_base_url = trimmed.to_string();
            }
        }

        before.retry_attempts != self.retry_attempts
            || before.retry_base_delay_ms != self.retry_base_delay_ms
            || before.video_poll_interval_secs != self.video_poll_interval_secs
            || before.video_poll_timeout_secs != self.video_poll_timeout_secs
            || before.request_timeout_secs != self.request_timeout_secs
            || before.video_resolution != self.video_resolution
            || before.api_base_url != self.api_base_url
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_secs(self.video_poll_interval_secs)
    }

    pub fn video_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.video_poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn resolve_data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(path);
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("auragrowth"))
        .unwrap_or_else(|| PathBuf::from(".auragrowth"))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32, min: u32, max: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}
