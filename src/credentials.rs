use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::AuraError;

const PRIMARY_KEY_ENVS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];
const ALTERNATE_KEYS_ENV: &str = "AURA_API_KEYS";

/// API keys for the generation service. One key is active at a time; a
/// rejected key is rotated out by `reselect`.
#[derive(Debug)]
pub struct CredentialStore {
    keys: Vec<String>,
    active: AtomicUsize,
    reselections: AtomicU32,
    reselection_requested: AtomicBool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub configured: bool,
    pub key_count: usize,
    pub active_index: usize,
    pub fingerprint: Option<String>,
    pub reselections: u32,
    pub reselection_requested: bool,
}

impl CredentialStore {
    pub fn new(keys: Vec<String>) -> Self {
        let mut normalized: Vec<String> = Vec::new();
        for key in keys {
            let trimmed = key.trim();
            if !trimmed.is_empty() && !normalized.iter().any(|known| known == trimmed) {
                normalized.push(trimmed.to_string());
            }
        }

        Self {
            keys: normalized,
            active: AtomicUsize::new(0),
            reselections: AtomicU32::new(0),
            reselection_requested: AtomicBool::new(false),
        }
    }

    pub fn from_env() -> Self {
        let mut keys = Vec::new();
        for name in PRIMARY_KEY_ENVS {
            if let Ok(value) = std::env::var(name) {
                keys.push(value);
            }
        }
        if let Ok(value) = std::env::var(ALTERNATE_KEYS_ENV) {
            keys.extend(value.split(',').map(str::to_string));
        }
        Self::new(keys)
    }

    pub fn active_key(&self) -> Result<String, AuraError> {
        if self.keys.is_empty() {
            return Err(AuraError::Credential(format!(
                "no API key configured; set {} or {ALTERNATE_KEYS_ENV}",
                PRIMARY_KEY_ENVS.join(" / ")
            )));
        }
        let index = self.active.load(Ordering::SeqCst) % self.keys.len();
        Ok(self.keys[index].clone())
    }

    /// Moves to the next configured key and flags that the host should prompt
    /// for a fresh key. With a single key the index stays put.
    pub fn reselect(&self) {
        self.reselections.fetch_add(1, Ordering::SeqCst);
        self.reselection_requested.store(true, Ordering::SeqCst);
        if self.keys.len() > 1 {
            let next = (self.active.load(Ordering::SeqCst) + 1) % self.keys.len();
            self.active.store(next, Ordering::SeqCst);
            warn!(active_index = next, "credential rejected; rotated to alternate API key");
        } else {
            warn!("credential rejected; no alternate API key configured, reselection required");
        }
    }

    pub fn acknowledge_reselection(&self) {
        self.reselection_requested.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> CredentialStatus {
        let active_index = if self.keys.is_empty() {
            0
        } else {
            self.active.load(Ordering::SeqCst) % self.keys.len()
        };
        CredentialStatus {
            configured: !self.keys.is_empty(),
            key_count: self.keys.len(),
            active_index,
            fingerprint: self.keys.get(active_index).map(|key| fingerprint(key)),
            reselections: self.reselections.load(Ordering::SeqCst),
            reselection_requested: self.reselection_requested.load(Ordering::SeqCst),
        }
    }
}

fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_credential_error() {
        let store = CredentialStore::new(vec!["  ".to_string()]);
        let error = store.active_key().expect_err("empty store must fail");
        assert!(error.is_credential());
        assert!(!store.status().configured);
    }

    #[test]
    fn reselect_rotates_between_alternates() {
        let store = CredentialStore::new(vec![
            "key-a".to_string(),
            "key-b".to_string(),
            "key-a".to_string(),
        ]);
        assert_eq!(store.status().key_count, 2);
        assert_eq!(store.active_key().expect("key should resolve"), "key-a");

        store.reselect();
        assert_eq!(store.active_key().expect("key should resolve"), "key-b");
        let status = store.status();
        assert_eq!(status.reselections, 1);
        assert!(status.reselection_requested);

        store.acknowledge_reselection();
        store.reselect();
        assert_eq!(store.active_key().expect("key should resolve"), "key-a");
    }

    #[test]
    fn status_exposes_fingerprint_not_key() {
        let store = CredentialStore::new(vec!["super-secret".to_string()]);
        let status = store.status();
        let fingerprint = status.fingerprint.expect("fingerprint should exist");
        assert_eq!(fingerprint.len(), 12);
        assert!(!fingerprint.contains("secret"));
    }
}
