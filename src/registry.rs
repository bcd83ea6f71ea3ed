//! Credential registry: loads `credential -> (rpm, itpm, otpm)` from a YAML
//! document and serves point-in-time-consistent lookups.
//!
//! Reload publishes a whole new snapshot behind an `ArcSwap`, the same
//! lock-free pointer-swap pattern the corpus's gateway config state uses —
//! readers never block and never observe a partially-updated map.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::error::ConfigError;

/// The three numeric limits for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CredentialLimits {
    #[serde(rename = "request_per_minute")]
    pub rpm: u64,
    #[serde(rename = "input_tokens_per_minute")]
    pub itpm: u64,
    #[serde(rename = "output_tokens_per_minute")]
    pub otpm: u64,
}

/// On-disk shape of the credentials document: `keys: { <credential>: {...} }`.
#[derive(Debug, Deserialize)]
struct CredentialsDocument {
    keys: HashMap<String, CredentialLimits>,
}

/// In-memory, read-mostly map from credential to limits.
///
/// Lookups are O(1) against a point-in-time snapshot; [`CredentialRegistry::reload`]
/// publishes a new snapshot atomically so in-flight lookups always see a
/// consistent triple, never a half-applied reload.
pub struct CredentialRegistry {
    snapshot: ArcSwap<HashMap<String, CredentialLimits>>,
    path: String,
}

impl CredentialRegistry {
    /// Load the registry from `path` at startup.
    pub fn load(path: impl Into<String>) -> Result<Self, ConfigError> {
        let path = path.into();
        let keys = read_credentials_file(&path)?;
        Ok(Self {
            snapshot: ArcSwap::new(Arc::new(keys)),
            path,
        })
    }

    /// Re-read the credentials document and publish the new snapshot.
    /// Unknown credentials are never coerced to default limits — a reload
    /// that drops a credential means lookups for it become `None`.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let keys = read_credentials_file(&self.path)?;
        self.snapshot.store(Arc::new(keys));
        Ok(())
    }

    /// Resolve the limits for a credential against the current snapshot.
    pub fn limits_for(&self, credential: &str) -> Option<CredentialLimits> {
        self.snapshot.load().get(credential).copied()
    }

    /// Number of credentials in the current snapshot (diagnostics only).
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_credentials_file(path: &str) -> Result<HashMap<String, CredentialLimits>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialsFileUnreadable {
        path: path.to_owned(),
        source,
    })?;
    let document: CredentialsDocument =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::CredentialsFileInvalid {
            path: path.to_owned(),
            source,
        })?;
    Ok(document.keys)
}
