use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::collaborators::Configuration;
use crate::types::{EncryptionMode, MigrationStatus};

/// Top-level configuration (loaded from cloakfs.toml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloakConfig {
    pub encryption: EncryptionConfig,
}

impl CloakConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Master switch for the interception layer (default: false)
    pub enabled: bool,
    /// Only `server_side` activates interception
    pub mode: EncryptionMode,
    /// Comma-separated extensions excluded from encryption, e.g. "avi,mkv,iso"
    pub type_blacklist: String,
    /// Whether historical files have been migrated to cleartext-size tracking
    pub migration_status: MigrationStatus,
    /// Whether a trash/recycle collaborator intercepts deletions
    pub trash_enabled: bool,
    /// Glob patterns naming partial/in-progress upload artifacts
    pub partial_upload_patterns: Vec<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: EncryptionMode::ServerSide,
            type_blacklist: String::new(),
            migration_status: MigrationStatus::NotStarted,
            trash_enabled: false,
            partial_upload_patterns: vec!["*.part".into()],
        }
    }
}

impl Configuration for EncryptionConfig {
    fn is_feature_enabled(&self) -> bool {
        self.enabled
    }

    fn encryption_mode(&self) -> EncryptionMode {
        self.mode
    }

    fn extension_blacklist(&self) -> Vec<String> {
        self.type_blacklist
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn migration_status(&self) -> MigrationStatus {
        self.migration_status
    }

    fn is_trash_enabled(&self) -> bool {
        self.trash_enabled
    }

    fn partial_upload_patterns(&self) -> Vec<String> {
        self.partial_upload_patterns.clone()
    }
}
