//! Decides whether a path's content must be encrypted.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use cloakfs_core::collaborators::Configuration;
use cloakfs_core::path;
use cloakfs_core::types::EncryptionMode;

use crate::format;

pub struct EncryptionPolicy {
    config: Arc<dyn Configuration>,
    blacklist: HashSet<String>,
}

impl EncryptionPolicy {
    /// The blacklist snapshot is taken here, at construction, never lazily
    /// on first use.
    pub fn new(config: Arc<dyn Configuration>) -> Self {
        let blacklist = Self::snapshot(config.as_ref());
        Self { config, blacklist }
    }

    fn snapshot(config: &dyn Configuration) -> HashSet<String> {
        config
            .extension_blacklist()
            .into_iter()
            .map(|e| e.to_ascii_lowercase())
            .collect()
    }

    /// Re-read the blacklist from configuration.
    pub fn rebuild_blacklist(&mut self) {
        self.blacklist = Self::snapshot(self.config.as_ref());
    }

    /// Should the content written to `path` be encrypted?
    ///
    /// `head` is a bounded prefix of the content currently stored at `path`,
    /// when the caller has one. Content that is already envelope-format is
    /// re-encrypted regardless of the extension blacklist.
    pub fn should_encrypt(&self, path: &str, head: Option<&[u8]>) -> bool {
        if !self.config.is_feature_enabled()
            || self.config.encryption_mode() != EncryptionMode::ServerSide
        {
            return false;
        }

        if path::strip_user_files(path).is_none() {
            return false;
        }

        if head.is_some_and(format::is_envelope) {
            return true;
        }

        match extension(path) {
            Some(ext) if self.blacklist.contains(&ext.to_ascii_lowercase()) => {
                debug!(path, ext, "extension blacklisted, leaving plaintext");
                false
            }
            _ => true,
        }
    }
}

fn extension(path: &str) -> Option<&str> {
    path::file_name(path)?
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}
