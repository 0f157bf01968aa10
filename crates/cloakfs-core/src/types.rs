use serde::{Deserialize, Serialize};

/// Per-file metadata row as tracked by the virtual filesystem.
///
/// `size` is whatever the underlying storage reports (ciphertext bytes for
/// encrypted files); `unencrypted_size` is the cleartext byte count and is
/// authoritative whenever it is plausible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataRecord {
    pub path: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub unencrypted_size: u64,
}

impl FileMetadataRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            encrypted: false,
            size: 0,
            unencrypted_size: 0,
        }
    }

    /// An encrypted record holding ciphertext bytes but claiming a zero
    /// cleartext size is self-evidently wrong and needs repair.
    pub fn has_implausible_cleartext_size(&self) -> bool {
        self.encrypted && self.size > 0 && self.unencrypted_size == 0
    }
}

/// Installation-wide flag gating whether size reconciliation is
/// authoritative. While not `Completed`, reported sizes fall back to the raw
/// ciphertext size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Only `ServerSide` activates the interception layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    #[default]
    Disabled,
    ClientSide,
    ServerSide,
}
