//! Collaborator interfaces consumed by the interception layer.
//!
//! The crypto engine, key store, virtual filesystem, share registry,
//! session store, and configuration are all external to this workspace;
//! they are consumed as trait objects so hosts wire in their own
//! implementations and tests wire in in-memory fakes.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use zeroize::Zeroize;

use crate::error::CloakResult;
use crate::types::{EncryptionMode, FileMetadataRecord, MigrationStatus};

/// Bidirectional byte stream, as handed out by a filesystem open.
pub trait ByteStream: Read + Write + Send {}

impl<T: Read + Write + Send> ByteStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

impl OpenMode {
    pub fn is_read_only(self) -> bool {
        matches!(self, OpenMode::Read)
    }
}

/// Session-held key for the deprecated block format. Zeroized on drop.
pub struct LegacyKey(Vec<u8>);

impl LegacyKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for LegacyKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for LegacyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LegacyKey").field(&"[REDACTED]").finish()
    }
}

/// Streaming cipher and envelope codec.
///
/// Writers opened through the engine produce envelope-format ciphertext on
/// flush/close; readers yield cleartext from envelope content.
pub trait CryptoEngine: Send + Sync {
    fn open_stream(&self, path: &str, mode: OpenMode) -> CloakResult<Box<dyn ByteStream>>;

    /// Cleartext length of the content at `path`, when it can be measured
    /// (i.e. the content is envelope-format and decryptable).
    fn measure_cleartext_length(&self, path: &str) -> CloakResult<Option<u64>>;

    /// Block-cipher routine for the deprecated pre-envelope format.
    fn legacy_decrypt(&self, data: &[u8], key: &LegacyKey) -> CloakResult<Vec<u8>>;

    fn open_for_read(&self, path: &str) -> CloakResult<Box<dyn ByteStream>> {
        self.open_stream(path, OpenMode::Read)
    }

    fn open_for_write(&self, path: &str) -> CloakResult<Box<dyn ByteStream>> {
        self.open_stream(path, OpenMode::Write)
    }
}

/// Durable storage for content keys and per-recipient share keys.
pub trait KeyStore: Send + Sync {
    /// Delete the content key for `path` (owner-relative). `false` when the
    /// key was present but could not be removed.
    fn delete_content_key(&self, owner: &str, path: &str) -> CloakResult<bool>;

    fn delete_all_share_keys(&self, owner: &str, path: &str) -> CloakResult<()>;

    /// Make wrapped share keys exist for exactly `recipients`. Pruning of
    /// stale wraps is the key store's own policy.
    fn ensure_share_keys(
        &self,
        owner: &str,
        path: &str,
        recipients: &BTreeSet<String>,
    ) -> CloakResult<()>;
}

/// The hooked virtual filesystem, reachable directly (hook-free) by the
/// interception layer for its internal operations.
pub trait VirtualFilesystem: Send + Sync {
    fn read(&self, path: &str) -> CloakResult<Vec<u8>>;

    /// Bounded prefix of the content at `path`. The default goes through
    /// [`VirtualFilesystem::read`]; implementors with ranged reads should
    /// override it.
    fn read_prefix(&self, path: &str, max_len: usize) -> CloakResult<Vec<u8>> {
        let mut data = self.read(path)?;
        data.truncate(max_len);
        Ok(data)
    }

    fn get_metadata(&self, path: &str) -> CloakResult<Option<FileMetadataRecord>>;

    fn put_metadata(&self, path: &str, record: &FileMetadataRecord) -> CloakResult<()>;

    fn is_directory(&self, path: &str) -> bool;

    fn delete_tree(&self, path: &str) -> CloakResult<()>;
}

/// Registry of which users may access a file.
pub trait ShareRegistry: Send + Sync {
    fn is_sharing_enabled(&self) -> bool;

    /// Users currently authorized for an owner-relative path. Does not need
    /// to include the owner.
    fn authorized_users(&self, owner_rel_path: &str) -> CloakResult<BTreeSet<String>>;
}

/// Per-session credential storage.
pub trait SessionStore: Send + Sync {
    fn has_legacy_key(&self) -> bool;

    fn legacy_key(&self) -> Option<LegacyKey>;
}

/// Installation configuration as seen by the interception layer.
pub trait Configuration: Send + Sync {
    fn is_feature_enabled(&self) -> bool;

    fn encryption_mode(&self) -> EncryptionMode;

    /// Extensions excluded from encryption, already split and trimmed.
    fn extension_blacklist(&self) -> Vec<String>;

    fn migration_status(&self) -> MigrationStatus;

    /// Whether a trash/recycle collaborator intercepts deletions first.
    fn is_trash_enabled(&self) -> bool;

    /// Glob patterns identifying partial/in-progress upload artifacts.
    fn partial_upload_patterns(&self) -> Vec<String>;
}
