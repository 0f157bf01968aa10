//! Cleartext-size reconciliation and self-healing.
//!
//! The filesystem reports ciphertext sizes; callers must see cleartext
//! sizes. The stored `unencrypted_size` is authoritative whenever it is
//! plausible; a stream traversal through the crypto engine is only paid
//! when metadata is missing or self-evidently wrong.

use std::sync::Arc;

use tracing::{debug, warn};

use cloakfs_core::collaborators::{Configuration, CryptoEngine, VirtualFilesystem};
use cloakfs_core::path::{self, PartialUploadClassifier};
use cloakfs_core::types::{FileMetadataRecord, MigrationStatus};

use crate::guard::InterceptState;

pub struct SizeReconciler {
    config: Arc<dyn Configuration>,
    vfs: Arc<dyn VirtualFilesystem>,
    engine: Arc<dyn CryptoEngine>,
    intercept: InterceptState,
    partial: PartialUploadClassifier,
}

impl SizeReconciler {
    pub fn new(
        config: Arc<dyn Configuration>,
        vfs: Arc<dyn VirtualFilesystem>,
        engine: Arc<dyn CryptoEngine>,
        intercept: InterceptState,
    ) -> Self {
        let partial = PartialUploadClassifier::new(&config.partial_upload_patterns());
        Self {
            config,
            vfs,
            engine,
            intercept,
            partial,
        }
    }

    /// Authoritative size for `path`, given the raw (ciphertext) size the
    /// filesystem reported. Falls back to `raw_size` whenever the path is
    /// not a reconcilable file.
    pub fn resolve_size(&self, path: &str, raw_size: u64) -> u64 {
        match self.reconcile(path, Some(raw_size)) {
            Some(size) => {
                debug!(path, raw_size, size, "resolved cleartext size");
                size
            }
            None => raw_size,
        }
    }

    /// Repair pass used after touch/write: true when `path` ends up
    /// recorded as encrypted with a plausible cleartext size.
    pub fn fix_file_size(&self, path: &str) -> bool {
        matches!(self.reconcile(path, None), Some(size) if size > 0)
    }

    /// `Some(cleartext_size)` when the file is (now) recorded as encrypted,
    /// `None` when reconciliation does not apply.
    fn reconcile(&self, path: &str, raw_size: Option<u64>) -> Option<u64> {
        // pre-migration, raw sizes pass through untouched
        if !self.config.is_feature_enabled()
            || self.config.migration_status() != MigrationStatus::Completed
        {
            return None;
        }
        if self.vfs.is_directory(path) {
            return None;
        }
        path::strip_user_files(path)?;

        let is_partial = self.partial.is_partial(path);

        let record = if is_partial {
            None
        } else {
            let _guard = self.intercept.suspend();
            match self.vfs.get_metadata(path) {
                Ok(record) => record,
                Err(e) => {
                    debug!(path, error = %e, "metadata lookup failed");
                    None
                }
            }
        };

        match record {
            Some(mut record) if record.encrypted => {
                if record.has_implausible_cleartext_size() {
                    debug!(path, "encrypted record reports no cleartext size, measuring");
                    if let Some(measured) = self.measure(path) {
                        record.unencrypted_size = measured;
                        if !is_partial {
                            self.persist(path, &record);
                        }
                    }
                }
                Some(record.unencrypted_size)
            }
            record => {
                // No record, or not flagged encrypted. If the engine can
                // still measure the content, the file actually holds
                // encrypted data whose metadata went missing: heal it.
                let measured = self.measure(path)?;
                let mut record = record.unwrap_or_else(|| FileMetadataRecord::new(path));
                record.encrypted = true;
                record.unencrypted_size = measured;
                if let Some(raw) = raw_size {
                    record.size = raw;
                }
                if !is_partial {
                    debug!(path, measured, "healing metadata from encrypted content");
                    self.persist(path, &record);
                }
                Some(measured)
            }
        }
    }

    /// Positive cleartext length via the crypto engine, with interception
    /// suspended around the stream traversal.
    fn measure(&self, path: &str) -> Option<u64> {
        let _guard = self.intercept.suspend();
        match self.engine.measure_cleartext_length(path) {
            Ok(Some(len)) if len > 0 => Some(len),
            Ok(_) => None,
            Err(e) => {
                debug!(path, error = %e, "cleartext measurement failed");
                None
            }
        }
    }

    fn persist(&self, path: &str, record: &FileMetadataRecord) {
        let _guard = self.intercept.suspend();
        if let Err(e) = self.vfs.put_metadata(path, record) {
            warn!(path, error = %e, "could not persist repaired metadata");
        }
    }
}
