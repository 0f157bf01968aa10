//! The interception layer: pre/post hooks around virtual-filesystem
//! operations.
//!
//! The host filesystem dispatches each operation through the matching
//! [`FileProxy`] callback. Hooks consult the encryption policy and format
//! detection, then delegate to the size reconciler, key-share coordinator,
//! or legacy bridge. Internal filesystem calls run under a suspended
//! intercept flag so they cannot re-enter the hooks.

use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use cloakfs_core::collaborators::{
    ByteStream, Configuration, CryptoEngine, KeyStore, OpenMode, SessionStore, ShareRegistry,
    VirtualFilesystem,
};
use cloakfs_core::error::CloakResult;
use cloakfs_core::path::{self, PathClass};
use cloakfs_core::types::{EncryptionMode, FileMetadataRecord};

use crate::format;
use crate::guard::InterceptState;
use crate::keyshare::KeyShareCoordinator;
use crate::legacy::LegacyDecryptionBridge;
use crate::policy::EncryptionPolicy;
use crate::sizefix::SizeReconciler;

/// Payload of a pending write: either materialized bytes or an already-open
/// stream handle. Streams are left alone here; the open hook has already
/// routed them through the crypto engine.
pub enum WriteContent {
    Bytes(Vec<u8>),
    Stream(Box<dyn ByteStream>),
}

impl std::fmt::Debug for WriteContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteContent::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            WriteContent::Stream(_) => f.debug_tuple("Stream").field(&"..").finish(),
        }
    }
}

/// Named hook surface the host filesystem dispatches through. Every hook
/// defaults to pass-through, so hosts can register a partial
/// implementation.
pub trait FileProxy: Send + Sync {
    /// Replace the payload with ciphertext for qualifying paths.
    fn before_write(&self, _path: &str, _content: &mut WriteContent) -> CloakResult<()> {
        Ok(())
    }

    /// Transform content just read into cleartext when it is encrypted.
    fn after_read(&self, _path: &str, content: Vec<u8>) -> CloakResult<Vec<u8>> {
        Ok(content)
    }

    /// Key cleanup before deletion. The returned bool is the allow flag;
    /// implementations must never block deletion.
    fn before_delete(&self, _path: &str) -> CloakResult<bool> {
        Ok(true)
    }

    fn after_write(&self, _path: &str) -> CloakResult<()> {
        Ok(())
    }

    fn after_touch(&self, _path: &str) -> CloakResult<()> {
        Ok(())
    }

    /// Re-route a freshly opened handle through the crypto engine when the
    /// content calls for it.
    fn after_open(
        &self,
        _path: &str,
        handle: Box<dyn ByteStream>,
        _mode: OpenMode,
    ) -> CloakResult<Box<dyn ByteStream>> {
        Ok(handle)
    }

    /// Rewrite the reported size to the cleartext size.
    fn after_get_file_info(
        &self,
        _path: &str,
        info: FileMetadataRecord,
    ) -> CloakResult<FileMetadataRecord> {
        Ok(info)
    }
}

/// The encryption interception layer.
pub struct EncryptionProxy {
    config: Arc<dyn Configuration>,
    engine: Arc<dyn CryptoEngine>,
    vfs: Arc<dyn VirtualFilesystem>,
    keystore: Arc<dyn KeyStore>,
    policy: EncryptionPolicy,
    reconciler: Arc<SizeReconciler>,
    coordinator: KeyShareCoordinator,
    bridge: LegacyDecryptionBridge,
    intercept: InterceptState,
}

impl EncryptionProxy {
    pub fn new(
        config: Arc<dyn Configuration>,
        engine: Arc<dyn CryptoEngine>,
        vfs: Arc<dyn VirtualFilesystem>,
        keystore: Arc<dyn KeyStore>,
        registry: Arc<dyn ShareRegistry>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        let intercept = InterceptState::new();
        let policy = EncryptionPolicy::new(Arc::clone(&config));
        let reconciler = Arc::new(SizeReconciler::new(
            Arc::clone(&config),
            Arc::clone(&vfs),
            Arc::clone(&engine),
            intercept.clone(),
        ));
        let coordinator = KeyShareCoordinator::new(
            Arc::clone(&keystore),
            registry,
            Arc::clone(&reconciler),
            intercept.clone(),
        );
        let bridge = LegacyDecryptionBridge::new(Arc::clone(&engine), session);

        Self {
            config,
            engine,
            vfs,
            keystore,
            policy,
            reconciler,
            coordinator,
            bridge,
            intercept,
        }
    }

    /// Handle to the shared interception flag, for hosts that check it
    /// before dispatching hooks.
    pub fn intercept_state(&self) -> InterceptState {
        self.intercept.clone()
    }

    pub fn size_reconciler(&self) -> &SizeReconciler {
        &self.reconciler
    }

    fn hooks_active(&self) -> bool {
        self.intercept.is_enabled()
            && self.config.is_feature_enabled()
            && self.config.encryption_mode() == EncryptionMode::ServerSide
    }

    /// Bounded content prefix at `path`, read with interception suspended.
    /// `None` when the path has no readable content yet.
    fn probe_head(&self, path: &str) -> Option<Vec<u8>> {
        let _guard = self.intercept.suspend();
        self.vfs.read_prefix(path, format::PROBE_LEN).ok()
    }

    /// Route cleartext through the engine's write path at a scratch
    /// location and return the resulting ciphertext, recording the true
    /// cleartext length in the target's metadata.
    fn encrypt_via_scratch(
        &self,
        target: &str,
        scratch: &str,
        cleartext: &[u8],
    ) -> CloakResult<Vec<u8>> {
        {
            let _guard = self.intercept.suspend();
            let mut writer = self.engine.open_for_write(scratch)?;
            writer.write_all(cleartext)?;
            writer.flush()?;
        }

        let _guard = self.intercept.suspend();
        let ciphertext = self.vfs.read(scratch)?;

        let mut record = self
            .vfs
            .get_metadata(target)?
            .unwrap_or_else(|| FileMetadataRecord::new(target));
        record.encrypted = true;
        record.size = ciphertext.len() as u64;
        record.unencrypted_size = cleartext.len() as u64;
        self.vfs.put_metadata(target, &record)?;

        Ok(ciphertext)
    }
}

impl FileProxy for EncryptionProxy {
    fn before_write(&self, path: &str, content: &mut WriteContent) -> CloakResult<()> {
        if !self.hooks_active() {
            return Ok(());
        }
        // stream writes are encrypted by the open hook
        let WriteContent::Bytes(payload) = content else {
            return Ok(());
        };

        let head = self.probe_head(path);
        if !self.policy.should_encrypt(path, head.as_deref()) {
            return Ok(());
        }
        let Some(resolved) = path::strip_user_files(path) else {
            return Ok(());
        };

        let cleartext = std::mem::take(payload);

        let token = Uuid::new_v4().simple().to_string();
        let Some(scratch) = path::scratch_path(path, &token) else {
            return Ok(());
        };
        let scratch_root = path::scratch_root(&resolved.user, &token);

        let result = self.encrypt_via_scratch(path, &scratch, &cleartext);

        // the scratch may hold cleartext after a failure; remove it on
        // every exit path
        {
            let _guard = self.intercept.suspend();
            if let Err(e) = self.vfs.delete_tree(&scratch_root) {
                warn!(path = %scratch_root, error = %e, "could not remove encryption scratch");
            }
        }

        let ciphertext = match result {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                // hand the payload back untouched; the write itself fails
                *content = WriteContent::Bytes(cleartext);
                return Err(e);
            }
        };
        debug!(
            path,
            cleartext_len = cleartext.len(),
            ciphertext_len = ciphertext.len(),
            "payload encrypted"
        );
        *content = WriteContent::Bytes(ciphertext);
        Ok(())
    }

    fn after_read(&self, path: &str, content: Vec<u8>) -> CloakResult<Vec<u8>> {
        if !self.hooks_active() {
            return Ok(content);
        }

        if format::is_envelope(&content) {
            let _guard = self.intercept.suspend();
            let mut reader = self.engine.open_for_read(path)?;
            let mut plain = Vec::new();
            reader.read_to_end(&mut plain)?;
            return Ok(plain);
        }

        if self.bridge.can_decrypt() {
            let _guard = self.intercept.suspend();
            let record = self.vfs.get_metadata(path).ok().flatten();
            if format::is_legacy_encrypted_meta(record.as_ref(), &content) {
                if let Some(plain) = self.bridge.decrypt(&content)? {
                    debug!(path, "decrypted legacy block-format content");
                    return Ok(plain);
                }
            }
        }

        Ok(content)
    }

    fn before_delete(&self, path: &str) -> CloakResult<bool> {
        if !self.hooks_active() {
            return Ok(true);
        }
        // a trash collaborator intercepts the delete first; keys must stay
        // usable for restore
        if self.config.is_trash_enabled() {
            return Ok(true);
        }
        let Some(resolved) = path::strip_user_files(path) else {
            return Ok(true);
        };

        let _guard = self.intercept.suspend();

        // keys must not outlive the file, but a failed cleanup must never
        // block a user-initiated deletion
        match self.keystore.delete_content_key(&resolved.user, &resolved.relative) {
            Ok(true) => {}
            Ok(false) => {
                warn!(path = %resolved.relative, "content key could not be deleted");
            }
            Err(e) => {
                warn!(path = %resolved.relative, error = %e, "content key deletion failed");
            }
        }
        if let Err(e) = self
            .keystore
            .delete_all_share_keys(&resolved.user, &resolved.relative)
        {
            warn!(path = %resolved.relative, error = %e, "share key deletion failed");
        }

        Ok(true)
    }

    fn after_write(&self, path: &str) -> CloakResult<()> {
        if !self.hooks_active() {
            return Ok(());
        }
        self.coordinator.handle_file(path)
    }

    fn after_touch(&self, path: &str) -> CloakResult<()> {
        if !self.hooks_active() {
            return Ok(());
        }
        self.coordinator.handle_file(path)
    }

    fn after_open(
        &self,
        path: &str,
        handle: Box<dyn ByteStream>,
        mode: OpenMode,
    ) -> CloakResult<Box<dyn ByteStream>> {
        if !self.hooks_active() {
            return Ok(handle);
        }
        let path = path::normalize(path);

        // cache chunks and trashed files are stored as-is
        match path::classify(&path) {
            PathClass::Cache | PathClass::Trash => return Ok(handle),
            PathClass::UserFiles | PathClass::Other => {}
        }

        let head = self.probe_head(&path);
        let already_encrypted = head.as_deref().is_some_and(format::is_envelope);

        if already_encrypted {
            // close the raw ciphertext handle and let the engine do the
            // transparent decryption instead
            drop(handle);
            let _guard = self.intercept.suspend();
            return self.engine.open_stream(&path, mode);
        }

        if !mode.is_read_only() && self.policy.should_encrypt(&path, head.as_deref()) {
            drop(handle);
            let _guard = self.intercept.suspend();
            return self.engine.open_stream(&path, mode);
        }

        Ok(handle)
    }

    fn after_get_file_info(
        &self,
        path: &str,
        mut info: FileMetadataRecord,
    ) -> CloakResult<FileMetadataRecord> {
        if !self.hooks_active() {
            return Ok(info);
        }
        let _guard = self.intercept.suspend();
        info.size = self.reconciler.resolve_size(path, info.size);
        Ok(info)
    }
}
