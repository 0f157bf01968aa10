//! In-memory collaborator fakes shared by the integration suites.
//!
//! The fake engine's "envelope" is the real magic marker followed by an
//! XOR-obfuscated body. That is enough for the layer under test: it is
//! detectable, it is not the plaintext, and its cleartext length is
//! measurable. It is not a cipher and does not pretend to be one.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cloakfs_core::collaborators::{
    ByteStream, Configuration, CryptoEngine, KeyStore, LegacyKey, OpenMode, SessionStore,
    ShareRegistry, VirtualFilesystem,
};
use cloakfs_core::config::EncryptionConfig;
use cloakfs_core::error::{CloakError, CloakResult};
use cloakfs_core::types::{EncryptionMode, FileMetadataRecord, MigrationStatus};
use cloakfs_proxy::format::ENVELOPE_MAGIC;
use cloakfs_proxy::proxy::{EncryptionProxy, FileProxy, WriteContent};

const OBFUSCATION_BYTE: u8 = 0x2a;

pub fn encode_envelope(cleartext: &[u8]) -> Vec<u8> {
    let mut out = ENVELOPE_MAGIC.to_vec();
    out.extend(cleartext.iter().map(|b| b ^ OBFUSCATION_BYTE));
    out
}

pub fn decode_envelope(raw: &[u8]) -> Option<Vec<u8>> {
    raw.strip_prefix(ENVELOPE_MAGIC)
        .map(|body| body.iter().map(|b| b ^ OBFUSCATION_BYTE).collect())
}

pub fn encode_legacy(cleartext: &[u8], key: &[u8]) -> Vec<u8> {
    xor_with_key(cleartext, key)
}

fn xor_with_key(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

// ── Configuration ─────────────────────────────────────────────────────────

/// Mutable configuration fake; migration status and friends can be flipped
/// mid-test.
pub struct TestConfig {
    inner: Mutex<EncryptionConfig>,
}

impl TestConfig {
    /// Fully active layer: enabled, server-side, migrated.
    pub fn active() -> Self {
        Self::new(EncryptionConfig {
            enabled: true,
            mode: EncryptionMode::ServerSide,
            type_blacklist: "avi,mkv".into(),
            migration_status: MigrationStatus::Completed,
            ..Default::default()
        })
    }

    pub fn new(config: EncryptionConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().unwrap().enabled = enabled;
    }

    pub fn set_mode(&self, mode: EncryptionMode) {
        self.inner.lock().unwrap().mode = mode;
    }

    pub fn set_migration_status(&self, status: MigrationStatus) {
        self.inner.lock().unwrap().migration_status = status;
    }

    pub fn set_trash_enabled(&self, enabled: bool) {
        self.inner.lock().unwrap().trash_enabled = enabled;
    }
}

impl Configuration for TestConfig {
    fn is_feature_enabled(&self) -> bool {
        self.inner.lock().unwrap().is_feature_enabled()
    }

    fn encryption_mode(&self) -> EncryptionMode {
        self.inner.lock().unwrap().encryption_mode()
    }

    fn extension_blacklist(&self) -> Vec<String> {
        self.inner.lock().unwrap().extension_blacklist()
    }

    fn migration_status(&self) -> MigrationStatus {
        self.inner.lock().unwrap().migration_status()
    }

    fn is_trash_enabled(&self) -> bool {
        self.inner.lock().unwrap().is_trash_enabled()
    }

    fn partial_upload_patterns(&self) -> Vec<String> {
        self.inner.lock().unwrap().partial_upload_patterns()
    }
}

// ── Virtual filesystem ────────────────────────────────────────────────────

#[derive(Default)]
struct HostState {
    files: BTreeMap<String, Vec<u8>>,
    metadata: BTreeMap<String, FileMetadataRecord>,
    directories: BTreeSet<String>,
}

/// In-memory host filesystem. Cloning yields a handle to the same state.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), data.to_vec());
    }

    pub fn insert_dir(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .directories
            .insert(path.to_string());
    }

    pub fn raw(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    pub fn metadata_of(&self, path: &str) -> Option<FileMetadataRecord> {
        self.state.lock().unwrap().metadata.get(path).cloned()
    }

    pub fn set_metadata(&self, path: &str, record: FileMetadataRecord) {
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(path.to_string(), record);
    }

    /// Paths of everything currently stored, for scratch-leak assertions.
    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    // Host-side operations, dispatching through the proxy hooks the way the
    // host filesystem would.

    pub fn write_through(
        &self,
        proxy: &EncryptionProxy,
        path: &str,
        data: &[u8],
    ) -> CloakResult<()> {
        let mut content = WriteContent::Bytes(data.to_vec());
        proxy.before_write(path, &mut content)?;
        let WriteContent::Bytes(payload) = content else {
            return Err(CloakError::Filesystem("stream payload in byte write".into()));
        };
        {
            let mut state = self.state.lock().unwrap();
            let len = payload.len() as u64;
            state.files.insert(path.to_string(), payload);
            let record = state
                .metadata
                .entry(path.to_string())
                .or_insert_with(|| FileMetadataRecord::new(path));
            record.size = len;
        }
        proxy.after_write(path)
    }

    pub fn read_through(&self, proxy: &EncryptionProxy, path: &str) -> CloakResult<Vec<u8>> {
        let raw = self
            .raw(path)
            .ok_or_else(|| CloakError::Filesystem(format!("no such file: {path}")))?;
        proxy.after_read(path, raw)
    }

    pub fn delete_through(&self, proxy: &EncryptionProxy, path: &str) -> CloakResult<bool> {
        let allow = proxy.before_delete(path)?;
        if allow {
            let mut state = self.state.lock().unwrap();
            state.files.remove(path);
            state.metadata.remove(path);
        }
        Ok(allow)
    }

    pub fn stat_through(
        &self,
        proxy: &EncryptionProxy,
        path: &str,
    ) -> CloakResult<FileMetadataRecord> {
        let record = self
            .metadata_of(path)
            .ok_or_else(|| CloakError::Filesystem(format!("no metadata: {path}")))?;
        proxy.after_get_file_info(path, record)
    }

    pub fn open_through(
        &self,
        proxy: &EncryptionProxy,
        path: &str,
        mode: OpenMode,
    ) -> CloakResult<Box<dyn ByteStream>> {
        // the host resolves its own path before handing out a handle
        let normalized = cloakfs_core::path::normalize(path);
        let handle = Box::new(RawHandle::open(self.clone(), &normalized, mode));
        proxy.after_open(path, handle, mode)
    }
}

impl VirtualFilesystem for MemoryHost {
    fn read(&self, path: &str) -> CloakResult<Vec<u8>> {
        self.raw(path)
            .ok_or_else(|| CloakError::Filesystem(format!("no such file: {path}")))
    }

    fn get_metadata(&self, path: &str) -> CloakResult<Option<FileMetadataRecord>> {
        Ok(self.metadata_of(path))
    }

    fn put_metadata(&self, path: &str, record: &FileMetadataRecord) -> CloakResult<()> {
        self.set_metadata(path, record.clone());
        Ok(())
    }

    fn is_directory(&self, path: &str) -> bool {
        self.state.lock().unwrap().directories.contains(path)
    }

    fn delete_tree(&self, path: &str) -> CloakResult<()> {
        let prefix = format!("{path}/");
        let mut state = self.state.lock().unwrap();
        state
            .files
            .retain(|p, _| p.as_str() != path && !p.starts_with(&prefix));
        state
            .metadata
            .retain(|p, _| p.as_str() != path && !p.starts_with(&prefix));
        state
            .directories
            .retain(|p| p.as_str() != path && !p.starts_with(&prefix));
        Ok(())
    }
}

/// The handle the host filesystem would hand out before hooks run: a plain
/// view of the raw stored bytes. Writes land unencrypted on drop.
pub struct RawHandle {
    host: MemoryHost,
    path: String,
    reader: Cursor<Vec<u8>>,
    write_buf: Vec<u8>,
    dirty: bool,
}

impl RawHandle {
    pub fn open(host: MemoryHost, path: &str, _mode: OpenMode) -> Self {
        let existing = host.raw(path).unwrap_or_default();
        Self {
            host,
            path: path.to_string(),
            reader: Cursor::new(existing),
            write_buf: Vec::new(),
            dirty: false,
        }
    }
}

impl Read for RawHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for RawHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.dirty {
            self.host.insert_raw(&self.path, &self.write_buf);
        }
        Ok(())
    }
}

impl Drop for RawHandle {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

// ── Crypto engine ─────────────────────────────────────────────────────────

/// Envelope codec over the shared in-memory host.
pub struct FakeEngine {
    host: MemoryHost,
    fail_open: AtomicBool,
}

impl FakeEngine {
    pub fn new(host: MemoryHost) -> Self {
        Self {
            host,
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn fail_next_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

impl CryptoEngine for FakeEngine {
    fn open_stream(&self, path: &str, _mode: OpenMode) -> CloakResult<Box<dyn ByteStream>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CloakError::Crypto(format!("cannot open stream: {path}")));
        }
        let existing = self.host.raw(path).unwrap_or_default();
        let cleartext = decode_envelope(&existing).unwrap_or(existing);
        Ok(Box::new(EngineStream {
            host: self.host.clone(),
            path: path.to_string(),
            reader: Cursor::new(cleartext),
            write_buf: Vec::new(),
            dirty: false,
        }))
    }

    fn measure_cleartext_length(&self, path: &str) -> CloakResult<Option<u64>> {
        match self.host.raw(path) {
            Some(raw) => Ok(decode_envelope(&raw).map(|c| c.len() as u64)),
            None => Ok(None),
        }
    }

    fn legacy_decrypt(&self, data: &[u8], key: &LegacyKey) -> CloakResult<Vec<u8>> {
        Ok(xor_with_key(data, key.as_bytes()))
    }
}

/// Stream through the fake envelope codec: reads yield cleartext, writes
/// are enveloped and stored on flush/drop.
struct EngineStream {
    host: MemoryHost,
    path: String,
    reader: Cursor<Vec<u8>>,
    write_buf: Vec<u8>,
    dirty: bool,
}

impl Read for EngineStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for EngineStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.dirty {
            self.host
                .insert_raw(&self.path, &encode_envelope(&self.write_buf));
        }
        Ok(())
    }
}

impl Drop for EngineStream {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

// ── Key store ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct KeyStoreState {
    content_keys: BTreeSet<(String, String)>,
    share_keys: BTreeMap<(String, String), BTreeSet<String>>,
}

#[derive(Default)]
pub struct FakeKeyStore {
    state: Mutex<KeyStoreState>,
    fail_content_delete: AtomicBool,
}

impl FakeKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_content_key(&self, owner: &str, path: &str) {
        self.state
            .lock()
            .unwrap()
            .content_keys
            .insert((owner.to_string(), path.to_string()));
    }

    pub fn insert_share_keys(&self, owner: &str, path: &str, users: &[&str]) {
        self.state.lock().unwrap().share_keys.insert(
            (owner.to_string(), path.to_string()),
            users.iter().map(|u| u.to_string()).collect(),
        );
    }

    pub fn has_content_key(&self, owner: &str, path: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .content_keys
            .contains(&(owner.to_string(), path.to_string()))
    }

    pub fn share_keys_for(&self, owner: &str, path: &str) -> Option<BTreeSet<String>> {
        self.state
            .lock()
            .unwrap()
            .share_keys
            .get(&(owner.to_string(), path.to_string()))
            .cloned()
    }

    pub fn fail_content_delete(&self, fail: bool) {
        self.fail_content_delete.store(fail, Ordering::SeqCst);
    }
}

impl KeyStore for FakeKeyStore {
    fn delete_content_key(&self, owner: &str, path: &str) -> CloakResult<bool> {
        if self.fail_content_delete.load(Ordering::SeqCst) {
            return Err(CloakError::KeyStore("content key backend unavailable".into()));
        }
        self.state
            .lock()
            .unwrap()
            .content_keys
            .remove(&(owner.to_string(), path.to_string()));
        Ok(true)
    }

    fn delete_all_share_keys(&self, owner: &str, path: &str) -> CloakResult<()> {
        self.state
            .lock()
            .unwrap()
            .share_keys
            .remove(&(owner.to_string(), path.to_string()));
        Ok(())
    }

    fn ensure_share_keys(
        &self,
        owner: &str,
        path: &str,
        recipients: &BTreeSet<String>,
    ) -> CloakResult<()> {
        self.state.lock().unwrap().share_keys.insert(
            (owner.to_string(), path.to_string()),
            recipients.clone(),
        );
        Ok(())
    }
}

// ── Share registry ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeShareRegistry {
    enabled: AtomicBool,
    shares: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl FakeShareRegistry {
    pub fn new() -> Self {
        let registry = Self::default();
        registry.enabled.store(true, Ordering::SeqCst);
        registry
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn share(&self, rel_path: &str, users: &[&str]) {
        self.shares.lock().unwrap().insert(
            rel_path.to_string(),
            users.iter().map(|u| u.to_string()).collect(),
        );
    }
}

impl ShareRegistry for FakeShareRegistry {
    fn is_sharing_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn authorized_users(&self, owner_rel_path: &str) -> CloakResult<BTreeSet<String>> {
        Ok(self
            .shares
            .lock()
            .unwrap()
            .get(owner_rel_path)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Session store ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSession {
    legacy_key: Mutex<Option<Vec<u8>>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_legacy_key(&self, key: Option<Vec<u8>>) {
        *self.legacy_key.lock().unwrap() = key;
    }
}

impl SessionStore for FakeSession {
    fn has_legacy_key(&self) -> bool {
        self.legacy_key.lock().unwrap().is_some()
    }

    fn legacy_key(&self) -> Option<LegacyKey> {
        self.legacy_key.lock().unwrap().clone().map(LegacyKey::new)
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────

pub struct TestEnv {
    pub config: Arc<TestConfig>,
    pub host: MemoryHost,
    pub engine: Arc<FakeEngine>,
    pub keystore: Arc<FakeKeyStore>,
    pub registry: Arc<FakeShareRegistry>,
    pub session: Arc<FakeSession>,
    pub proxy: EncryptionProxy,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(TestConfig::active())
    }

    pub fn with_config(config: TestConfig) -> Self {
        let config = Arc::new(config);
        let host = MemoryHost::new();
        let engine = Arc::new(FakeEngine::new(host.clone()));
        let keystore = Arc::new(FakeKeyStore::new());
        let registry = Arc::new(FakeShareRegistry::new());
        let session = Arc::new(FakeSession::new());
        let proxy = EncryptionProxy::new(
            Arc::clone(&config) as Arc<dyn Configuration>,
            Arc::clone(&engine) as Arc<dyn CryptoEngine>,
            Arc::new(host.clone()) as Arc<dyn VirtualFilesystem>,
            Arc::clone(&keystore) as Arc<dyn KeyStore>,
            Arc::clone(&registry) as Arc<dyn ShareRegistry>,
            Arc::clone(&session) as Arc<dyn SessionStore>,
        );
        Self {
            config,
            host,
            engine,
            keystore,
            registry,
            session,
            proxy,
        }
    }
}
