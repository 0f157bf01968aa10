//! cloakfs-proxy: transparent file-encryption interception
//!
//! Sits between application callers and a virtual filesystem: callers
//! read/write/delete/stat files exactly as before, while this layer
//! encrypts content on write, decrypts on read, and keeps cleartext-size
//! metadata consistent with ciphertext-size reality.
//!
//! ```text
//! caller ── fs operation ──► host filesystem
//!                               │  pre/post hook (FileProxy)
//!                               ▼
//!                        EncryptionProxy
//!                          │ policy: should this path encrypt?
//!                          │ format: envelope / legacy / plaintext?
//!                          ├─► SizeReconciler      (cleartext-size repair)
//!                          ├─► KeyShareCoordinator (share-key re-wrap)
//!                          └─► LegacyDecryptionBridge
//! ```
//!
//! Hooks that perform internal filesystem calls suspend interception via a
//! scoped guard first, so those calls cannot re-trigger the hooks.

pub mod format;
pub mod guard;
pub mod keyshare;
pub mod legacy;
pub mod policy;
pub mod proxy;
pub mod sizefix;

pub use guard::{InterceptState, SuspendGuard};
pub use keyshare::KeyShareCoordinator;
pub use legacy::LegacyDecryptionBridge;
pub use policy::EncryptionPolicy;
pub use proxy::{EncryptionProxy, FileProxy, WriteContent};
pub use sizefix::SizeReconciler;
