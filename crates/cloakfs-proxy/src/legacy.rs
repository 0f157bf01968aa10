//! Compatibility bridge for content written before the envelope format
//! existed. Such files can only be decrypted with a legacy key held in the
//! active session.

use std::sync::Arc;

use cloakfs_core::collaborators::{CryptoEngine, SessionStore};
use cloakfs_core::error::CloakResult;

pub struct LegacyDecryptionBridge {
    engine: Arc<dyn CryptoEngine>,
    session: Arc<dyn SessionStore>,
}

impl LegacyDecryptionBridge {
    pub fn new(engine: Arc<dyn CryptoEngine>, session: Arc<dyn SessionStore>) -> Self {
        Self { engine, session }
    }

    pub fn can_decrypt(&self) -> bool {
        self.session.has_legacy_key()
    }

    /// Decrypt legacy block-format content. `None` when the session holds
    /// no legacy key.
    pub fn decrypt(&self, content: &[u8]) -> CloakResult<Option<Vec<u8>>> {
        let Some(key) = self.session.legacy_key() else {
            return Ok(None);
        };
        self.engine.legacy_decrypt(content, &key).map(Some)
    }
}
