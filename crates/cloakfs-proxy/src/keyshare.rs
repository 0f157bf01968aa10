//! Share-key coordination after qualifying file mutations.
//!
//! When an encrypted file is touched or written, the set of users allowed
//! to read it may have changed. The coordinator recomputes that set and
//! asks the key store to make a wrapped share key exist for exactly those
//! recipients. Stale wraps are the key store's own pruning concern.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use cloakfs_core::collaborators::{KeyStore, ShareRegistry};
use cloakfs_core::error::CloakResult;
use cloakfs_core::path;

use crate::guard::InterceptState;
use crate::sizefix::SizeReconciler;

pub struct KeyShareCoordinator {
    keystore: Arc<dyn KeyStore>,
    registry: Arc<dyn ShareRegistry>,
    reconciler: Arc<SizeReconciler>,
    intercept: InterceptState,
}

impl KeyShareCoordinator {
    pub fn new(
        keystore: Arc<dyn KeyStore>,
        registry: Arc<dyn ShareRegistry>,
        reconciler: Arc<SizeReconciler>,
        intercept: InterceptState,
    ) -> Self {
        Self {
            keystore,
            registry,
            reconciler,
            intercept,
        }
    }

    /// Re-wrap share keys for `path` if it is an encrypted file in a user's
    /// files area. A no-op everywhere else.
    pub fn handle_file(&self, path: &str) -> CloakResult<()> {
        let _guard = self.intercept.suspend();

        let Some(resolved) = path::strip_user_files(path) else {
            return Ok(());
        };

        if !self.reconciler.fix_file_size(path) {
            return Ok(());
        }

        let mut recipients: BTreeSet<String> = if self.registry.is_sharing_enabled() {
            self.registry.authorized_users(&resolved.relative)?
        } else {
            BTreeSet::new()
        };
        // the owner always holds a wrap of their own content key
        recipients.insert(resolved.user.clone());

        debug!(
            path,
            owner = %resolved.user,
            recipients = recipients.len(),
            "ensuring share keys"
        );
        self.keystore
            .ensure_share_keys(&resolved.user, &resolved.relative, &recipients)
    }
}
