//! Re-entrancy guard for hook execution.
//!
//! Hooks that perform internal filesystem calls must not re-trigger
//! themselves. The shared flag is suspended through a scope guard whose
//! `Drop` restores the captured prior value, so a hook that returns early
//! or panics cannot leave interception permanently disabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interception on/off flag. Cloning yields a handle to the same
/// flag.
#[derive(Debug, Clone)]
pub struct InterceptState {
    enabled: Arc<AtomicBool>,
}

impl InterceptState {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn interception off for the lifetime of the returned guard. The
    /// prior value is captured and restored when the guard drops, so nested
    /// suspensions compose.
    pub fn suspend(&self) -> SuspendGuard {
        let prev = self.enabled.swap(false, Ordering::SeqCst);
        SuspendGuard {
            enabled: Arc::clone(&self.enabled),
            prev,
        }
    }
}

impl Default for InterceptState {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "interception resumes when the guard drops"]
pub struct SuspendGuard {
    enabled: Arc<AtomicBool>,
    prev: bool,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.enabled.store(self.prev, Ordering::SeqCst);
    }
}
