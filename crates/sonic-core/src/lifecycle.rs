//! Process-wide running flag shared by background tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// A cloneable running flag.
///
/// Background loops check [`Lifecycle::is_running`] between polls and exit
/// once [`Lifecycle::stop`] has been called from any clone.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    running: Arc<AtomicBool>,
}

impl Lifecycle {
    /// Creates a flag in the running state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns whether the flag is still set.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clears the flag. Returns `true` if this call changed it.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if was_running {
            debug!("Lifecycle stopped");
        }
        was_running
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
