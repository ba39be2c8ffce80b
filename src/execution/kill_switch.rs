//! Process-wide trading halt.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::error;

/// Latching halt flag shared by the engine and every position task.
///
/// Once tripped it stays tripped for the life of the process. Position tasks
/// watch it to cancel pending submissions and force exits.
#[derive(Clone)]
pub struct KillSwitch {
    tx: Arc<watch::Sender<bool>>,
    reason: Arc<Mutex<Option<String>>>,
}

impl KillSwitch {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Trip the switch. Returns false if it was already tripped; the first
    /// reason is kept.
    pub fn trip(&self, reason: impl Into<String>) -> bool {
        let mut current = self.reason.lock();
        if current.is_some() {
            return false;
        }
        let reason = reason.into();
        error!(%reason, "Kill switch tripped, trading halted");
        *current = Some(reason);
        self.tx.send_replace(true);
        true
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// A receiver notified when the switch trips.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("reason", &self.reason())
            .finish()
    }
}
