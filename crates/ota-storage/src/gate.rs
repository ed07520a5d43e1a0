use std::time::Duration;

use ota_store::{StorageError, StoreResult};
use tokio::sync::watch;

/// Setup state of a storage instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Ready,
    Failed(String),
}

/// Gate every operation waits on until setup has finished.
///
/// Transitions: `Uninitialized → Ready | Failed`. A reset goes back to
/// `Uninitialized` so setup can run again.
#[derive(Debug)]
pub struct ReadinessGate {
    state: watch::Sender<Readiness>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Readiness::Uninitialized);
        Self { state }
    }

    pub fn state(&self) -> Readiness {
        self.state.borrow().clone()
    }

    pub fn mark_ready(&self) {
        self.state.send_replace(Readiness::Ready);
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.state.send_replace(Readiness::Failed(reason.into()));
    }

    pub fn reset(&self) {
        self.state.send_replace(Readiness::Uninitialized);
    }

    /// Wait until setup settles, at most `timeout`.
    ///
    /// Fails with `ConnectionFailed` when setup failed or did not finish in
    /// time.
    pub async fn wait(&self, timeout: Duration) -> StoreResult<()> {
        let mut rx = self.state.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != Readiness::Uninitialized),
        )
        .await;
        let state = match settled {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => {
                return Err(StorageError::connection_failed("storage gate closed"));
            }
            Err(_) => {
                return Err(StorageError::connection_failed(format!(
                    "storage was not ready within {}ms",
                    timeout.as_millis()
                )));
            }
        };
        match state {
            Readiness::Ready => Ok(()),
            Readiness::Failed(reason) => Err(StorageError::connection_failed(format!(
                "storage setup failed: {reason}"
            ))),
            Readiness::Uninitialized => Err(StorageError::connection_failed(
                "storage is not initialized",
            )),
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
