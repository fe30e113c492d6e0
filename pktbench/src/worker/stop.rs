use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Cooperative stop flag shared by every worker of a run.
///
/// Workers check it once per iteration with a single relaxed load, so polling
/// never touches a lock. Async code that stops through a [`CancellationToken`]
/// links the two with [`StopSignal::follow`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    /// Returns a signal that is raised once `token` is cancelled.
    ///
    /// Spawns a task on the current tokio runtime.
    pub fn follow(token: &CancellationToken) -> Self {
        let stop = StopSignal::new();
        let flag = stop.clone();
        let token = token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            flag.cancel();
        });
        stop
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
