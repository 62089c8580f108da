use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone)]
struct ActiveRun {
    session: String,
    generation: u64,
}

/// Owns the background tasks that pump runs from runners into the log.
///
/// Every pump is tracked so shutdown can wait for in-flight runs, and is
/// registered under its run id while it is alive.
#[derive(Clone, Default)]
pub struct RunSupervisor {
    tracker: TaskTracker,
    runs: Arc<DashMap<String, ActiveRun>>,
    generation: Arc<AtomicU64>,
}

/// Removes a run from the registry when its task ends, including by panic.
struct Registration {
    runs: Arc<DashMap<String, ActiveRun>>,
    run_id: String,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.runs.remove_if(&self.run_id, |_, run| run.generation == self.generation);
    }
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, session: &str, run_id: &str, pump: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.runs.insert(
            run_id.to_string(),
            ActiveRun { session: session.to_string(), generation },
        );

        let registration =
            Registration { runs: Arc::clone(&self.runs), run_id: run_id.to_string(), generation };
        self.tracker.spawn(async move {
            let _registration = registration;
            pump.await;
        });
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }

    /// Run ids currently being pumped, with their sessions.
    pub fn active_runs(&self) -> Vec<(String, String)> {
        self.runs.iter().map(|entry| (entry.key().clone(), entry.value().session.clone())).collect()
    }

    pub fn active_count(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait for every pump to end.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Like [`shutdown`](Self::shutdown), but give up after `grace`.
    ///
    /// Returns `false` when pumps were still running at the deadline; they
    /// are left to be dropped with the runtime.
    pub async fn shutdown_within(&self, grace: Duration) -> bool {
        if tokio::time::timeout(grace, self.shutdown()).await.is_ok() {
            return true;
        }
        tracing::warn!(
            remaining = self.active_count(),
            grace_secs = grace.as_secs_f64(),
            "in-flight runs did not finish before the shutdown deadline"
        );
        false
    }
}

impl std::fmt::Debug for RunSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSupervisor").field("active", &self.runs.len()).finish()
    }
}
