//! External-system syncers and their shared runner.

mod alert_rules;
pub use alert_rules::{alert_services, AlertRuleSyncer};

mod alert_state;
pub use alert_state::{AlertStateSyncer, STATE_TRANSITION_TTL};

mod dashboards;
pub use dashboards::{DashboardSyncer, Hierarchy};

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::RwLock;
use spectre_core::{Error, Result, Timestamp};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One periodic sync against an external system
#[async_trait]
pub trait Syncer: Send + Sync + 'static {
    /// Name used in logs and status reads
    fn name(&self) -> &'static str;

    /// Tick period
    fn interval(&self) -> Duration;

    /// Run one sync
    async fn sync(&self, now: Timestamp) -> Result<SyncStats>;
}

/// What one sync run touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entities examined
    pub seen: usize,
    /// Entities whose graph projection changed
    pub updated: usize,
    /// Entities skipped as unchanged
    pub unchanged: usize,
    /// Entities that failed (sync stayed alive)
    pub failed: usize,
}

/// Last-run status of one syncer, readable concurrently
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// Completion time of the last successful run
    pub last_success: Option<Timestamp>,
    /// Error text of the last failed run
    pub last_error: Option<String>,
    /// Stats of the last completed run
    pub last_stats: SyncStats,
    /// Completed runs since start
    pub runs: u64,
    /// Whether a run is in flight
    pub running: bool,
}

struct Shared {
    status: RwLock<SyncStatus>,
    trigger: tokio::sync::Notify,
}

/// Handle to a spawned syncer: status reads and manual triggers
#[derive(Clone)]
pub struct SyncHandle {
    name: &'static str,
    shared: Arc<Shared>,
    handle: Arc<tokio::task::JoinHandle<()>>,
}

impl SyncHandle {
    /// Snapshot of the last-run status
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.shared.status.read().clone()
    }

    /// Request an immediate run
    ///
    /// Only one run per syncer is ever in flight: while one is running the
    /// trigger is rejected with a busy conflict rather than queued behind it.
    pub fn trigger(&self) -> Result<()> {
        if self.shared.status.read().running {
            return Err(Error::Conflict(format!("{} sync already running", self.name)));
        }
        self.shared.trigger.notify_one();
        Ok(())
    }

    /// Wait for the runner task to exit (after cancellation)
    pub async fn join(self) {
        if let Ok(handle) = Arc::try_unwrap(self.handle) {
            let _ = handle.await;
        }
    }
}

/// Spawn a syncer on its own ticker
///
/// The first run happens on the first tick, not at spawn. Cancellation lets
/// an in-flight run finish, then the task exits.
pub fn spawn(syncer: Arc<dyn Syncer>, cancel: CancellationToken) -> SyncHandle {
    let shared = Arc::new(Shared {
        status: RwLock::new(SyncStatus::default()),
        trigger: tokio::sync::Notify::new(),
    });
    let name = syncer.name();
    let runner_shared = shared.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(syncer.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the interval fires immediately once; swallow that so the first
        // sync waits a full period (or a manual trigger)
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                () = runner_shared.trigger.notified() => {}
            }
            run_once(&*syncer, &runner_shared).await;
        }
        info!(syncer = name, "syncer stopped");
    });
    SyncHandle {
        name,
        shared,
        handle: Arc::new(handle),
    }
}

async fn run_once(syncer: &dyn Syncer, shared: &Shared) {
    shared.status.write().running = true;
    let now = Timestamp::now();
    let outcome = syncer.sync(now).await;
    let mut status = shared.status.write();
    status.running = false;
    status.runs += 1;
    match outcome {
        Ok(stats) => {
            status.last_success = Some(now);
            status.last_error = None;
            status.last_stats = stats;
        }
        Err(err) => {
            // degraded, not dead: status records the error, the ticker
            // retries on the next period
            warn!(syncer = syncer.name(), error = %err, "sync run failed");
            status.last_error = Some(err.to_string());
        }
    }
}

/// Run a syncer once outside a runner, updating nothing
///
/// Used by tests and ad-hoc invocations.
pub async fn run_now(syncer: &dyn Syncer, now: Timestamp) -> Result<SyncStats> {
    syncer.sync(now).await
}
