//! Interval-driven background sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::intake::DocumentIntake;
use super::notify::Notifier;
use super::repository::LendingStore;
use super::service::LendingService;
use super::sweeps::SweepKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub npa_interval: Duration,
    pub reminder_interval: Duration,
    pub collateral_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            npa_interval: Duration::from_secs(60),
            reminder_interval: Duration::from_secs(24 * 60 * 60),
            collateral_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self, kind: SweepKind) -> Duration {
        match kind {
            SweepKind::Npa => self.npa_interval,
            SweepKind::Reminders => self.reminder_interval,
            SweepKind::CollateralExpiry => self.collateral_interval,
        }
    }
}

/// Running sweeper tasks. Dropping the handle without [`shutdown`](Self::shutdown) leaves the
/// tasks running until the runtime stops.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every sweeper and wait for in-flight iterations to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "sweeper task ended abnormally");
            }
        }
        info!("background sweepers stopped");
    }
}

/// Spawn one task per sweep. Each waits a full interval before its first run, and runs the sweep
/// body on the blocking pool since the store is synchronous.
pub fn spawn<S, N, D>(
    service: Arc<LendingService<S, N, D>>,
    config: &SchedulerConfig,
) -> SchedulerHandle
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let (stop, stopped) = watch::channel(false);
    let tasks = if config.enabled {
        SweepKind::ALL
            .into_iter()
            .map(|kind| {
                tokio::spawn(run_sweeper(
                    Arc::clone(&service),
                    kind,
                    config.interval(kind),
                    stopped.clone(),
                ))
            })
            .collect()
    } else {
        info!("background sweepers disabled");
        Vec::new()
    };
    SchedulerHandle { stop, tasks }
}

async fn run_sweeper<S, N, D>(
    service: Arc<LendingService<S, N, D>>,
    kind: SweepKind,
    period: Duration,
    mut stopped: watch::Receiver<bool>,
) where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately; the first sweep belongs one period after start.
    ticker.tick().await;
    info!(sweep = kind.label(), ?period, "sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stopped.changed() => {
                if changed.is_err() || *stopped.borrow() {
                    break;
                }
                continue;
            }
        }

        let worker = Arc::clone(&service);
        let outcome =
            tokio::task::spawn_blocking(move || worker.run_sweep(kind, Utc::now())).await;
        match outcome {
            Ok(Ok(summary)) => debug!(sweep = kind.label(), %summary, "sweep finished"),
            Ok(Err(err)) => warn!(
                sweep = kind.label(),
                error = %err,
                "sweep iteration failed; retrying next tick"
            ),
            Err(err) => error!(sweep = kind.label(), error = %err, "sweep worker panicked"),
        }
    }
    debug!(sweep = kind.label(), "sweeper exiting");
}
