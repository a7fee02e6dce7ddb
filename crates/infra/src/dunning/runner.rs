//! Interval runner for the dunning sweep.
//!
//! Daily cadence by default, with a manual trigger hook (used by the HTTP
//! cron endpoint wiring in dev) and graceful shutdown. Failures never stop
//! the runner: the sweep isolates and counts them itself.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::info;

use super::sweep::SweepReport;

/// Something that can execute one sweep pass.
///
/// Keeps the runner decoupled from the sweep's generic parameters.
pub trait SweepTask: Send + Sync {
    fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport;
}

impl<S, B, IS, CS, Cat> SweepTask for super::sweep::DunningSweep<S, B, IS, CS, Cat>
where
    S: crate::event_store::EventStore,
    B: facturier_events::EventBus<facturier_events::EventEnvelope<serde_json::Value>>,
    IS: crate::read_model::AccountStore<
            facturier_billing::InvoiceId,
            crate::projections::InvoiceReadModel,
        >,
    CS: crate::read_model::AccountStore<
            facturier_clients::ClientId,
            crate::projections::ClientReadModel,
        >,
    Cat: facturier_plans::PlanCatalog,
{
    fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.run(now)
    }
}

/// Config for the dunning runner.
#[derive(Debug, Clone)]
pub struct DunningRunner {
    pub interval: Duration,
}

impl Default for DunningRunner {
    fn default() -> Self {
        Self {
            // Daily in the reference deployment.
            interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Handle for the running sweep thread (shutdown + trigger hook).
#[derive(Debug)]
pub struct DunningRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl DunningRunnerHandle {
    /// Request an out-of-schedule sweep pass.
    ///
    /// Triggers are coalesced (bounded queue); if a pass is already pending
    /// this becomes a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Gracefully stop the runner thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl DunningRunner {
    /// Spawn the sweep loop on a dedicated thread.
    pub fn spawn<T>(&self, name: &'static str, task: Arc<T>) -> DunningRunnerHandle
    where
        T: SweepTask + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let interval = self.interval;
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner_loop(name, interval, shutdown_rx, trigger_rx, task))
            .expect("failed to spawn dunning runner thread");

        DunningRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

fn runner_loop<T>(
    name: &'static str,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    task: Arc<T>,
) where
    T: SweepTask + 'static,
{
    info!(runner = name, "dunning runner started");

    let mut next_tick = Instant::now() + interval;
    let mut pending = false;

    loop {
        // Shutdown has priority.
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            // Keep a stable cadence even if we were delayed.
            while next_tick <= now {
                next_tick += interval;
            }
        }

        // Manual trigger: non-blocking drain to coalesce multiple triggers.
        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;
        let report = task.run_sweep(Utc::now());
        info!(
            runner = name,
            sent = report.total_sent(),
            skipped = report.skipped,
            errored = report.errored,
            "scheduled dunning sweep completed"
        );
    }

    info!(runner = name, "dunning runner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTask {
        runs: AtomicU32,
    }

    impl SweepTask for CountingTask {
        fn run_sweep(&self, _now: DateTime<Utc>) -> SweepReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            SweepReport::default()
        }
    }

    #[test]
    fn trigger_runs_a_pass_and_shutdown_stops_the_thread() {
        let task = Arc::new(CountingTask {
            runs: AtomicU32::new(0),
        });
        let runner = DunningRunner {
            interval: Duration::from_secs(3600),
        };
        let handle = runner.spawn("dunning.test", task.clone());

        handle.trigger();
        // Give the runner thread time to pick up the trigger.
        let deadline = Instant::now() + Duration::from_secs(2);
        while task.runs.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        handle.shutdown();
    }
}
