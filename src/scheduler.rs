//! RecurringTask - Cancellable Interval Loop
//!
//! ## Responsibilities
//!
//! - Run an async job every `period` on a spawned tokio task
//! - Stop before the next tick; a tick in flight runs to completion
//! - Reschedule under a new period without a gap in ownership

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Job run on every tick
pub type TaskJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Running {
    period: Duration,
    job: TaskJob,
    stop_tx: oneshot::Sender<()>,
}

/// Recurring task with start / stop / reschedule
pub struct RecurringTask {
    name: &'static str,
    running: Mutex<Option<Running>>,
}

impl RecurringTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Current period, if running
    pub fn period(&self) -> Option<Duration> {
        self.running.lock().as_ref().map(|r| r.period)
    }

    /// Start ticking; the first tick fires one period from now.
    ///
    /// Returns `false` if already running.
    pub fn start(&self, period: Duration, job: TaskJob) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::debug!(task = self.name, "Recurring task already running");
            return false;
        }
        *running = Some(spawn_loop(self.name, period, job));
        tracing::debug!(task = self.name, period_ms = period.as_millis() as u64, "Recurring task started");
        true
    }

    /// Stop ticking. Returns `false` if not running.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(r) => {
                let _ = r.stop_tx.send(());
                tracing::debug!(task = self.name, "Recurring task stopped");
                true
            }
            None => false,
        }
    }

    /// Restart under `period` if running. Returns whether a restart happened.
    pub fn reschedule(&self, period: Duration) -> bool {
        let mut running = self.running.lock();
        match running.take() {
            Some(r) => {
                let _ = r.stop_tx.send(());
                *running = Some(spawn_loop(self.name, period, r.job));
                tracing::debug!(task = self.name, period_ms = period.as_millis() as u64, "Recurring task rescheduled");
                true
            }
            None => false,
        }
    }

    /// Swap the job and restart the current period. Returns `false` if not running.
    pub fn replace_job(&self, job: TaskJob) -> bool {
        let mut running = self.running.lock();
        match running.take() {
            Some(r) => {
                let _ = r.stop_tx.send(());
                *running = Some(spawn_loop(self.name, r.period, job));
                true
            }
            None => false,
        }
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_loop(name: &'static str, period: Duration, job: TaskJob) -> Running {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let loop_job = job.clone();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => (loop_job)().await,
            }
        }

        tracing::trace!(task = name, "Recurring task loop exited");
    });

    Running {
        period,
        job,
        stop_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> TaskJob {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(task.start(Duration::from_millis(1000), counting_job(count.clone())));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_returns_false() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(task.start(Duration::from_millis(1000), counting_job(count.clone())));
        assert!(!task.start(Duration::from_millis(1000), counting_job(count.clone())));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_next_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        task.start(Duration::from_millis(1000), counting_job(count.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(task.stop());
        assert!(!task.stop());
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_uses_new_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(!task.reschedule(Duration::from_millis(2000)));

        task.start(Duration::from_millis(1000), counting_job(count.clone()));
        assert!(task.reschedule(Duration::from_millis(5000)));
        assert_eq!(task.period(), Some(Duration::from_millis(5000)));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_job() {
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(!task.replace_job(counting_job(new.clone())));

        task.start(Duration::from_millis(1000), counting_job(old.clone()));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(task.replace_job(counting_job(new.clone())));

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(old.load(Ordering::SeqCst), 1);
        assert_eq!(new.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_completes_after_stop() {
        let finished = Arc::new(AtomicUsize::new(0));
        let job_finished = finished.clone();
        let job: TaskJob = Arc::new(move || {
            let finished = job_finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        let task = RecurringTask::new("test");
        task.start(Duration::from_millis(1000), job);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        task.stop();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
