//! Fixed-interval drivers for the periodic pipelines.
//!
//! Each job gets its own spawned loop and its own ticker, so jobs never wait
//! on each other. The time source is injected: production uses tokio
//! intervals, tests fire ticks by hand.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};

use crate::error::Result;

/// Work run on every tick.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<()>;
}

#[async_trait]
pub trait Ticker: Send {
    /// Resolves at the next tick.
    async fn tick(&mut self);
}

pub trait TimeSource: Send + Sync {
    /// A ticker whose first tick is one full period away.
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// Wall-clock ticks backed by `tokio::time::interval`. A late tick shifts
/// the following ones instead of bursting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTime;

struct IntervalTicker(Interval);

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.0.tick().await;
    }
}

impl TimeSource for TokioTime {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicker(interval))
    }
}

/// Ticks only when fired.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    tickers: Arc<Mutex<Vec<(Duration, mpsc::UnboundedSender<()>)>>>,
}

struct ManualTicker(mpsc::UnboundedReceiver<()>);

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires every live ticker created with `period`. Returns how many fired.
    pub fn fire(&self, period: Duration) -> usize {
        self.fire_where(|p| p == period)
    }

    pub fn fire_all(&self) -> usize {
        self.fire_where(|_| true)
    }

    fn fire_where(&self, matches: impl Fn(Duration) -> bool) -> usize {
        let mut tickers = self.tickers.lock();
        tickers.retain(|(_, tx)| !tx.is_closed());
        tickers
            .iter()
            .filter(|(period, _)| matches(*period))
            .filter(|(_, tx)| tx.send(()).is_ok())
            .count()
    }
}

impl TimeSource for ManualTime {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tickers.lock().push((period, tx));
        Box::new(ManualTicker(rx))
    }
}

pub struct Scheduler {
    time: Arc<dyn TimeSource>,
    jobs: Vec<(Duration, Arc<dyn Job>)>,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            time,
            jobs: Vec::new(),
            shutdown: None,
            handles: Vec::new(),
        }
    }

    pub fn every(mut self, period: Duration, job: Arc<dyn Job>) -> Self {
        self.jobs.push((period, job));
        self
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawns one loop per job. Calling it on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("scheduler already running");
            return;
        }

        let (tx, rx) = watch::channel(false);
        for (period, job) in &self.jobs {
            let ticker = self.time.ticker(*period);
            tracing::info!(job = job.name(), period_secs = period.as_secs(), "starting periodic job");
            self.handles
                .push(tokio::spawn(run_loop(Arc::clone(job), ticker, rx.clone())));
        }
        self.shutdown = Some(tx);
    }

    /// Signals every loop and waits for them. A tick in progress finishes first.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        let _ = tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "periodic job task panicked");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

async fn run_loop(job: Arc<dyn Job>, mut ticker: Box<dyn Ticker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match job.run().await {
                    Ok(()) => tracing::debug!(job = job.name(), "periodic job finished"),
                    Err(e) => tracing::error!(job = job.name(), error = %e, "periodic job failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const TEN_MIN: Duration = Duration::from_secs(600);
    const FIVE_MIN: Duration = Duration::from_secs(300);

    struct Probe {
        name: &'static str,
        fail: bool,
        runs: mpsc::UnboundedSender<&'static str>,
    }

    #[async_trait]
    impl Job for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) -> Result<()> {
            let _ = self.runs.send(self.name);
            if self.fail {
                Err(Error::transport("tick", "down"))
            } else {
                Ok(())
            }
        }
    }

    fn counting_job(
        name: &'static str,
        fail: bool,
    ) -> (Arc<dyn Job>, mpsc::UnboundedReceiver<&'static str>) {
        let (runs, rx) = mpsc::unbounded_channel();
        (Arc::new(Probe { name, fail, runs }), rx)
    }

    #[tokio::test]
    async fn manual_ticks_drive_jobs() {
        let time = ManualTime::new();
        let (job, mut runs) = counting_job("collect", false);
        let mut scheduler = Scheduler::new(Arc::new(time.clone())).every(TEN_MIN, job);
        scheduler.start();

        assert_eq!(time.fire(TEN_MIN), 1);
        assert_eq!(runs.recv().await, Some("collect"));
        assert_eq!(time.fire(TEN_MIN), 1);
        assert_eq!(runs.recv().await, Some("collect"));

        scheduler.stop().await;
        assert!(runs.try_recv().is_err());
    }

    #[tokio::test]
    async fn failing_job_stays_scheduled() {
        let time = ManualTime::new();
        let (job, mut runs) = counting_job("collect", true);
        let mut scheduler = Scheduler::new(Arc::new(time.clone())).every(TEN_MIN, job);
        scheduler.start();

        for _ in 0..3 {
            time.fire(TEN_MIN);
            assert_eq!(runs.recv().await, Some("collect"));
        }
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn timers_are_independent() {
        let time = ManualTime::new();
        let (collect, mut collect_runs) = counting_job("collect", false);
        let (dispatch, mut dispatch_runs) = counting_job("dispatch", false);
        let mut scheduler = Scheduler::new(Arc::new(time.clone()))
            .every(TEN_MIN, collect)
            .every(FIVE_MIN, dispatch);
        scheduler.start();

        time.fire(FIVE_MIN);
        assert_eq!(dispatch_runs.recv().await, Some("dispatch"));
        assert!(collect_runs.try_recv().is_err());

        assert_eq!(time.fire_all(), 2);
        assert_eq!(collect_runs.recv().await, Some("collect"));
        assert_eq!(dispatch_runs.recv().await, Some("dispatch"));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_ends_every_loop() {
        let time = ManualTime::new();
        let (job, _runs) = counting_job("collect", false);
        let mut scheduler = Scheduler::new(Arc::new(time.clone())).every(TEN_MIN, job);

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert_eq!(time.fire_all(), 0);
        // Stopping twice is harmless.
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_wins_over_a_pending_tick() {
        let time = ManualTime::new();
        let (job, mut runs) = counting_job("collect", false);
        let mut scheduler = Scheduler::new(Arc::new(time.clone())).every(TEN_MIN, job);
        scheduler.start();

        // The loop has not been polled yet: shutdown and the tick are both
        // ready on its first poll.
        assert_eq!(time.fire(TEN_MIN), 1);
        scheduler.stop().await;

        assert!(runs.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_time_waits_a_full_period_before_first_run() {
        let (job, mut runs) = counting_job("collect", false);
        let mut scheduler = Scheduler::new(Arc::new(TokioTime)).every(TEN_MIN, job);
        let started = Instant::now();
        scheduler.start();

        assert_eq!(runs.recv().await, Some("collect"));
        assert!(started.elapsed() >= TEN_MIN);
        assert_eq!(runs.recv().await, Some("collect"));
        assert!(started.elapsed() >= TEN_MIN * 2);

        scheduler.stop().await;
    }
}
