//! Worker pool lifecycle.
//!
//! [`LoadProducer::start`] spawns the workers and then parks the caller until
//! the shutdown signal fires. [`LoadProducer::stop`] triggers the signal, gives
//! workers a grace period to finish their in-flight request, aborts whatever is
//! left, and finally releases the HTTP transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::{self, Duration, Instant};
use tracing::{error, info, warn};

use crate::config::ProducerConfig;
use crate::endpoint::EndpointSet;
use crate::errors::{ConfigError, ProducerError};
use crate::executor::RequestExecutor;
use crate::load_pattern::{LoadConfig, LoadPattern};
use crate::shutdown::ShutdownSignal;
use crate::worker::{RequestEvent, Worker, WorkerSummary};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Result of the one effective call to [`LoadProducer::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited on their own within the grace period.
    pub workers_stopped: usize,
    /// Workers aborted after the grace period.
    pub workers_cancelled: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub elapsed: Duration,
}

pub struct LoadProducer {
    endpoints: Arc<EndpointSet>,
    load_config: Arc<LoadConfig>,
    executor: Arc<RequestExecutor>,
    shutdown: ShutdownSignal,
    workers: Mutex<JoinSet<WorkerSummary>>,
    events: broadcast::Sender<RequestEvent>,
    active_workers: Arc<AtomicUsize>,
    grace_period: Duration,
    started: AtomicBool,
    stopping: AtomicBool,
    stopped: AtomicBool,
}

impl LoadProducer {
    pub fn new(endpoints: EndpointSet, load_config: LoadConfig, executor: RequestExecutor) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            endpoints: Arc::new(endpoints),
            load_config: Arc::new(load_config),
            executor: Arc::new(executor),
            shutdown: ShutdownSignal::new(),
            workers: Mutex::new(JoinSet::new()),
            events,
            active_workers: Arc::new(AtomicUsize::new(0)),
            grace_period: DEFAULT_GRACE_PERIOD,
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Build endpoints, pacing and transport from a loaded configuration.
    pub fn from_config(config: &ProducerConfig) -> Result<Self, ConfigError> {
        let endpoints = EndpointSet::new(config.endpoints.clone())?;
        let executor = RequestExecutor::from_config(&config.client)?;
        Ok(Self::new(endpoints, config.load.clone(), executor).with_grace_period(config.grace_period))
    }

    /// How long `stop` waits for workers before aborting them.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Stream of per-request events. Slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Workers have been told to stop. They may still be finishing.
    pub fn is_shutdown_triggered(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// `stop` has joined every worker and released the transport.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn load_config(&self) -> &LoadConfig {
        &self.load_config
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Spawn `num_workers` workers and wait until the producer is told to stop.
    ///
    /// With a non-zero configured duration the signal is triggered here once
    /// that duration has elapsed. Returning from `start` does not tear anything
    /// down; call [`stop`](Self::stop) for that.
    pub async fn start(&self, num_workers: usize) -> Result<(), ProducerError> {
        if num_workers == 0 {
            return Err(ProducerError::NoWorkers);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ProducerError::AlreadyStarted);
        }

        {
            // Held while spawning so a concurrent `stop` sees the full pool.
            let mut workers = self.workers.lock().await;
            if self.shutdown.is_triggered() {
                return Err(ProducerError::AlreadyStopped);
            }

            self.log_start(num_workers);

            for worker_id in 0..num_workers {
                let worker = Worker {
                    worker_id,
                    endpoints: Arc::clone(&self.endpoints),
                    load_config: Arc::clone(&self.load_config),
                    executor: Arc::clone(&self.executor),
                    shutdown: self.shutdown.clone(),
                    events: self.events.clone(),
                    active_workers: Arc::clone(&self.active_workers),
                };
                workers.spawn(worker.run());
            }
        }

        match self.load_config.deadline() {
            Some(duration) => {
                tokio::select! {
                    _ = self.shutdown.wait() => {}
                    _ = time::sleep(duration) => {
                        if self.shutdown.trigger() {
                            info!(duration = ?duration, "Configured run duration elapsed");
                        }
                    }
                }
            }
            None => self.shutdown.wait().await,
        }

        Ok(())
    }

    fn log_start(&self, num_workers: usize) {
        match self.load_config.pattern() {
            LoadPattern::Constant { base_rps } => info!(
                pattern = "constant",
                base_rps = base_rps,
                workers = num_workers,
                endpoints = self.endpoints.len(),
                duration = ?self.load_config.duration(),
                "Load producer started"
            ),
            LoadPattern::Random {
                min_delay,
                max_delay,
            } => info!(
                pattern = "random",
                min_delay = ?min_delay,
                max_delay = ?max_delay,
                workers = num_workers,
                endpoints = self.endpoints.len(),
                duration = ?self.load_config.duration(),
                "Load producer started"
            ),
        }
    }

    /// Stop all workers and release the transport.
    ///
    /// Only the first call does anything; later calls return `None`. Workers
    /// still running after the grace period are aborted and joined, which is
    /// logged but not treated as an error.
    pub async fn stop(&self) -> Option<ShutdownReport> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return None;
        }

        let started_at = Instant::now();
        info!("Stopping load producer");
        self.shutdown.trigger();

        let mut workers = self.workers.lock().await;
        let mut report = ShutdownReport {
            workers_stopped: 0,
            workers_cancelled: 0,
            total_requests: 0,
            total_failures: 0,
            elapsed: Duration::ZERO,
        };

        let deadline = time::sleep(self.grace_period);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(result) => Self::account(&mut report, result),
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        remaining = workers.len(),
                        grace_period = ?self.grace_period,
                        "Workers did not stop within grace period, cancelling"
                    );
                    workers.abort_all();
                    while let Some(result) = workers.join_next().await {
                        Self::account(&mut report, result);
                    }
                    break;
                }
            }
        }
        drop(workers);

        self.executor.close();
        self.stopped.store(true, Ordering::SeqCst);

        report.elapsed = started_at.elapsed();
        info!(
            workers_stopped = report.workers_stopped,
            workers_cancelled = report.workers_cancelled,
            total_requests = report.total_requests,
            total_failures = report.total_failures,
            elapsed = ?report.elapsed,
            "Load producer stopped"
        );
        Some(report)
    }

    fn account(
        report: &mut ShutdownReport,
        result: Result<WorkerSummary, tokio::task::JoinError>,
    ) {
        match result {
            Ok(summary) => {
                report.workers_stopped += 1;
                report.total_requests += summary.requests;
                report.total_failures += summary.failures;
            }
            Err(e) if e.is_cancelled() => {
                report.workers_cancelled += 1;
            }
            Err(e) => {
                report.workers_cancelled += 1;
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}
