use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::Method;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::endpoint::EndpointSet;
use crate::executor::{RequestExecutor, RequestOutcome, RequestStatus};
use crate::load_pattern::LoadConfig;
use crate::metrics::{
    ACTIVE_WORKERS, HTTP_REQUESTS_DURATION_SECONDS, HTTP_REQUESTS_TOTAL, REQUEST_FAILURES_TOTAL,
};
use crate::shutdown::ShutdownSignal;

/// Published once per completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub worker_id: usize,
    pub endpoint_url: String,
    pub method: Method,
    pub status_code: u16,
    pub status: RequestStatus,
    pub latency: Duration,
}

impl RequestEvent {
    fn new(worker_id: usize, outcome: RequestOutcome) -> Self {
        Self {
            worker_id,
            endpoint_url: outcome.url,
            method: outcome.method,
            status_code: outcome.status_code,
            status: outcome.status,
            latency: outcome.latency,
        }
    }
}

/// What a worker did before it stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub requests: u64,
    pub failures: u64,
}

/// Keeps the running-worker count accurate, including when the task is aborted.
struct ActiveWorkerGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveWorkerGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        ACTIVE_WORKERS.inc();
        Self { active }
    }
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        ACTIVE_WORKERS.dec();
    }
}

/// One load-generating loop: select, execute, record, wait.
pub struct Worker {
    pub worker_id: usize,
    pub endpoints: Arc<EndpointSet>,
    pub load_config: Arc<LoadConfig>,
    pub executor: Arc<RequestExecutor>,
    pub shutdown: ShutdownSignal,
    pub events: broadcast::Sender<RequestEvent>,
    pub active_workers: Arc<AtomicUsize>,
}

impl Worker {
    /// Runs until the shutdown signal is observed.
    ///
    /// The signal is checked before every request and interrupts both the
    /// wait for a connection slot and the pacing wait, so a stop never waits
    /// out a full pacing delay. A request already in flight is allowed to finish.
    pub async fn run(self) -> WorkerSummary {
        let _guard = ActiveWorkerGuard::new(Arc::clone(&self.active_workers));
        let mut summary = WorkerSummary {
            worker_id: self.worker_id,
            requests: 0,
            failures: 0,
        };

        debug!(
            worker_id = self.worker_id,
            pattern = self.load_config.pattern().name(),
            "Worker starting"
        );

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            let endpoint = self.endpoints.select();
            let outcome = match self
                .executor
                .execute_unless_shutdown(endpoint, &self.shutdown)
                .await
            {
                Some(outcome) => outcome,
                None => break,
            };

            summary.requests += 1;
            if outcome.status == RequestStatus::Failed {
                summary.failures += 1;
            }
            self.record(outcome);

            let delay = self.load_config.next_delay();
            if self.shutdown.wait_timeout(delay).await {
                break;
            }
        }

        debug!(
            worker_id = self.worker_id,
            requests = summary.requests,
            failures = summary.failures,
            "Worker stopped"
        );
        summary
    }

    fn record(&self, outcome: RequestOutcome) {
        let method = outcome.method.as_str();
        let status_code = outcome.status_code.to_string();

        HTTP_REQUESTS_TOTAL
            .with_label_values(&[&outcome.url, method, &status_code])
            .inc();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&[&outcome.url, method])
            .observe(outcome.latency.as_secs_f64());

        match outcome.status {
            RequestStatus::Success => {
                info!(
                    worker_id = self.worker_id,
                    endpoint = %outcome.url,
                    method = method,
                    status_code = outcome.status_code,
                    status = outcome.status.label(),
                    latency_ms = outcome.latency.as_millis() as u64,
                    "Request completed"
                );
            }
            RequestStatus::Failed => {
                let category = outcome
                    .error_category
                    .map_or("other_error", |c| c.label());
                REQUEST_FAILURES_TOTAL.with_label_values(&[category]).inc();
                warn!(
                    worker_id = self.worker_id,
                    endpoint = %outcome.url,
                    method = method,
                    status_code = outcome.status_code,
                    status = outcome.status.label(),
                    error_category = category,
                    latency_ms = outcome.latency.as_millis() as u64,
                    "Request failed"
                );
            }
        }

        // No subscribers is fine.
        let _ = self.events.send(RequestEvent::new(self.worker_id, outcome));
    }
}
