//! Single-request execution against the shared HTTP transport.
//!
//! [`RequestExecutor::execute`] never fails: anything that goes wrong at the
//! transport level is folded into a [`RequestOutcome`] with
//! [`RequestStatus::Failed`] and the [`FAILED_STATUS_CODE`] sentinel. HTTP
//! error responses (4xx/5xx) are transport successes and keep their real code.

use reqwest::Method;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::client::{build_client, ClientConfig};
use crate::endpoint::Endpoint;
use crate::errors::{ConfigError, ErrorCategory};
use crate::metrics::INFLIGHT_REQUESTS;
use crate::shutdown::ShutdownSignal;

/// Status code reported when no HTTP response was obtained.
pub const FAILED_STATUS_CODE: u16 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// The server answered, whatever the status code.
    Success,
    /// No usable response: connection error, timeout, broken body.
    Failed,
}

impl RequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Success => "SUCCESS",
            RequestStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized result of one request attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub url: String,
    pub method: Method,
    pub status_code: u16,
    pub status: RequestStatus,
    pub latency: Duration,
    /// Set for failed requests and for 4xx/5xx responses.
    pub error_category: Option<ErrorCategory>,
}

impl RequestOutcome {
    fn success(endpoint: &Endpoint, status_code: u16, latency: Duration) -> Self {
        Self {
            url: endpoint.url.clone(),
            method: endpoint.method.clone(),
            status_code,
            status: RequestStatus::Success,
            latency,
            error_category: ErrorCategory::from_status_code(status_code),
        }
    }

    fn failed(endpoint: &Endpoint, category: ErrorCategory, latency: Duration) -> Self {
        Self {
            url: endpoint.url.clone(),
            method: endpoint.method.clone(),
            status_code: FAILED_STATUS_CODE,
            status: RequestStatus::Failed,
            latency,
            error_category: Some(category),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }
}

/// Decrements the in-flight gauge even if the request future is dropped.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        INFLIGHT_REQUESTS.inc();
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        INFLIGHT_REQUESTS.dec();
    }
}

/// Issues requests on behalf of every worker of a producer.
///
/// Safe to share behind an `Arc`; the reqwest client owns its own pool
/// synchronization and the semaphore enforces the connection ceiling.
pub struct RequestExecutor {
    client: Mutex<Option<reqwest::Client>>,
    connection_limit: Semaphore,
    max_connections: usize,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

impl RequestExecutor {
    pub fn new(client: reqwest::Client, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            client: Mutex::new(Some(client)),
            connection_limit: Semaphore::new(max_connections),
            max_connections,
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Build the client from `config` and wrap it.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = build_client(config)?;
        Ok(Self::new(client, config.pool.max_connections))
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Requests currently holding a connection slot.
    pub fn in_flight(&self) -> usize {
        self.max_connections - self.connection_limit.available_permits()
    }

    fn client(&self) -> Option<reqwest::Client> {
        let guard = self.client.lock().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }

    /// Execute one request against `endpoint` using its method and timeout.
    pub async fn execute(&self, endpoint: &Endpoint) -> RequestOutcome {
        let start = Instant::now();

        match self.connection_limit.acquire().await {
            Ok(permit) => self.send(endpoint, start, permit).await,
            Err(_) => RequestOutcome::failed(endpoint, ErrorCategory::OtherError, start.elapsed()),
        }
    }

    /// Like [`execute`](Self::execute), but returns `None` without sending
    /// anything if `shutdown` fires before a connection slot is obtained.
    pub async fn execute_unless_shutdown(
        &self,
        endpoint: &Endpoint,
        shutdown: &ShutdownSignal,
    ) -> Option<RequestOutcome> {
        let start = Instant::now();

        let acquired = tokio::select! {
            biased;
            _ = shutdown.wait() => return None,
            acquired = self.connection_limit.acquire() => acquired,
        };
        // Both may have become ready in the same poll.
        if shutdown.is_triggered() {
            return None;
        }

        match acquired {
            Ok(permit) => Some(self.send(endpoint, start, permit).await),
            Err(_) => Some(RequestOutcome::failed(
                endpoint,
                ErrorCategory::OtherError,
                start.elapsed(),
            )),
        }
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        start: Instant,
        _permit: SemaphorePermit<'_>,
    ) -> RequestOutcome {
        let client = match self.client() {
            Some(client) => client,
            None => {
                return RequestOutcome::failed(endpoint, ErrorCategory::OtherError, start.elapsed())
            }
        };

        let _inflight = InflightGuard::new();
        let result = client
            .request(endpoint.method.clone(), &endpoint.url)
            .timeout(endpoint.timeout)
            .send()
            .await;

        match result {
            Ok(mut response) => {
                let status_code = response.status().as_u16();

                // Drain the body so the connection goes back to the pool.
                loop {
                    match response.chunk().await {
                        Ok(Some(_chunk)) => {}
                        Ok(None) => break,
                        Err(e) => {
                            let category = ErrorCategory::from_reqwest_error(&e);
                            debug!(
                                url = %endpoint.url,
                                status_code = status_code,
                                error = %e,
                                "Failed reading response body"
                            );
                            return RequestOutcome::failed(endpoint, category, start.elapsed());
                        }
                    }
                }

                RequestOutcome::success(endpoint, status_code, start.elapsed())
            }
            Err(e) => {
                let category = ErrorCategory::from_reqwest_error(&e);
                debug!(
                    url = %endpoint.url,
                    error = %e,
                    error_category = category.label(),
                    "Request failed"
                );
                RequestOutcome::failed(endpoint, category, start.elapsed())
            }
        }
    }

    /// Release the transport. Only the first call has an effect and returns `true`.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.connection_limit.close();
        let client = self
            .client
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        drop(client);

        self.close_count.fetch_add(1, Ordering::SeqCst);
        info!("HTTP transport closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of times the transport has actually been released (0 or 1).
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("max_connections", &self.max_connections)
            .field("closed", &self.is_closed())
            .finish()
    }
}
