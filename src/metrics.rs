use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::env;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Request latency buckets in seconds.
pub const DURATION_BUCKETS: &[f64] = &[0.1, 0.2, 0.25, 0.5, 1.0];

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "load_producer".to_string());

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests issued")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["endpoint", "method", "http_status"]
        ).unwrap();

    pub static ref HTTP_REQUESTS_DURATION_SECONDS: HistogramVec =
        HistogramVec::new(
            HistogramOpts::new(
                "http_requests_duration_seconds",
                "HTTP request latencies in seconds"
            )
            .namespace(METRIC_NAMESPACE.as_str())
            .buckets(DURATION_BUCKETS.to_vec()),
            &["endpoint", "method"]
        ).unwrap();

    pub static ref REQUEST_FAILURES_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_failures_total", "Requests that failed at the transport level")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).unwrap();

    pub static ref INFLIGHT_REQUESTS: IntGauge =
        IntGauge::with_opts(
            Opts::new("inflight_requests", "Number of HTTP requests currently in flight")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref ACTIVE_WORKERS: IntGauge =
        IntGauge::with_opts(
            Opts::new("active_workers", "Number of load workers currently running")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let registry = prometheus::default_registry();
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUESTS_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(REQUEST_FAILURES_TOTAL.clone()))?;
    registry.register(Box::new(INFLIGHT_REQUESTS.clone()))?;
    registry.register(Box::new(ACTIVE_WORKERS.clone()))?;
    Ok(())
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let body = gather_metrics_string(&registry);

    let response = Response::builder()
        .status(200)
        .header("Content-Type", TextEncoder::new().format_type())
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()));

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(port = port, addr = %addr, "Metrics server listening");

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics in the Prometheus text format.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = match registry.lock() {
        Ok(registry) => registry.gather(),
        Err(poisoned) => poisoned.into_inner().gather(),
    };
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# ERROR ENCODING METRICS");
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output is not valid UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        let registry = Registry::new();
        registry
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .unwrap();
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["http://localhost/metrics-test", "GET", "200"])
            .inc();

        let output = gather_metrics_string(&Arc::new(Mutex::new(registry)));
        assert!(output.contains("http_requests_total"), "output: {}", output);
        assert!(output.contains("http://localhost/metrics-test"));
    }

    #[test]
    fn test_duration_histogram_buckets() {
        let registry = Registry::new();
        registry
            .register(Box::new(HTTP_REQUESTS_DURATION_SECONDS.clone()))
            .unwrap();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&["http://localhost/bucket-test", "GET"])
            .observe(0.3);

        let output = gather_metrics_string(&Arc::new(Mutex::new(registry)));
        assert!(output.contains("le=\"0.25\""), "output: {}", output);
        assert!(output.contains("le=\"0.5\""));
    }
}
