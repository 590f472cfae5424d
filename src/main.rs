use std::env;
use std::sync::{Arc, Mutex};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use load_producer::config::ProducerConfig;
use load_producer::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use load_producer::producer::LoadProducer;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Configuration file:");
    eprintln!("  LOAD_PRODUCER_CONFIG    - Path to a YAML config file (optional)");
    eprintln!("  TARGET_BASE_URL         - Base URL for the built-in demo endpoints");
    eprintln!("                            (default: http://localhost:8000, used when no file is given)");
    eprintln!();
    eprintln!("Overrides (take precedence over the file):");
    eprintln!("  NUM_WORKERS             - Number of concurrent workers (default: 5, must be > 0)");
    eprintln!("  TEST_DURATION           - Total run duration: 30s, 10m, 2h; 0 runs until Ctrl+C (default: 0)");
    eprintln!("  GRACE_PERIOD            - Time workers get to finish on stop (default: 5s)");
    eprintln!("  LOAD_PATTERN            - constant or random (default: constant)");
    eprintln!("    constant requires:");
    eprintln!("      BASE_RPS            - Requests per second per worker (default: 10)");
    eprintln!("    random uses:");
    eprintln!("      RANDOM_MIN_DELAY    - Minimum delay between requests (default: 10ms)");
    eprintln!("      RANDOM_MAX_DELAY    - Maximum delay between requests (default: 2s)");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  METRICS_PORT            - Prometheus metrics port (default: 9090)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: load_producer)");
    eprintln!();
    eprintln!("Logging:");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  LOG_FORMAT              - Set to 'json' for JSON log lines");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = match ProducerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };
    config.log_summary();

    register_metrics()?;
    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));

    if config.metrics_port != 0 {
        let registry = registry_arc.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    let producer = Arc::new(LoadProducer::from_config(&config)?);

    {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, stopping");
                    producer.shutdown_signal().trigger();
                }
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        });
    }

    let run_result = producer.start(config.workers).await;
    producer.stop().await;
    run_result?;

    let final_metrics_output = gather_metrics_string(&registry_arc);
    println!("\n--- FINAL METRICS ---\n{}", final_metrics_output);
    println!("--- END OF FINAL METRICS ---\n");

    Ok(())
}
