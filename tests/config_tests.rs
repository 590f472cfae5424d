//! Integration tests for YAML configuration and environment overrides.
//!
//! Precedence is env > yaml > defaults. Every configuration error must be
//! reported here, before a producer is built.

use load_producer::config::{ProducerConfig, YamlConfig};
use load_producer::errors::ConfigError;
use load_producer::load_pattern::LoadPattern;
use load_producer::producer::LoadProducer;
use reqwest::Method;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;

/// Clear all env vars that could affect config parsing.
fn clean_env() {
    for var in [
        "LOAD_PRODUCER_CONFIG",
        "TARGET_BASE_URL",
        "NUM_WORKERS",
        "TEST_DURATION",
        "GRACE_PERIOD",
        "LOAD_PATTERN",
        "BASE_RPS",
        "RANDOM_MIN_DELAY",
        "RANDOM_MAX_DELAY",
        "SKIP_TLS_VERIFY",
        "METRICS_PORT",
    ] {
        env::remove_var(var);
    }
}

const FULL_YAML: &str = r#"
baseUrl: "http://localhost:8000"
workers: 8
duration: "10m"
gracePeriod: "2s"
metricsPort: 9191
load:
  pattern: random
  minDelay: "50ms"
  maxDelay: 1
client:
  timeout: "15s"
  maxConnections: 40
  maxKeepaliveConnections: 10
endpoints:
  - url: /example/code-2xx
    weight: 50
  - url: /example/ms-500
    method: post
    weight: 10
    timeout: "750ms"
  - url: https://other.example.com/health
    weight: 0
"#;

#[test]
fn test_full_yaml() {
    let config = ProducerConfig::from_yaml_str(FULL_YAML).unwrap();

    assert_eq!(config.workers, 8);
    assert_eq!(config.metrics_port, 9191);
    assert_eq!(config.grace_period, Duration::from_secs(2));
    assert_eq!(config.load.duration(), Duration::from_secs(600));
    assert_eq!(
        config.load.pattern(),
        &LoadPattern::Random {
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    );

    assert_eq!(config.client.request_timeout, Duration::from_secs(15));
    assert_eq!(config.client.pool.max_connections, 40);
    assert_eq!(config.client.pool.max_idle_per_host, 10);

    assert_eq!(config.endpoints.len(), 3);
    assert_eq!(
        config.endpoints[0].url,
        "http://localhost:8000/example/code-2xx"
    );
    assert_eq!(config.endpoints[0].method, Method::GET);
    assert_eq!(config.endpoints[0].timeout, Duration::from_secs(5));
    assert_eq!(config.endpoints[1].method, Method::POST);
    assert_eq!(config.endpoints[1].timeout, Duration::from_millis(750));
    assert_eq!(config.endpoints[2].url, "https://other.example.com/health");
    assert_eq!(config.endpoints[2].weight, 0);
}

#[test]
fn test_minimal_yaml_uses_defaults() {
    let yaml = r#"
endpoints:
  - url: http://localhost:8000/example/code-2xx
"#;
    let config = ProducerConfig::from_yaml_str(yaml).unwrap();

    assert_eq!(config.workers, 5);
    assert_eq!(config.load.duration(), Duration::ZERO);
    assert_eq!(config.load.deadline(), None);
    assert_eq!(config.load.pattern(), &LoadPattern::Constant { base_rps: 10.0 });
    assert_eq!(config.grace_period, Duration::from_secs(5));
    assert_eq!(config.client.request_timeout, Duration::from_secs(30));
    assert_eq!(config.client.pool.max_connections, 100);
    assert_eq!(config.client.pool.max_idle_per_host, 20);
    assert_eq!(config.endpoints[0].weight, 50);
}

#[test]
fn test_empty_endpoints_rejected() {
    let err = ProducerConfig::from_yaml_str("endpoints: []").unwrap_err();
    assert!(matches!(err, ConfigError::EmptyEndpoints), "got {:?}", err);
}

#[test]
fn test_all_zero_weights_rejected() {
    let yaml = r#"
endpoints:
  - url: http://a/x
    weight: 0
  - url: http://a/y
    weight: 0
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::AllZeroWeights), "got {:?}", err);
}

#[test]
fn test_inverted_delay_bounds_rejected() {
    let yaml = r#"
load:
  pattern: random
  minDelay: "3s"
  maxDelay: "1s"
endpoints:
  - url: http://a/x
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidDelayBounds { .. }),
        "got {:?}",
        err
    );
}

#[test]
fn test_unknown_pattern_rejected() {
    let yaml = r#"
load:
  pattern: sawtooth
endpoints:
  - url: http://a/x
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownPattern(_)), "got {:?}", err);
}

#[test]
fn test_zero_rate_rejected() {
    let yaml = r#"
load:
  pattern: constant
  baseRps: 0
endpoints:
  - url: http://a/x
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRate(_)), "got {:?}", err);
}

#[test]
fn test_invalid_method_rejected() {
    let yaml = r#"
endpoints:
  - url: http://a/x
    method: "GE T"
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMethod(_)), "got {:?}", err);
}

#[test]
fn test_zero_workers_rejected() {
    let yaml = r#"
workers: 0
endpoints:
  - url: http://a/x
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got {:?}", err);
}

#[test]
fn test_malformed_yaml_rejected() {
    let err = ProducerConfig::from_yaml_str("workers: [oops").unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse(_)), "got {:?}", err);
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_YAML.as_bytes()).unwrap();

    let yaml = YamlConfig::from_file(file.path()).unwrap();
    assert_eq!(yaml.workers, 8);
    assert_eq!(yaml.endpoints.len(), 3);

    let missing = YamlConfig::from_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(missing, ConfigError::FileRead(_)));
}

#[tokio::test]
async fn test_producer_from_config() {
    let config = ProducerConfig::from_yaml_str(FULL_YAML).unwrap();
    let producer = LoadProducer::from_config(&config).unwrap();

    assert_eq!(producer.endpoints().len(), 3);
    assert_eq!(producer.grace_period(), Duration::from_secs(2));
    assert_eq!(producer.executor().max_connections(), 40);
    producer.stop().await;
}

#[test]
#[serial]
fn test_no_env_uses_demo_endpoints() {
    clean_env();
    let config = ProducerConfig::from_env().unwrap();

    assert_eq!(config.workers, 5);
    assert_eq!(config.endpoints.len(), 6);
    assert_eq!(
        config.endpoints[3].url,
        "http://localhost:8000/example/ms-200"
    );
    assert_eq!(config.endpoints[3].weight, 30);
}

#[test]
#[serial]
fn test_target_base_url_env() {
    clean_env();
    env::set_var("TARGET_BASE_URL", "http://target:9000/");
    let config = ProducerConfig::from_env().unwrap();
    assert_eq!(config.endpoints[0].url, "http://target:9000/example/code-2xx");
    clean_env();
}

#[test]
#[serial]
fn test_env_overrides_yaml_file() {
    clean_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_YAML.as_bytes()).unwrap();

    env::set_var("LOAD_PRODUCER_CONFIG", file.path());
    env::set_var("NUM_WORKERS", "12");
    env::set_var("TEST_DURATION", "30s");
    env::set_var("GRACE_PERIOD", "1s");
    env::set_var("LOAD_PATTERN", "constant");
    env::set_var("BASE_RPS", "25");
    env::set_var("METRICS_PORT", "0");

    let config = ProducerConfig::from_env().unwrap();
    clean_env();

    assert_eq!(config.workers, 12);
    assert_eq!(config.load.duration(), Duration::from_secs(30));
    assert_eq!(config.grace_period, Duration::from_secs(1));
    assert_eq!(config.load.pattern(), &LoadPattern::Constant { base_rps: 25.0 });
    assert_eq!(config.metrics_port, 0);
    // Untouched by env: still from the file.
    assert_eq!(config.client.pool.max_connections, 40);
}

#[test]
#[serial]
fn test_env_random_pattern_override() {
    clean_env();
    env::set_var("LOAD_PATTERN", "RANDOM");
    env::set_var("RANDOM_MIN_DELAY", "100ms");
    env::set_var("RANDOM_MAX_DELAY", "200ms");

    let config = ProducerConfig::from_env().unwrap();
    clean_env();

    assert_eq!(
        config.load.pattern(),
        &LoadPattern::Random {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(200),
        }
    );
}

#[test]
#[serial]
fn test_invalid_env_value_rejected() {
    clean_env();
    env::set_var("NUM_WORKERS", "many");
    let err = ProducerConfig::from_env().unwrap_err();
    clean_env();

    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got {:?}", err);
    assert!(err.to_string().contains("NUM_WORKERS"));
}

#[test]
fn test_shipped_demo_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/demo.yaml");
    let config = YamlConfig::from_file(path)
        .unwrap()
        .into_producer_config()
        .unwrap();

    assert_eq!(config.endpoints.len(), 6);
    assert_eq!(config.load.deadline(), None);
    assert_eq!(
        config.endpoints,
        YamlConfig::demo("http://localhost:8000")
            .into_producer_config()
            .unwrap()
            .endpoints
    );
}

#[test]
#[serial]
fn test_env_duration_zero_means_unbounded() {
    clean_env();
    env::set_var("TEST_DURATION", "0");
    env::set_var("GRACE_PERIOD", "2");
    let config = ProducerConfig::from_env().unwrap();
    clean_env();

    assert_eq!(config.load.duration(), Duration::ZERO);
    assert_eq!(config.load.deadline(), None);
    assert_eq!(config.grace_period, Duration::from_secs(2));
}

#[test]
#[serial]
fn test_oversized_env_duration_rejected() {
    clean_env();
    env::set_var("TEST_DURATION", "300000000000000d");
    let err = ProducerConfig::from_env().unwrap_err();
    clean_env();

    assert!(matches!(err, ConfigError::InvalidDuration(_)), "got {:?}", err);
}

#[test]
fn test_oversized_yaml_duration_rejected() {
    let yaml = r#"
duration: "300000000000000d"
endpoints:
  - url: http://a/x
"#;
    let err = ProducerConfig::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDuration(_)), "got {:?}", err);
}
