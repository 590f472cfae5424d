//! Producer configuration.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then environment variable overrides (env > yaml > defaults). Everything is
//! validated here, before a single worker is spawned.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::client::{ClientConfig, PoolConfig};
use crate::endpoint::{parse_method, Endpoint, EndpointSet, DEFAULT_TIMEOUT, DEFAULT_WEIGHT};
use crate::errors::ConfigError;
use crate::load_pattern::{
    LoadConfig, LoadPattern, PatternKind, DEFAULT_BASE_RPS, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY,
};
use crate::producer::DEFAULT_GRACE_PERIOD;
use crate::utils::parse_duration_string;

pub const CONFIG_PATH_ENV: &str = "LOAD_PRODUCER_CONFIG";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Duration in YAML: either whole seconds or a string such as "500ms" or "2h".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlDuration {
    Seconds(u64),
    String(String),
}

impl YamlDuration {
    pub fn to_std_duration(&self) -> Result<Duration, ConfigError> {
        match self {
            YamlDuration::Seconds(s) => Ok(Duration::from_secs(*s)),
            // A bare number means seconds, the same as the integer form.
            YamlDuration::String(s) => match s.trim().parse::<u64>() {
                Ok(secs) => Ok(Duration::from_secs(secs)),
                Err(_) => parse_duration_string(s)
                    .map_err(|e| ConfigError::InvalidDuration(format!("'{}': {}", s, e))),
            },
        }
    }
}

/// Pacing section of the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlLoad {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    pub base_rps: Option<f64>,
    pub min_delay: Option<YamlDuration>,
    pub max_delay: Option<YamlDuration>,
}

impl Default for YamlLoad {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            base_rps: None,
            min_delay: None,
            max_delay: None,
        }
    }
}

fn default_pattern() -> String {
    "constant".to_string()
}

impl YamlLoad {
    pub fn to_load_pattern(&self) -> Result<LoadPattern, ConfigError> {
        match self.pattern.parse::<PatternKind>()? {
            PatternKind::Constant => Ok(LoadPattern::Constant {
                base_rps: self.base_rps.unwrap_or(DEFAULT_BASE_RPS),
            }),
            PatternKind::Random => Ok(LoadPattern::Random {
                min_delay: optional_duration(&self.min_delay, DEFAULT_MIN_DELAY)?,
                max_delay: optional_duration(&self.max_delay, DEFAULT_MAX_DELAY)?,
            }),
        }
    }
}

fn optional_duration(
    value: &Option<YamlDuration>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    value
        .as_ref()
        .map(YamlDuration::to_std_duration)
        .transpose()
        .map(|d| d.unwrap_or(default))
}

/// Transport section of the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct YamlClient {
    pub timeout: Option<YamlDuration>,
    pub max_connections: Option<usize>,
    pub max_keepalive_connections: Option<usize>,
    pub idle_timeout: Option<YamlDuration>,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl YamlClient {
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let defaults = ClientConfig::default();
        let mut pool = PoolConfig::default();
        if let Some(max) = self.max_connections {
            pool = pool.with_max_connections(max);
        }
        if let Some(max) = self.max_keepalive_connections {
            pool = pool.with_max_idle_per_host(max);
        }
        pool.idle_timeout = optional_duration(&self.idle_timeout, pool.idle_timeout)?;

        Ok(ClientConfig {
            request_timeout: optional_duration(&self.timeout, defaults.request_timeout)?,
            pool,
            skip_tls_verify: self.skip_tls_verify,
        })
    }
}

/// One endpoint entry in the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlEndpoint {
    /// Absolute URL, or a path starting with `/` resolved against `baseUrl`.
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub timeout: Option<YamlDuration>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl YamlEndpoint {
    fn new(url: String, weight: u32) -> Self {
        Self {
            url,
            method: default_method(),
            weight,
            timeout: None,
        }
    }

    pub fn to_endpoint(&self, base_url: Option<&str>) -> Result<Endpoint, ConfigError> {
        let url = match base_url {
            Some(base) if self.url.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), self.url)
            }
            _ => self.url.clone(),
        };

        Ok(Endpoint::new(url)
            .with_method(parse_method(&self.method)?)
            .with_weight(self.weight)
            .with_timeout(optional_duration(&self.timeout, DEFAULT_TIMEOUT)?))
    }
}

/// Raw YAML configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlConfig {
    pub base_url: Option<String>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Zero or absent means run until stopped.
    pub duration: Option<YamlDuration>,

    pub grace_period: Option<YamlDuration>,

    #[serde(default)]
    pub load: YamlLoad,

    #[serde(default)]
    pub client: YamlClient,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    pub endpoints: Vec<YamlEndpoint>,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl YamlConfig {
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// The demo target set: status-code and latency endpoints of the example service.
    pub fn demo(base_url: &str) -> Self {
        let endpoints = [
            ("/example/code-2xx", 50),
            ("/example/code-4xx", 3),
            ("/example/code-5xx", 2),
            ("/example/ms-200", 30),
            ("/example/ms-500", 10),
            ("/example/ms-1000", 5),
        ]
        .into_iter()
        .map(|(path, weight)| YamlEndpoint::new(path.to_string(), weight))
        .collect();

        Self {
            base_url: Some(base_url.to_string()),
            workers: DEFAULT_WORKERS,
            duration: None,
            grace_period: None,
            load: YamlLoad::default(),
            client: YamlClient::default(),
            metrics_port: DEFAULT_METRICS_PORT,
            endpoints,
        }
    }

    /// Apply environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(workers) = env_parse::<usize>("NUM_WORKERS")? {
            self.workers = workers;
        }
        if let Ok(duration) = env::var("TEST_DURATION") {
            self.duration = Some(YamlDuration::String(duration));
        }
        if let Ok(grace) = env::var("GRACE_PERIOD") {
            self.grace_period = Some(YamlDuration::String(grace));
        }
        if let Ok(pattern) = env::var("LOAD_PATTERN") {
            self.load.pattern = pattern;
        }
        if let Some(rps) = env_parse::<f64>("BASE_RPS")? {
            self.load.base_rps = Some(rps);
        }
        if let Ok(min) = env::var("RANDOM_MIN_DELAY") {
            self.load.min_delay = Some(YamlDuration::String(min));
        }
        if let Ok(max) = env::var("RANDOM_MAX_DELAY") {
            self.load.max_delay = Some(YamlDuration::String(max));
        }
        if let Ok(skip) = env::var("SKIP_TLS_VERIFY") {
            self.client.skip_tls_verify = skip.to_lowercase() == "true";
        }
        if let Some(port) = env_parse::<u16>("METRICS_PORT")? {
            self.metrics_port = port;
        }
        Ok(())
    }

    /// Validate and convert into the runtime configuration.
    pub fn into_producer_config(self) -> Result<ProducerConfig, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "workers".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let endpoints = self
            .endpoints
            .iter()
            .map(|e| e.to_endpoint(self.base_url.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        // Fail fast on empty or all-zero endpoint lists.
        EndpointSet::new(endpoints.clone())?;

        let duration = optional_duration(&self.duration, Duration::ZERO)?;
        let load = LoadConfig::new(self.load.to_load_pattern()?, duration)?;

        Ok(ProducerConfig {
            endpoints,
            load,
            client: self.client.to_client_config()?,
            workers: self.workers,
            grace_period: optional_duration(&self.grace_period, DEFAULT_GRACE_PERIOD)?,
            metrics_port: self.metrics_port,
        })
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{}': {}", value, e),
            }),
        Err(_) => Ok(None),
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    pub endpoints: Vec<Endpoint>,
    pub load: LoadConfig,
    pub client: ClientConfig,
    pub workers: usize,
    pub grace_period: Duration,
    pub metrics_port: u16,
}

impl ProducerConfig {
    /// Parse a YAML document without consulting the environment.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        YamlConfig::from_str(content)?.into_producer_config()
    }

    /// Load the file named by `LOAD_PRODUCER_CONFIG`, or the demo endpoint set
    /// against `TARGET_BASE_URL`, then apply environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut yaml = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => YamlConfig::from_file(path)?,
            Err(_) => {
                let base_url =
                    env::var("TARGET_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
                YamlConfig::demo(&base_url)
            }
        };
        yaml.apply_env_overrides()?;
        yaml.into_producer_config()
    }

    pub fn log_summary(&self) {
        info!(
            workers = self.workers,
            pattern = self.load.pattern().name(),
            duration = ?self.load.duration(),
            grace_period = ?self.grace_period,
            endpoints = self.endpoints.len(),
            max_connections = self.client.pool.max_connections,
            metrics_port = self.metrics_port,
            "Load producer configuration"
        );
        for endpoint in &self.endpoints {
            info!(
                url = %endpoint.url,
                method = %endpoint.method,
                weight = endpoint.weight,
                timeout = ?endpoint.timeout,
                "Endpoint"
            );
        }
    }
}
