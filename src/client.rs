use std::time::Duration;
use tracing::{info, warn};

use crate::errors::ConfigError;

/// Connection pool configuration for the shared transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Ceiling on requests in flight at once across all workers
    pub max_connections: usize,

    /// Maximum idle keep-alive connections to keep per host
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup
    pub idle_timeout: Duration,

    /// TCP keepalive duration
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_idle_per_host: 20,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Apply this configuration to a reqwest ClientBuilder.
    ///
    /// `max_connections` is not a reqwest setting; the executor enforces it.
    pub fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder
    }
}

/// Configuration for building the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Client-wide fallback timeout; each endpoint's own timeout takes precedence.
    pub request_timeout: Duration,
    pub pool: PoolConfig,
    pub skip_tls_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
            skip_tls_verify: false,
        }
    }
}

/// Builds the shared reqwest client.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ConfigError> {
    if config.pool.max_connections == 0 {
        return Err(ConfigError::InvalidValue {
            name: "max_connections".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    let mut client_builder = reqwest::Client::builder().timeout(config.request_timeout);
    client_builder = config.pool.apply_to_builder(client_builder);

    info!(
        max_connections = config.pool.max_connections,
        max_idle_per_host = config.pool.max_idle_per_host,
        idle_timeout = ?config.pool.idle_timeout,
        request_timeout = ?config.request_timeout,
        "Connection pool configured"
    );

    let client = if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder
            .danger_accept_invalid_certs(true)
            .build()?
    } else {
        client_builder.build()?
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_idle_per_host, 20);
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.tcp_keepalive, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_pool_config_builders() {
        let config = PoolConfig::default()
            .with_max_connections(8)
            .with_max_idle_per_host(4)
            .with_idle_timeout(Duration::from_secs(5));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_idle_per_host, 4);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_build_client_defaults() {
        assert!(build_client(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_build_client_rejects_zero_connections() {
        let config = ClientConfig {
            pool: PoolConfig::default().with_max_connections(0),
            ..ClientConfig::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
