//! Weighted HTTP targets.
//!
//! An [`EndpointSet`] is built once, validated, and then shared read-only
//! across every worker. Selection is a weighted random draw: each endpoint is
//! picked with probability `weight / total_weight`, and zero-weight endpoints
//! are never picked.

use rand::Rng;
use reqwest::Method;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_WEIGHT: u32 = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One HTTP target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub method: Method,
    pub weight: u32,
    /// Per-request timeout, overrides the client-wide default.
    pub timeout: Duration,
}

impl Endpoint {
    /// Create a GET endpoint with the default weight and timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            weight: DEFAULT_WEIGHT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Parse and set the HTTP method from a string such as "post".
    pub fn with_method_str(self, method: &str) -> Result<Self, ConfigError> {
        let method = parse_method(method)?;
        Ok(self.with_method(method))
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Parse an HTTP method token, upper-casing it first.
pub fn parse_method(method: &str) -> Result<Method, ConfigError> {
    let upper = method.trim().to_uppercase();
    if upper.is_empty() {
        return Err(ConfigError::InvalidMethod(method.to_string()));
    }
    Method::from_str(&upper).map_err(|_| ConfigError::InvalidMethod(method.to_string()))
}

/// Immutable, validated set of weighted endpoints.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    cumulative_weights: Vec<u64>,
    total_weight: u64,
}

impl EndpointSet {
    /// Build a set, rejecting an empty list, all-zero weights, or non-HTTP URLs.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpoints);
        }

        for endpoint in &endpoints {
            if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
                return Err(ConfigError::InvalidUrl(endpoint.url.clone()));
            }
        }

        let mut cumulative_weights = Vec::with_capacity(endpoints.len());
        let mut sum: u64 = 0;
        for endpoint in &endpoints {
            sum += u64::from(endpoint.weight);
            cumulative_weights.push(sum);
        }

        if sum == 0 {
            return Err(ConfigError::AllZeroWeights);
        }

        Ok(Self {
            endpoints,
            cumulative_weights,
            total_weight: sum,
        })
    }

    /// Pick an endpoint at random, proportionally to weight.
    pub fn select(&self) -> &Endpoint {
        let draw = rand::thread_rng().gen_range(0..self.total_weight);
        self.pick(draw)
    }

    // First index whose cumulative weight exceeds the draw. A zero-weight entry
    // shares its cumulative value with the entry before it, so it never wins.
    fn pick(&self, draw: u64) -> &Endpoint {
        let index = self.cumulative_weights.partition_point(|&c| c <= draw);
        &self.endpoints[index]
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Configured selection probability for each endpoint URL.
    pub fn probabilities(&self) -> Vec<(String, f64)> {
        self.endpoints
            .iter()
            .map(|e| {
                (
                    e.url.clone(),
                    f64::from(e.weight) / self.total_weight as f64,
                )
            })
            .collect()
    }
}
