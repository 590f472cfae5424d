//! Error types for the load producer.
//!
//! Configuration problems are reported as [`ConfigError`] and always surface
//! before any worker starts. Lifecycle misuse is reported as [`ProducerError`].
//! Per-request transport failures never become errors; they are classified
//! with [`ErrorCategory`] and carried inside a failed outcome instead.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building endpoints, pacing or the HTTP transport.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Endpoint list cannot be empty")]
    EmptyEndpoints,

    #[error("At least one endpoint must have a weight greater than zero")]
    AllZeroWeights,

    #[error("Invalid HTTP method '{0}' for endpoint")]
    InvalidMethod(String),

    #[error("Invalid endpoint URL '{0}': must start with http:// or https://")]
    InvalidUrl(String),

    #[error("base_rps must be a finite number greater than zero (got {0})")]
    InvalidRate(f64),

    #[error("min_delay ({min:?}) must not exceed max_delay ({max:?})")]
    InvalidDelayBounds { min: Duration, max: Duration },

    #[error("Unknown load pattern '{0}'. Use 'constant' or 'random'")]
    UnknownPattern(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors raised by the producer lifecycle.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProducerError {
    #[error("Worker count must be greater than zero")]
    NoWorkers,

    #[error("Load producer has already been started")]
    AlreadyStarted,

    #[error("Load producer has already been stopped")]
    AlreadyStopped,
}

/// Classification of request results for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx responses
    ClientError,

    /// HTTP 5xx responses
    ServerError,

    /// Connection refused, DNS failures, resets
    NetworkError,

    /// Request exceeded the endpoint timeout
    TimeoutError,

    /// TLS/SSL handshake or certificate errors
    TlsError,

    /// Response body could not be read to completion
    BodyError,

    /// Executor already closed, or anything not covered above
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// Returns `None` for 1xx/2xx/3xx codes.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            100..=399 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a reqwest transport error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() {
            ErrorCategory::NetworkError
        } else if error.is_body() || error.is_decode() {
            ErrorCategory::BodyError
        } else if error.is_request() {
            ErrorCategory::NetworkError
        } else {
            let error_msg = error.to_string().to_lowercase();

            if error_msg.contains("certificate")
                || error_msg.contains("tls")
                || error_msg.contains("ssl")
            {
                ErrorCategory::TlsError
            } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
                ErrorCategory::TimeoutError
            } else if error_msg.contains("dns")
                || error_msg.contains("resolve")
                || error_msg.contains("connect")
            {
                ErrorCategory::NetworkError
            } else {
                ErrorCategory::OtherError
            }
        }
    }

    /// Get the Prometheus label for this category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::BodyError => "body_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::BodyError => "Response Body Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_success_codes() {
        assert_eq!(ErrorCategory::from_status_code(200), None);
        assert_eq!(ErrorCategory::from_status_code(201), None);
        assert_eq!(ErrorCategory::from_status_code(302), None);
    }

    #[test]
    fn test_categorize_error_codes() {
        assert_eq!(
            ErrorCategory::from_status_code(429),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(503),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(999),
            Some(ErrorCategory::OtherError)
        );
    }

    #[test]
    fn test_error_category_labels() {
        assert_eq!(ErrorCategory::NetworkError.label(), "network_error");
        assert_eq!(ErrorCategory::TimeoutError.label(), "timeout_error");
        assert_eq!(ErrorCategory::BodyError.label(), "body_error");
        assert!(ErrorCategory::ServerError.to_string().contains("5xx"));
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::InvalidDelayBounds {
            min: Duration::from_secs(2),
            max: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("must not exceed"));

        let err = ConfigError::UnknownPattern("burst".to_string());
        assert!(err.to_string().contains("burst"));
    }
}
