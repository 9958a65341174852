//! Error types for registration and delivery operations.
//!
//! The taxonomy mirrors how failures propagate: configuration and
//! credential errors abort the run before any delivery attempt; everything
//! else is local to one endpoint or one record and only circuit-breaks or
//! skips, never aborting the run.

use thiserror::Error;

use urd_core::{CoreError, EndpointUrl};

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions arising during a delivery run.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network error contacting {endpoint}: {message}")]
    Network {
        /// Endpoint the call was addressed to
        endpoint: EndpointUrl,
        /// Error message describing the failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request to {endpoint} timed out after {timeout_seconds}s")]
    Timeout {
        /// Endpoint the call was addressed to
        endpoint: EndpointUrl,
        /// Configured timeout in seconds
        timeout_seconds: u64,
    },

    /// The remote service rejected the registration.
    #[error("registration rejected by {endpoint}: HTTP {status}")]
    Rejected {
        /// Endpoint that rejected the batch
        endpoint: EndpointUrl,
        /// HTTP status code of the rejection
        status: u16,
    },

    /// Service description lookup failed or yielded no registration entry.
    #[error("discovery failed for {endpoint}: {message}")]
    Discovery {
        /// Endpoint whose service description was queried
        endpoint: EndpointUrl,
        /// What went wrong
        message: String,
    },

    /// Invalid configuration or credentials.
    ///
    /// The only category that aborts the run.
    #[error("configuration error: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Record source or delivery state operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(endpoint: EndpointUrl, message: impl Into<String>) -> Self {
        Self::Network { endpoint, message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(endpoint: EndpointUrl, timeout_seconds: u64) -> Self {
        Self::Timeout { endpoint, timeout_seconds }
    }

    /// Creates a rejection error from an HTTP status.
    pub fn rejected(endpoint: EndpointUrl, status: u16) -> Self {
        Self::Rejected { endpoint, status }
    }

    /// Creates a discovery error.
    pub fn discovery(endpoint: EndpointUrl, message: impl Into<String>) -> Self {
        Self::Discovery { endpoint, message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this error aborts the run.
    ///
    /// Configuration and credential errors are fatal and yield a nonzero
    /// exit status. State persistence failures are fatal for the affected
    /// record's update but surface through the endpoint report, not here.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointUrl {
        EndpointUrl::from("https://collector.example.org")
    }

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(DeliveryError::configuration("missing key file").is_fatal());

        assert!(!DeliveryError::network(endpoint(), "connection refused").is_fatal());
        assert!(!DeliveryError::timeout(endpoint(), 30).is_fatal());
        assert!(!DeliveryError::rejected(endpoint(), 503).is_fatal());
        assert!(!DeliveryError::discovery(endpoint(), "no registration service").is_fatal());
    }

    #[test]
    fn error_display_names_the_endpoint() {
        let error = DeliveryError::rejected(endpoint(), 500);
        assert_eq!(
            error.to_string(),
            "registration rejected by https://collector.example.org: HTTP 500"
        );
    }
}
