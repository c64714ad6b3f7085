//! Error types for sink initialization and downstream clients.

use thiserror::Error;

/// Fatal configuration problems. Surfaced from sink init; the hosting
/// process is expected to treat them as a startup failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("accessKey is '{access}' and secretKey is '{secret}': sentinel credentials must be set on both")]
    MixedCredentialSentinels { access: String, secret: String },

    #[error("{field} must be {requirement}")]
    InvalidValue {
        field: &'static str,
        requirement: &'static str,
    },

    #[error("no primary stream client was provided")]
    MissingStreamClient,

    #[error("fallbackQueueName is set but no queue client was provided")]
    MissingQueueClient,
}

/// Failures reported by the primary-stream and fallback-queue clients.
///
/// Throughput exhaustion is kept apart from other transport failures so the
/// submitter can escalate it instead of burning client-side retries on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("provisioned throughput exceeded: {0}")]
    ThroughputExceeded(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn is_throughput_exceeded(&self) -> bool {
        matches!(self, Self::ThroughputExceeded(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
