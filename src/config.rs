//! Sink configuration and credential resolution.
//!
//! The configuration arrives as a structured document with lowercase-first
//! camelCase keys; `serde` maps it onto [`SinkConfig`].

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Largest payload accepted when events go straight to the primary stream.
pub const MAX_BYTES_PRIMARY: usize = 1_000_000;

/// Largest payload accepted when a fallback queue is configured. Queue
/// message bodies are base64-encoded, which costs a 4/3 expansion against
/// the queue's 256 KB ceiling.
pub const MAX_BYTES_FALLBACK: usize = 256_000 * 3 / 4;

fn default_thread_pool_size() -> usize {
    10
}

fn default_credential() -> String {
    "default".to_string()
}

/// Tuning and wiring for the sink.
///
/// Limits are expressed in bytes, records, and milliseconds. `byteLimit`,
/// `recordLimit`, and `timeLimit` each trigger a flush on their own; the
/// backoff bounds shape retry waits after a failed submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    /// Primary stream identifier.
    pub stream_name: String,

    /// Auxiliary queue identifier; absence disables the fallback path.
    #[serde(default)]
    pub fallback_queue_name: Option<String>,

    /// Flush once this many bytes are buffered.
    pub byte_limit: usize,

    /// Flush once this many events are buffered.
    pub record_limit: usize,

    /// Flush a quiet buffer after this many milliseconds.
    pub time_limit: u64,

    /// Smallest retry wait, milliseconds.
    pub min_backoff: u64,

    /// Largest retry wait, milliseconds.
    pub max_backoff: u64,

    /// Parallelism available to submitter tasks.
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    /// Access key, or one of the sentinels `default` / `iam` / `env`.
    #[serde(default = "default_credential")]
    pub access_key: String,

    /// Secret key, or the matching sentinel.
    #[serde(default = "default_credential")]
    pub secret_key: String,
}

impl SinkConfig {
    /// The payload ceiling enforced on ingest. Any event may end up spilled
    /// to the fallback queue, so the stricter queue limit wins whenever a
    /// fallback is configured.
    pub fn max_bytes(&self) -> usize {
        if self.fallback_queue_name.is_some() {
            MAX_BYTES_FALLBACK
        } else {
            MAX_BYTES_PRIMARY
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.time_limit)
    }

    pub fn min_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.min_backoff)
    }

    pub fn max_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.max_backoff)
    }

    /// Resolve the credential mode from the key pair.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::resolve(&self.access_key, &self.secret_key)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, requirement: &'static str) -> ConfigError {
            ConfigError::InvalidValue { field, requirement }
        }

        if self.stream_name.is_empty() {
            return Err(invalid("streamName", "non-empty"));
        }
        if matches!(self.fallback_queue_name.as_deref(), Some("")) {
            return Err(invalid("fallbackQueueName", "non-empty when set"));
        }
        if self.byte_limit == 0 {
            return Err(invalid("byteLimit", "greater than zero"));
        }
        if self.record_limit == 0 {
            return Err(invalid("recordLimit", "greater than zero"));
        }
        if self.time_limit == 0 {
            return Err(invalid("timeLimit", "greater than zero"));
        }
        if self.min_backoff == 0 {
            return Err(invalid("minBackoff", "greater than zero"));
        }
        if self.max_backoff < self.min_backoff {
            return Err(invalid("maxBackoff", "at least minBackoff"));
        }
        if self.thread_pool_size == 0 {
            return Err(invalid("threadPoolSize", "greater than zero"));
        }
        self.credentials().map(|_| ())
    }
}

/// How the embedding process obtains credentials for its clients.
///
/// The mode is keyed on the `(accessKey, secretKey)` pair: both `default`,
/// both `iam`, or both `env` select a provider chain; any other pair is
/// taken as static credentials. A sentinel on one side only is a
/// configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Platform default provider chain.
    DefaultChain,
    /// Instance profile credentials.
    InstanceProfile,
    /// Credentials from the process environment.
    Environment,
    /// Static credentials taken verbatim from the two fields.
    Static { access_key: String, secret_key: String },
}

const SENTINELS: [&str; 3] = ["default", "iam", "env"];

fn is_sentinel(value: &str) -> bool {
    SENTINELS.contains(&value)
}

impl Credentials {
    pub fn resolve(access_key: &str, secret_key: &str) -> Result<Self, ConfigError> {
        match (access_key, secret_key) {
            ("default", "default") => Ok(Self::DefaultChain),
            ("iam", "iam") => Ok(Self::InstanceProfile),
            ("env", "env") => Ok(Self::Environment),
            (access, secret) if is_sentinel(access) || is_sentinel(secret) => {
                Err(ConfigError::MixedCredentialSentinels {
                    access: access.to_string(),
                    secret: secret.to_string(),
                })
            }
            (access, secret) => Ok(Self::Static {
                access_key: access.to_string(),
                secret_key: secret.to_string(),
            }),
        }
    }
}
