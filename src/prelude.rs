//! Convenience re-exports for embedding the sink.
//!
//! ```rust
//! use spillway::prelude::*;
//! ```

pub use crate::client::{QueueClient, StreamClient, StreamStatus};
pub use crate::config::{Credentials, SinkConfig};
pub use crate::error::{ClientError, ConfigError};
pub use crate::sink::{Sink, StreamSink, StreamSinkBuilder};
