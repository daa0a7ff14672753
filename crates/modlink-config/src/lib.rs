//! Shared configuration for the modlink command server.
//!
//! Values resolve from command-line flags, then `MODLINK_*` environment
//! variables, then the built-in defaults such as [`DEFAULT_PORT`].
//! [`Config::load`] validates the result before handing it to the server.

mod config;
mod defaults;
mod endpoint;
mod logging;

pub use config::{Config, ConfigError};
pub use defaults::{
    DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_QUEUE_WAIT_MS, DEFAULT_REPLY_TIMEOUT_MS,
    default_log_filter, default_log_format,
};
pub use endpoint::ListenEndpoint;
pub use logging::{LogFormat, LogFormatParseError};
