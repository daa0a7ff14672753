use std::ffi::OsString;
use std::time::Duration;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::defaults::{
    DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_QUEUE_WAIT_MS, DEFAULT_REPLY_TIMEOUT_MS,
};
use crate::endpoint::ListenEndpoint;
use crate::logging::LogFormat;

/// Resolved server configuration.
///
/// Every field is a long command-line flag with an `MODLINK_*` environment
/// fallback. Flags win over the environment, which wins over the built-in
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "modlinkd",
    version,
    about = "Line-delimited JSON command server for game file tooling"
)]
pub struct Config {
    /// Interface address the listener binds to.
    #[arg(long, env = "MODLINK_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port to listen on.
    #[arg(long, env = "MODLINK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Length of the OS accept backlog.
    #[arg(long, env = "MODLINK_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    pub backlog: i32,

    /// Bound on each readiness wait, in milliseconds.
    #[arg(long, env = "MODLINK_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Bound on each processor queue wait, in milliseconds.
    #[arg(long, env = "MODLINK_QUEUE_WAIT_MS", default_value_t = DEFAULT_QUEUE_WAIT_MS)]
    pub queue_wait_ms: u64,

    /// Longest unterminated request line a client may buffer, in bytes.
    #[arg(long, env = "MODLINK_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Deadline for writing one response to a client, in milliseconds.
    #[arg(long, env = "MODLINK_REPLY_TIMEOUT_MS", default_value_t = DEFAULT_REPLY_TIMEOUT_MS)]
    pub reply_timeout_ms: u64,

    /// Put the listening socket into non-blocking mode.
    #[arg(
        long,
        env = "MODLINK_NONBLOCKING_ACCEPT",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub nonblocking_accept: bool,

    /// `tracing` filter expression.
    #[arg(long, env = "MODLINK_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format (`json` or `compact`).
    #[arg(long, env = "MODLINK_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment input could not be parsed.
    #[error(transparent)]
    Parse(#[from] clap::Error),
    /// A parsed value is out of range.
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending configuration field.
        field: &'static str,
        /// Human-readable explanation.
        reason: &'static str,
    },
}

impl ConfigError {
    const fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            queue_wait_ms: DEFAULT_QUEUE_WAIT_MS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            nonblocking_accept: true,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is the binary name, as with [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable by the server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::invalid("backlog", "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be non-zero"));
        }
        if self.queue_wait_ms == 0 {
            return Err(ConfigError::invalid("queue_wait_ms", "must be non-zero"));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::invalid("max_line_bytes", "must be non-zero"));
        }
        Ok(())
    }

    /// Endpoint the listener binds to.
    #[must_use]
    pub fn listen_endpoint(&self) -> ListenEndpoint {
        ListenEndpoint::new(self.host.clone(), self.port)
    }

    /// Bound on each readiness wait.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bound on each processor queue wait.
    #[must_use]
    pub const fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    /// Deadline for writing one response.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
