use crate::logging::LogFormat;

/// Interface address the listener binds to by default (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default TCP port for the command server.
pub const DEFAULT_PORT: u16 = 1234;

/// Default length of the OS accept backlog.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Default bound, in milliseconds, on every readiness wait.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default bound, in milliseconds, on the processor's queue wait.
pub const DEFAULT_QUEUE_WAIT_MS: u64 = 100;

/// Default cap on a single unterminated request line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default deadline, in milliseconds, for writing one response to a client.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 1000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
