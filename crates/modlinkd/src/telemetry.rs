//! Process-wide `tracing` subscriber for the server.
//!
//! Worker threads are named after their loop, so every event carries the
//! thread it came from. Output goes to stderr.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, time::UtcTime};

use modlink_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter '{expression}': {source}")]
    Filter {
        /// Expression taken from the configuration.
        expression: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber was installed outside this module.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls keep the first subscriber and return the format it was
/// installed with, so tests and the launch path can both call this freely.
///
/// # Examples
///
/// ```rust
/// use modlink_config::Config;
/// use modlinkd::telemetry;
///
/// # fn main() -> Result<(), modlinkd::telemetry::TelemetryError> {
/// let format = telemetry::install(&Config::default())?;
/// assert_eq!(telemetry::install(&Config::default())?, format);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or a foreign
/// subscriber already owns the global default.
pub fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            set_global(config)?;
            Ok(config.log_format())
        })
        .copied()
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|source| TelemetryError::Filter {
        expression: expression.to_owned(),
        source,
    })
}

fn set_global(config: &Config) -> Result<(), TelemetryError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(parse_filter(config.log_filter())?)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    match config.log_format() {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().flatten_event(true).finish())?;
        }
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())?;
        }
    }
    Ok(())
}
