//! Configuration and shutdown doubles.

use modlink_config::{Config, ConfigError};

use crate::process::{ConfigLoader, ShutdownError, ShutdownSignal};

/// Loopback configuration with an ephemeral port and short waits.
#[must_use]
pub fn test_config() -> Config {
    Config {
        host: String::from("127.0.0.1"),
        port: 0,
        poll_interval_ms: 20,
        queue_wait_ms: 20,
        reply_timeout_ms: 500,
        log_filter: String::from("modlinkd=debug"),
        ..Config::default()
    }
}

/// Loader that always rejects the configuration.
#[derive(Debug, Default)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_from_iter(["modlinkd", "--port", "not-a-port"])
    }
}

/// Shutdown signal that fires as soon as it is awaited.
#[derive(Debug, Default)]
pub struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}
