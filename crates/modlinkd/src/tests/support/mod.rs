//! Shared helpers for the server behaviour suites.

mod client;
mod config_loader;
mod reporter;

pub use self::client::{TestClient, WireResponse};
pub use self::config_loader::{FailingConfigLoader, ImmediateShutdown, test_config};
pub use self::reporter::{HealthEvent, RecordingHealthReporter};
