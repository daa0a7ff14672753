//! Process entry points: configuration loading, launch, and shutdown.

mod errors;
mod launch;
mod loader;
mod shutdown;

pub use self::errors::LaunchError;
pub use self::launch::{LaunchPlan, run_server, run_server_with};
pub use self::loader::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use self::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
