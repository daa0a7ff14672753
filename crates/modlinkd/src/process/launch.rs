//! Launch sequencing for the server process.

use std::sync::Arc;

use tracing::info;

use crate::dispatch::{Dispatcher, RequestHandler};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::server::{ProtocolServer, StopSummary};
use crate::telemetry;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::loader::{ConfigLoader, SystemConfigLoader};
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to run the server.
pub struct LaunchPlan<L, S> {
    /// Configuration source.
    pub loader: L,
    /// Blocks until the server should stop.
    pub shutdown: S,
    /// Receives lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Handles every request line.
    pub handler: Arc<dyn RequestHandler>,
}

/// Runs the server with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when any launch stage fails.
pub fn run_server() -> Result<StopSummary, LaunchError> {
    run_server_with(LaunchPlan {
        loader: SystemConfigLoader,
        shutdown: SystemShutdownSignal::new(),
        reporter: Arc::new(StructuredHealthReporter::new()),
        handler: Arc::new(Dispatcher::with_builtin_commands()),
    })
}

/// Runs the server with injected collaborators.
///
/// The server is stopped even when waiting for the shutdown signal fails.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, telemetry, the server
/// lifecycle, or the shutdown listener fails.
pub fn run_server_with<L, S>(plan: LaunchPlan<L, S>) -> Result<StopSummary, LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        shutdown,
        reporter,
        handler,
    } = plan;

    let config = loader.load()?;
    telemetry::install(&config)?;
    info!(
        target: PROCESS_TARGET,
        endpoint = %config.listen_endpoint(),
        "starting command server"
    );

    let mut server = ProtocolServer::new(config, handler, reporter);
    server.initialize()?;
    server.start()?;
    let waited = shutdown.wait();
    let summary = server.stop()?;
    waited?;
    info!(
        target: PROCESS_TARGET,
        processed = summary.processed_requests,
        "shutdown sequence completed"
    );
    Ok(summary)
}
