//! Structured health reporting for server lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use modlink_config::ListenEndpoint;

use crate::server::{ServerError, StopSummary};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the listening socket is bound.
    fn initialize_starting(&self, endpoint: &ListenEndpoint);

    /// Invoked once the listener is bound and listening.
    fn initialize_succeeded(&self, local_addr: SocketAddr);

    /// Invoked when binding or listening fails.
    fn initialize_failed(&self, error: &ServerError);

    /// Invoked after all three worker threads are running.
    fn server_started(&self);

    /// Invoked when shutdown begins.
    fn server_stopping(&self);

    /// Invoked after every worker has joined and every socket is closed.
    fn server_stopped(&self, summary: &StopSummary);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn initialize_starting(&self, endpoint: &ListenEndpoint) {
        (**self).initialize_starting(endpoint);
    }

    fn initialize_succeeded(&self, local_addr: SocketAddr) {
        (**self).initialize_succeeded(local_addr);
    }

    fn initialize_failed(&self, error: &ServerError) {
        (**self).initialize_failed(error);
    }

    fn server_started(&self) {
        (**self).server_started();
    }

    fn server_stopping(&self) {
        (**self).server_stopping();
    }

    fn server_stopped(&self, summary: &StopSummary) {
        (**self).server_stopped(summary);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn initialize_starting(&self, endpoint: &ListenEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "initialize_starting",
            endpoint = %endpoint,
            "binding command listener"
        );
    }

    fn initialize_succeeded(&self, local_addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "initialize_succeeded",
            local_addr = %local_addr,
            "command listener ready"
        );
    }

    fn initialize_failed(&self, error: &ServerError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "initialize_failed",
            error = %error,
            "command listener failed to start"
        );
    }

    fn server_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_started",
            "command server running"
        );
    }

    fn server_stopping(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopping",
            "command server stopping"
        );
    }

    fn server_stopped(&self, summary: &StopSummary) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            closed_connections = summary.closed_connections,
            discarded_requests = summary.discarded_requests,
            processed_requests = summary.processed_requests,
            "command server stopped"
        );
    }
}
