//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;
use std::net::SocketAddr;

use modlink_config::ListenEndpoint;

use crate::health::HealthReporter;
use crate::server::{ServerError, StopSummary};

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    InitializeStarting,
    InitializeSucceeded,
    InitializeFailed(String),
    Started,
    Stopping,
    Stopped(StopSummary),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn initialize_starting(&self, _endpoint: &ListenEndpoint) {
        self.record(HealthEvent::InitializeStarting);
    }

    fn initialize_succeeded(&self, _local_addr: SocketAddr) {
        self.record(HealthEvent::InitializeSucceeded);
    }

    fn initialize_failed(&self, error: &ServerError) {
        self.record(HealthEvent::InitializeFailed(error.to_string()));
    }

    fn server_started(&self) {
        self.record(HealthEvent::Started);
    }

    fn server_stopping(&self) {
        self.record(HealthEvent::Stopping);
    }

    fn server_stopped(&self, summary: &StopSummary) {
        self.record(HealthEvent::Stopped(*summary));
    }
}
