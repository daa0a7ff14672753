//! Serial request processing.
//!
//! One thread pops requests from the queue in arrival order, runs each
//! through the [`RequestHandler`], and writes the response back to the
//! connection the request came from.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::{RequestHandler, Response};
use crate::transport::{PendingRequest, RequestQueue};

const PROCESSOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::processor");

pub(crate) struct Processor {
    queue: Arc<RequestQueue<PendingRequest>>,
    handler: Arc<dyn RequestHandler>,
    running: Arc<AtomicBool>,
    queue_wait: Duration,
}

impl Processor {
    pub(crate) fn new(
        queue: Arc<RequestQueue<PendingRequest>>,
        handler: Arc<dyn RequestHandler>,
        running: Arc<AtomicBool>,
        queue_wait: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            running,
            queue_wait,
        }
    }

    /// Processes requests until the running flag clears and returns how
    /// many were handled.
    ///
    /// The flag is checked before every wait, so at most one request is
    /// started after shutdown begins.
    pub(crate) fn run(self) -> usize {
        info!(target: PROCESSOR_TARGET, "processor active");
        let mut processed = 0;
        while self.running.load(Ordering::SeqCst) {
            if let Some(request) = self.queue.pop_timeout(self.queue_wait) {
                self.process(&request);
                processed += 1;
            }
        }
        info!(target: PROCESSOR_TARGET, processed, "processor stopped");
        processed
    }

    fn process(&self, request: &PendingRequest) {
        debug!(
            target: PROCESSOR_TARGET,
            connection = %request.connection(),
            bytes = request.line().len(),
            "processing request"
        );
        let response = self.handler.handle(request.line());
        deliver(request, &response);
    }
}

fn deliver(request: &PendingRequest, response: &Response) {
    let Some(reply) = request.reply() else {
        debug!(
            target: PROCESSOR_TARGET,
            connection = %request.connection(),
            "no reply channel; response dropped"
        );
        return;
    };
    let encoded = match response.encode() {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(
                target: PROCESSOR_TARGET,
                connection = %request.connection(),
                %error,
                "failed to encode response"
            );
            return;
        }
    };
    if let Err(error) = reply.send(&encoded) {
        warn!(
            target: PROCESSOR_TARGET,
            connection = %reply.connection(),
            %error,
            "failed to deliver response"
        );
    }
}
