//! Mutex-guarded FIFO connecting the multiplexer to the processor.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Thread-safe FIFO with a bounded blocking pop.
///
/// Producers push any number of items and then call
/// [`RequestQueue::notify_waiters`] once; consumers never miss an item because
/// the emptiness check happens under the lock before waiting.
#[derive(Debug)]
pub(crate) struct RequestQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }
}

impl<T> RequestQueue<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an item without waking consumers.
    pub(crate) fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Wakes every consumer blocked in [`RequestQueue::pop_timeout`].
    pub(crate) fn notify_waiters(&self) {
        self.available.notify_all();
    }

    /// Removes the oldest item, waiting at most `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pop_front()
    }

    /// Empties the queue, returning the discarded items in FIFO order.
    pub(crate) fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
