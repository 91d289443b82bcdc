//! Quiet-interval debouncing for search input and notes auto-save.
//!
//! # Invariants
//! - Only the latest value of a burst is delivered.
//! - A value is delivered once the interval passed with no newer `submit`.
//! - `cancel` drops the pending value without delivering it.
//! - The generation check and the send happen under one lock, so a `submit`
//!   racing a timer on another worker either supersedes it or starts a new
//!   burst; a stale value is never sent.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

struct Shared<T> {
    generation: Mutex<u64>,
    sender: mpsc::UnboundedSender<T>,
}

impl<T> Shared<T> {
    /// Starts a new generation and returns its ticket.
    fn bump(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        *generation
    }

    /// Sends `value` only if `ticket` is still the latest generation.
    fn deliver(&self, ticket: u64, value: T) -> bool {
        let generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *generation != ticket {
            return false;
        }
        // Receiver gone means nobody is listening anymore.
        self.sender.send(value).is_ok()
    }
}

/// Coalesces bursts of values into one delivery on the returned receiver.
///
/// `submit` spawns a timer task, so it must run inside a tokio runtime.
pub struct Debouncer<T> {
    delay: Duration,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                sender,
            }),
        };
        (debouncer, receiver)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restarts the quiet interval with `value` as the pending delivery.
    pub fn submit(&self, value: T) {
        let ticket = self.shared.bump();
        let shared = Arc::clone(&self.shared);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.deliver(ticket, value);
        });
    }

    /// Drops whatever is pending.
    pub fn cancel(&self) {
        self.shared.bump();
    }
}
