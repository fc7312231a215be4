//! Error-message queue shared with the embedding host

use std::collections::VecDeque;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// FIFO of error messages
///
/// Each [`RuntimeState`](crate::RuntimeState) reports fatal errors into its
/// own queue; [`ErrorQueue::global`] is a process-wide instance hosts can use
/// for build-time diagnostics.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    messages: Mutex<VecDeque<String>>,
}

impl ErrorQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide queue
    pub fn global() -> &'static ErrorQueue {
        static GLOBAL: OnceLock<ErrorQueue> = OnceLock::new();
        GLOBAL.get_or_init(ErrorQueue::new)
    }

    /// Append a message
    pub fn push(&self, message: impl Into<String>) {
        self.messages.lock().push_back(message.into());
    }

    /// Take the oldest message
    pub fn pop(&self) -> Option<String> {
        self.messages.lock().pop_front()
    }

    /// Whether any message is queued
    pub fn has(&self) -> bool {
        !self.messages.lock().is_empty()
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        !self.has()
    }

    /// Drop every queued message
    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Take every queued message, oldest first
    pub fn drain(&self) -> Vec<String> {
        self.messages.lock().drain(..).collect()
    }
}
