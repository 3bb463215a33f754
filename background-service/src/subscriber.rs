//! Receivers for poller status events.
//!
//! Subscribers are called on the poller's task, one after another, in the
//! order events are raised. Anything that has to run on a UI thread should
//! use [`ChannelSubscriber`] and drain the channel from there.

use deskalert_core::StatusEvent;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

pub trait StatusSubscriber: Send + Sync {
    fn on_status(&self, event: &StatusEvent);
}

impl<F> StatusSubscriber for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_status(&self, event: &StatusEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StatusSubscriber for ChannelSubscriber {
    fn on_status(&self, event: &StatusEvent) {
        if self.sender.send(event.clone()).is_err() {
            trace!("Status receiver dropped; event discarded");
        }
    }
}

/// Bounded in-memory history of recent events, oldest evicted first.
#[derive(Debug)]
pub struct StatusLog {
    capacity: usize,
    entries: Mutex<VecDeque<StatusEvent>>,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn entries(&self) -> Vec<StatusEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<StatusEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSubscriber for StatusLog {
    fn on_status(&self, event: &StatusEvent) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event.clone());
    }
}
