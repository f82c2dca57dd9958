//! Outbound events buffered while the channel is not open.

use std::collections::VecDeque;

use serde_json::Value;

/// One buffered event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueuedEvent {
    pub event: String,
    pub data: Value,
    pub seq: u64,
}

/// FIFO of events waiting for the next open.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn push(&mut self, event: String, data: Value) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push_back(QueuedEvent { event, data, seq });
        seq
    }

    /// Removes and returns every event in enqueue order.
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedEvent> + '_ {
        self.events.drain(..)
    }

    /// Puts an event back at the front, keeping its sequence number.
    pub fn requeue_front(&mut self, event: QueuedEvent) {
        self.events.push_front(event);
    }

    /// Drops every buffered event and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
