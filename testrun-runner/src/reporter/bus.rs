// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestEvent, TestEventKind};
use crate::stopwatch::{StopwatchStart, stopwatch};
use chrono::Local;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};

/// A fire-and-forget sink for [`TestEvent`]s.
///
/// Cloning the bus is cheap; every clone posts to the same receiver.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Option<UnboundedSender<TestEvent>>,
    stopwatch: StopwatchStart,
}

impl EventBus {
    /// Creates a new event bus, returning the bus and the receiving end.
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = unbounded_channel();
        let bus = Self {
            sender: Some(sender),
            stopwatch: stopwatch(),
        };
        (bus, EventReceiver { receiver })
    }

    /// Creates an event bus that discards every event.
    pub fn noop() -> Self {
        Self {
            sender: None,
            stopwatch: stopwatch(),
        }
    }

    /// Posts an event.
    ///
    /// If the receiver has been dropped, the event is discarded.
    pub fn post(&self, kind: TestEventKind) {
        if let Some(sender) = &self.sender {
            let event = TestEvent {
                timestamp: Local::now(),
                elapsed: self.stopwatch.elapsed(),
                kind,
            };
            // Ignore errors: nobody is listening anymore.
            let _ = sender.send(event);
        }
    }
}

/// The receiving end of an [`EventBus`].
///
/// Receiving returns `None` once every clone of the bus has been dropped.
#[derive(Debug)]
pub struct EventReceiver {
    receiver: UnboundedReceiver<TestEvent>,
}

impl EventReceiver {
    /// Receives the next event, waiting asynchronously.
    pub async fn recv(&mut self) -> Option<TestEvent> {
        self.receiver.recv().await
    }

    /// Receives the next event, blocking the current thread.
    ///
    /// Must not be called from within an asynchronous context.
    pub fn blocking_recv(&mut self) -> Option<TestEvent> {
        self.receiver.blocking_recv()
    }

    /// Returns every event that has already been posted, without waiting.
    pub fn drain(&mut self) -> Vec<TestEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}
