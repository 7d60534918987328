//! The public tracking entry point and its pre-install call queue.
//!
//! Pages may call the tracker before it has loaded. Until installation the
//! entry point only buffers calls; installation swaps in the live dispatcher
//! and replays the buffer.
//!
//! # Lifecycle
//!
//! ```text
//! Queueing(PendingCallQueue) --install(dispatcher)--> Live(dispatcher)
//! ```
//!
//! The buffer is snapshotted and the state switched to `Live` before any call
//! is replayed, so calls made while replaying go straight to the dispatcher and
//! are never re-queued.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dispatcher::{Dispatcher, EventSink};
use crate::event::EventOptions;

/// A call made against the entry point before installation.
#[derive(Debug)]
pub struct QueuedCall {
    pub name: String,
    pub options: EventOptions,
}

impl QueuedCall {
    /// Create a queued call.
    pub fn new(name: impl Into<String>, options: EventOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// Calls captured before installation, in call order.
#[derive(Debug, Default)]
pub struct PendingCallQueue {
    calls: Vec<QueuedCall>,
}

impl PendingCallQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call.
    pub fn push(&mut self, call: QueuedCall) {
        self.calls.push(call);
    }

    /// Number of buffered calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn into_calls(self) -> Vec<QueuedCall> {
        self.calls
    }
}

impl FromIterator<QueuedCall> for PendingCallQueue {
    fn from_iter<I: IntoIterator<Item = QueuedCall>>(iter: I) -> Self {
        Self {
            calls: iter.into_iter().collect(),
        }
    }
}

enum EntryPoint {
    Queueing(PendingCallQueue),
    Live(Rc<Dispatcher>),
}

/// The public tracking function, before and after installation.
pub struct TrackerHandle {
    state: RefCell<EntryPoint>,
}

impl fmt::Debug for TrackerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.borrow() {
            EntryPoint::Queueing(queue) => format!("Queueing({} calls)", queue.len()),
            EntryPoint::Live(_) => "Live".to_string(),
        };
        f.debug_struct("TrackerHandle").field("state", &state).finish()
    }
}

impl Default for TrackerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerHandle {
    /// Create an uninstalled handle with an empty queue.
    pub fn new() -> Self {
        Self::with_queue(PendingCallQueue::new())
    }

    /// Create an uninstalled handle holding calls captured elsewhere, such as
    /// a queue left by a page-side stub.
    pub fn with_queue(queue: PendingCallQueue) -> Self {
        Self {
            state: RefCell::new(EntryPoint::Queueing(queue)),
        }
    }

    /// Whether the live dispatcher has been installed.
    pub fn is_installed(&self) -> bool {
        matches!(&*self.state.borrow(), EntryPoint::Live(_))
    }

    /// Number of calls waiting for installation.
    pub fn pending(&self) -> usize {
        match &*self.state.borrow() {
            EntryPoint::Queueing(queue) => queue.len(),
            EntryPoint::Live(_) => 0,
        }
    }

    /// Call the entry point: buffer before installation, dispatch after.
    pub fn call(&self, name: &str, options: EventOptions) {
        let dispatcher = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                EntryPoint::Queueing(queue) => {
                    queue.push(QueuedCall::new(name, options));
                    return;
                }
                EntryPoint::Live(dispatcher) => Rc::clone(dispatcher),
            }
        };
        dispatcher.dispatch(name, options);
    }

    /// Install `dispatcher` and replay the buffered calls in order.
    ///
    /// Returns the number of replayed calls. Installing again replaces the
    /// dispatcher and replays nothing.
    pub fn install(&self, dispatcher: Rc<Dispatcher>) -> usize {
        let previous = self
            .state
            .replace(EntryPoint::Live(Rc::clone(&dispatcher)));

        let calls = match previous {
            EntryPoint::Queueing(queue) => queue.into_calls(),
            EntryPoint::Live(_) => {
                tracing::debug!("Tracker entry point already live, replacing dispatcher");
                Vec::new()
            }
        };

        let replayed = calls.len();
        for call in calls {
            dispatcher.dispatch(&call.name, call.options);
        }
        replayed
    }
}

impl EventSink for TrackerHandle {
    fn track(&self, name: &str, options: EventOptions) {
        self.call(name, options);
    }
}
