//! Event plumbing between the builder and whatever renders progress.

use super::Event;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Where the builder and scanner report progress.
///
/// A sender made with [`EventSender::discard`] drops every event, so
/// library code can always report without checking for a listener.
#[derive(Clone, Default)]
pub struct EventSender {
    inner: Option<Sender<Event>>,
}

impl EventSender {
    /// A sender nobody listens to
    pub fn discard() -> Self {
        Self { inner: None }
    }

    /// Report an event; lost if the receiving side has gone away
    pub fn send(&self, event: Event) {
        if let Some(ref sender) = self.inner {
            sender.send(event).ok();
        }
    }
}

/// Receiving end, usually drained on a UI thread
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Events in order until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// An unbounded sender/receiver pair. Events are small, so there is
/// no backpressure.
pub fn channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = unbounded();
    (
        EventSender {
            inner: Some(sender),
        },
        EventReceiver { inner: receiver },
    )
}
