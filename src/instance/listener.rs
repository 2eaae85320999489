//! Slot-change observers.
//!
//! Events are queued while a mutation and its propagation run, then
//! delivered in order once the graph has settled.

use std::fmt;

use crate::identity::{InstanceId, PropertyId};

/// What changed on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotChange {
    Asserted,
    Fixed,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotEvent {
    pub instance: InstanceId,
    pub property: PropertyId,
    pub change: SlotChange,
}

/// Handle returned by [`InstanceGraph::subscribe`](super::InstanceGraph::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type SlotListener = Box<dyn Fn(&SlotEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, SlotListener)>,
    pending: Vec<SlotEvent>,
}

impl Listeners {
    pub(crate) fn subscribe(&mut self, listener: SlotListener) -> ListenerId {
        self.next += 1;
        let id = ListenerId(self.next);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(l, _)| *l != id);
        self.entries.len() != before
    }

    pub(crate) fn queue(&mut self, event: SlotEvent) {
        self.pending.push(event);
    }

    /// Drop queued events for an instance that no longer exists.
    pub(crate) fn discard_for(&mut self, instance: InstanceId) {
        self.pending.retain(|e| e.instance != instance);
    }

    pub(crate) fn flush(&mut self) {
        let events = std::mem::take(&mut self.pending);
        if events.is_empty() || self.entries.is_empty() {
            return;
        }
        tracing::trace!(events = events.len(), listeners = self.entries.len(), "delivering slot events");
        for event in &events {
            for (_, listener) in &self.entries {
                listener(event);
            }
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("listeners", &self.entries.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn event() -> SlotEvent {
        SlotEvent {
            instance: InstanceId(0),
            property: PropertyId(0),
            change: SlotChange::Asserted,
        }
    }

    #[test]
    fn events_wait_for_flush() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::default();
        let counter = Arc::clone(&seen);
        listeners.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        listeners.queue(event());
        listeners.queue(event());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        listeners.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        listeners.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_listener_is_silent() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::default();
        let counter = Arc::clone(&seen);
        let id = listeners.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.queue(event());
        listeners.flush();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
