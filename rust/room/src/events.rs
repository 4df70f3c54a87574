// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room events and observer registration.

use std::collections::VecDeque;

use crate::registry::RoomNodeType;

/// Something that happened to a room node.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    NodeCreated { uid: String, node_type: RoomNodeType },
    NodeRemoved { uid: String, node_type: RoomNodeType },
    /// Transform or params were changed from outside.
    NodeChanged { uid: String, node_type: RoomNodeType },
    DragStarted { uid: String, node_type: RoomNodeType },
    DragEnded { uid: String, node_type: RoomNodeType },
    /// An action space received a new coverage result.
    ActionSpaceEvaluated {
        uid: String,
        visible_volume: f64,
        occluded_volume: f64,
    },
}

impl RoomEvent {
    pub fn uid(&self) -> &str {
        match self {
            RoomEvent::NodeCreated { uid, .. }
            | RoomEvent::NodeRemoved { uid, .. }
            | RoomEvent::NodeChanged { uid, .. }
            | RoomEvent::DragStarted { uid, .. }
            | RoomEvent::DragEnded { uid, .. }
            | RoomEvent::ActionSpaceEvaluated { uid, .. } => uid,
        }
    }
}

/// May be implemented to get callbacks for room events.
pub trait RoomObserver {
    /// Called once per dispatched event, in queue order.
    fn on_room_event(&mut self, event: &RoomEvent);
}

impl<F> RoomObserver for F
where
    F: FnMut(&RoomEvent),
{
    fn on_room_event(&mut self, event: &RoomEvent) {
        self(event)
    }
}

/// Handle returned by [`Observers::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registered observers, notified in registration order.
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    entries: Vec<(ObserverId, Box<dyn RoomObserver>)>,
}

impl Observers {
    pub fn register(&mut self, observer: Box<dyn RoomObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn notify(&mut self, event: &RoomEvent) {
        for (_, observer) in &mut self.entries {
            observer.on_room_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// FIFO of events waiting for dispatch.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<RoomEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: RoomEvent) {
        self.pending.push_back(event);
    }

    pub fn pop(&mut self) -> Option<RoomEvent> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn drag(uid: &str) -> RoomEvent {
        RoomEvent::DragStarted {
            uid: uid.to_string(),
            node_type: RoomNodeType::Camera,
        }
    }

    #[test]
    fn test_observers_see_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::default();
        let sink = Rc::clone(&seen);
        observers.register(Box::new(move |event: &RoomEvent| {
            sink.borrow_mut().push(event.uid().to_string())
        }));

        observers.notify(&drag("a"));
        observers.notify(&drag("b"));
        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unregister() {
        let count = Rc::new(RefCell::new(0));
        let mut observers = Observers::default();
        let sink = Rc::clone(&count);
        let id = observers.register(Box::new(move |_: &RoomEvent| *sink.borrow_mut() += 1));

        observers.notify(&drag("a"));
        assert!(observers.unregister(id));
        assert!(!observers.unregister(id));
        observers.notify(&drag("b"));
        assert_eq!(*count.borrow(), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = EventQueue::default();
        queue.push(drag("first"));
        queue.push(drag("second"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().uid(), "first");
        assert_eq!(queue.pop().unwrap().uid(), "second");
        assert!(queue.pop().is_none());
    }
}
