//! Synchronous event bus owned by a [`World`](crate::World).
//!
//! Subscribers are called in subscription order, on the simulation thread,
//! before the publishing call returns.

use physim_engine::{BodyId, JointId, ShapeId};
use physim_math::Pose;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity named by a created/deleted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Body(BodyId),
    Joint(JointId),
    Shape(ShapeId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Body(id) => id.fmt(f),
            EntityRef::Joint(id) => id.fmt(f),
            EntityRef::Shape(id) => id.fmt(f),
        }
    }
}

/// Something external collaborators may want to know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    WorldCreated { name: String },
    EntityCreated { entity: EntityRef, name: String },
    EntityDeleted { entity: EntityRef, name: String },
    /// A body's link pose changed during the step (solver or external set).
    PoseChanged { body: BodyId, pose: Pose },
    WorldStepStart { iteration: u64, sim_time: f64 },
    WorldStepEnd { iteration: u64, sim_time: f64 },
    Paused { paused: bool },
    /// A single step was requested explicitly and has completed.
    Stepped { iteration: u64, sim_time: f64 },
    Stopped,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::WorldCreated { .. } => EventKind::WorldCreated,
            Event::EntityCreated { .. } => EventKind::EntityCreated,
            Event::EntityDeleted { .. } => EventKind::EntityDeleted,
            Event::PoseChanged { .. } => EventKind::PoseChanged,
            Event::WorldStepStart { .. } => EventKind::WorldStepStart,
            Event::WorldStepEnd { .. } => EventKind::WorldStepEnd,
            Event::Paused { .. } => EventKind::Paused,
            Event::Stepped { .. } => EventKind::Stepped,
            Event::Stopped => EventKind::Stopped,
        }
    }
}

/// Discriminant of [`Event`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    WorldCreated,
    EntityCreated,
    EntityDeleted,
    PoseChanged,
    WorldStepStart,
    WorldStepEnd,
    Paused,
    Stepped,
    Stopped,
}

/// Handle returned by a subscription, used to disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

type Callback = Box<dyn FnMut(&Event) + Send>;

struct Subscriber {
    id: ConnectionId,
    filter: Option<EventKind>,
    callback: Callback,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(&mut self, filter: Option<EventKind>, callback: Callback) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            callback,
        });
        id
    }

    /// Receive events of one kind.
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> ConnectionId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.connect(Some(kind), Box::new(callback))
    }

    /// Receive every event.
    pub fn subscribe_all<F>(&mut self, callback: F) -> ConnectionId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.connect(None, Box::new(callback))
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every matching subscriber, in subscription order.
    pub fn publish(&mut self, event: &Event) {
        let kind = event.kind();
        for sub in &mut self.subscribers {
            if sub.filter.map_or(true, |f| f == kind) {
                (sub.callback)(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn log() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&Event) + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = log.clone();
        let make = move |tag: &str| -> Box<dyn FnMut(&Event) + Send> {
            let log = shared.clone();
            let tag = tag.to_string();
            Box::new(move |e: &Event| log.lock().unwrap().push(format!("{tag}:{:?}", e.kind())))
        };
        (log, make)
    }

    #[test]
    fn test_subscription_order_and_filter() {
        let (log, make) = log();
        let mut bus = EventBus::new();
        bus.subscribe_all(make("a"));
        bus.subscribe(EventKind::Stopped, make("b"));
        bus.subscribe_all(make("c"));

        bus.publish(&Event::Paused { paused: true });
        bus.publish(&Event::Stopped);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:Paused",
                "c:Paused",
                "a:Stopped",
                "b:Stopped",
                "c:Stopped"
            ]
        );
    }

    #[test]
    fn test_disconnect() {
        let (log, make) = log();
        let mut bus = EventBus::new();
        let id = bus.subscribe_all(make("a"));
        assert!(bus.disconnect(id));
        assert!(!bus.disconnect(id));
        bus.publish(&Event::Stopped);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
