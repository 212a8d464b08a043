//! Events and the simulation clock.
//!
//! Every [Event] gets a fresh id and a creation sequence from process-wide
//! counters. The queue orders events by `(trigger_time, sequence)`: earlier
//! trigger first, and for equal trigger times the event created first wins.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::entities::{CraneOperation, FenceStatus};
use crate::spatial::Point;

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    MoveStart,
    Arrival,
    FenceControl,
    TaskAssigned,
    CraneMoveStart,
    CraneOperationStart,
    CraneOperationDone,
    ChargeCommand,
    ChargeComplete,
    PhysicsTick,
    DispatchRequest,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::MoveStart,
        EventKind::Arrival,
        EventKind::FenceControl,
        EventKind::TaskAssigned,
        EventKind::CraneMoveStart,
        EventKind::CraneOperationStart,
        EventKind::CraneOperationDone,
        EventKind::ChargeCommand,
        EventKind::ChargeComplete,
        EventKind::PhysicsTick,
        EventKind::DispatchRequest,
    ];
}

/// Role an entity plays in an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectRole {
    Truck,
    QuayCrane,
    YardCrane,
    Fence,
    WorkInstruction,
    Container,
    ChargingStation,
}

impl SubjectRole {
    pub const DEVICE_ROLES: [SubjectRole; 3] =
        [SubjectRole::Truck, SubjectRole::QuayCrane, SubjectRole::YardCrane];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChargeAction {
    Start { station_code: String },
    Release,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum EventPayload {
    #[default]
    None,
    Waypoints(Vec<Point>),
    Segment { target: Point },
    FenceStatus(FenceStatus),
    CraneMove { target_bay: i32 },
    CraneOperation {
        operation: CraneOperation,
        /// Truck receiving the container on a put; `None` puts it at the
        /// instruction's destination.
        onto: Option<String>,
    },
    Charge(ChargeAction),
    Tick { delta_ms: u64 },
    /// Free-form data for events scheduled by external collaborators.
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub parent: Option<EventId>,
    pub trigger_time: u64,
    pub kind: EventKind,
    pub subjects: BTreeMap<SubjectRole, String>,
    pub payload: EventPayload,
    pub sequence: u64,
}

impl Event {
    pub fn new(kind: EventKind, trigger_time: u64) -> Self {
        Self {
            id: EventId(NEXT_EVENT_ID.fetch_add(1, AtomicOrdering::Relaxed)),
            parent: None,
            trigger_time,
            kind,
            subjects: BTreeMap::new(),
            payload: EventPayload::None,
            sequence: NEXT_SEQUENCE.fetch_add(1, AtomicOrdering::SeqCst),
        }
    }

    pub fn with_parent(mut self, parent: Option<EventId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_subject(mut self, role: SubjectRole, id: impl Into<String>) -> Self {
        self.add_subject(role, id);
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn add_subject(&mut self, role: SubjectRole, id: impl Into<String>) {
        self.subjects.insert(role, id.into());
    }

    pub fn primary_subject(&self, role: SubjectRole) -> Option<&str> {
        self.subjects.get(&role).map(String::as_str)
    }

    /// The first device subject (truck, quay crane, yard crane order).
    pub fn device_subject(&self) -> Option<(SubjectRole, &str)> {
        SubjectRole::DEVICE_ROLES
            .iter()
            .find_map(|role| self.primary_subject(*role).map(|id| (*role, id)))
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.subjects.values().cloned().collect()
    }

    fn order_key(&self) -> (u64, u64) {
        (self.trigger_time, self.sequence)
    }
}

/// Heap entry reversing the event order so [BinaryHeap] pops the earliest.
#[derive(Debug, Clone)]
struct Queued(Event);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.0.order_key() == other.0.order_key()
    }
}

impl Eq for Queued {}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.order_key().cmp(&self.0.order_key())
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue plus the engine-side current time.
///
/// The clock never moves backwards: scheduling before `now` clamps the trigger
/// time to `now`, and [SimulationClock::advance_to] ignores earlier instants.
/// Popping does not move the clock; the engine advances it only for events it
/// actually dispatches.
#[derive(Debug, Default)]
pub struct SimulationClock {
    now: u64,
    events: BinaryHeap<Queued>,
}

impl SimulationClock {
    pub fn starting_at(now: u64) -> Self {
        Self {
            now,
            events: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Queues `event`, clamping a past trigger time to `now`. Returns the
    /// event as queued.
    pub fn schedule(&mut self, mut event: Event) -> Event {
        event.trigger_time = event.trigger_time.max(self.now);
        self.events.push(Queued(event.clone()));
        event
    }

    /// Puts a popped event back unchanged.
    pub fn requeue(&mut self, event: Event) {
        self.events.push(Queued(event));
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        self.events.pop().map(|queued| queued.0)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|queued| queued.0.trigger_time)
    }

    pub fn advance_to(&mut self, time: u64) {
        self.now = self.now.max(time);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn queued_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.iter().map(|queued| queued.0.id)
    }
}
