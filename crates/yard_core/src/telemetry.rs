//! Bounded diagnostic logs: handler errors, dispatched events and dead-loop
//! aborts. Each log is a ring buffer that evicts its oldest entry once full;
//! readers always get a point-in-time copy.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::clock::{Event, EventId, EventKind, SubjectRole};
use crate::error::{DeadLoopError, HandlerError};

/// Log entries expose the simulation time they were recorded at.
pub trait Timestamped {
    fn sim_time(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T: Clone> BoundedLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.clamp(1, 1024)),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone + Timestamped> BoundedLog<T> {
    /// Entries recorded at or after `sim_time`, oldest first.
    pub fn since(&self, sim_time: u64) -> Vec<T> {
        self.entries
            .iter()
            .filter(|entry| entry.sim_time() >= sim_time)
            .cloned()
            .collect()
    }
}

/// One handler failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorLogEntry {
    pub sim_time: u64,
    pub event_id: EventId,
    pub event_kind: EventKind,
    pub message: String,
    pub cause: Option<String>,
    /// Every subject id of the failing event.
    pub entities: Vec<String>,
}

impl ErrorLogEntry {
    pub fn from_failure(sim_time: u64, event: &Event, error: &HandlerError) -> Self {
        Self {
            sim_time,
            event_id: event.id,
            event_kind: event.kind,
            message: error.to_string(),
            cause: error.cause(),
            entities: event.entity_ids(),
        }
    }
}

impl Timestamped for ErrorLogEntry {
    fn sim_time(&self) -> u64 {
        self.sim_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    Dispatched,
    Failed,
    SkippedSuspended,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    pub sim_time: u64,
    pub event_id: EventId,
    pub parent: Option<EventId>,
    pub kind: EventKind,
    pub subjects: BTreeMap<SubjectRole, String>,
    pub outcome: EventOutcome,
}

impl EventLogEntry {
    pub fn new(sim_time: u64, event: &Event, outcome: EventOutcome) -> Self {
        Self {
            sim_time,
            event_id: event.id,
            parent: event.parent,
            kind: event.kind,
            subjects: event.subjects.clone(),
            outcome,
        }
    }
}

impl Timestamped for EventLogEntry {
    fn sim_time(&self) -> u64 {
        self.sim_time
    }
}

/// Recorded dead-loop abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeadLoopDiagnostic {
    pub sim_time: u64,
    pub event_count: usize,
    pub threshold: usize,
}

impl From<DeadLoopError> for DeadLoopDiagnostic {
    fn from(err: DeadLoopError) -> Self {
        Self {
            sim_time: err.sim_time,
            event_count: err.event_count,
            threshold: err.threshold,
        }
    }
}

impl Timestamped for DeadLoopDiagnostic {
    fn sim_time(&self) -> u64 {
        self.sim_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_log_evicts_oldest_entry() {
        let mut log = BoundedLog::with_capacity(3);
        for t in 0..5u64 {
            log.push(DeadLoopDiagnostic {
                sim_time: t,
                event_count: 1,
                threshold: 1,
            });
        }
        let times: Vec<u64> = log.snapshot().iter().map(|d| d.sim_time).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(log.len(), log.capacity());
    }

    #[test]
    fn since_filters_by_sim_time() {
        let mut log = BoundedLog::with_capacity(10);
        let event = Event::new(EventKind::MoveStart, 0).with_subject(SubjectRole::Truck, "T01");
        for t in [100u64, 200, 300] {
            log.push(EventLogEntry::new(t, &event, EventOutcome::Dispatched));
        }
        let recent = log.since(200);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sim_time, 200);
        assert_eq!(recent[0].subjects.get(&SubjectRole::Truck).map(String::as_str), Some("T01"));
    }

    #[test]
    fn error_entry_carries_cause_and_entities() {
        let event = Event::new(EventKind::MoveStart, 0).with_subject(SubjectRole::Truck, "T01");
        let err = HandlerError::Configuration(crate::error::ConfigurationError::Parse("bad".into()));
        let entry = ErrorLogEntry::from_failure(42, &event, &err);
        assert_eq!(entry.sim_time, 42);
        assert_eq!(entry.entities, vec!["T01".to_string()]);
        assert!(entry.cause.is_some());
    }
}
