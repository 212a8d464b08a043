#![allow(dead_code)]

use yard_core::clock::{EventId, EventKind};
use yard_core::runner::Engine;
use yard_core::telemetry::{EventLogEntry, EventOutcome};

/// Log entries of `kind` with the given outcome, in processing order.
pub fn logged(engine: &Engine, kind: EventKind, outcome: EventOutcome) -> Vec<EventLogEntry> {
    engine
        .event_log()
        .into_iter()
        .filter(|entry| entry.kind == kind && entry.outcome == outcome)
        .collect()
}

/// Ids of dispatched events of `kind`, in dispatch order.
pub fn dispatched_ids(engine: &Engine, kind: EventKind) -> Vec<EventId> {
    logged(engine, kind, EventOutcome::Dispatched)
        .into_iter()
        .map(|entry| entry.event_id)
        .collect()
}
