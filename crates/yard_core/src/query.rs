//! Query façade: point-in-time reads of the store and the engine's logs.

use crate::clock::EventId;
use crate::entities::BusinessType;
use crate::profiling::EventMetrics;
use crate::runner::Engine;
use crate::store::StoreSnapshot;
use crate::telemetry::{DeadLoopDiagnostic, ErrorLogEntry, EventLogEntry};

impl Engine {
    pub fn snapshot(&self) -> StoreSnapshot {
        let _core = self.core();
        self.store().snapshot()
    }

    pub fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.core().errors.snapshot()
    }

    /// Error entries recorded at or after `sim_time`.
    pub fn errors_since(&self, sim_time: u64) -> Vec<ErrorLogEntry> {
        self.core().errors.since(sim_time)
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.core().events.snapshot()
    }

    pub fn events_since(&self, sim_time: u64) -> Vec<EventLogEntry> {
        self.core().events.since(sim_time)
    }

    /// Failed roots plus the queued events suspended beneath them. Skipped
    /// events leave this set; they remain visible in the event log.
    pub fn suspended_chains(&self) -> Vec<EventId> {
        self.core().suspended.members()
    }

    /// Events whose handler failed.
    pub fn failed_chain_roots(&self) -> Vec<EventId> {
        self.core().suspended.roots()
    }

    pub fn is_suspended(&self, id: EventId) -> bool {
        self.core().suspended.contains(id)
    }

    /// Forgets suspended chains. Already skipped events stay skipped; queued
    /// members become deliverable again.
    pub fn clear_suspended_chains(&self) {
        self.core().suspended.clear();
    }

    /// Number of in-flight events tracked for chain suspension.
    pub fn lineage_size(&self) -> usize {
        self.core().lineage.len()
    }

    pub fn dead_loop_diagnostics(&self) -> Vec<DeadLoopDiagnostic> {
        self.core().dead_loops.snapshot()
    }

    pub fn suspended_business_types(&self) -> Vec<BusinessType> {
        self.core().breaker.suspended()
    }

    /// Lifts a business-type suspension. Returns false if it was not suspended.
    pub fn clear_business_type(&self, business_type: BusinessType) -> bool {
        self.core().breaker.clear(business_type)
    }

    pub fn event_metrics(&self) -> EventMetrics {
        self.core().metrics.clone()
    }
}
