//! Event processing statistics: how many events of each kind were dispatched,
//! failed or skipped, and how much wall-clock time their handlers took.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::clock::EventKind;

/// Counters and handler time for one event kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindStats {
    pub dispatched: u64,
    pub failed: u64,
    pub skipped: u64,
    pub handler_time: Duration,
    pub slowest: Duration,
}

impl KindStats {
    pub fn mean_handler_time(&self) -> Duration {
        match u32::try_from(self.dispatched) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.handler_time / n,
            Err(_) => Duration::from_secs_f64(self.handler_time.as_secs_f64() / self.dispatched as f64),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventMetrics {
    pub events_processed: u64,
    pub events_failed: u64,
    pub events_skipped: u64,
    pub start_time: Option<Instant>,
    by_kind: HashMap<EventKind, KindStats>,
}

impl EventMetrics {
    /// One handler run of `elapsed`, successful or not.
    pub fn record_dispatch(&mut self, kind: EventKind, elapsed: Duration, failed: bool) {
        self.start_time.get_or_insert_with(Instant::now);
        self.events_processed += 1;
        let stats = self.by_kind.entry(kind).or_default();
        stats.dispatched += 1;
        stats.handler_time += elapsed;
        stats.slowest = stats.slowest.max(elapsed);
        if failed {
            stats.failed += 1;
            self.events_failed += 1;
        }
    }

    /// An event dropped because its chain is suspended.
    pub fn record_skip(&mut self, kind: EventKind) {
        self.events_skipped += 1;
        self.by_kind.entry(kind).or_default().skipped += 1;
    }

    /// Dispatches of `kind`, failed ones included.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.by_kind.get(&kind).map_or(0, |stats| stats.dispatched)
    }

    pub fn kind(&self, kind: EventKind) -> Option<&KindStats> {
        self.by_kind.get(&kind)
    }

    /// Wall-clock dispatch rate since the first recorded event.
    pub fn events_per_second(&self) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.events_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// One totals line, then one line per kind by descending handler time.
    pub fn log_summary(&self) {
        info!(
            processed = self.events_processed,
            failed = self.events_failed,
            skipped = self.events_skipped,
            events_per_second = self.events_per_second(),
            "event processing summary"
        );
        let mut kinds: Vec<_> = self.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.handler_time.cmp(&a.1.handler_time));
        for (kind, stats) in kinds {
            info!(
                kind = ?kind,
                dispatched = stats.dispatched,
                failed = stats.failed,
                skipped = stats.skipped,
                handler_ms = stats.handler_time.as_secs_f64() * 1000.0,
                mean_us = stats.mean_handler_time().as_secs_f64() * 1_000_000.0,
                slowest_us = stats.slowest.as_secs_f64() * 1_000_000.0,
                "events by kind"
            );
        }
    }
}
