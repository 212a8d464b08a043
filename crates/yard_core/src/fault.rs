//! Fault isolation: causal lineage, suspended chains, the per-timestamp
//! dead-loop guard and the business-type circuit breaker.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::warn;

use crate::clock::EventId;
use crate::config::BreakerConfig;
use crate::entities::BusinessType;
use crate::error::DeadLoopError;

#[derive(Debug, Clone, Default)]
struct LineageNode {
    /// Nearest ancestor that is still queued or dispatching.
    parent: Option<EventId>,
    children: Vec<EventId>,
}

/// Parent links between in-flight events only.
///
/// A retired event can never fail again, so retiring removes its node and
/// re-parents its children onto its own in-flight parent. The map is therefore
/// bounded by the queue length, whatever the depth of a causal chain.
#[derive(Debug, Default)]
pub struct Lineage {
    nodes: HashMap<EventId, LineageNode>,
}

impl Lineage {
    /// Tracks a newly queued event. A parent that already retired is not linked.
    pub fn record(&mut self, id: EventId, parent: Option<EventId>) {
        let parent = parent.filter(|parent_id| self.nodes.contains_key(parent_id));
        if let Some(node) = parent.and_then(|parent_id| self.nodes.get_mut(&parent_id)) {
            node.children.push(id);
        }
        self.nodes.insert(
            id,
            LineageNode {
                parent,
                children: Vec::new(),
            },
        );
    }

    /// Forgets `id`, handing its children to its parent.
    pub fn retire(&mut self, id: EventId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = node.parent;
            }
        }
        if let Some(parent) = node.parent.and_then(|parent_id| self.nodes.get_mut(&parent_id)) {
            parent.children.retain(|child| *child != id);
            parent.children.extend(node.children);
        }
    }

    /// In-flight ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: EventId) -> Vec<EventId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|node| node.parent);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        out
    }

    pub fn has_ancestor(&self, id: EventId, ancestor: EventId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Failed events and the queued events suspended because of them. Members
/// leave once they are skipped; roots stay until cleared.
#[derive(Debug, Default)]
pub struct SuspendedChains {
    roots: BTreeSet<EventId>,
    members: BTreeSet<EventId>,
}

impl SuspendedChains {
    pub fn suspend(&mut self, root: EventId, descendants: impl IntoIterator<Item = EventId>) {
        self.roots.insert(root);
        self.members.extend(descendants);
    }

    pub fn add_member(&mut self, id: EventId) {
        self.members.insert(id);
    }

    /// Drops a member that has left the queue.
    pub fn retire(&mut self, id: EventId) {
        self.members.remove(&id);
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.members.contains(&id) || self.roots.contains(&id)
    }

    /// True when the event, or anything in `ancestors`, belongs to a suspended chain.
    pub fn covers(&self, id: EventId, ancestors: &[EventId]) -> bool {
        self.contains(id) || ancestors.iter().any(|a| self.contains(*a))
    }

    pub fn roots(&self) -> Vec<EventId> {
        self.roots.iter().copied().collect()
    }

    /// Failed roots plus still-queued members.
    pub fn members(&self) -> Vec<EventId> {
        self.roots.union(&self.members).copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.members.clear();
    }
}

/// Counts dispatches sharing one simulation timestamp.
#[derive(Debug, Clone)]
pub struct DeadLoopGuard {
    threshold: usize,
    current: Option<(u64, usize)>,
}

impl DeadLoopGuard {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            current: None,
        }
    }

    /// Counts one dispatch at `sim_time`; fails once the count passes the threshold.
    pub fn admit(&mut self, sim_time: u64) -> Result<(), DeadLoopError> {
        let count = match self.current {
            Some((time, count)) if time == sim_time => count + 1,
            _ => 1,
        };
        if count > self.threshold {
            self.current = None;
            return Err(DeadLoopError {
                sim_time,
                event_count: count,
                threshold: self.threshold,
            });
        }
        self.current = Some((sim_time, count));
        Ok(())
    }

    pub fn count_at(&self, sim_time: u64) -> usize {
        match self.current {
            Some((time, count)) if time == sim_time => count,
            _ => 0,
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Decides when repeated failures should suspend a business type.
pub trait SuspensionPolicy: Send {
    /// Records one failure at `now`; returns true when the type should be suspended.
    fn record_failure(&mut self, business_type: BusinessType, now: u64) -> bool;

    /// Forgets recorded failures for `business_type`.
    fn clear(&mut self, business_type: BusinessType);
}

/// Never suspends anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSuspend;

impl SuspensionPolicy for NeverSuspend {
    fn record_failure(&mut self, _business_type: BusinessType, _now: u64) -> bool {
        false
    }

    fn clear(&mut self, _business_type: BusinessType) {}
}

/// Trips after `max_failures` failures within a sliding `window_ms`.
#[derive(Debug, Clone)]
pub struct SlidingWindowPolicy {
    max_failures: usize,
    window_ms: u64,
    failures: HashMap<BusinessType, VecDeque<u64>>,
}

impl SlidingWindowPolicy {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            window_ms: config.window_ms,
            failures: HashMap::new(),
        }
    }
}

impl SuspensionPolicy for SlidingWindowPolicy {
    fn record_failure(&mut self, business_type: BusinessType, now: u64) -> bool {
        let window_start = now.saturating_sub(self.window_ms);
        let failures = self.failures.entry(business_type).or_default();
        failures.push_back(now);
        while failures.front().is_some_and(|&t| t < window_start) {
            failures.pop_front();
        }
        failures.len() >= self.max_failures
    }

    fn clear(&mut self, business_type: BusinessType) {
        self.failures.remove(&business_type);
    }
}

pub struct BusinessTypeBreaker {
    policy: Box<dyn SuspensionPolicy>,
    suspended: BTreeSet<BusinessType>,
}

impl std::fmt::Debug for BusinessTypeBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessTypeBreaker")
            .field("suspended", &self.suspended)
            .finish_non_exhaustive()
    }
}

impl BusinessTypeBreaker {
    pub fn new(policy: Box<dyn SuspensionPolicy>) -> Self {
        Self {
            policy,
            suspended: BTreeSet::new(),
        }
    }

    /// Sliding-window breaker when configured, otherwise one that never trips.
    pub fn from_config(config: Option<BreakerConfig>) -> Self {
        match config {
            Some(config) => Self::new(Box::new(SlidingWindowPolicy::new(config))),
            None => Self::new(Box::new(NeverSuspend)),
        }
    }

    /// Returns true when this failure newly suspends the business type.
    pub fn record_failure(&mut self, business_type: BusinessType, now: u64) -> bool {
        if !self.policy.record_failure(business_type, now) {
            return false;
        }
        let tripped = self.suspended.insert(business_type);
        if tripped {
            warn!(business_type = ?business_type, sim_time = now, "business type suspended");
        }
        tripped
    }

    pub fn is_suspended(&self, business_type: BusinessType) -> bool {
        self.suspended.contains(&business_type)
    }

    pub fn clear(&mut self, business_type: BusinessType) -> bool {
        self.policy.clear(business_type);
        self.suspended.remove(&business_type)
    }

    pub fn suspended(&self) -> Vec<BusinessType> {
        self.suspended.iter().copied().collect()
    }
}
