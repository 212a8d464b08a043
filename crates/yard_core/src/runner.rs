//! Simulation runner: owns the event queue and routes events into handlers.
//!
//! Clock progression and event routing happen here, outside handlers. Each
//! step pops the next event from [SimulationClock], skips it if cancelled or
//! suspended, counts it against the dead-loop guard, advances the clock and
//! dispatches it through the [HandlerRegistry].
//!
//! All queue-side state lives in [EngineCore] behind one `Mutex`, held for
//! exactly one dispatched event at a time. Lock order is core, then store
//! tables.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::clock::{Event, EventId, EventKind, EventPayload, SimulationClock, SubjectRole};
use crate::config::{PhysicsConfig, SimConfig};
use crate::dispatch::DispatchAlgorithm;
use crate::entities::{BusinessType, DeviceState, StationStatus};
use crate::error::{ConfigurationError, DeadLoopError, HandlerError};
use crate::fault::{BusinessTypeBreaker, DeadLoopGuard, Lineage, SuspendedChains, SuspensionPolicy};
use crate::profiling::EventMetrics;
use crate::store::{GlobalStore, StoreSnapshot};
use crate::systems::{HandlerContext, HandlerRegistry};
use crate::telemetry::{
    BoundedLog, DeadLoopDiagnostic, ErrorLogEntry, EventLogEntry, EventOutcome,
};

/// Queue-side engine state guarded by the engine mutex.
#[derive(Debug)]
pub struct EngineCore {
    pub(crate) clock: SimulationClock,
    queued: HashSet<EventId>,
    cancelled: HashSet<EventId>,
    pub(crate) lineage: Lineage,
    pub(crate) suspended: SuspendedChains,
    dead_loop: DeadLoopGuard,
    pub(crate) breaker: BusinessTypeBreaker,
    pub(crate) errors: BoundedLog<ErrorLogEntry>,
    pub(crate) events: BoundedLog<EventLogEntry>,
    pub(crate) dead_loops: BoundedLog<DeadLoopDiagnostic>,
    pub(crate) metrics: EventMetrics,
}

impl EngineCore {
    fn new(config: &SimConfig, start: u64, breaker: BusinessTypeBreaker) -> Self {
        Self {
            clock: SimulationClock::starting_at(start),
            queued: HashSet::new(),
            cancelled: HashSet::new(),
            lineage: Lineage::default(),
            suspended: SuspendedChains::default(),
            dead_loop: DeadLoopGuard::new(config.max_events_per_timestamp),
            breaker,
            errors: BoundedLog::with_capacity(config.error_log_capacity),
            events: BoundedLog::with_capacity(config.event_log_capacity),
            dead_loops: BoundedLog::with_capacity(config.dead_loop_log_capacity),
            metrics: EventMetrics::default(),
        }
    }

    /// Queues an event, recording its lineage. An event whose parent chain is
    /// suspended is suspended on arrival.
    pub(crate) fn insert(&mut self, event: Event) -> Event {
        let event = self.clock.schedule(event);
        self.queued.insert(event.id);
        self.lineage.record(event.id, event.parent);
        if let Some(parent) = event.parent {
            let mut ancestors = self.lineage.ancestors(event.id);
            ancestors.push(parent);
            if self.suspended.covers(event.id, &ancestors) {
                self.suspended.add_member(event.id);
            }
        }
        event
    }

    pub(crate) fn cancel(&mut self, id: EventId) -> bool {
        self.queued.contains(&id) && self.cancelled.insert(id)
    }

    fn retire(&mut self, id: EventId) {
        self.cancelled.remove(&id);
        self.lineage.retire(id);
        self.suspended.retire(id);
    }

    fn queued_descendants(&self, root: EventId) -> Vec<EventId> {
        self.clock
            .queued_ids()
            .filter(|id| self.lineage.has_ancestor(*id, root))
            .collect()
    }

    /// Drops everything queued or logged and restarts the clock at `start`.
    fn reset(&mut self, start: u64) {
        self.clock = SimulationClock::starting_at(start);
        self.queued.clear();
        self.cancelled.clear();
        self.lineage.clear();
        self.suspended.clear();
        self.dead_loop.reset();
        for business_type in self.breaker.suspended() {
            self.breaker.clear(business_type);
        }
        self.errors.clear();
        self.events.clear();
        self.dead_loops.clear();
        self.metrics = EventMetrics::default();
    }
}

pub struct EngineBuilder {
    store: Arc<GlobalStore>,
    config: SimConfig,
    physics: Arc<dyn PhysicsConfig>,
    handlers: Option<HandlerRegistry>,
    dispatcher: Option<Arc<dyn DispatchAlgorithm>>,
    policy: Option<Box<dyn SuspensionPolicy>>,
}

impl EngineBuilder {
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn DispatchAlgorithm>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Overrides the breaker policy derived from `SimConfig::business_breaker`.
    pub fn with_suspension_policy(mut self, policy: Box<dyn SuspensionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Validates configuration and the handler table, then schedules the first
    /// physics tick.
    pub fn build(self) -> Result<Engine, ConfigurationError> {
        self.config.validate()?;
        let handlers = self.handlers.unwrap_or_else(HandlerRegistry::standard);
        handlers.ensure_complete()?;
        let breaker = match self.policy {
            Some(policy) => BusinessTypeBreaker::new(policy),
            None => BusinessTypeBreaker::from_config(self.config.business_breaker),
        };
        let core = EngineCore::new(&self.config, self.store.now(), breaker);
        let engine = Engine {
            store: self.store,
            config: self.config,
            physics: self.physics,
            handlers,
            dispatcher: self.dispatcher,
            core: Mutex::new(core),
        };
        engine.schedule_first_tick(&mut engine.core());
        Ok(engine)
    }
}

pub struct Engine {
    store: Arc<GlobalStore>,
    config: SimConfig,
    physics: Arc<dyn PhysicsConfig>,
    handlers: HandlerRegistry,
    dispatcher: Option<Arc<dyn DispatchAlgorithm>>,
    core: Mutex<EngineCore>,
}

impl Engine {
    pub fn builder(
        store: Arc<GlobalStore>,
        config: SimConfig,
        physics: Arc<dyn PhysicsConfig>,
    ) -> EngineBuilder {
        EngineBuilder {
            store,
            config,
            physics,
            handlers: None,
            dispatcher: None,
            policy: None,
        }
    }

    pub(crate) fn core(&self) -> MutexGuard<'_, EngineCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &Arc<GlobalStore> {
        &self.store
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.core().clock.now()
    }

    /// Number of queued events, cancelled and suspended ones included.
    pub fn pending_events(&self) -> usize {
        self.core().clock.len()
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.core().clock.next_event_time()
    }

    fn schedule_first_tick(&self, core: &mut EngineCore) {
        let tick_ms = self.config.physics_tick_ms;
        if tick_ms == 0 {
            return;
        }
        let now = core.clock.now();
        core.insert(
            Event::new(EventKind::PhysicsTick, now.saturating_add(tick_ms))
                .with_payload(EventPayload::Tick { delta_ms: tick_ms }),
        );
    }

    /// Queues a new event. A trigger time before the clock is clamped to it;
    /// the returned handle carries the time actually queued.
    pub fn schedule_event(
        &self,
        parent: Option<EventId>,
        trigger_time: u64,
        kind: EventKind,
        payload: EventPayload,
    ) -> Event {
        self.schedule(
            Event::new(kind, trigger_time)
                .with_parent(parent)
                .with_payload(payload),
        )
    }

    /// Queues a fully built event (subjects included).
    pub fn schedule(&self, event: Event) -> Event {
        self.core().insert(event)
    }

    /// Lazily cancels a queued event. Returns false for unknown, already
    /// dispatched or already cancelled ids.
    pub fn cancel_event(&self, id: EventId) -> bool {
        self.core().cancel(id)
    }

    /// Queues a dispatch request for every idle device so the installed
    /// dispatch algorithm can hand out work. Returns the number queued; zero
    /// without a dispatch algorithm.
    pub fn dispatch_idle_devices(&self) -> usize {
        if self.dispatcher.is_none() {
            return 0;
        }
        let mut core = self.core();
        let now = core.clock.now();
        let idle = self.store.devices().filter(|d| d.state == DeviceState::Idle);
        for device in &idle {
            core.insert(
                Event::new(EventKind::DispatchRequest, now)
                    .with_subject(device.subject_role(), device.id.clone()),
            );
        }
        idle.len()
    }

    /// Dispatches the earliest deliverable event, if any.
    pub fn step_next_event(&self) -> Result<Option<Event>, DeadLoopError> {
        let mut core = self.core();
        self.step_within(&mut core, u64::MAX)
    }

    /// Dispatches every event due at or before `target`, then moves the clock
    /// to `target`. Returns the number of dispatched events.
    pub fn run_until(&self, target: u64) -> Result<usize, DeadLoopError> {
        let mut dispatched = 0;
        loop {
            let mut core = self.core();
            match self.step_within(&mut core, target)? {
                Some(_) => dispatched += 1,
                None => {
                    core.clock.advance_to(target);
                    self.store.advance_clock(core.clock.now());
                    return Ok(dispatched);
                }
            }
        }
    }

    /// Advances simulated time by `delta_ms`.
    pub fn tick(&self, delta_ms: u64) -> Result<usize, DeadLoopError> {
        let target = self.now().saturating_add(delta_ms);
        self.run_until(target)
    }

    /// Runs steps until the queue drains or `max_steps` is reached. With the
    /// physics tick enabled the queue never drains.
    pub fn run_until_empty(&self, max_steps: usize) -> Result<usize, DeadLoopError> {
        let mut steps = 0;
        while steps < max_steps && self.step_next_event()?.is_some() {
            steps += 1;
        }
        Ok(steps)
    }

    fn step_within(
        &self,
        core: &mut EngineCore,
        limit: u64,
    ) -> Result<Option<Event>, DeadLoopError> {
        loop {
            match core.clock.next_event_time() {
                Some(time) if time <= limit => {}
                _ => return Ok(None),
            }
            let Some(event) = core.clock.pop_next() else {
                return Ok(None);
            };
            core.queued.remove(&event.id);

            if core.cancelled.contains(&event.id) {
                core.events
                    .push(EventLogEntry::new(core.clock.now(), &event, EventOutcome::Cancelled));
                core.retire(event.id);
                continue;
            }
            if core.suspended.contains(event.id) {
                debug!(event_id = %event.id, kind = ?event.kind, "skipping suspended event");
                core.events.push(EventLogEntry::new(
                    core.clock.now(),
                    &event,
                    EventOutcome::SkippedSuspended,
                ));
                core.metrics.record_skip(event.kind);
                core.retire(event.id);
                continue;
            }
            if let Err(err) = core.dead_loop.admit(event.trigger_time) {
                error!(
                    sim_time = err.sim_time,
                    event_count = err.event_count,
                    threshold = err.threshold,
                    "dead loop detected; aborting run"
                );
                core.dead_loops.push(err.into());
                core.queued.insert(event.id);
                core.clock.requeue(event);
                return Err(err);
            }

            core.clock.advance_to(event.trigger_time);
            self.store.advance_clock(core.clock.now());
            self.dispatch(core, &event);
            core.retire(event.id);
            return Ok(Some(event));
        }
    }

    fn dispatch(&self, core: &mut EngineCore, event: &Event) {
        debug!(event_id = %event.id, kind = ?event.kind, sim_time = event.trigger_time, "dispatching event");
        let started = Instant::now();
        let outcome = {
            let mut ctx = HandlerContext::new(
                event,
                core,
                &self.store,
                &self.config,
                self.physics.as_ref(),
                self.dispatcher.as_deref(),
            );
            panic::catch_unwind(AssertUnwindSafe(|| self.handlers.dispatch(&mut ctx)))
        };
        let result = outcome.unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload))));
        core.metrics
            .record_dispatch(event.kind, started.elapsed(), result.is_err());

        match result {
            Ok(()) => {
                let now = core.clock.now();
                core.events
                    .push(EventLogEntry::new(now, event, EventOutcome::Dispatched));
            }
            Err(err) => self.isolate_failure(core, event, err),
        }
    }

    /// Logs the failure, suspends the event's chain and feeds the breaker.
    fn isolate_failure(&self, core: &mut EngineCore, event: &Event, err: HandlerError) {
        let now = core.clock.now();
        core.errors
            .push(ErrorLogEntry::from_failure(now, event, &err));
        core.events
            .push(EventLogEntry::new(now, event, EventOutcome::Failed));

        let descendants = core.queued_descendants(event.id);
        let suspended = descendants.len();
        let mut dead: HashSet<EventId> = descendants.iter().copied().collect();
        dead.insert(event.id);
        core.suspended.suspend(event.id, descendants);
        self.fault_stranded_devices(&dead, now);

        let business_type = self.business_type_of(event);
        if let Some(business_type) = business_type {
            core.breaker.record_failure(business_type, now);
        }
        warn!(
            event_id = %event.id,
            kind = ?event.kind,
            error = %err,
            suspended_descendants = suspended,
            business_type = ?business_type,
            "handler failed; chain suspended"
        );
    }

    /// Moves to FAULT every device whose pending arrival or charge completion
    /// will never be delivered.
    fn fault_stranded_devices(&self, dead: &HashSet<EventId>, now: u64) {
        let stranded = self.store.devices().filter(|device| {
            device.motion.is_some_and(|motion| dead.contains(&motion.arrival_event))
                || device
                    .truck_data()
                    .and_then(|truck| truck.charge.as_ref())
                    .is_some_and(|session| dead.contains(&session.complete_event))
        });
        for device in stranded {
            let station = self
                .store
                .devices()
                .update(&device.id, |device| {
                    device.state = DeviceState::Fault;
                    device.motion = None;
                    device.waypoints.clear();
                    device
                        .truck_data_mut()
                        .and_then(|truck| truck.charge.take())
                        .map(|session| session.station_code)
                })
                .flatten();
            if let Some(code) = station {
                self.store.stations().update(&code, |station| {
                    if station.bound_truck.as_deref() == Some(device.id.as_str()) {
                        station.bound_truck = None;
                        if station.status == StationStatus::Occupied {
                            station.status = StationStatus::Free;
                        }
                    }
                });
            }
            warn!(device_id = %device.id, sim_time = now, "device stranded by a failed chain; marked FAULT");
        }
    }

    /// Business type of the instruction the event concerns: the work
    /// instruction subject, else the device's current instruction.
    fn business_type_of(&self, event: &Event) -> Option<BusinessType> {
        let wi_ref = match event.primary_subject(SubjectRole::WorkInstruction) {
            Some(wi_ref) => wi_ref.to_string(),
            None => {
                let (_, device_id) = event.device_subject()?;
                self.store.devices().get(device_id)?.current_instruction?
            }
        };
        self.store
            .instructions()
            .get(&wi_ref)
            .map(|wi| wi.business_type)
    }

    /// Clears the store, queue and logs.
    pub fn reset(&self) {
        let mut core = self.core();
        self.store.reset();
        core.reset(0);
        self.schedule_first_tick(&mut core);
    }

    /// Replaces the whole store with `snapshot` and restarts the queue at its
    /// simulation time.
    pub fn reload(&self, snapshot: StoreSnapshot) {
        let mut core = self.core();
        self.store.replace_all(snapshot);
        core.reset(self.store.now());
        self.schedule_first_tick(&mut core);
    }

    /// Upserts the entities of `snapshot` without touching the queue.
    pub fn merge(&self, snapshot: StoreSnapshot) {
        let _core = self.core();
        self.store.merge(snapshot);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
