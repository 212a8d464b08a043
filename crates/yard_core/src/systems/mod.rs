//! Event handlers and the table that routes each [EventKind] to one.
//!
//! Handlers receive a [HandlerContext]: the event being dispatched, the
//! engine's scheduling surface, the store and configuration. Follow-up events
//! created through [HandlerContext::follow_up] are children of the current
//! event, which is what lets a failure suspend the whole chain.

pub mod charging;
pub mod crane;
pub mod dispatch;
pub mod fence;
pub mod movement;
pub mod task;
pub mod tick;

use std::collections::HashMap;

use crate::clock::{Event, EventId, EventKind, EventPayload, SubjectRole};
use crate::config::{PhysicsConfig, SimConfig};
use crate::dispatch::DispatchAlgorithm;
use crate::entities::{
    BusinessType, ChargingStation, Container, Device, DeviceState, Fence, WorkInstruction,
};
use crate::error::{ConfigurationError, HandlerError};
use crate::runner::EngineCore;
use crate::store::GlobalStore;

pub type Handler = Box<dyn Fn(&mut HandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Event kind to handler table, built once before the engine starts.
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Handler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// An empty table; [HandlerRegistry::ensure_complete] fails until every kind is registered.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Every built-in handler.
    pub fn standard() -> Self {
        Self::new()
            .with(EventKind::MoveStart, movement::handle_move_start)
            .with(EventKind::Arrival, movement::handle_arrival)
            .with(EventKind::FenceControl, fence::handle_fence_control)
            .with(EventKind::TaskAssigned, task::handle_task_assigned)
            .with(EventKind::CraneMoveStart, crane::handle_crane_move_start)
            .with(EventKind::CraneOperationStart, crane::handle_crane_operation_start)
            .with(EventKind::CraneOperationDone, crane::handle_crane_operation_done)
            .with(EventKind::ChargeCommand, charging::handle_charge_command)
            .with(EventKind::ChargeComplete, charging::handle_charge_complete)
            .with(EventKind::PhysicsTick, tick::handle_physics_tick)
            .with(EventKind::DispatchRequest, dispatch::handle_dispatch_request)
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&mut HandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn with<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(kind, handler);
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn ensure_complete(&self) -> Result<(), ConfigurationError> {
        match EventKind::ALL.iter().find(|kind| !self.contains(**kind)) {
            Some(kind) => Err(ConfigurationError::UnregisteredEventKind(*kind)),
            None => Ok(()),
        }
    }

    pub(crate) fn dispatch(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        let kind = ctx.event().kind;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ConfigurationError::UnregisteredEventKind(kind))?;
        handler(ctx)
    }
}

pub struct HandlerContext<'a> {
    event: &'a Event,
    core: &'a mut EngineCore,
    store: &'a GlobalStore,
    config: &'a SimConfig,
    physics: &'a dyn PhysicsConfig,
    dispatcher: Option<&'a dyn DispatchAlgorithm>,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        event: &'a Event,
        core: &'a mut EngineCore,
        store: &'a GlobalStore,
        config: &'a SimConfig,
        physics: &'a dyn PhysicsConfig,
        dispatcher: Option<&'a dyn DispatchAlgorithm>,
    ) -> Self {
        Self {
            event,
            core,
            store,
            config,
            physics,
            dispatcher,
        }
    }

    pub fn event(&self) -> &'a Event {
        self.event
    }

    pub fn payload(&self) -> &'a EventPayload {
        &self.event.payload
    }

    pub fn store(&self) -> &'a GlobalStore {
        self.store
    }

    pub fn config(&self) -> &'a SimConfig {
        self.config
    }

    pub fn physics(&self) -> &'a dyn PhysicsConfig {
        self.physics
    }

    pub fn dispatcher(&self) -> Option<&'a dyn DispatchAlgorithm> {
        self.dispatcher
    }

    pub fn now(&self) -> u64 {
        self.core.clock.now()
    }

    /// Simulation time `delay_ms` from now, or [HandlerError::InvalidPhysics]
    /// when that lies beyond the representable clock.
    pub fn due_after(&self, device_id: &str, delay_ms: u64) -> Result<u64, HandlerError> {
        self.now()
            .checked_add(delay_ms)
            .ok_or_else(|| HandlerError::InvalidPhysics {
                device_id: device_id.to_string(),
                quantity: "duration",
                value: delay_ms as f64,
            })
    }

    /// New event caused by the current one; not queued until [Self::schedule].
    pub fn follow_up(&self, kind: EventKind, trigger_time: u64) -> Event {
        Event::new(kind, trigger_time).with_parent(Some(self.event.id))
    }

    pub fn schedule(&mut self, event: Event) -> Event {
        self.core.insert(event)
    }

    pub fn cancel(&mut self, id: EventId) -> bool {
        self.core.cancel(id)
    }

    pub fn is_business_type_suspended(&self, business_type: BusinessType) -> bool {
        self.core.breaker.is_suspended(business_type)
    }

    pub fn suspended_business_types(&self) -> Vec<BusinessType> {
        self.core.breaker.suspended()
    }

    pub fn subject(&self, role: SubjectRole) -> Result<&'a str, HandlerError> {
        self.event
            .primary_subject(role)
            .ok_or(HandlerError::MissingSubject(role))
    }

    /// Id of the event's device subject, whatever its device type.
    pub fn device_subject(&self) -> Result<&'a str, HandlerError> {
        self.event
            .device_subject()
            .map(|(_, id)| id)
            .ok_or(HandlerError::MissingSubject(SubjectRole::Truck))
    }

    /// Id of the event's quay or yard crane subject.
    pub fn crane_subject(&self) -> Result<&'a str, HandlerError> {
        self.event
            .primary_subject(SubjectRole::QuayCrane)
            .or_else(|| self.event.primary_subject(SubjectRole::YardCrane))
            .ok_or(HandlerError::MissingSubject(SubjectRole::QuayCrane))
    }

    pub fn device(&self, id: &str) -> Result<Device, HandlerError> {
        self.store
            .devices()
            .get(id)
            .ok_or_else(|| HandlerError::not_found("device", id))
    }

    pub fn fence(&self, id: &str) -> Result<Fence, HandlerError> {
        self.store
            .fences()
            .get(id)
            .ok_or_else(|| HandlerError::not_found("fence", id))
    }

    pub fn station(&self, code: &str) -> Result<ChargingStation, HandlerError> {
        self.store
            .stations()
            .get(code)
            .ok_or_else(|| HandlerError::not_found("charging station", code))
    }

    pub fn instruction(&self, wi_ref: &str) -> Result<WorkInstruction, HandlerError> {
        self.store
            .instructions()
            .get(wi_ref)
            .ok_or_else(|| HandlerError::not_found("work instruction", wi_ref))
    }

    pub fn container(&self, id: &str) -> Result<Container, HandlerError> {
        self.store
            .containers()
            .get(id)
            .ok_or_else(|| HandlerError::not_found("container", id))
    }

    /// Settles a device that has nothing left to do: WORKING/WAITING while it
    /// still holds an instruction, otherwise IDLE with a dispatch request.
    pub fn settle_device(&mut self, device: &mut Device) {
        if device.current_instruction.is_some() {
            device.state = DeviceState::WAITING;
        } else {
            device.state = DeviceState::Idle;
            self.request_dispatch(device);
        }
    }

    /// Asks the installed dispatch algorithm for work for an idle device.
    pub fn request_dispatch(&mut self, device: &Device) {
        if self.dispatcher.is_none() {
            return;
        }
        let request = self
            .follow_up(EventKind::DispatchRequest, self.now())
            .with_subject(device.subject_role(), device.id.clone());
        self.schedule(request);
    }
}
