//! Error taxonomy for the yard engine.
//!
//! - [ValidationError]: a command was rejected before touching the queue.
//! - [HandlerError]: a dispatched event failed; its chain gets suspended.
//! - [DeadLoopError]: too many events at one timestamp; returned to the caller.
//! - [ConfigurationError]: missing or invalid configuration; fail fast.

use crate::clock::{EventKind, SubjectRole};
use crate::config::PhysicsParameter;
use crate::entities::{BusinessType, DeviceState, DeviceType};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },
    #[error("device '{id}' is a {actual:?}, expected {expected}")]
    WrongDeviceType {
        id: String,
        expected: &'static str,
        actual: DeviceType,
    },
    #[error("invalid fence status code '{0}' (expected \"01\" or \"02\")")]
    InvalidFenceStatus(String),
    #[error("move command for '{0}' has no waypoints")]
    EmptyWaypoints(String),
    #[error("move command for '{0}' has a non-finite waypoint")]
    NonFiniteWaypoint(String),
    #[error("business type {0:?} is suspended")]
    BusinessTypeSuspended(BusinessType),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("missing physics parameter {parameter} for device '{device_id}'")]
    MissingPhysics {
        device_id: String,
        parameter: PhysicsParameter,
    },
    #[error("no handler registered for event kind {0:?}")]
    UnregisteredEventKind(EventKind),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration '{path}': {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("{kind} '{id}' not found")]
    EntityNotFound { kind: &'static str, id: String },
    #[error("event has no {0:?} subject")]
    MissingSubject(SubjectRole),
    #[error("unexpected payload for {0:?}")]
    UnexpectedPayload(EventKind),
    #[error("device '{device_id}' cannot {action} while {state:?}")]
    InvalidTransition {
        device_id: String,
        state: DeviceState,
        action: &'static str,
    },
    #[error("work instruction '{wi_ref}' cannot {action}: {reason}")]
    InvalidInstruction {
        wi_ref: String,
        action: &'static str,
        reason: String,
    },
    #[error("charging station '{station}' is not available to '{truck_id}'")]
    StationUnavailable { station: String, truck_id: String },
    #[error("device '{device_id}' has unusable {quantity} {value}")]
    InvalidPhysics {
        device_id: String,
        quantity: &'static str,
        value: f64,
    },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        HandlerError::EntityNotFound {
            kind,
            id: id.into(),
        }
    }

    /// Underlying cause, for the error log.
    pub fn cause(&self) -> Option<String> {
        match self {
            HandlerError::Configuration(inner) => Some(format!("configuration: {inner}")),
            HandlerError::Validation(inner) => Some(format!("validation: {inner}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dead loop at t={sim_time}ms: {event_count} events exceed threshold {threshold}")]
pub struct DeadLoopError {
    pub sim_time: u64,
    pub event_count: usize,
    pub threshold: usize,
}
