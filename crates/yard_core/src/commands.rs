//! Command façade: validates external commands and turns them into due-now
//! events.
//!
//! Validation is synchronous and touches nothing. A command that names an
//! unknown entity, the wrong kind of device or malformed input is rejected with
//! a [ValidationError] and the queue stays untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{ChargeAction, Event, EventKind, EventPayload, SubjectRole};
use crate::entities::{BusinessType, CraneOperation, Device, DeviceType, FenceStatus};
use crate::error::ValidationError;
use crate::runner::Engine;
use crate::spatial::Point;
use crate::store::GlobalStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Move {
        truck_id: String,
        waypoints: Vec<Point>,
    },
    AssignTask {
        device_id: String,
        wi_ref: String,
    },
    ToggleFence {
        fence_id: String,
        /// "01" blocked, "02" passable.
        status_code: String,
    },
    CraneMove {
        crane_id: String,
        target_bay: i32,
    },
    CraneOperation {
        crane_id: String,
        container_id: String,
        wi_ref: String,
        operation: CraneOperation,
        #[serde(default)]
        onto: Option<String>,
    },
    Charge {
        truck_id: String,
        action: ChargeAction,
    },
}

fn unknown(kind: &'static str, id: &str) -> ValidationError {
    ValidationError::UnknownEntity {
        kind,
        id: id.to_string(),
    }
}

fn require_device(store: &GlobalStore, id: &str) -> Result<Device, ValidationError> {
    store.devices().get(id).ok_or_else(|| unknown("device", id))
}

fn require_truck(store: &GlobalStore, id: &str) -> Result<Device, ValidationError> {
    let device = require_device(store, id)?;
    if device.device_type != DeviceType::Truck {
        return Err(ValidationError::WrongDeviceType {
            id: id.to_string(),
            expected: "truck",
            actual: device.device_type,
        });
    }
    Ok(device)
}

fn require_crane(store: &GlobalStore, id: &str) -> Result<Device, ValidationError> {
    let device = require_device(store, id)?;
    if !device.device_type.is_crane() {
        return Err(ValidationError::WrongDeviceType {
            id: id.to_string(),
            expected: "crane",
            actual: device.device_type,
        });
    }
    Ok(device)
}

impl Command {
    pub fn kind(&self) -> EventKind {
        match self {
            Command::Move { .. } => EventKind::MoveStart,
            Command::AssignTask { .. } => EventKind::TaskAssigned,
            Command::ToggleFence { .. } => EventKind::FenceControl,
            Command::CraneMove { .. } => EventKind::CraneMoveStart,
            Command::CraneOperation { .. } => EventKind::CraneOperationStart,
            Command::Charge { .. } => EventKind::ChargeCommand,
        }
    }

    /// Validates against the store and builds the event, due at `now`.
    /// `is_suspended` reports business types whose assignment is refused.
    pub fn to_event(
        &self,
        store: &GlobalStore,
        now: u64,
        is_suspended: impl Fn(BusinessType) -> bool,
    ) -> Result<Event, ValidationError> {
        let event = Event::new(self.kind(), now);
        let event = match self {
            Command::Move {
                truck_id,
                waypoints,
            } => {
                require_truck(store, truck_id)?;
                if waypoints.is_empty() {
                    return Err(ValidationError::EmptyWaypoints(truck_id.clone()));
                }
                if !waypoints.iter().all(|p| p.is_finite()) {
                    return Err(ValidationError::NonFiniteWaypoint(truck_id.clone()));
                }
                event
                    .with_subject(SubjectRole::Truck, truck_id.clone())
                    .with_payload(EventPayload::Waypoints(waypoints.clone()))
            }
            Command::AssignTask { device_id, wi_ref } => {
                let device = require_device(store, device_id)?;
                let instruction = store
                    .instructions()
                    .get(wi_ref)
                    .ok_or_else(|| unknown("work instruction", wi_ref))?;
                if is_suspended(instruction.business_type) {
                    return Err(ValidationError::BusinessTypeSuspended(instruction.business_type));
                }
                event
                    .with_subject(device.subject_role(), device_id.clone())
                    .with_subject(SubjectRole::WorkInstruction, wi_ref.clone())
            }
            Command::ToggleFence {
                fence_id,
                status_code,
            } => {
                if !store.fences().contains(fence_id) {
                    return Err(unknown("fence", fence_id));
                }
                let status = FenceStatus::from_code(status_code)
                    .ok_or_else(|| ValidationError::InvalidFenceStatus(status_code.clone()))?;
                event
                    .with_subject(SubjectRole::Fence, fence_id.clone())
                    .with_payload(EventPayload::FenceStatus(status))
            }
            Command::CraneMove {
                crane_id,
                target_bay,
            } => {
                let crane = require_crane(store, crane_id)?;
                event
                    .with_subject(crane.subject_role(), crane_id.clone())
                    .with_payload(EventPayload::CraneMove {
                        target_bay: *target_bay,
                    })
            }
            Command::CraneOperation {
                crane_id,
                container_id,
                wi_ref,
                operation,
                onto,
            } => {
                let crane = require_crane(store, crane_id)?;
                if !store.containers().contains(container_id) {
                    return Err(unknown("container", container_id));
                }
                if !store.instructions().contains(wi_ref) {
                    return Err(unknown("work instruction", wi_ref));
                }
                let mut event = event
                    .with_subject(crane.subject_role(), crane_id.clone())
                    .with_subject(SubjectRole::Container, container_id.clone())
                    .with_subject(SubjectRole::WorkInstruction, wi_ref.clone())
                    .with_payload(EventPayload::CraneOperation {
                        operation: *operation,
                        onto: onto.clone(),
                    });
                if let Some(truck_id) = onto {
                    require_truck(store, truck_id)?;
                    event.add_subject(SubjectRole::Truck, truck_id.clone());
                }
                event
            }
            Command::Charge { truck_id, action } => {
                require_truck(store, truck_id)?;
                let event = event
                    .with_subject(SubjectRole::Truck, truck_id.clone())
                    .with_payload(EventPayload::Charge(action.clone()));
                match action {
                    ChargeAction::Start { station_code } => {
                        if !store.stations().contains(station_code) {
                            return Err(unknown("charging station", station_code));
                        }
                        event.with_subject(SubjectRole::ChargingStation, station_code.clone())
                    }
                    ChargeAction::Release => event,
                }
            }
        };
        Ok(event)
    }
}

impl Engine {
    /// Validates `command` and enqueues its event due now.
    pub fn submit(&self, command: Command) -> Result<Event, ValidationError> {
        let mut core = self.core();
        let now = core.clock.now();
        let breaker = &core.breaker;
        let event = command.to_event(self.store(), now, |bt| breaker.is_suspended(bt))?;
        let event = core.insert(event);
        debug!(event_id = %event.id, kind = ?event.kind, "command accepted");
        Ok(event)
    }

    pub fn move_truck(&self, truck_id: &str, waypoints: Vec<Point>) -> Result<Event, ValidationError> {
        self.submit(Command::Move {
            truck_id: truck_id.to_string(),
            waypoints,
        })
    }

    pub fn assign_task(&self, device_id: &str, wi_ref: &str) -> Result<Event, ValidationError> {
        self.submit(Command::AssignTask {
            device_id: device_id.to_string(),
            wi_ref: wi_ref.to_string(),
        })
    }

    pub fn toggle_fence(&self, fence_id: &str, status_code: &str) -> Result<Event, ValidationError> {
        self.submit(Command::ToggleFence {
            fence_id: fence_id.to_string(),
            status_code: status_code.to_string(),
        })
    }

    pub fn crane_move(&self, crane_id: &str, target_bay: i32) -> Result<Event, ValidationError> {
        self.submit(Command::CraneMove {
            crane_id: crane_id.to_string(),
            target_bay,
        })
    }

    pub fn crane_operation(
        &self,
        crane_id: &str,
        container_id: &str,
        wi_ref: &str,
        operation: CraneOperation,
        onto: Option<&str>,
    ) -> Result<Event, ValidationError> {
        self.submit(Command::CraneOperation {
            crane_id: crane_id.to_string(),
            container_id: container_id.to_string(),
            wi_ref: wi_ref.to_string(),
            operation,
            onto: onto.map(str::to_string),
        })
    }

    pub fn charge(&self, truck_id: &str, action: ChargeAction) -> Result<Event, ValidationError> {
        self.submit(Command::Charge {
            truck_id: truck_id.to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Container, Fence, WorkInstruction};
    use crate::store::StoreSnapshot;

    fn store() -> GlobalStore {
        GlobalStore::from_snapshot(StoreSnapshot {
            devices: vec![
                Device::truck("T01", Point::ORIGIN),
                Device::quay_crane("QC1", Point::new(0.0, 50.0), 0),
            ],
            fences: vec![Fence::new("F1", Point::new(5.0, 0.0), 1.0)],
            containers: vec![Container::new("C1", "VESSEL")],
            instructions: vec![WorkInstruction::new("WI-1", BusinessType::Discharge, "C1")],
            ..StoreSnapshot::default()
        })
    }

    #[test]
    fn move_requires_a_known_truck_and_waypoints() {
        let store = store();
        let never = |_: BusinessType| false;
        let cmd = Command::Move {
            truck_id: "QC1".into(),
            waypoints: vec![Point::new(1.0, 0.0)],
        };
        assert!(matches!(
            cmd.to_event(&store, 0, never),
            Err(ValidationError::WrongDeviceType { expected: "truck", .. })
        ));
        let cmd = Command::Move {
            truck_id: "T01".into(),
            waypoints: vec![],
        };
        assert_eq!(
            cmd.to_event(&store, 0, never),
            Err(ValidationError::EmptyWaypoints("T01".into()))
        );
        let cmd = Command::Move {
            truck_id: "T01".into(),
            waypoints: vec![Point::new(f64::NAN, 0.0)],
        };
        assert_eq!(
            cmd.to_event(&store, 0, never),
            Err(ValidationError::NonFiniteWaypoint("T01".into()))
        );
    }

    #[test]
    fn fence_codes_are_validated() {
        let store = store();
        let cmd = Command::ToggleFence {
            fence_id: "F1".into(),
            status_code: "03".into(),
        };
        assert_eq!(
            cmd.to_event(&store, 0, |_| false),
            Err(ValidationError::InvalidFenceStatus("03".into()))
        );
        let event = Command::ToggleFence {
            fence_id: "F1".into(),
            status_code: "01".into(),
        }
        .to_event(&store, 250, |_| false)
        .expect("valid toggle");
        assert_eq!(event.kind, EventKind::FenceControl);
        assert_eq!(event.trigger_time, 250);
        assert_eq!(event.payload, EventPayload::FenceStatus(FenceStatus::Blocked));
    }

    #[test]
    fn suspended_business_type_rejects_assignment() {
        let store = store();
        let cmd = Command::AssignTask {
            device_id: "QC1".into(),
            wi_ref: "WI-1".into(),
        };
        assert_eq!(
            cmd.to_event(&store, 0, |bt| bt == BusinessType::Discharge),
            Err(ValidationError::BusinessTypeSuspended(BusinessType::Discharge))
        );
        let event = cmd.to_event(&store, 0, |_| false).expect("assignable");
        assert_eq!(event.primary_subject(SubjectRole::QuayCrane), Some("QC1"));
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: Command = serde_json::from_str(
            r#"{"command":"crane_operation","crane_id":"QC1","container_id":"C1","wi_ref":"WI-1","operation":"FETCH"}"#,
        )
        .expect("valid command json");
        assert_eq!(cmd.kind(), EventKind::CraneOperationStart);
        assert!(cmd.to_event(&store(), 0, |_| false).is_ok());
    }
}
