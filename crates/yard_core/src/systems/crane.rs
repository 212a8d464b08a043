//! Crane handlers: rail travel between bays and fetch/put cycles.
//!
//! A cycle lasts `crane_operation_ms` plus one hoist round trip
//! (`2 * hoist_height_m` at the crane's hoist speed). Completion moves the
//! container and advances the work instruction:
//!
//! - fetch: container onto the crane, instruction FETCHED (a truck it was
//!   taken from is unloaded and released from the instruction)
//! - put onto a truck: container onto the truck, instruction CARRYING, crane
//!   released from the instruction
//! - put without a truck: container at the instruction's destination,
//!   instruction COMPLETED/DELIVERED and released from every device

use tracing::{debug, info};

use crate::clock::{EventKind, EventPayload, SubjectRole};
use crate::entities::{CraneOperation, Device, DeviceState, InstructionStatus, InstructionStep};
use crate::error::HandlerError;
use crate::spatial::{travel_time_ms, Point};

use super::movement::{begin_segment, halt, prepare_travel};
use super::HandlerContext;

fn require_crane(device: &Device, action: &'static str) -> Result<(), HandlerError> {
    if device.crane().is_some() {
        Ok(())
    } else {
        Err(HandlerError::InvalidTransition {
            device_id: device.id.clone(),
            state: device.state,
            action,
        })
    }
}

pub fn handle_crane_move_start(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let crane_id = ctx.crane_subject()?;
    let EventPayload::CraneMove { target_bay } = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::CraneMoveStart));
    };
    let mut device = ctx.device(crane_id)?;
    require_crane(&device, "move along the rail")?;
    if !device.state.accepts_travel() || device.crane().is_some_and(|c| c.operation.is_some()) {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id,
            state: device.state,
            action: "move along the rail",
        });
    }

    prepare_travel(ctx, &mut device)?;
    halt(ctx, &mut device)?;
    let target = Point::new(*target_bay as f64 * ctx.config().bay_pitch_m, device.position.y);
    if let Some(crane) = device.crane_mut() {
        crane.target_bay = Some(*target_bay);
    }
    device.waypoints = [target].into_iter().collect();
    begin_segment(ctx, &mut device)?;
    ctx.store().devices().insert(device);
    Ok(())
}

pub fn handle_crane_operation_start(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let crane_id = ctx.crane_subject()?;
    let container_id = ctx.subject(SubjectRole::Container)?;
    let wi_ref = ctx.subject(SubjectRole::WorkInstruction)?;
    let EventPayload::CraneOperation { operation, .. } = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::CraneOperationStart));
    };

    let mut device = ctx.device(crane_id)?;
    require_crane(&device, "operate")?;
    if device.state.is_moving() || device.crane().is_some_and(|c| c.operation.is_some()) {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id,
            state: device.state,
            action: "operate",
        });
    }
    ctx.container(container_id)?;
    let mut instruction = ctx.instruction(wi_ref)?;
    if instruction.is_closed() {
        return Err(HandlerError::InvalidInstruction {
            wi_ref: instruction.ref_no,
            action: "start a crane operation",
            reason: format!("instruction is {:?}", instruction.status),
        });
    }

    let hoist_speed = ctx.physics().hoist_speed(crane_id)?;
    let hoist_cycle = travel_time_ms(2.0 * ctx.config().hoist_height_m, hoist_speed).ok_or(
        HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "hoist speed",
            value: hoist_speed,
        },
    )?;
    let duration = ctx.config().crane_operation_ms.saturating_add(hoist_cycle);
    let now = ctx.now();
    let due = ctx.due_after(&device.id, duration)?;

    let mut done = ctx.follow_up(EventKind::CraneOperationDone, due);
    done.subjects = ctx.event().subjects.clone();
    done.payload = ctx.payload().clone();
    let done = ctx.schedule(done);

    if let Some(crane) = device.crane_mut() {
        crane.operation = Some(*operation);
        crane.hoist_speed = hoist_speed;
    }
    device.take_instruction(wi_ref);
    device.state = DeviceState::WAITING;
    if instruction.status == InstructionStatus::Pending {
        instruction.status = InstructionStatus::Executing;
        instruction.started_at = Some(now);
        ctx.store().instructions().insert(instruction);
    }
    ctx.store().devices().insert(device);
    debug!(crane_id, wi_ref, operation = ?operation, done_at = done.trigger_time, "crane operation started");
    Ok(())
}

pub fn handle_crane_operation_done(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let crane_id = ctx.crane_subject()?;
    let container_id = ctx.subject(SubjectRole::Container)?;
    let wi_ref = ctx.subject(SubjectRole::WorkInstruction)?;
    let EventPayload::CraneOperation { operation, onto } = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::CraneOperationDone));
    };

    let mut crane = ctx.device(crane_id)?;
    let mut container = ctx.container(container_id)?;
    let mut instruction = ctx.instruction(wi_ref)?;
    let now = ctx.now();

    match (operation, onto) {
        (CraneOperation::Fetch, _) => {
            let source = std::mem::replace(&mut container.location, crane.id.clone());
            instruction.step = InstructionStep::Fetched;
            if let Some(mut truck) = ctx.store().devices().get(&source).filter(Device::is_truck) {
                if let Some(data) = truck.truck_data_mut() {
                    data.loaded = false;
                }
                truck.release_instruction(wi_ref);
                if truck.state == DeviceState::WAITING && truck.blocked_by.is_none() {
                    ctx.settle_device(&mut truck);
                }
                ctx.store().devices().insert(truck);
            }
        }
        (CraneOperation::Put, Some(truck_id)) => {
            let mut truck = ctx.device(truck_id)?;
            if let Some(data) = truck.truck_data_mut() {
                data.loaded = true;
            }
            truck.take_instruction(wi_ref);
            ctx.store().devices().insert(truck);
            container.location = truck_id.clone();
            instruction.step = InstructionStep::Carrying;
            crane.release_instruction(wi_ref);
        }
        (CraneOperation::Put, None) => {
            container.location = instruction.to_location.clone();
            instruction.status = InstructionStatus::Completed;
            instruction.step = InstructionStep::Delivered;
            instruction.completed_at = Some(now);
            for device_id in instruction.devices().filter(|id| *id != crane_id) {
                if let Some(mut other) = ctx.store().devices().get(device_id) {
                    other.release_instruction(wi_ref);
                    if other.state == DeviceState::WAITING && other.blocked_by.is_none() {
                        ctx.settle_device(&mut other);
                    }
                    ctx.store().devices().insert(other);
                }
            }
            crane.release_instruction(wi_ref);
            info!(wi_ref, container_id, location = %container.location, "work instruction completed");
        }
    }

    if let Some(data) = crane.crane_mut() {
        data.operation = None;
    }
    ctx.settle_device(&mut crane);
    ctx.store().containers().insert(container);
    ctx.store().instructions().insert(instruction);
    ctx.store().devices().insert(crane);
    Ok(())
}
