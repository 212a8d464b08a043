//! Task assignment: binds a work instruction to a device.

use tracing::{debug, info};

use crate::clock::SubjectRole;
use crate::entities::{DeviceState, DeviceType, InstructionStatus};
use crate::error::HandlerError;

use super::HandlerContext;

pub fn handle_task_assigned(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let device_id = ctx.device_subject()?;
    let wi_ref = ctx.subject(SubjectRole::WorkInstruction)?;
    let mut device = ctx.device(device_id)?;
    let mut instruction = ctx.instruction(wi_ref)?;

    // The breaker may have tripped between validation and dispatch.
    if ctx.is_business_type_suspended(instruction.business_type) {
        instruction.status = InstructionStatus::Skipped;
        ctx.store().instructions().insert(instruction);
        info!(device_id, wi_ref, "instruction skipped: business type suspended");
        return Ok(());
    }
    if instruction.is_closed() {
        return Err(HandlerError::InvalidInstruction {
            wi_ref: instruction.ref_no,
            action: "be assigned",
            reason: format!("instruction is {:?}", instruction.status),
        });
    }

    device.take_instruction(wi_ref);
    if instruction.assigned_at.is_none() {
        instruction.assigned_at = Some(ctx.now());
    }
    if !instruction.devices().any(|id| id == device.id) {
        let slot = match device.device_type {
            DeviceType::Truck => &mut instruction.carry_device,
            _ if instruction.fetch_device.is_none() => &mut instruction.fetch_device,
            _ => &mut instruction.put_device,
        };
        if slot.is_none() {
            *slot = Some(device.id.clone());
        }
    }
    if device.state == DeviceState::Idle {
        device.state = DeviceState::WAITING;
    }
    debug!(device_id, wi_ref, "instruction assigned");
    ctx.store().instructions().insert(instruction);
    ctx.store().devices().insert(device);
    Ok(())
}
