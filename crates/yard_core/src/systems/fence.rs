//! Fence control: toggling a traffic fence between BLOCKED and PASSABLE.

use tracing::{debug, info};

use crate::clock::{EventKind, EventPayload, SubjectRole};
use crate::entities::FenceStatus;
use crate::error::HandlerError;
use crate::spatial::segment_enters_circle;

use super::movement::{begin_segment, halt, hold_at_fence};
use super::HandlerContext;

pub fn handle_fence_control(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let fence_id = ctx.subject(SubjectRole::Fence)?;
    let EventPayload::FenceStatus(status) = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::FenceControl));
    };
    let mut fence = ctx.fence(fence_id)?;
    if fence.status == *status {
        debug!(fence_id, status = ?status, "fence already in requested status");
        return Ok(());
    }
    fence.status = *status;

    match status {
        FenceStatus::Blocked => {
            ctx.store().fences().insert(fence.clone());
            let mut halted = 0;
            for mut device in ctx.store().devices().filter(|d| d.is_truck() && d.motion.is_some()) {
                let Some(motion) = device.motion else {
                    continue;
                };
                if !segment_enters_circle(device.position, motion.target, fence.center, fence.radius) {
                    continue;
                }
                halt(ctx, &mut device)?;
                hold_at_fence(ctx, &mut device, fence_id);
                ctx.store().devices().insert(device);
                halted += 1;
            }
            info!(fence_id, halted, sim_time = ctx.now(), "fence blocked");
        }
        FenceStatus::Passable => {
            let waiting = std::mem::take(&mut fence.waiting_trucks);
            ctx.store().fences().insert(fence);
            let mut released = 0;
            let mut first_error = None;
            for truck_id in &waiting {
                let Some(mut device) = ctx.store().devices().get(truck_id) else {
                    continue;
                };
                if device.blocked_by.as_deref() != Some(fence_id) {
                    continue;
                }
                device.blocked_by = None;
                match begin_segment(ctx, &mut device) {
                    Ok(()) => released += 1,
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
                ctx.store().devices().insert(device);
            }
            info!(fence_id, released, sim_time = ctx.now(), "fence opened");
            // Later trucks are released even when an earlier one fails.
            if let Some(err) = first_error {
                return Err(err);
            }
        }
    }
    Ok(())
}
