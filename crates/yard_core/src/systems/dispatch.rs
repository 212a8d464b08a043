//! Dispatch requests: consult the installed [DispatchAlgorithm] for an idle device.
//!
//! [DispatchAlgorithm]: crate::dispatch::DispatchAlgorithm

use tracing::{debug, warn};

use crate::entities::DeviceState;
use crate::error::HandlerError;

use super::HandlerContext;

pub fn handle_dispatch_request(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let Some(dispatcher) = ctx.dispatcher() else {
        return Ok(());
    };
    let device_id = ctx.device_subject()?;
    let device = ctx.device(device_id)?;
    if device.state != DeviceState::Idle {
        debug!(device_id, state = ?device.state, "device no longer idle; dispatch skipped");
        return Ok(());
    }

    let now = ctx.now();
    let suspended = ctx.suspended_business_types();
    let commands = dispatcher.on_device_idle(&device, ctx.store(), now);
    for command in commands {
        match command.to_event(ctx.store(), now, |bt| suspended.contains(&bt)) {
            Ok(event) => {
                let event = event.with_parent(Some(ctx.event().id));
                ctx.schedule(event);
            }
            Err(err) => {
                warn!(device_id, kind = ?command.kind(), error = %err, "dispatcher command rejected");
            }
        }
    }
    Ok(())
}
