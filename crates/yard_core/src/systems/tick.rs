//! Physics tick: a self-rescheduling root event that integrates continuous
//! state between discrete events.
//!
//! Moving devices advance linearly along their segment. When a device is
//! within `arrival_threshold` of its target before the discrete arrival is
//! due, that arrival is cancelled and a new one is injected at the tick
//! instant, so both paths agree within one tick. Charging trucks get their
//! power level refreshed from the active session.

use crate::clock::{Event, EventKind, EventPayload};
use crate::error::HandlerError;

use super::movement::{integrate, refresh_fences_inside};
use super::HandlerContext;

pub fn handle_physics_tick(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let now = ctx.now();
    let tick_ms = ctx.config().physics_tick_ms;
    if tick_ms > 0 {
        // Root event: a failure in one tick never suspends the next.
        ctx.schedule(
            Event::new(EventKind::PhysicsTick, now.saturating_add(tick_ms))
                .with_payload(EventPayload::Tick { delta_ms: tick_ms }),
        );
    }

    let threshold = ctx.config().arrival_threshold;
    let store = ctx.store();
    for mut device in store.devices().filter(|d| d.motion.is_some() || d.truck_data().is_some_and(|t| t.charge.is_some())) {
        if let Some(mut motion) = device.motion {
            let elapsed = now.saturating_sub(motion.updated_at);
            if elapsed > 0 {
                device.position = integrate(device.position, motion.target, device.speed, elapsed);
                motion.updated_at = now;
                refresh_fences_inside(store, &mut device);
            }
            if device.position.distance_to(motion.target) <= threshold && motion.arrives_at > now {
                ctx.cancel(motion.arrival_event);
                let arrival = Event::new(EventKind::Arrival, now)
                    .with_parent(Some(motion.started_by))
                    .with_subject(device.subject_role(), device.id.clone())
                    .with_payload(EventPayload::Segment { target: motion.target });
                let arrival = ctx.schedule(arrival);
                motion.arrival_event = arrival.id;
                motion.arrives_at = now;
            }
            device.motion = Some(motion);
        }
        if let Some(truck) = device.truck_data_mut() {
            if let Some(level) = truck.charge.as_ref().map(|session| session.level_at(now)) {
                truck.power_level = level;
            }
        }
        store.devices().insert(device);
    }
    Ok(())
}
