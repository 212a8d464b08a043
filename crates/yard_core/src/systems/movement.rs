//! Movement handlers: devices travel waypoint by waypoint.
//!
//! Each segment toward the head waypoint schedules one discrete `Arrival` at
//! `now + distance / speed`. The physics tick integrates the position in
//! between and may pull the arrival forward (see [super::tick]). A truck whose
//! next segment enters a BLOCKED fence is held at that fence instead.

use tracing::{debug, info};

use crate::clock::{EventKind, EventPayload, SubjectRole, ONE_SEC_MS};
use crate::entities::{Device, DeviceState, Motion};
use crate::error::HandlerError;
use crate::spatial::{advance_towards, segment_enters_circle, travel_time_ms, Point};
use crate::store::GlobalStore;

use super::charging::begin_charging;
use super::HandlerContext;

pub fn handle_move_start(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let truck_id = ctx.subject(SubjectRole::Truck)?;
    let EventPayload::Waypoints(waypoints) = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::MoveStart));
    };
    let mut device = ctx.device(truck_id)?;
    if !device.state.accepts_travel() {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id,
            state: device.state,
            action: "move",
        });
    }
    prepare_travel(ctx, &mut device)?;
    halt(ctx, &mut device)?;
    device.waypoints = waypoints.iter().copied().collect();
    begin_segment(ctx, &mut device)?;
    ctx.store().devices().insert(device);
    Ok(())
}

/// Refreshes speed (and a truck's consume rate) from the physics collaborator.
pub(crate) fn prepare_travel(ctx: &HandlerContext<'_>, device: &mut Device) -> Result<(), HandlerError> {
    let speed = ctx.physics().horizontal_speed(&device.id)?;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "horizontal speed",
            value: speed,
        });
    }
    if device.is_truck() {
        let consume_rate = ctx.physics().power_consume_rate(&device.id)?;
        if let Some(truck) = device.truck_data_mut() {
            truck.consume_rate = consume_rate;
        }
    }
    device.speed = speed;
    Ok(())
}

pub fn handle_arrival(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let device_id = ctx.device_subject()?;
    let mut device = ctx.device(device_id)?;
    let Some(motion) = device.motion else {
        debug!(device_id, event_id = %ctx.event().id, "stale arrival ignored");
        return Ok(());
    };
    if motion.arrival_event != ctx.event().id {
        debug!(device_id, event_id = %ctx.event().id, "superseded arrival ignored");
        return Ok(());
    }

    drain_power(ctx, &mut device, ctx.now().saturating_sub(motion.started_at))?;
    device.position = motion.target;
    device.motion = None;
    device.waypoints.pop_front();
    refresh_fences_inside(ctx.store(), &mut device);

    if device.waypoints.is_empty() {
        finish_route(ctx, &mut device)?;
    } else {
        begin_segment(ctx, &mut device)?;
    }
    ctx.store().devices().insert(device);
    Ok(())
}

/// Starts travel toward the head waypoint, or finishes the route when there is none.
pub(crate) fn begin_segment(ctx: &mut HandlerContext<'_>, device: &mut Device) -> Result<(), HandlerError> {
    let Some(&target) = device.waypoints.front() else {
        return finish_route(ctx, device);
    };
    if device.is_truck() {
        if let Some(fence_id) = blocking_fence(ctx.store(), device.position, target) {
            hold_at_fence(ctx, device, &fence_id);
            return Ok(());
        }
    }

    let distance = device.position.distance_to(target);
    let travel = travel_time_ms(distance, device.speed).ok_or_else(|| unreachable_target(device, distance))?;
    let now = ctx.now();
    let due = ctx.due_after(&device.id, travel)?;
    let arrival = ctx
        .follow_up(EventKind::Arrival, due)
        .with_subject(device.subject_role(), device.id.clone())
        .with_payload(EventPayload::Segment { target });
    let arrival = ctx.schedule(arrival);

    device.motion = Some(Motion {
        from: device.position,
        target,
        started_at: now,
        updated_at: now,
        arrives_at: arrival.trigger_time,
        arrival_event: arrival.id,
        started_by: ctx.event().id,
    });
    device.state = DeviceState::MOVING;
    device.blocked_by = None;
    Ok(())
}

fn unreachable_target(device: &Device, distance: f64) -> HandlerError {
    if device.speed.is_finite() && device.speed > 0.0 {
        HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "travel distance",
            value: distance,
        }
    } else {
        HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "speed",
            value: device.speed,
        }
    }
}

/// Route done: plug into a charger, finish a crane move, or settle.
fn finish_route(ctx: &mut HandlerContext<'_>, device: &mut Device) -> Result<(), HandlerError> {
    device.motion = None;
    if let Some(crane) = device.crane_mut() {
        if let Some(bay) = crane.target_bay.take() {
            crane.current_bay = bay;
        }
    }

    let charging_target = device.truck_data().and_then(|truck| truck.charging_target.clone());
    if let Some(code) = charging_target {
        let station = ctx.station(&code)?;
        if device
            .position
            .is_within(station.position, ctx.config().charge_align_threshold)
        {
            return begin_charging(ctx, device, &station);
        }
    }

    ctx.settle_device(device);
    Ok(())
}

/// Stops the current segment where the device is now: syncs the position,
/// cancels the pending arrival, settles power use and leaves any fence queue.
/// Remaining waypoints are kept.
pub(crate) fn halt(ctx: &mut HandlerContext<'_>, device: &mut Device) -> Result<(), HandlerError> {
    if let Some(motion) = device.motion.take() {
        let now = ctx.now();
        let elapsed = now.saturating_sub(motion.updated_at);
        device.position = integrate(device.position, motion.target, device.speed, elapsed);
        ctx.cancel(motion.arrival_event);
        drain_power(ctx, device, now.saturating_sub(motion.started_at))?;
        refresh_fences_inside(ctx.store(), device);
    }
    if let Some(fence_id) = device.blocked_by.take() {
        let truck_id = device.id.clone();
        ctx.store()
            .fences()
            .update(&fence_id, |fence| fence.waiting_trucks.retain(|id| *id != truck_id));
    }
    Ok(())
}

/// Queues a truck at `fence_id` in WORKING/WAITING.
pub(crate) fn hold_at_fence(ctx: &mut HandlerContext<'_>, device: &mut Device, fence_id: &str) {
    device.state = DeviceState::WAITING;
    device.motion = None;
    device.blocked_by = Some(fence_id.to_string());
    let truck_id = device.id.clone();
    ctx.store().fences().update(fence_id, |fence| {
        if !fence.waiting_trucks.contains(&truck_id) {
            fence.waiting_trucks.push(truck_id.clone());
        }
    });
    info!(truck_id = %device.id, fence_id, sim_time = ctx.now(), "truck held at blocked fence");
}

/// First BLOCKED fence the segment `from`-`to` enters, in id order.
pub(crate) fn blocking_fence(store: &GlobalStore, from: Point, to: Point) -> Option<String> {
    store
        .fences()
        .filter(|fence| fence.is_blocked() && segment_enters_circle(from, to, fence.center, fence.radius))
        .into_iter()
        .next()
        .map(|fence| fence.id)
}

pub(crate) fn integrate(position: Point, target: Point, speed: f64, elapsed_ms: u64) -> Point {
    let step = speed * elapsed_ms as f64 / ONE_SEC_MS as f64;
    advance_towards(position, target, step)
}

pub(crate) fn refresh_fences_inside(store: &GlobalStore, device: &mut Device) {
    let position = device.position;
    device.fences_inside = store
        .fences()
        .filter(|fence| fence.contains(position))
        .into_iter()
        .map(|fence| fence.id)
        .collect();
}

/// Charges a truck's battery for `travel_ms` of driving.
fn drain_power(ctx: &HandlerContext<'_>, device: &mut Device, travel_ms: u64) -> Result<(), HandlerError> {
    let (rate, loaded) = match device.truck_data() {
        Some(truck) => (truck.consume_rate, truck.loaded),
        None => return Ok(()),
    };
    if travel_ms == 0 || rate <= 0.0 {
        return Ok(());
    }
    let coefficient = if loaded {
        ctx.physics().loaded_consume_coefficient(&device.id)?
    } else {
        1.0
    };
    let safe_threshold = ctx.physics().safe_power_threshold(&device.id)?;
    let Some(truck) = device.truck_data_mut() else {
        return Ok(());
    };
    let used = rate * (travel_ms as f64 / ONE_SEC_MS as f64) * coefficient;
    truck.set_power_level(truck.power_level - used);
    let newly_low = truck.power_level < safe_threshold && !truck.need_charge;
    let power_level = truck.power_level;
    if newly_low {
        truck.need_charge = true;
        info!(truck_id = %device.id, power_level, "truck needs charging");
    }
    Ok(())
}
