//! Charging handlers.
//!
//! A start command binds the station to the truck and either plugs in (truck
//! already within `charge_align_threshold`) or drives there first; plugging in
//! happens when the route finishes. Power rises linearly at the station rate
//! until `ChargeComplete` or a release command.

use tracing::info;

use crate::clock::{ChargeAction, EventKind, EventPayload, SubjectRole, ONE_SEC_MS};
use crate::entities::{ChargeSession, ChargingStation, Device, DeviceState, StationStatus};
use crate::error::HandlerError;

use super::movement::{begin_segment, halt, prepare_travel};
use super::HandlerContext;

pub fn handle_charge_command(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let truck_id = ctx.subject(SubjectRole::Truck)?;
    let EventPayload::Charge(action) = ctx.payload() else {
        return Err(HandlerError::UnexpectedPayload(EventKind::ChargeCommand));
    };
    let mut device = ctx.device(truck_id)?;
    if !device.is_truck() {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id,
            state: device.state,
            action: "charge",
        });
    }

    match action {
        ChargeAction::Start { station_code } => start(ctx, &mut device, station_code)?,
        ChargeAction::Release => release(ctx, &mut device)?,
    }
    ctx.store().devices().insert(device);
    Ok(())
}

fn start(ctx: &mut HandlerContext<'_>, device: &mut Device, station_code: &str) -> Result<(), HandlerError> {
    let station = ctx.station(station_code)?;
    if !station.is_available_for(&device.id) {
        return Err(HandlerError::StationUnavailable {
            station: station.code,
            truck_id: device.id.clone(),
        });
    }
    if device.state == DeviceState::Charging {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id.clone(),
            state: device.state,
            action: "start charging",
        });
    }

    let truck_id = device.id.clone();
    ctx.store()
        .stations()
        .update(station_code, |s| s.bound_truck = Some(truck_id));
    if let Some(truck) = device.truck_data_mut() {
        truck.charging_target = Some(station.code.clone());
    }

    if device
        .position
        .is_within(station.position, ctx.config().charge_align_threshold)
    {
        halt(ctx, device)?;
        device.waypoints.clear();
        return begin_charging(ctx, device, &station);
    }

    if !device.state.accepts_travel() {
        return Err(HandlerError::InvalidTransition {
            device_id: device.id.clone(),
            state: device.state,
            action: "drive to charger",
        });
    }
    prepare_travel(ctx, device)?;
    halt(ctx, device)?;
    device.waypoints = [station.position].into_iter().collect();
    begin_segment(ctx, device)
}

/// Plugs a truck into `station` and schedules the full-charge event.
pub(crate) fn begin_charging(
    ctx: &mut HandlerContext<'_>,
    device: &mut Device,
    station: &ChargingStation,
) -> Result<(), HandlerError> {
    let rate = station.charge_rate;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "charge rate",
            value: rate,
        });
    }
    let start_level = device.truck_data().map_or(0.0, |truck| truck.power_level);
    let duration_ms = ((100.0 - start_level) / rate * ONE_SEC_MS as f64).ceil();
    if duration_ms >= u64::MAX as f64 {
        return Err(HandlerError::InvalidPhysics {
            device_id: device.id.clone(),
            quantity: "charge rate",
            value: rate,
        });
    }
    let now = ctx.now();
    let due = ctx.due_after(&device.id, duration_ms as u64)?;
    let complete = ctx
        .follow_up(EventKind::ChargeComplete, due)
        .with_subject(SubjectRole::Truck, device.id.clone())
        .with_subject(SubjectRole::ChargingStation, station.code.clone());
    let complete = ctx.schedule(complete);

    if let Some(truck) = device.truck_data_mut() {
        truck.charge = Some(ChargeSession {
            station_code: station.code.clone(),
            started_at: now,
            start_level,
            rate_per_sec: rate,
            complete_event: complete.id,
        });
    }
    device.state = DeviceState::Charging;
    device.motion = None;
    let truck_id = device.id.clone();
    ctx.store().stations().update(&station.code, |s| {
        s.status = StationStatus::Occupied;
        s.bound_truck = Some(truck_id);
    });
    info!(
        truck_id = %device.id,
        station = %station.code,
        start_level,
        full_at = complete.trigger_time,
        "charging started"
    );
    Ok(())
}

fn release(ctx: &mut HandlerContext<'_>, device: &mut Device) -> Result<(), HandlerError> {
    let now = ctx.now();
    let Some(truck) = device.truck_data_mut() else {
        return Ok(());
    };
    let session = truck.charge.take();
    let station_code = truck.charging_target.take();
    if let Some(session) = &session {
        truck.set_power_level(session.level_at(now));
    }
    let power_level = truck.power_level;

    if let Some(session) = &session {
        ctx.cancel(session.complete_event);
    }
    if let Some(code) = station_code.or(session.map(|s| s.station_code)) {
        unbind_station(ctx, &code);
    }
    if device.state == DeviceState::Charging {
        ctx.settle_device(device);
    }
    info!(truck_id = %device.id, power_level, "charging released");
    Ok(())
}

pub fn handle_charge_complete(ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
    let truck_id = ctx.subject(SubjectRole::Truck)?;
    let mut device = ctx.device(truck_id)?;
    let event_id = ctx.event().id;
    let Some(truck) = device.truck_data_mut() else {
        return Ok(());
    };
    if truck.charge.as_ref().map(|s| s.complete_event) != Some(event_id) {
        return Ok(());
    }
    let session = truck.charge.take();
    truck.set_power_level(100.0);
    truck.need_charge = false;
    truck.charging_target = None;

    if let Some(session) = session {
        unbind_station(ctx, &session.station_code);
    }
    ctx.settle_device(&mut device);
    info!(truck_id, sim_time = ctx.now(), "charging complete");
    ctx.store().devices().insert(device);
    Ok(())
}

fn unbind_station(ctx: &HandlerContext<'_>, code: &str) {
    ctx.store().stations().update(code, |s| {
        s.bound_truck = None;
        if s.status == StationStatus::Occupied {
            s.status = StationStatus::Free;
        }
    });
}
