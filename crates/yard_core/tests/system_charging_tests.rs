mod support;

use yard_core::clock::{ChargeAction, EventKind};
use yard_core::entities::{ChargingStation, Device, DeviceState, StationStatus};
use yard_core::spatial::Point;

use support::entities::{assert_near, device, power_level, station};
use support::yard::TestYardBuilder;

fn start(code: &str) -> ChargeAction {
    ChargeAction::Start {
        station_code: code.to_string(),
    }
}

fn charging_yard(truck_at: Point) -> yard_core::runner::Engine {
    TestYardBuilder::new()
        .with_device(Device::truck("T01", truck_at).with_power_level(50.0))
        .with_device(Device::truck("T02", Point::new(0.0, 20.0)))
        .with_station(ChargingStation::new("CS01", Point::ORIGIN, 0.5))
        .build()
}

#[test]
fn aligned_truck_charges_to_full() {
    let engine = charging_yard(Point::ORIGIN);
    engine.charge("T01", start("CS01")).expect("valid charge");
    engine.run_until(0).expect("no dead loop");

    assert_eq!(device(&engine, "T01").state, DeviceState::Charging);
    let cs = station(&engine, "CS01");
    assert_eq!(cs.status, StationStatus::Occupied);
    assert_eq!(cs.bound_truck.as_deref(), Some("T01"));

    engine.run_until(50_000).expect("no dead loop");
    assert_near(power_level(&engine, "T01"), 75.0);

    // (100 - 50) / 0.5 %/s = 100 s.
    engine.run_until(100_000).expect("no dead loop");
    let truck = device(&engine, "T01");
    assert_eq!(truck.state, DeviceState::Idle);
    let data = truck.truck_data().expect("truck data");
    assert_near(data.power_level, 100.0);
    assert!(!data.need_charge);
    assert!(data.charge.is_none());
    let cs = station(&engine, "CS01");
    assert_eq!(cs.status, StationStatus::Free);
    assert!(cs.bound_truck.is_none());
}

#[test]
fn distant_truck_drives_to_station_first() {
    let engine = charging_yard(Point::new(20.0, 0.0));
    engine.charge("T01", start("CS01")).expect("valid charge");
    engine.run_until(0).expect("no dead loop");

    assert_eq!(device(&engine, "T01").state, DeviceState::MOVING);
    assert_eq!(station(&engine, "CS01").bound_truck.as_deref(), Some("T01"));

    engine.run_until(4_000).expect("no dead loop");
    let truck = device(&engine, "T01");
    assert_eq!(truck.state, DeviceState::Charging);
    assert_eq!(station(&engine, "CS01").status, StationStatus::Occupied);
}

#[test]
fn release_stops_charging_and_frees_station() {
    let engine = charging_yard(Point::ORIGIN);
    engine.charge("T01", start("CS01")).expect("valid charge");
    engine.run_until(20_000).expect("no dead loop");

    engine.charge("T01", ChargeAction::Release).expect("valid release");
    engine.run_until(20_000).expect("no dead loop");

    let truck = device(&engine, "T01");
    assert_eq!(truck.state, DeviceState::Idle);
    assert_near(power_level(&engine, "T01"), 60.0);
    assert_eq!(station(&engine, "CS01").status, StationStatus::Free);

    // The full-charge event was cancelled with the session.
    engine.run_until(100_000).expect("no dead loop");
    assert_near(power_level(&engine, "T01"), 60.0);
    assert!(engine
        .event_log()
        .iter()
        .any(|e| e.kind == EventKind::ChargeComplete
            && e.outcome == yard_core::telemetry::EventOutcome::Cancelled));
}

#[test]
fn bound_station_rejects_another_truck() {
    let engine = charging_yard(Point::ORIGIN);
    engine.charge("T01", start("CS01")).expect("valid charge");
    engine.charge("T02", start("CS01")).expect("command itself is valid");
    engine.run_until(0).expect("no dead loop");

    let errors = engine.error_log();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_kind, EventKind::ChargeCommand);
    assert!(errors[0].message.contains("CS01"));
    assert_eq!(device(&engine, "T02").state, DeviceState::Idle);
}

#[test]
fn offline_station_is_unavailable() {
    let mut offline = ChargingStation::new("CS01", Point::ORIGIN, 0.5);
    offline.status = StationStatus::Offline;
    let engine = TestYardBuilder::new()
        .with_device(Device::truck("T01", Point::ORIGIN))
        .with_station(offline)
        .build();
    engine.charge("T01", start("CS01")).expect("command itself is valid");
    engine.run_until(0).expect("no dead loop");

    assert_eq!(engine.error_log().len(), 1);
    assert_eq!(device(&engine, "T01").state, DeviceState::Idle);
}
