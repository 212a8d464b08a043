#![allow(dead_code)]

use yard_core::entities::{
    BusinessType, ChargingStation, Container, Device, Fence, WorkInstruction,
};
use yard_core::runner::Engine;
use yard_core::spatial::Point;

pub fn device(engine: &Engine, id: &str) -> Device {
    engine
        .store()
        .devices()
        .get(id)
        .unwrap_or_else(|| panic!("device {id} should exist"))
}

pub fn fence(engine: &Engine, id: &str) -> Fence {
    engine
        .store()
        .fences()
        .get(id)
        .unwrap_or_else(|| panic!("fence {id} should exist"))
}

pub fn station(engine: &Engine, code: &str) -> ChargingStation {
    engine
        .store()
        .stations()
        .get(code)
        .unwrap_or_else(|| panic!("station {code} should exist"))
}

pub fn instruction(engine: &Engine, wi_ref: &str) -> WorkInstruction {
    engine
        .store()
        .instructions()
        .get(wi_ref)
        .unwrap_or_else(|| panic!("instruction {wi_ref} should exist"))
}

pub fn container(engine: &Engine, id: &str) -> Container {
    engine
        .store()
        .containers()
        .get(id)
        .unwrap_or_else(|| panic!("container {id} should exist"))
}

pub fn power_level(engine: &Engine, truck_id: &str) -> f64 {
    device(engine, truck_id)
        .truck_data()
        .map(|t| t.power_level)
        .expect("device should be a truck")
}

/// Discharge from the vessel to block `B01`, quay crane fetches, yard crane puts.
pub fn discharge_instruction(wi_ref: &str, container_id: &str) -> WorkInstruction {
    let mut wi = WorkInstruction::new(wi_ref, BusinessType::Discharge, container_id)
        .with_locations("VESSEL", "B01")
        .with_devices(Some("QC01"), Some("T01"), Some("YC01"));
    wi.from_position = Point::ORIGIN;
    wi.to_position = Point::new(61.0, 100.0);
    wi
}

pub fn assert_near(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
