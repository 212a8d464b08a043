mod support;

use yard_core::clock::EventKind;
use yard_core::entities::{
    Container, CraneOperation, Device, DeviceState, InstructionStatus, InstructionStep,
};
use yard_core::error::ValidationError;
use yard_core::spatial::Point;
use yard_core::test_helpers::{TEST_QUAY_CRANE, TEST_YARD_CRANE};

use support::entities::{assert_near, container, device, discharge_instruction, instruction};
use support::yard::TestYardBuilder;

/// `crane_operation_ms` plus a 40 m hoist round trip at 0.5 m/s.
const CYCLE_MS: u64 = 81_000;

fn terminal() -> yard_core::runner::Engine {
    TestYardBuilder::new()
        .with_device(Device::quay_crane(TEST_QUAY_CRANE, Point::ORIGIN, 0))
        .with_device(Device::yard_crane(TEST_YARD_CRANE, Point::new(61.0, 100.0), 10))
        .with_device(Device::truck("T01", Point::ORIGIN))
        .with_container(Container::new("C1", "VESSEL"))
        .with_instruction(discharge_instruction("WI-1", "C1"))
        .build()
}

#[test]
fn crane_travels_to_target_bay() {
    let engine = terminal();
    engine.crane_move(TEST_QUAY_CRANE, 5).expect("valid crane move");

    engine.run_until(10_000).expect("no dead loop");
    assert_eq!(device(&engine, TEST_QUAY_CRANE).state, DeviceState::MOVING);

    // 5 bays * 6.1 m at 1 m/s.
    engine.run_until(30_500).expect("no dead loop");
    let crane = device(&engine, TEST_QUAY_CRANE);
    assert_eq!(crane.state, DeviceState::Idle);
    assert_near(crane.position.x, 30.5);
    assert_eq!(crane.crane().map(|c| c.current_bay), Some(5));
    assert_eq!(crane.crane().and_then(|c| c.target_bay), None);
}

#[test]
fn fetch_moves_container_onto_crane() {
    let engine = terminal();
    engine
        .crane_operation(TEST_QUAY_CRANE, "C1", "WI-1", CraneOperation::Fetch, None)
        .expect("valid operation");
    engine.run_until(0).expect("no dead loop");

    let crane = device(&engine, TEST_QUAY_CRANE);
    assert_eq!(crane.state, DeviceState::WAITING);
    assert_eq!(crane.crane().and_then(|c| c.operation), Some(CraneOperation::Fetch));
    assert_eq!(instruction(&engine, "WI-1").status, InstructionStatus::Executing);

    engine.run_until(CYCLE_MS - 1).expect("no dead loop");
    assert_eq!(container(&engine, "C1").location, "VESSEL");

    engine.run_until(CYCLE_MS).expect("no dead loop");
    assert_eq!(container(&engine, "C1").location, TEST_QUAY_CRANE);
    assert_eq!(instruction(&engine, "WI-1").step, InstructionStep::Fetched);
    let crane = device(&engine, TEST_QUAY_CRANE);
    assert_eq!(crane.crane().and_then(|c| c.operation), None);
    assert_eq!(crane.state, DeviceState::WAITING, "still holds the instruction");
}

#[test]
fn full_discharge_cycle_completes_instruction() {
    let engine = terminal();

    engine
        .crane_operation(TEST_QUAY_CRANE, "C1", "WI-1", CraneOperation::Fetch, None)
        .expect("valid operation");
    engine.tick(CYCLE_MS).expect("no dead loop");
    engine
        .crane_operation(TEST_QUAY_CRANE, "C1", "WI-1", CraneOperation::Put, Some("T01"))
        .expect("valid operation");
    engine.tick(CYCLE_MS).expect("no dead loop");

    assert_eq!(container(&engine, "C1").location, "T01");
    assert_eq!(instruction(&engine, "WI-1").step, InstructionStep::Carrying);
    let truck = device(&engine, "T01");
    assert_eq!(truck.truck_data().map(|t| t.loaded), Some(true));
    assert_eq!(truck.current_instruction.as_deref(), Some("WI-1"));
    assert_eq!(device(&engine, TEST_QUAY_CRANE).state, DeviceState::Idle);

    engine
        .move_truck("T01", vec![Point::new(61.0, 100.0)])
        .expect("valid move");
    engine.tick(30_000).expect("no dead loop");
    assert_eq!(device(&engine, "T01").state, DeviceState::WAITING);

    engine
        .crane_operation(TEST_YARD_CRANE, "C1", "WI-1", CraneOperation::Fetch, None)
        .expect("valid operation");
    engine.tick(CYCLE_MS).expect("no dead loop");
    let truck = device(&engine, "T01");
    assert_eq!(truck.truck_data().map(|t| t.loaded), Some(false));
    assert_eq!(truck.state, DeviceState::Idle);
    assert!(truck.current_instruction.is_none());

    engine
        .crane_operation(TEST_YARD_CRANE, "C1", "WI-1", CraneOperation::Put, None)
        .expect("valid operation");
    engine.tick(CYCLE_MS).expect("no dead loop");

    let wi = instruction(&engine, "WI-1");
    assert_eq!(wi.status, InstructionStatus::Completed);
    assert_eq!(wi.step, InstructionStep::Delivered);
    assert!(wi.completed_at.is_some());
    assert_eq!(container(&engine, "C1").location, "B01");
    assert_eq!(device(&engine, TEST_YARD_CRANE).state, DeviceState::Idle);
    assert!(device(&engine, TEST_QUAY_CRANE).current_instruction.is_none());
    assert!(engine.error_log().is_empty());
}

#[test]
fn crane_cannot_travel_mid_operation() {
    let engine = terminal();
    engine
        .crane_operation(TEST_QUAY_CRANE, "C1", "WI-1", CraneOperation::Fetch, None)
        .expect("valid operation");
    engine.crane_move(TEST_QUAY_CRANE, 3).expect("valid crane move");
    engine.run_until(0).expect("no dead loop");

    let errors = engine.error_log();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_kind, EventKind::CraneMoveStart);
    assert_near(device(&engine, TEST_QUAY_CRANE).position.x, 0.0);
}

#[test]
fn closed_instruction_rejects_operation() {
    let mut wi = discharge_instruction("WI-1", "C1");
    wi.status = InstructionStatus::Completed;
    let engine = TestYardBuilder::new()
        .with_device(Device::quay_crane(TEST_QUAY_CRANE, Point::ORIGIN, 0))
        .with_container(Container::new("C1", "VESSEL"))
        .with_instruction(wi)
        .build();
    engine
        .crane_operation(TEST_QUAY_CRANE, "C1", "WI-1", CraneOperation::Fetch, None)
        .expect("valid operation");
    engine.run_until(0).expect("no dead loop");

    let errors = engine.error_log();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("WI-1"));
    assert_eq!(device(&engine, TEST_QUAY_CRANE).state, DeviceState::Idle);
}

#[test]
fn crane_commands_require_a_crane() {
    let engine = terminal();
    assert!(matches!(
        engine.crane_move("T01", 3),
        Err(ValidationError::WrongDeviceType { expected: "crane", .. })
    ));
    assert!(matches!(
        engine.crane_operation(TEST_QUAY_CRANE, "C404", "WI-1", CraneOperation::Fetch, None),
        Err(ValidationError::UnknownEntity { kind: "container", .. })
    ));
}
