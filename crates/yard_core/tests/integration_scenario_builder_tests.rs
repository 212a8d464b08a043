mod support;

use std::sync::Arc;

use yard_core::config::SimConfig;
use yard_core::dispatch::PendingInstructionDispatch;
use yard_core::entities::{DeviceType, FenceStatus, InstructionStatus};
use yard_core::scenario::{build_scenario, ScenarioParams, VESSEL_LOCATION};

#[test]
fn scenario_populates_every_entity_kind() {
    let params = ScenarioParams::default()
        .with_seed(42)
        .with_trucks(10)
        .with_cranes(2, 3)
        .with_instructions(20);
    let scenario = build_scenario(&params);
    let snapshot = &scenario.snapshot;

    let count = |device_type: DeviceType| {
        snapshot
            .devices
            .iter()
            .filter(|d| d.device_type == device_type)
            .count()
    };
    assert_eq!(count(DeviceType::Truck), 10);
    assert_eq!(count(DeviceType::QuayCrane), 2);
    assert_eq!(count(DeviceType::YardCrane), 3);
    assert_eq!(snapshot.blocks.len(), params.num_blocks);
    assert_eq!(snapshot.fences.len(), params.num_fences);
    assert_eq!(snapshot.stations.len(), params.num_stations);
    assert_eq!(snapshot.instructions.len(), 20);
    assert_eq!(snapshot.containers.len(), 20);
}

#[test]
fn quay_cranes_sit_on_bay_positions() {
    let scenario = build_scenario(&ScenarioParams::default().with_seed(5));
    for crane in scenario
        .snapshot
        .devices
        .iter()
        .filter(|d| d.device_type == DeviceType::QuayCrane)
    {
        let bay = crane.crane().map(|c| c.current_bay).expect("crane data");
        assert!((crane.position.x - bay as f64 * 6.1).abs() < 1e-9);
        assert_eq!(crane.position.y, 0.0);
    }
}

#[test]
fn fence_ratio_is_respected_at_the_extremes() {
    let all_blocked = build_scenario(&ScenarioParams::default().with_seed(9).with_fences(5, 1.0));
    assert!(all_blocked
        .snapshot
        .fences
        .iter()
        .all(|f| f.status == FenceStatus::Blocked));

    let all_open = build_scenario(&ScenarioParams::default().with_seed(9).with_fences(5, 0.0));
    assert!(all_open
        .snapshot
        .fences
        .iter()
        .all(|f| f.status == FenceStatus::Passable));
}

#[test]
fn vessel_containers_belong_to_discharge_work() {
    let scenario = build_scenario(&ScenarioParams::default().with_seed(17));
    for wi in &scenario.snapshot.instructions {
        let on_vessel = wi.from_location == VESSEL_LOCATION;
        assert_eq!(on_vessel, wi.business_type == yard_core::entities::BusinessType::Discharge);
        assert!(wi.carry_device.is_some());
    }
}

#[test]
fn dispatched_scenario_runs_without_errors() {
    let params = ScenarioParams::default()
        .with_seed(7)
        .with_trucks(8)
        .with_fences(0, 0.0)
        .with_instructions(16);
    let engine = build_scenario(&params)
        .engine_builder(SimConfig::default())
        .with_dispatcher(Arc::new(PendingInstructionDispatch))
        .build()
        .expect("valid config");

    assert_eq!(engine.dispatch_idle_devices(), engine.store().devices().len());
    engine.run_until(10 * 60 * 1_000).expect("no dead loop");

    assert!(engine.error_log().is_empty(), "{:?}", engine.error_log());
    let assigned = engine
        .store()
        .instructions()
        .filter(|wi| wi.assigned_at.is_some())
        .len();
    assert!(assigned > 0);
    assert!(engine
        .store()
        .instructions()
        .values()
        .iter()
        .all(|wi| wi.status == InstructionStatus::Pending));
}
