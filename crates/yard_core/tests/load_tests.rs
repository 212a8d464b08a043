//! Load tests for yard_core: validate performance under realistic load conditions.

use std::sync::Arc;
use std::time::Instant;

use yard_core::config::SimConfig;
use yard_core::dispatch::PendingInstructionDispatch;
use yard_core::scenario::{build_scenario, ScenarioParams};
use yard_core::spatial::Point;

#[test]
#[ignore] // Only run explicitly: cargo test --package yard_core --test load_tests -- --ignored
fn test_sustained_load() {
    let params = ScenarioParams::default()
        .with_seed(42)
        .with_trucks(500)
        .with_cranes(8, 24)
        .with_fences(20, 0.2)
        .with_instructions(2_000)
        .with_yard_size(2_000.0, 800.0);
    let engine = build_scenario(&params)
        .engine_builder(SimConfig::default())
        .with_dispatcher(Arc::new(PendingInstructionDispatch))
        .build()
        .expect("valid config");
    engine.dispatch_idle_devices();

    let start = Instant::now();
    let events = engine.run_until(60 * 60 * 1_000).expect("no dead loop"); // 1 hour
    let duration = start.elapsed();

    let events_per_sec = events as f64 / duration.as_secs_f64();
    println!(
        "Sustained load test: {} events in {:.2}s ({:.0} events/sec)",
        events,
        duration.as_secs_f64(),
        events_per_sec
    );

    assert!(
        events_per_sec > 1000.0,
        "Should process >1000 events/sec, got {:.0}",
        events_per_sec
    );
}

#[test]
#[ignore]
fn test_peak_load() {
    // Every truck receives a move at the same instant.
    let params = ScenarioParams::default()
        .with_seed(7)
        .with_trucks(2_000)
        .with_fences(0, 0.0)
        .with_instructions(0);
    let engine = build_scenario(&params)
        .into_engine(SimConfig::default())
        .expect("valid config");
    let trucks: Vec<_> = engine
        .store()
        .devices()
        .filter(|d| d.is_truck())
        .into_iter()
        .map(|d| d.id)
        .collect();
    for (i, truck_id) in trucks.iter().enumerate() {
        engine
            .move_truck(truck_id, vec![Point::new((i % 100) as f64 * 5.0, 150.0)])
            .expect("valid move");
    }

    let start = Instant::now();
    let events = engine.run_until(10 * 60 * 1_000).expect("no dead loop");
    let duration = start.elapsed();

    println!(
        "Peak load test: {} events in {:.2}s ({:.0} events/sec)",
        events,
        duration.as_secs_f64(),
        events as f64 / duration.as_secs_f64()
    );
    assert!(engine.error_log().is_empty());
    assert!(duration.as_secs() < 60, "Peak load should finish within 60s");
}
