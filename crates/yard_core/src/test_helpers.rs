//! Test helpers for common test setup and utilities.
//!
//! Fixed device ids with known physics, so unit and integration tests share
//! one small yard vocabulary.

use std::sync::Arc;

use crate::config::{PhysicsProfile, PhysicsTable, SimConfig};
use crate::runner::Engine;
use crate::store::{GlobalStore, StoreSnapshot};

/// Truck ids covered by [test_physics].
pub const TEST_TRUCKS: [&str; 4] = ["T01", "T02", "T03", "T04"];
pub const TEST_QUAY_CRANE: &str = "QC01";
pub const TEST_YARD_CRANE: &str = "YC01";

/// Meters per second for every test truck.
pub const TEST_TRUCK_SPEED: f64 = 5.0;
/// Percent of charge per second of empty travel.
pub const TEST_CONSUME_RATE: f64 = 0.1;
pub const TEST_LOADED_COEFFICIENT: f64 = 2.0;
pub const TEST_SAFE_POWER: f64 = 20.0;
pub const TEST_CRANE_SPEED: f64 = 1.0;
pub const TEST_HOIST_SPEED: f64 = 0.5;

/// Physics for [TEST_TRUCKS] and the two test cranes.
pub fn test_physics() -> PhysicsTable {
    let table = TEST_TRUCKS.iter().fold(PhysicsTable::new(), |table, id| {
        table.with_profile(
            *id,
            PhysicsProfile::truck(
                TEST_TRUCK_SPEED,
                TEST_CONSUME_RATE,
                TEST_LOADED_COEFFICIENT,
                TEST_SAFE_POWER,
            ),
        )
    });
    table
        .with_profile(
            TEST_QUAY_CRANE,
            PhysicsProfile::crane(TEST_CRANE_SPEED, TEST_HOIST_SPEED),
        )
        .with_profile(
            TEST_YARD_CRANE,
            PhysicsProfile::crane(TEST_CRANE_SPEED, TEST_HOIST_SPEED),
        )
}

/// Default configuration with a short crane cycle.
///
/// A cycle is `1_000 ms + 2 * 20 m / 0.5 m/s = 81_000 ms` with [TEST_HOIST_SPEED].
pub fn test_config() -> SimConfig {
    SimConfig {
        crane_operation_ms: 1_000,
        ..SimConfig::default()
    }
}

/// Engine over `snapshot` with [test_physics] and the standard handlers.
///
/// # Panics
///
/// Panics if `config` fails validation.
pub fn test_engine(snapshot: StoreSnapshot, config: SimConfig) -> Engine {
    let store = Arc::new(GlobalStore::from_snapshot(snapshot));
    Engine::builder(store, config, Arc::new(test_physics()))
        .build()
        .expect("test config should be valid")
}
