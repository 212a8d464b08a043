//! Scenario setup: seeded random yards for examples, benchmarks and load tests.
//!
//! A scenario is a [StoreSnapshot] plus the [PhysicsTable] covering every
//! device in it. Quay cranes line the quay at `y = 0`, yard blocks sit in a
//! grid behind it, and trucks start at random points of the yard.
//!
//! [StoreSnapshot]: crate::store::StoreSnapshot
//! [PhysicsTable]: crate::config::PhysicsTable

mod build;
mod params;

pub use build::{build_scenario, Scenario, VESSEL_LOCATION};
pub use params::ScenarioParams;
