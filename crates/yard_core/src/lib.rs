pub mod spatial;
pub mod clock;
pub mod entities;
pub mod error;
pub mod config;
pub mod store;
pub mod telemetry;
pub mod fault;
pub mod profiling;
pub mod runner;
pub mod systems;
pub mod commands;
pub mod dispatch;
pub mod query;
pub mod scenario;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
