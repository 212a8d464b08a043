//! Run a seeded yard for one simulated hour with the baseline dispatcher and
//! print what happened.
//!
//! Run with: cargo run -p yard_core --example scenario_run
//! Set `LOG_FORMAT=json` for JSON logs and `RUST_LOG=yard_core=debug` for
//! per-event tracing.

use std::sync::Arc;

use yard_core::clock::ONE_HOUR_MS;
use yard_core::config::SimConfig;
use yard_core::dispatch::PendingInstructionDispatch;
use yard_core::entities::{DeviceState, InstructionStatus};
use yard_core::scenario::{build_scenario, ScenarioParams};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn main() {
    const SEED: u64 = 123;
    const NUM_TRUCKS: usize = 60;

    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
        None => SimConfig::default(),
    };

    let params = ScenarioParams::default()
        .with_seed(SEED)
        .with_trucks(NUM_TRUCKS)
        .with_instructions(120);
    let engine = match build_scenario(&params)
        .engine_builder(config)
        .with_dispatcher(Arc::new(PendingInstructionDispatch))
        .build()
    {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    engine.dispatch_idle_devices();
    let dispatched = match engine.run_until(ONE_HOUR_MS) {
        Ok(dispatched) => dispatched,
        Err(err) => {
            eprintln!("run aborted: {err}");
            std::process::exit(2);
        }
    };

    let snapshot = engine.snapshot();
    let count_state = |state: DeviceState| snapshot.devices.iter().filter(|d| d.state == state).count();
    let assigned = snapshot
        .instructions
        .iter()
        .filter(|wi| wi.assigned_at.is_some())
        .count();
    let completed = snapshot
        .instructions
        .iter()
        .filter(|wi| wi.status == InstructionStatus::Completed)
        .count();
    let needing_charge = snapshot
        .devices
        .iter()
        .filter(|d| d.truck_data().is_some_and(|t| t.need_charge))
        .count();

    println!("--- Yard run ({NUM_TRUCKS} trucks, seed {SEED}) ---");
    println!("Events dispatched: {dispatched}");
    println!("Simulation time: {} s", engine.now() / 1_000);
    println!(
        "Devices: {} idle, {} moving, {} waiting, {} charging",
        count_state(DeviceState::Idle),
        count_state(DeviceState::MOVING),
        count_state(DeviceState::WAITING),
        count_state(DeviceState::Charging),
    );
    println!(
        "Instructions: {} total, {assigned} assigned, {completed} completed",
        snapshot.instructions.len()
    );
    println!("Trucks needing charge: {needing_charge}");
    println!("Handler errors: {}", engine.error_log().len());

    engine.event_metrics().log_summary();
}
