use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{PhysicsProfile, PhysicsTable, SimConfig};
use crate::entities::{
    BusinessType, ChargingStation, Container, Device, Fence, FenceStatus, WorkInstruction,
    YardBlock,
};
use crate::error::ConfigurationError;
use crate::runner::{Engine, EngineBuilder};
use crate::spatial::Point;
use crate::store::{GlobalStore, StoreSnapshot};

use super::params::ScenarioParams;

/// Container location used for boxes still on (or bound for) the vessel.
pub const VESSEL_LOCATION: &str = "VESSEL";

/// Depth of the quay apron; yard blocks start behind it.
const APRON_DEPTH_M: f64 = 40.0;

const TRUCK_CONSUME_RATE: f64 = 0.02;
const TRUCK_LOADED_COEFFICIENT: f64 = 1.5;
const TRUCK_SAFE_POWER: f64 = 20.0;
const STATION_CHARGE_RATE: f64 = 0.5;

/// A generated yard: initial store contents plus matching physics.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub snapshot: StoreSnapshot,
    pub physics: PhysicsTable,
}

impl Scenario {
    /// Loads the snapshot into a fresh store and returns a builder over it.
    pub fn engine_builder(self, config: SimConfig) -> EngineBuilder {
        let store = Arc::new(GlobalStore::from_snapshot(self.snapshot));
        Engine::builder(store, config, Arc::new(self.physics))
    }

    /// Engine with the standard handlers and no dispatcher.
    pub fn into_engine(self, config: SimConfig) -> Result<Engine, ConfigurationError> {
        self.engine_builder(config).build()
    }
}

fn bay_of(x: f64, bay_pitch_m: f64) -> i32 {
    (x / bay_pitch_m).round() as i32
}

fn block_positions(params: &ScenarioParams) -> Vec<Point> {
    let count = params.num_blocks.max(1);
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let usable_depth = (params.yard_depth_m - APRON_DEPTH_M).max(1.0);
    (0..count)
        .map(|i| {
            let col = i % columns;
            let row = i / columns;
            let x = params.yard_width_m * (col as f64 + 0.5) / columns as f64;
            let y = APRON_DEPTH_M + usable_depth * (row as f64 + 0.5) / rows as f64;
            Point::new(x, y)
        })
        .collect()
}

fn random_point(rng: &mut StdRng, params: &ScenarioParams) -> Point {
    Point::new(
        rng.gen_range(0.0..=params.yard_width_m),
        rng.gen_range(0.0..=params.yard_depth_m),
    )
}

/// Builds a random yard from `params`. The same seed always yields the same
/// yard.
pub fn build_scenario(params: &ScenarioParams) -> Scenario {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut snapshot = StoreSnapshot::default();
    let mut physics = PhysicsTable::new();

    let blocks: Vec<YardBlock> = block_positions(params)
        .into_iter()
        .take(params.num_blocks)
        .enumerate()
        .map(|(i, position)| YardBlock {
            code: format!("B{:02}", i + 1),
            position,
        })
        .collect();

    let quay_spacing = params.yard_width_m / (params.num_quay_cranes.max(1) as f64 + 1.0);
    let quay_cranes: Vec<Device> = (0..params.num_quay_cranes)
        .map(|i| {
            let x = quay_spacing * (i as f64 + 1.0);
            let bay = bay_of(x, params.bay_pitch_m);
            let position = Point::new(bay as f64 * params.bay_pitch_m, 0.0);
            Device::quay_crane(format!("QC{:02}", i + 1), position, bay)
        })
        .collect();

    let yard_cranes: Vec<Device> = (0..params.num_yard_cranes)
        .filter_map(|i| {
            let block = blocks.get(i % blocks.len().max(1))?;
            let bay = bay_of(block.position.x, params.bay_pitch_m);
            let position = Point::new(bay as f64 * params.bay_pitch_m, block.position.y);
            Some(Device::yard_crane(format!("YC{:02}", i + 1), position, bay))
        })
        .collect();

    for crane in quay_cranes.iter().chain(&yard_cranes) {
        let speed = rng.gen_range(0.5..=1.5);
        let hoist = rng.gen_range(0.5..=1.0);
        physics.insert(crane.id.clone(), PhysicsProfile::crane(speed, hoist));
    }

    let trucks: Vec<Device> = (0..params.num_trucks)
        .map(|i| {
            let id = format!("T{:03}", i + 1);
            let speed = rng.gen_range(params.truck_speed_min..=params.truck_speed_max);
            physics.insert(
                id.clone(),
                PhysicsProfile::truck(
                    speed,
                    TRUCK_CONSUME_RATE,
                    TRUCK_LOADED_COEFFICIENT,
                    TRUCK_SAFE_POWER,
                ),
            );
            Device::truck(id, random_point(&mut rng, params))
                .with_power_level(rng.gen_range(30.0..=100.0))
                .with_lane((i % 4) as u32)
        })
        .collect();

    let fences = (0..params.num_fences).map(|i| {
        let center = random_point(&mut rng, params);
        let radius = rng.gen_range(8.0..=25.0);
        let status = if rng.gen_bool(params.blocked_fence_ratio.clamp(0.0, 1.0)) {
            FenceStatus::Blocked
        } else {
            FenceStatus::Passable
        };
        let mut fence = Fence::new(format!("F{:02}", i + 1), center, radius).with_status(status);
        if let Some(block) = blocks.get(i % blocks.len().max(1)) {
            fence.block_code = block.code.clone();
        }
        fence
    });
    snapshot.fences.extend(fences);

    // Charging stations along the landside edge.
    let station_spacing = params.yard_width_m / (params.num_stations.max(1) as f64 + 1.0);
    snapshot.stations.extend((0..params.num_stations).map(|i| {
        ChargingStation::new(
            format!("CS{:02}", i + 1),
            Point::new(station_spacing * (i as f64 + 1.0), params.yard_depth_m),
            STATION_CHARGE_RATE,
        )
    }));

    if !blocks.is_empty() {
        for i in 0..params.num_instructions {
            let (instruction, container) = random_instruction(
                &mut rng,
                i,
                &blocks,
                &quay_cranes,
                &yard_cranes,
                &trucks,
            );
            snapshot.instructions.push(instruction);
            snapshot.containers.push(container);
        }
    }

    snapshot.devices.extend(trucks);
    snapshot.devices.extend(quay_cranes);
    snapshot.devices.extend(yard_cranes);
    snapshot.blocks = blocks;
    Scenario { snapshot, physics }
}

fn random_instruction(
    rng: &mut StdRng,
    index: usize,
    blocks: &[YardBlock],
    quay_cranes: &[Device],
    yard_cranes: &[Device],
    trucks: &[Device],
) -> (WorkInstruction, Container) {
    let business_type = match rng.gen_range(0..3) {
        0 => BusinessType::Discharge,
        1 => BusinessType::Load,
        _ => BusinessType::YardShift,
    };
    let container_id = format!("CN{:05}", index + 1);
    let block_index = rng.gen_range(0..blocks.len());
    let other_index = rng.gen_range(0..blocks.len());
    let (block, other_block) = (&blocks[block_index], &blocks[other_index]);
    let quay_crane = pick(rng, quay_cranes);
    // Yard crane `i` works block `i`.
    let crane_on = |index: usize| yard_cranes.get(index).or_else(|| yard_cranes.first());
    let yard_crane = crane_on(block_index);
    let truck = pick(rng, trucks).map(|t| t.id.as_str());

    let quay = quay_crane.map_or(Point::ORIGIN, |c| c.position);
    let (from_location, to_location, from, to, fetch, put) = match business_type {
        BusinessType::Discharge => (
            VESSEL_LOCATION.to_string(),
            block.code.clone(),
            quay,
            block.position,
            quay_crane,
            yard_crane,
        ),
        BusinessType::Load => (
            block.code.clone(),
            VESSEL_LOCATION.to_string(),
            block.position,
            quay,
            yard_crane,
            quay_crane,
        ),
        _ => (
            block.code.clone(),
            other_block.code.clone(),
            block.position,
            other_block.position,
            yard_crane,
            crane_on(other_index),
        ),
    };

    let mut instruction = WorkInstruction::new(format!("WI{:05}", index + 1), business_type, &container_id)
        .with_locations(&from_location, to_location)
        .with_devices(
            fetch.map(|d| d.id.as_str()),
            truck,
            put.map(|d| d.id.as_str()),
        );
    instruction.from_position = from;
    instruction.to_position = to;
    (instruction, Container::new(container_id, from_location))
}

fn pick<'a>(rng: &mut StdRng, devices: &'a [Device]) -> Option<&'a Device> {
    if devices.is_empty() {
        None
    } else {
        devices.get(rng.gen_range(0..devices.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_builds_same_yard() {
        let params = ScenarioParams::default().with_seed(7).with_trucks(12);
        let a = build_scenario(&params);
        let b = build_scenario(&params);
        assert_eq!(a.snapshot, b.snapshot);
        assert_eq!(a.snapshot.devices.iter().filter(|d| d.is_truck()).count(), 12);
    }

    #[test]
    fn every_device_has_a_physics_profile() {
        let scenario = build_scenario(&ScenarioParams::default().with_seed(3));
        assert_eq!(scenario.physics.len(), scenario.snapshot.devices.len());
    }

    #[test]
    fn instructions_reference_existing_containers() {
        let scenario = build_scenario(&ScenarioParams::default().with_seed(11).with_instructions(25));
        let snapshot = &scenario.snapshot;
        assert_eq!(snapshot.instructions.len(), 25);
        for wi in &snapshot.instructions {
            let container = snapshot
                .containers
                .iter()
                .find(|c| c.id == wi.container_id)
                .expect("container exists");
            assert_eq!(container.location, wi.from_location);
        }
    }

    #[test]
    fn scenario_builds_an_engine() {
        let scenario = build_scenario(&ScenarioParams::default().with_seed(1).with_trucks(3));
        let engine = scenario.into_engine(SimConfig::default()).expect("valid config");
        assert_eq!(engine.store().devices().len(), 3 + 4 + 8);
    }
}
