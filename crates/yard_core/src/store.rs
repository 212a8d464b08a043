//! Global state store: one explicitly constructed registry of every yard
//! entity plus the authoritative simulation clock.
//!
//! Each entity kind lives in its own [Table] behind its own `RwLock`, so only
//! per-map atomicity is guaranteed; a sequence touching two maps is two
//! independently visible mutations. Callers must not hold a table guard while
//! locking another table. The only multi-table operations are [GlobalStore::snapshot],
//! [GlobalStore::replace_all] and [GlobalStore::merge], which take the guards in
//! declaration order: devices, fences, stations, instructions, containers, blocks.
//!
//! Tables are `BTreeMap`s so iteration order, and therefore every tick, is
//! deterministic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::entities::{
    ChargingStation, Container, Device, Fence, Keyed, WorkInstruction, YardBlock,
};

/// Id-keyed map of one entity kind.
#[derive(Debug)]
pub struct Table<T> {
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone + Keyed> Table<T> {
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, T>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, T>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Inserts under the row's own key, returning the replaced row.
    pub fn insert(&self, row: T) -> Option<T> {
        let key = row.key().to_string();
        self.write().insert(key, row)
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        self.write().remove(id)
    }

    /// Mutates one row in place under the write lock.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.write().get_mut(id).map(f)
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    pub fn filter(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        self.read().values().filter(|row| pred(row)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn keyed<T: Keyed>(rows: Vec<T>) -> BTreeMap<String, T> {
    rows.into_iter().map(|row| (row.key().to_string(), row)).collect()
}

/// Point-in-time copy of the whole store; also the scenario file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub sim_time: u64,
    pub devices: Vec<Device>,
    pub fences: Vec<Fence>,
    pub stations: Vec<ChargingStation>,
    pub instructions: Vec<WorkInstruction>,
    pub containers: Vec<Container>,
    pub blocks: Vec<YardBlock>,
}

impl StoreSnapshot {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Default)]
pub struct GlobalStore {
    devices: Table<Device>,
    fences: Table<Fence>,
    stations: Table<ChargingStation>,
    instructions: Table<WorkInstruction>,
    containers: Table<Container>,
    blocks: Table<YardBlock>,
    clock: AtomicU64,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        store.replace_all(snapshot);
        store
    }

    pub fn devices(&self) -> &Table<Device> {
        &self.devices
    }

    pub fn fences(&self) -> &Table<Fence> {
        &self.fences
    }

    pub fn stations(&self) -> &Table<ChargingStation> {
        &self.stations
    }

    pub fn instructions(&self) -> &Table<WorkInstruction> {
        &self.instructions
    }

    pub fn containers(&self) -> &Table<Container> {
        &self.containers
    }

    pub fn blocks(&self) -> &Table<YardBlock> {
        &self.blocks
    }

    /// Current simulation time in ms.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Moves the clock forward; earlier instants are ignored.
    pub fn advance_clock(&self, time: u64) {
        self.clock.fetch_max(time, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let devices = self.devices.read();
        let fences = self.fences.read();
        let stations = self.stations.read();
        let instructions = self.instructions.read();
        let containers = self.containers.read();
        let blocks = self.blocks.read();
        StoreSnapshot {
            sim_time: self.now(),
            devices: devices.values().cloned().collect(),
            fences: fences.values().cloned().collect(),
            stations: stations.values().cloned().collect(),
            instructions: instructions.values().cloned().collect(),
            containers: containers.values().cloned().collect(),
            blocks: blocks.values().cloned().collect(),
        }
    }

    /// Replaces every map and the clock while holding all write guards.
    pub fn replace_all(&self, snapshot: StoreSnapshot) {
        let mut devices = self.devices.write();
        let mut fences = self.fences.write();
        let mut stations = self.stations.write();
        let mut instructions = self.instructions.write();
        let mut containers = self.containers.write();
        let mut blocks = self.blocks.write();
        *devices = keyed(snapshot.devices);
        *fences = keyed(snapshot.fences);
        *stations = keyed(snapshot.stations);
        *instructions = keyed(snapshot.instructions);
        *containers = keyed(snapshot.containers);
        *blocks = keyed(snapshot.blocks);
        self.clock.store(snapshot.sim_time, Ordering::Release);
    }

    /// Upserts every entity of `snapshot`, leaving other entities and the clock alone.
    pub fn merge(&self, snapshot: StoreSnapshot) {
        let mut devices = self.devices.write();
        let mut fences = self.fences.write();
        let mut stations = self.stations.write();
        let mut instructions = self.instructions.write();
        let mut containers = self.containers.write();
        let mut blocks = self.blocks.write();
        devices.extend(keyed(snapshot.devices));
        fences.extend(keyed(snapshot.fences));
        stations.extend(keyed(snapshot.stations));
        instructions.extend(keyed(snapshot.instructions));
        containers.extend(keyed(snapshot.containers));
        blocks.extend(keyed(snapshot.blocks));
    }

    pub fn reset(&self) {
        self.replace_all(StoreSnapshot::default());
    }
}
