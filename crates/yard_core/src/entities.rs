//! Yard entities: devices, fences, work instructions, containers, charging
//! stations and yard blocks.
//!
//! Devices are one shared [Device] record plus a per-variant [DeviceKind]
//! payload. Every entity is keyed by a string id through [Keyed] so the store
//! can hold them in uniform id maps.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::clock::{EventId, SubjectRole};
use crate::spatial::Point;

/// Entities stored in the global store expose their id through this trait.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Truck,
    QuayCrane,
    YardCrane,
}

impl DeviceType {
    pub fn subject_role(self) -> SubjectRole {
        match self {
            DeviceType::Truck => SubjectRole::Truck,
            DeviceType::QuayCrane => SubjectRole::QuayCrane,
            DeviceType::YardCrane => SubjectRole::YardCrane,
        }
    }

    pub fn is_crane(self) -> bool {
        matches!(self, DeviceType::QuayCrane | DeviceType::YardCrane)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingPhase {
    Moving,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Offline,
    Idle,
    /// Trucks only.
    Charging,
    Working(WorkingPhase),
    Fault,
}

impl DeviceState {
    pub const MOVING: DeviceState = DeviceState::Working(WorkingPhase::Moving);
    pub const WAITING: DeviceState = DeviceState::Working(WorkingPhase::Waiting);

    pub fn is_moving(self) -> bool {
        self == Self::MOVING
    }

    /// States from which a device accepts new travel.
    pub fn accepts_travel(self) -> bool {
        matches!(self, DeviceState::Idle | DeviceState::Working(_))
    }
}

/// One in-flight travel segment toward the head waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub from: Point,
    pub target: Point,
    pub started_at: u64,
    /// Last instant the position was integrated.
    pub updated_at: u64,
    pub arrives_at: u64,
    pub arrival_event: EventId,
    /// Event that started the segment; tick-injected arrivals hang off it.
    pub started_by: EventId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub station_code: String,
    pub started_at: u64,
    pub start_level: f64,
    /// Percent per second.
    pub rate_per_sec: f64,
    pub complete_event: EventId,
}

impl ChargeSession {
    pub fn level_at(&self, now: u64) -> f64 {
        let elapsed_secs = now.saturating_sub(self.started_at) as f64 / 1000.0;
        clamp_power(self.start_level + self.rate_per_sec * elapsed_secs)
    }
}

pub fn clamp_power(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruckData {
    pub power_level: f64,
    /// Percent of battery per second of travel, refreshed from physics config
    /// whenever the truck starts moving.
    pub consume_rate: f64,
    pub lane: u32,
    pub charging_target: Option<String>,
    pub need_charge: bool,
    pub loaded: bool,
    pub charge: Option<ChargeSession>,
}

impl Default for TruckData {
    fn default() -> Self {
        Self {
            power_level: 100.0,
            consume_rate: 0.0,
            lane: 0,
            charging_target: None,
            need_charge: false,
            loaded: false,
            charge: None,
        }
    }
}

impl TruckData {
    pub fn set_power_level(&mut self, level: f64) {
        self.power_level = clamp_power(level);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CraneOperation {
    Fetch,
    Put,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CraneData {
    pub current_bay: i32,
    pub target_bay: Option<i32>,
    pub hoist_speed: f64,
    pub operation: Option<CraneOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    Truck(TruckData),
    Crane(CraneData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub device_type: DeviceType,
    pub state: DeviceState,
    pub position: Point,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub fences_inside: BTreeSet<String>,
    #[serde(default)]
    pub current_instruction: Option<String>,
    /// Not-yet-done instructions, including the current one.
    #[serde(default)]
    pub pending_instructions: Vec<String>,
    #[serde(default)]
    pub waypoints: VecDeque<Point>,
    #[serde(default)]
    pub motion: Option<Motion>,
    /// Fence the device is queued at while WORKING/WAITING.
    #[serde(default)]
    pub blocked_by: Option<String>,
    pub kind: DeviceKind,
}

impl Device {
    fn with_kind(id: impl Into<String>, device_type: DeviceType, position: Point, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            device_type,
            state: DeviceState::Idle,
            position,
            speed: 0.0,
            fences_inside: BTreeSet::new(),
            current_instruction: None,
            pending_instructions: Vec::new(),
            waypoints: VecDeque::new(),
            motion: None,
            blocked_by: None,
            kind,
        }
    }

    pub fn truck(id: impl Into<String>, position: Point) -> Self {
        Self::with_kind(id, DeviceType::Truck, position, DeviceKind::Truck(TruckData::default()))
    }

    pub fn quay_crane(id: impl Into<String>, position: Point, bay: i32) -> Self {
        Self::with_kind(
            id,
            DeviceType::QuayCrane,
            position,
            DeviceKind::Crane(CraneData {
                current_bay: bay,
                ..CraneData::default()
            }),
        )
    }

    pub fn yard_crane(id: impl Into<String>, position: Point, bay: i32) -> Self {
        Self::with_kind(
            id,
            DeviceType::YardCrane,
            position,
            DeviceKind::Crane(CraneData {
                current_bay: bay,
                ..CraneData::default()
            }),
        )
    }

    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_power_level(mut self, level: f64) -> Self {
        if let Some(truck) = self.truck_data_mut() {
            truck.set_power_level(level);
        }
        self
    }

    pub fn with_lane(mut self, lane: u32) -> Self {
        if let Some(truck) = self.truck_data_mut() {
            truck.lane = lane;
        }
        self
    }

    pub fn subject_role(&self) -> SubjectRole {
        self.device_type.subject_role()
    }

    pub fn is_truck(&self) -> bool {
        self.device_type == DeviceType::Truck
    }

    pub fn truck_data(&self) -> Option<&TruckData> {
        match &self.kind {
            DeviceKind::Truck(truck) => Some(truck),
            DeviceKind::Crane(_) => None,
        }
    }

    pub fn truck_data_mut(&mut self) -> Option<&mut TruckData> {
        match &mut self.kind {
            DeviceKind::Truck(truck) => Some(truck),
            DeviceKind::Crane(_) => None,
        }
    }

    pub fn crane(&self) -> Option<&CraneData> {
        match &self.kind {
            DeviceKind::Crane(crane) => Some(crane),
            DeviceKind::Truck(_) => None,
        }
    }

    pub fn crane_mut(&mut self) -> Option<&mut CraneData> {
        match &mut self.kind {
            DeviceKind::Crane(crane) => Some(crane),
            DeviceKind::Truck(_) => None,
        }
    }

    /// Adds an instruction to the not-yet-done list; the first one becomes current.
    pub fn take_instruction(&mut self, wi_ref: &str) {
        if !self.pending_instructions.iter().any(|r| r == wi_ref) {
            self.pending_instructions.push(wi_ref.to_string());
        }
        if self.current_instruction.is_none() {
            self.current_instruction = Some(wi_ref.to_string());
        }
    }

    /// Drops a finished instruction and promotes the next pending one.
    pub fn release_instruction(&mut self, wi_ref: &str) {
        self.pending_instructions.retain(|r| r != wi_ref);
        if self.current_instruction.as_deref() == Some(wi_ref) {
            self.current_instruction = self.pending_instructions.first().cloned();
        }
    }
}

impl Keyed for Device {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FenceStatus {
    Blocked,
    Passable,
}

impl FenceStatus {
    pub const BLOCKED_CODE: &'static str = "01";
    pub const PASSABLE_CODE: &'static str = "02";

    /// Parses the external status code ("01" blocked, "02" passable).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            Self::BLOCKED_CODE => Some(FenceStatus::Blocked),
            Self::PASSABLE_CODE => Some(FenceStatus::Passable),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            FenceStatus::Blocked => Self::BLOCKED_CODE,
            FenceStatus::Passable => Self::PASSABLE_CODE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fence {
    pub id: String,
    #[serde(default)]
    pub block_code: String,
    pub center: Point,
    pub radius: f64,
    #[serde(default)]
    pub speed_limit: f64,
    pub status: FenceStatus,
    /// FIFO of trucks held at this fence.
    #[serde(default)]
    pub waiting_trucks: Vec<String>,
}

impl Fence {
    pub fn new(id: impl Into<String>, center: Point, radius: f64) -> Self {
        Self {
            id: id.into(),
            block_code: String::new(),
            center,
            radius,
            speed_limit: 0.0,
            status: FenceStatus::Passable,
            waiting_trucks: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: FenceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn contains(&self, point: Point) -> bool {
        self.center.is_within(point, self.radius)
    }

    pub fn is_blocked(&self) -> bool {
        self.status == FenceStatus::Blocked
    }
}

impl Keyed for Fence {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessType {
    Discharge,
    Load,
    YardShift,
    Deliver,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionStatus {
    Pending,
    Skipped,
    Executing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionStep {
    Waiting,
    Fetched,
    Carrying,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkInstruction {
    pub ref_no: String,
    pub business_type: BusinessType,
    pub container_id: String,
    #[serde(default)]
    pub fetch_device: Option<String>,
    #[serde(default)]
    pub carry_device: Option<String>,
    #[serde(default)]
    pub put_device: Option<String>,
    #[serde(default)]
    pub from_position: Point,
    #[serde(default)]
    pub to_position: Point,
    #[serde(default)]
    pub from_location: String,
    /// Block or vessel id the container ends up at once put down.
    #[serde(default)]
    pub to_location: String,
    pub status: InstructionStatus,
    pub step: InstructionStep,
    #[serde(default)]
    pub assigned_at: Option<u64>,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub completed_at: Option<u64>,
}

impl WorkInstruction {
    pub fn new(ref_no: impl Into<String>, business_type: BusinessType, container_id: impl Into<String>) -> Self {
        Self {
            ref_no: ref_no.into(),
            business_type,
            container_id: container_id.into(),
            fetch_device: None,
            carry_device: None,
            put_device: None,
            from_position: Point::ORIGIN,
            to_position: Point::ORIGIN,
            from_location: String::new(),
            to_location: String::new(),
            status: InstructionStatus::Pending,
            step: InstructionStep::Waiting,
            assigned_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_locations(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_location = from.into();
        self.to_location = to.into();
        self
    }

    pub fn with_devices(mut self, fetch: Option<&str>, carry: Option<&str>, put: Option<&str>) -> Self {
        self.fetch_device = fetch.map(str::to_string);
        self.carry_device = carry.map(str::to_string);
        self.put_device = put.map(str::to_string);
        self
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, InstructionStatus::Completed | InstructionStatus::Skipped)
    }

    /// Every device id named on the instruction.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        [&self.fetch_device, &self.carry_device, &self.put_device]
            .into_iter()
            .filter_map(|d| d.as_deref())
    }
}

impl Keyed for WorkInstruction {
    fn key(&self) -> &str {
        &self.ref_no
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    /// Device id or block id.
    pub location: String,
}

impl Container {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}

impl Keyed for Container {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationStatus {
    Free,
    Occupied,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub code: String,
    pub status: StationStatus,
    pub position: Point,
    #[serde(default)]
    pub bound_truck: Option<String>,
    /// Percent per second.
    pub charge_rate: f64,
}

impl ChargingStation {
    pub fn new(code: impl Into<String>, position: Point, charge_rate: f64) -> Self {
        Self {
            code: code.into(),
            status: StationStatus::Free,
            position,
            bound_truck: None,
            charge_rate,
        }
    }

    pub fn is_available_for(&self, truck_id: &str) -> bool {
        self.status != StationStatus::Offline
            && self
                .bound_truck
                .as_deref()
                .map_or(true, |bound| bound == truck_id)
    }
}

impl Keyed for ChargingStation {
    fn key(&self) -> &str {
        &self.code
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YardBlock {
    pub code: String,
    pub position: Point,
}

impl Keyed for YardBlock {
    fn key(&self) -> &str {
        &self.code
    }
}
