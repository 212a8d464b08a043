/// Default yard footprint (meters).
const DEFAULT_YARD_WIDTH_M: f64 = 600.0;
const DEFAULT_YARD_DEPTH_M: f64 = 300.0;

/// Parameters for building a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub num_trucks: usize,
    pub num_quay_cranes: usize,
    pub num_yard_cranes: usize,
    /// Yard blocks; each yard crane is placed on one.
    pub num_blocks: usize,
    pub num_fences: usize,
    pub num_stations: usize,
    pub num_instructions: usize,
    /// Random seed for reproducibility (optional; if None, uses entropy).
    pub seed: Option<u64>,
    pub yard_width_m: f64,
    pub yard_depth_m: f64,
    /// Rail distance between bays; keep in line with `SimConfig::bay_pitch_m`.
    pub bay_pitch_m: f64,
    /// Truck speed is uniform in `[min, max]` m/s.
    pub truck_speed_min: f64,
    pub truck_speed_max: f64,
    /// Share of fences that start BLOCKED.
    pub blocked_fence_ratio: f64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_trucks: 40,
            num_quay_cranes: 4,
            num_yard_cranes: 8,
            num_blocks: 8,
            num_fences: 6,
            num_stations: 4,
            num_instructions: 60,
            seed: None,
            yard_width_m: DEFAULT_YARD_WIDTH_M,
            yard_depth_m: DEFAULT_YARD_DEPTH_M,
            bay_pitch_m: 6.1,
            truck_speed_min: 4.0,
            truck_speed_max: 8.0,
            blocked_fence_ratio: 0.3,
        }
    }
}

impl ScenarioParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_trucks(mut self, num_trucks: usize) -> Self {
        self.num_trucks = num_trucks;
        self
    }

    pub fn with_cranes(mut self, quay: usize, yard: usize) -> Self {
        self.num_quay_cranes = quay;
        self.num_yard_cranes = yard;
        self.num_blocks = self.num_blocks.max(yard);
        self
    }

    pub fn with_fences(mut self, num_fences: usize, blocked_ratio: f64) -> Self {
        self.num_fences = num_fences;
        self.blocked_fence_ratio = blocked_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_instructions(mut self, num_instructions: usize) -> Self {
        self.num_instructions = num_instructions;
        self
    }

    pub fn with_yard_size(mut self, width_m: f64, depth_m: f64) -> Self {
        self.yard_width_m = width_m;
        self.yard_depth_m = depth_m;
        self
    }
}
