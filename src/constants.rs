pub const TICK_MS: u64 = 50;
pub const MAX_FRAME_DELTA_MS: u64 = 100;
pub const DECISION_INTERVAL_MS: u64 = 300;

pub const PACMAN_BASE_SPEED_MPS: f64 = 60.0;
pub const GHOST_BASE_SPEED_MPS: f64 = 45.0;
pub const SCARED_SPEED_MULTIPLIER: f64 = 0.7;

pub const NUMBER_OF_GHOSTS: usize = 7;
pub const STARTING_LIVES: i32 = 3;
pub const DEFAULT_TIME_LIMIT_MS: u64 = 600_000;

pub const POWER_MODE_DURATION_MS: u64 = 10_000;
pub const GHOST_EATEN_RESPAWN_MS: u64 = 500;
pub const ROUND_TRANSITION_MS: u64 = 3_000;

pub const COLLECT_RADIUS_M: f64 = 5.0;
pub const GHOST_CONTACT_RADIUS_M: f64 = 3.0;

pub const COORD_TOLERANCE_DEG: f64 = 1e-6;
pub const MIN_MOVE_DISTANCE_M: f64 = 0.1;
pub const SCATTER_ARRIVAL_M: f64 = 10.0;

pub const DANGER_RADIUS_M: f64 = 15.0;
pub const DANGER_PROXIMITY_PENALTY: f64 = 50_000.0;
pub const DANGER_ON_NODE_PENALTY: f64 = 1_000_000.0;

pub const BFS_DEFAULT_MAX_DEPTH: u32 = 100;

pub const ITEM_DENSITY_FACTOR: f64 = 0.70;
pub const MAX_TOTAL_ITEMS: usize = 20_000;
pub const POWER_PELLET_FRACTION: f64 = 0.07;
pub const MAX_POWER_PELLETS: usize = 10;

/// Scatter anchors to aim for given the ghost roster and how many road
/// nodes the map actually produced.
pub fn desired_scatter_points(ghost_count: usize, position_count: usize) -> usize {
    ghost_count.max(4).min(position_count).min(8)
}
