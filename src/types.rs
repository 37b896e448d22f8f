use serde::Serialize;

use crate::geo::{Bounds, GeoPoint};
use crate::graph::Segment;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    None,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostMode {
    Chasing,
    Fleeing,
    Scattering,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectibleKind {
    Dot,
    PowerPellet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Victory,
    Defeat,
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLevel {
    Info,
    Warn,
    Success,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotStopReason {
    NoReachableTarget,
    NoCollectibles,
}

/// One segment of interpolated travel between two road nodes. The renderer
/// reads start/destination/total/traveled to place and rotate the sprite.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MovementState {
    pub start: GeoPoint,
    pub destination: GeoPoint,
    #[serde(rename = "totalDistanceM")]
    pub total_distance_m: f64,
    #[serde(rename = "traveledM")]
    pub traveled_m: f64,
    pub moving: bool,
}

impl MovementState {
    pub fn at_rest(position: GeoPoint) -> Self {
        Self {
            start: position,
            destination: position,
            total_distance_m: 0.0,
            traveled_m: 0.0,
            moving: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PacmanView {
    pub position: GeoPoint,
    pub movement: MovementState,
    pub facing: Direction,
    pub autopilot: bool,
    pub clever: bool,
    pub lives: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GhostView {
    pub id: String,
    pub color: String,
    pub position: GeoPoint,
    pub movement: MovementState,
    pub mode: GhostMode,
    pub scared: bool,
    pub eaten: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectibleView {
    pub id: String,
    pub kind: CollectibleKind,
    pub position: GeoPoint,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameConfig {
    #[serde(rename = "decisionIntervalMs")]
    pub decision_interval_ms: u64,
    #[serde(rename = "powerModeDurationMs")]
    pub power_mode_duration_ms: u64,
    #[serde(rename = "pacmanSpeedMps")]
    pub pacman_speed_mps: f64,
    #[serde(rename = "ghostSpeedMps")]
    pub ghost_speed_mps: f64,
    #[serde(rename = "scaredSpeedMultiplier")]
    pub scared_speed_multiplier: f64,
    #[serde(rename = "ghostCount")]
    pub ghost_count: usize,
    #[serde(rename = "startingLives")]
    pub starting_lives: i32,
    #[serde(rename = "timeLimitMs")]
    pub time_limit_ms: u64,
}

/// Static world payload sent once at game start; everything the renderer
/// needs to draw the street network and seed its markers.
#[derive(Clone, Debug, Serialize)]
pub struct WorldInit {
    pub bounds: Bounds,
    #[serde(rename = "roadNetwork")]
    pub road_network: Vec<Segment>,
    #[serde(rename = "validPositions")]
    pub valid_positions: Vec<GeoPoint>,
    #[serde(rename = "pacmanSpawn")]
    pub pacman_spawn: GeoPoint,
    #[serde(rename = "ghostSpawns")]
    pub ghost_spawns: Vec<GeoPoint>,
    #[serde(rename = "scatterPoints")]
    pub scatter_points: Vec<GeoPoint>,
    pub collectibles: Vec<CollectibleView>,
}

/// Advisory and gameplay events drained into each snapshot. The autopilot
/// and avoidance entries are signals, not errors.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    DotCollected {
        kind: CollectibleKind,
        position: GeoPoint,
    },
    PowerModeStarted,
    PowerModeEnded,
    GhostEaten {
        #[serde(rename = "ghostId")]
        ghost_id: String,
    },
    LifeLost {
        #[serde(rename = "livesLeft")]
        lives_left: i32,
    },
    LevelCleared,
    GameOver {
        reason: GameOverReason,
    },
    AutopilotPlanned {
        steps: usize,
        level: AdvisoryLevel,
        message: String,
    },
    ReplanForced {
        level: AdvisoryLevel,
        message: String,
    },
    AutopilotDisabled {
        reason: AutopilotStopReason,
        level: AdvisoryLevel,
        message: String,
    },
    AvoidanceDisabled {
        level: AdvisoryLevel,
        message: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    #[serde(rename = "timeLeftMs")]
    pub time_left_ms: u64,
    pub pacman: PacmanView,
    pub ghosts: Vec<GhostView>,
    pub collectibles: Vec<CollectibleView>,
    #[serde(rename = "powerMode")]
    pub power_mode: bool,
    pub events: Vec<RuntimeEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameSummary {
    pub reason: GameOverReason,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "dotsCollected")]
    pub dots_collected: usize,
    #[serde(rename = "ghostsEaten")]
    pub ghosts_eaten: usize,
    #[serde(rename = "livesLost")]
    pub lives_lost: usize,
    #[serde(rename = "collectiblesLeft")]
    pub collectibles_left: usize,
}
