use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Direction;

pub(super) fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// Unit step in degree space for a compass direction; latitude grows north.
pub(super) fn direction_vector(dir: Direction) -> Option<(f64, f64)> {
    match dir {
        Direction::Up => Some((1.0, 0.0)),
        Direction::Down => Some((-1.0, 0.0)),
        Direction::Left => Some((0.0, -1.0)),
        Direction::Right => Some((0.0, 1.0)),
        Direction::None => None,
    }
}
