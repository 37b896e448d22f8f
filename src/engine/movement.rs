use crate::constants::MIN_MOVE_DISTANCE_M;
use crate::geo::{interpolate, GeoPoint};
use crate::types::{Direction, MovementState};

/// Advances a movement segment by elapsed wall-clock time. Pure: the caller
/// owns the state and feeds it deltas, so tests can drive it with synthetic
/// timings. Arrival snaps traveled distance to the segment total; segments
/// below the minimum distance complete immediately.
pub fn advance(state: &MovementState, speed_mps: f64, dt_ms: u64) -> MovementState {
    if !state.moving || dt_ms == 0 {
        return *state;
    }
    let mut next = *state;
    next.traveled_m += speed_mps * dt_ms as f64 / 1000.0;
    if next.traveled_m >= next.total_distance_m || next.total_distance_m < MIN_MOVE_DISTANCE_M {
        next.traveled_m = next.total_distance_m;
        next.moving = false;
    }
    next
}

/// Current interpolated coordinate of a movement segment.
pub fn position_of(state: &MovementState) -> GeoPoint {
    if !state.moving {
        return if state.traveled_m > 0.0 {
            state.destination
        } else {
            state.start
        };
    }
    let fraction = (state.traveled_m / state.total_distance_m).clamp(0.0, 1.0);
    interpolate(state.start, state.destination, fraction)
}

/// Starts a fresh segment toward the destination, refusing segments shorter
/// than the minimum distance (they would only produce interpolation jitter).
pub fn start_segment(from: GeoPoint, to: GeoPoint, total_distance_m: f64) -> MovementState {
    MovementState {
        start: from,
        destination: to,
        total_distance_m,
        traveled_m: 0.0,
        moving: total_distance_m > MIN_MOVE_DISTANCE_M,
    }
}

/// Facing for a step, picked from the dominant coordinate delta. Falls back
/// to the current facing when the step is degenerate.
pub fn facing_for_step(from: GeoPoint, to: GeoPoint, current: Direction) -> Direction {
    let d_lat = to.lat - from.lat;
    let d_lng = to.lng - from.lng;
    if d_lat == 0.0 && d_lng == 0.0 {
        return current;
    }
    if d_lng.abs() > d_lat.abs() {
        if d_lng > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if d_lat > 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_m;

    fn segment_100m() -> MovementState {
        let from = GeoPoint::new(25.0330, 121.5654);
        let to = GeoPoint::new(25.0339, 121.5654);
        start_segment(from, to, haversine_m(from, to))
    }

    #[test]
    fn advances_by_speed_times_delta() {
        let state = segment_100m();
        let after = advance(&state, 60.0, 500);
        assert!(after.moving);
        assert!((after.traveled_m - 30.0).abs() < 1e-9);
        let position = position_of(&after);
        assert!(position.lat > state.start.lat && position.lat < state.destination.lat);
    }

    #[test]
    fn arrival_snaps_to_the_destination() {
        let state = segment_100m();
        let after = advance(&state, 60.0, 2_000);
        assert!(!after.moving);
        assert_eq!(after.traveled_m, after.total_distance_m);
        let position = position_of(&after);
        assert!(position.approx_eq(state.destination));
    }

    #[test]
    fn repeated_small_deltas_match_one_large_delta() {
        let mut stepped = segment_100m();
        for _ in 0..10 {
            stepped = advance(&stepped, 60.0, 50);
        }
        let jumped = advance(&segment_100m(), 60.0, 500);
        assert!((stepped.traveled_m - jumped.traveled_m).abs() < 1e-9);
    }

    #[test]
    fn short_segments_never_start_moving() {
        let from = GeoPoint::new(25.0330, 121.5654);
        let state = start_segment(from, from, 0.05);
        assert!(!state.moving);
        assert!(position_of(&state).approx_eq(from));
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        let state = segment_100m();
        let after = advance(&state, 60.0, 0);
        assert_eq!(after.traveled_m, state.traveled_m);
        assert!(after.moving);
    }

    #[test]
    fn facing_follows_the_dominant_axis() {
        let origin = GeoPoint::new(25.0, 121.5);
        assert_eq!(
            facing_for_step(origin, GeoPoint::new(25.001, 121.5001), Direction::Left),
            Direction::Up
        );
        assert_eq!(
            facing_for_step(origin, GeoPoint::new(24.999, 121.5), Direction::Left),
            Direction::Down
        );
        assert_eq!(
            facing_for_step(origin, GeoPoint::new(25.0001, 121.502), Direction::Left),
            Direction::Right
        );
        assert_eq!(
            facing_for_step(origin, GeoPoint::new(25.0, 121.498), Direction::Up),
            Direction::Left
        );
        assert_eq!(facing_for_step(origin, origin, Direction::Up), Direction::Up);
    }
}
