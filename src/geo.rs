use serde::{Deserialize, Serialize};

use crate::constants::COORD_TOLERANCE_DEG;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const KEY_GRID_PER_DEG: f64 = 1e7;

/// A geographic coordinate. Equality within the game is tolerance-based
/// (`approx_eq`); exact identity inside graph maps goes through [`NodeKey`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn approx_eq(&self, other: GeoPoint) -> bool {
        self.approx_eq_within(other, COORD_TOLERANCE_DEG)
    }

    pub fn approx_eq_within(&self, other: GeoPoint, tolerance_deg: f64) -> bool {
        (self.lat - other.lat).abs() < tolerance_deg && (self.lng - other.lng).abs() < tolerance_deg
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::of(*self)
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Exact map key for a node: both coordinates snapped to a 1e-7-degree grid.
/// Every node entering a graph map is produced by graph construction, so an
/// exact lookup is sufficient; there is no tolerance-scan fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(i64, i64);

impl NodeKey {
    pub fn of(point: GeoPoint) -> Self {
        Self(snap(point.lat), snap(point.lng))
    }
}

fn snap(degrees: f64) -> i64 {
    (degrees * KEY_GRID_PER_DEG).round() as i64
}

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Squared distance in degree space. Only good for ranking nearby candidates.
pub fn degree_distance_sq(a: GeoPoint, b: GeoPoint) -> f64 {
    let dy = a.lat - b.lat;
    let dx = a.lng - b.lng;
    dy * dy + dx * dx
}

pub fn interpolate(a: GeoPoint, b: GeoPoint, fraction: f64) -> GeoPoint {
    if fraction >= 1.0 {
        return b;
    }
    GeoPoint {
        lat: a.lat + fraction * (b.lat - a.lat),
        lng: a.lng + fraction * (b.lng - a.lng),
    }
}

/// Geographic play-area bounds, south/west inclusive of the corner nodes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lng_span(&self) -> f64 {
        self.east - self.west
    }
}
