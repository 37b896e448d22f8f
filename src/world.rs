use std::fmt;

use crate::constants::{
    desired_scatter_points, ITEM_DENSITY_FACTOR, MAX_POWER_PELLETS, MAX_TOTAL_ITEMS,
    NUMBER_OF_GHOSTS, POWER_PELLET_FRACTION,
};
use crate::geo::{Bounds, GeoPoint};
use crate::graph::{build_road_graph, GraphOptions, RoadGraph};
use crate::osm::{OsmData, OsmElement};
use crate::repair::{connect_dead_ends, remove_disconnected_islands, RepairOptions};
use crate::rng::Rng;
use crate::types::{CollectibleKind, CollectibleView, WorldInit};

/// Spawn points near ghost spawns are rejected with this coarse tolerance so
/// scatter targets never sit on top of a spawn.
const SPAWN_EXCLUSION_DEG: f64 = 5e-4;

#[derive(Clone, Debug)]
pub struct Collectible {
    pub id: String,
    pub kind: CollectibleKind,
    pub position: GeoPoint,
}

impl Collectible {
    pub fn view(&self) -> CollectibleView {
        CollectibleView {
            id: self.id.clone(),
            kind: self.kind,
            position: self.position,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameWorld {
    pub bounds: Bounds,
    pub graph: RoadGraph,
    pub pacman_spawn: GeoPoint,
    pub ghost_spawns: Vec<GeoPoint>,
    pub scatter_points: Vec<GeoPoint>,
    pub collectibles: Vec<Collectible>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldBuildError {
    /// The geometry source produced no usable road network.
    EmptyNetwork,
}

impl fmt::Display for WorldBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNetwork => write!(f, "road network generation failed: no usable geometry"),
        }
    }
}

impl std::error::Error for WorldBuildError {}

/// Builds and repairs the road graph, then lays out spawns, scatter anchors
/// and collectibles. All randomness flows through the caller's seeded RNG.
pub fn build_world(
    bounds: Bounds,
    data: &OsmData,
    graph_options: &GraphOptions,
    repair_options: &RepairOptions,
    rng: &mut Rng,
) -> Result<GameWorld, WorldBuildError> {
    let mut warnings = Vec::new();
    let mut graph = build_road_graph(data, graph_options);
    if graph.is_empty() {
        return Err(WorldBuildError::EmptyNetwork);
    }

    let repair = connect_dead_ends(&mut graph, repair_options, graph_options.max_segment_length_m);
    if repair.capped {
        warnings.push(format!(
            "dead-end connection stopped at the {}-pass limit; some dead ends remain",
            repair.passes
        ));
    }
    let pruned = remove_disconnected_islands(&mut graph);
    if pruned > 0 {
        warnings.push(format!("removed {pruned} nodes outside the main component"));
    }

    let Some(pacman_spawn) = graph.nearest_node(bounds.center()) else {
        return Err(WorldBuildError::EmptyNetwork);
    };

    let ghost_spawns = pick_ghost_spawns(&graph, bounds, rng, &mut warnings);
    let scatter_points = pick_scatter_points(&graph, bounds, &ghost_spawns, rng);
    let collectibles = place_collectibles(&graph, pacman_spawn, &ghost_spawns, rng);

    Ok(GameWorld {
        bounds,
        graph,
        pacman_spawn,
        ghost_spawns,
        scatter_points,
        collectibles,
        warnings,
    })
}

pub fn to_world_init(world: &GameWorld) -> WorldInit {
    WorldInit {
        bounds: world.bounds,
        road_network: world.graph.road_network.clone(),
        valid_positions: world.graph.valid_positions.clone(),
        pacman_spawn: world.pacman_spawn,
        ghost_spawns: world.ghost_spawns.clone(),
        scatter_points: world.scatter_points.clone(),
        collectibles: world.collectibles.iter().map(Collectible::view).collect(),
    }
}

fn pick_ghost_spawns(
    graph: &RoadGraph,
    bounds: Bounds,
    rng: &mut Rng,
    warnings: &mut Vec<String>,
) -> Vec<GeoPoint> {
    let center = bounds.center();
    let candidates = [
        GeoPoint::new(bounds.north, bounds.west),
        GeoPoint::new(bounds.north, bounds.east),
        GeoPoint::new(bounds.south, bounds.west),
        GeoPoint::new(bounds.south, bounds.east),
        GeoPoint::new(center.lat + (bounds.north - center.lat) * 0.5, center.lng),
        GeoPoint::new(center.lat - (center.lat - bounds.south) * 0.5, center.lng),
        GeoPoint::new(center.lat, center.lng - (center.lng - bounds.west) * 0.5),
        GeoPoint::new(center.lat, center.lng + (bounds.east - center.lng) * 0.5),
    ];

    let mut spawns: Vec<GeoPoint> = Vec::new();
    for candidate in candidates {
        if spawns.len() >= NUMBER_OF_GHOSTS {
            break;
        }
        if let Some(road) = graph.nearest_node(candidate) {
            if !spawns.iter().any(|p| p.approx_eq(road)) {
                spawns.push(road);
            }
        }
    }

    let mut attempts = 0;
    while spawns.len() < NUMBER_OF_GHOSTS
        && attempts < 50
        && graph.node_count() > spawns.len()
    {
        let random = graph.valid_positions[rng.pick_index(graph.node_count())];
        if !spawns.iter().any(|p| p.approx_eq(random)) {
            spawns.push(random);
        }
        attempts += 1;
    }
    if spawns.is_empty() && !graph.is_empty() {
        spawns.push(graph.valid_positions[0]);
        warnings.push("too few ghost spawn points; spawns will be reused".to_string());
    }
    spawns
}

fn pick_scatter_points(
    graph: &RoadGraph,
    bounds: Bounds,
    ghost_spawns: &[GeoPoint],
    rng: &mut Rng,
) -> Vec<GeoPoint> {
    let mid = bounds.center();
    let lat_offset = bounds.lat_span() * 0.25;
    let lng_offset = bounds.lng_span() * 0.25;
    let anchors = [
        GeoPoint::new(bounds.north - lat_offset, bounds.west + lng_offset),
        GeoPoint::new(bounds.north - lat_offset, bounds.east - lng_offset),
        GeoPoint::new(bounds.south + lat_offset, bounds.west + lng_offset),
        GeoPoint::new(bounds.south + lat_offset, bounds.east - lng_offset),
        GeoPoint::new(mid.lat + lat_offset * 0.5, mid.lng - lng_offset * 0.5),
        GeoPoint::new(mid.lat - lat_offset * 0.5, mid.lng + lng_offset * 0.5),
        GeoPoint::new(mid.lat + lat_offset * 0.5, mid.lng + lng_offset * 0.5),
        GeoPoint::new(mid.lat - lat_offset * 0.5, mid.lng - lng_offset * 0.5),
    ];

    let near_spawn = |point: GeoPoint, spawns: &[GeoPoint]| {
        spawns
            .iter()
            .any(|spawn| spawn.approx_eq_within(point, SPAWN_EXCLUSION_DEG))
    };

    let mut scatter: Vec<GeoPoint> = Vec::new();
    for anchor in anchors {
        if let Some(road) = graph.nearest_node(anchor) {
            if !scatter.iter().any(|p| p.approx_eq(road)) && !near_spawn(road, ghost_spawns) {
                scatter.push(road);
            }
        }
    }

    let desired = desired_scatter_points(NUMBER_OF_GHOSTS, graph.node_count());
    let mut attempts = 0;
    while scatter.len() < desired && attempts < 50 && graph.node_count() > scatter.len() {
        let random = graph.valid_positions[rng.pick_index(graph.node_count())];
        if !scatter.iter().any(|p| p.approx_eq(random)) && !near_spawn(random, ghost_spawns) {
            scatter.push(random);
        }
        attempts += 1;
    }
    if scatter.is_empty() && !graph.is_empty() {
        let fallback = graph
            .valid_positions
            .iter()
            .copied()
            .find(|p| !ghost_spawns.iter().any(|spawn| spawn.approx_eq(*p)))
            .unwrap_or(graph.valid_positions[0]);
        scatter.push(fallback);
    }
    scatter
}

fn place_collectibles(
    graph: &RoadGraph,
    pacman_spawn: GeoPoint,
    ghost_spawns: &[GeoPoint],
    rng: &mut Rng,
) -> Vec<Collectible> {
    let mut available: Vec<GeoPoint> = graph
        .valid_positions
        .iter()
        .copied()
        .filter(|p| !p.approx_eq(pacman_spawn))
        .filter(|p| !ghost_spawns.iter().any(|spawn| spawn.approx_eq(*p)))
        .collect();

    let total = ((available.len() as f64 * ITEM_DENSITY_FACTOR).floor() as usize)
        .min(MAX_TOTAL_ITEMS)
        .min(available.len());
    let pellets = ((total as f64 * POWER_PELLET_FRACTION).floor() as usize).min(MAX_POWER_PELLETS);
    let dots = total.saturating_sub(pellets);

    let mut collectibles = Vec::with_capacity(total);
    for i in 0..pellets {
        if available.is_empty() {
            break;
        }
        let position = available.swap_remove(rng.pick_index(available.len()));
        collectibles.push(Collectible {
            id: format!("pellet_{}", i + 1),
            kind: CollectibleKind::PowerPellet,
            position,
        });
    }
    for i in 0..dots {
        if available.is_empty() {
            break;
        }
        let position = available.swap_remove(rng.pick_index(available.len()));
        collectibles.push(Collectible {
            id: format!("dot_{}", i + 1),
            kind: CollectibleKind::Dot,
            position,
        });
    }
    collectibles
}

/// Rectangular street lattice for the simulator and tests. Node spacing is in
/// meters; every row and column becomes one residential way.
pub fn synthetic_grid(rows: usize, cols: usize, spacing_m: f64, origin: GeoPoint) -> (Bounds, OsmData) {
    let d_lat = spacing_m / 111_320.0;
    let d_lng = spacing_m / (111_320.0 * origin.lat.to_radians().cos());

    let mut elements = Vec::new();
    let node_id = |r: usize, c: usize| (r * cols + c + 1) as i64;
    for r in 0..rows {
        for c in 0..cols {
            elements.push(OsmElement {
                kind: "node".to_string(),
                id: node_id(r, c),
                lat: Some(origin.lat + r as f64 * d_lat),
                lon: Some(origin.lng + c as f64 * d_lng),
                nodes: None,
                tags: None,
            });
        }
    }

    let mut way_id = 1_000_000;
    let mut push_way = |elements: &mut Vec<OsmElement>, ids: Vec<i64>| {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("highway".to_string(), "residential".to_string());
        elements.push(OsmElement {
            kind: "way".to_string(),
            id: way_id,
            lat: None,
            lon: None,
            nodes: Some(ids),
            tags: Some(tags),
        });
        way_id += 1;
    };
    for r in 0..rows {
        push_way(&mut elements, (0..cols).map(|c| node_id(r, c)).collect());
    }
    for c in 0..cols {
        push_way(&mut elements, (0..rows).map(|r| node_id(r, c)).collect());
    }

    let bounds = Bounds {
        south: origin.lat,
        west: origin.lng,
        north: origin.lat + (rows.saturating_sub(1)) as f64 * d_lat,
        east: origin.lng + (cols.saturating_sub(1)) as f64 * d_lng,
    };
    (bounds, OsmData { elements })
}
