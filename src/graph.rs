use std::collections::BTreeMap;

use serde::Serialize;

use crate::geo::{degree_distance_sq, haversine_m, interpolate, GeoPoint, NodeKey};
use crate::osm::{collect_road_ways, OsmData};

/// One traversable road fragment, kept for rendering. Adjacency treats it as
/// undirected.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Segment {
    pub a: GeoPoint,
    pub b: GeoPoint,
}

#[derive(Clone, Copy, Debug)]
pub struct GraphOptions {
    pub max_segment_length_m: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_segment_length_m: 20.0,
        }
    }
}

/// The playable road network. Invariants: adjacency is symmetric, every node
/// has an entry, and no segment exceeds the configured maximum length.
#[derive(Clone, Debug, Default)]
pub struct RoadGraph {
    pub valid_positions: Vec<GeoPoint>,
    pub adjacency: BTreeMap<NodeKey, Vec<GeoPoint>>,
    pub road_network: Vec<Segment>,
}

impl RoadGraph {
    pub fn is_empty(&self) -> bool {
        self.valid_positions.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.valid_positions.len()
    }

    pub fn contains(&self, node: GeoPoint) -> bool {
        self.adjacency.contains_key(&node.key())
    }

    pub fn neighbors(&self, node: GeoPoint) -> &[GeoPoint] {
        self.adjacency
            .get(&node.key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn degree(&self, node: GeoPoint) -> usize {
        self.neighbors(node).len()
    }

    /// Road node closest to the target in degree space, `None` on an empty
    /// graph.
    pub fn nearest_node(&self, target: GeoPoint) -> Option<GeoPoint> {
        let mut nearest = None;
        let mut best = f64::INFINITY;
        for &position in &self.valid_positions {
            let distance_sq = degree_distance_sq(position, target);
            if distance_sq < best {
                best = distance_sq;
                nearest = Some(position);
            }
        }
        nearest
    }

    /// Registers the point as a node. Points sharing a key sit within 1e-7
    /// degrees of each other, so the argument itself serves as the canonical
    /// coordinate for edge insertion.
    pub fn ensure_node(&mut self, point: GeoPoint) -> GeoPoint {
        let key = point.key();
        if !self.adjacency.contains_key(&key) {
            self.adjacency.insert(key, Vec::new());
            self.valid_positions.push(point);
        }
        point
    }

    /// Inserts an undirected edge, deduplicating adjacency entries under
    /// tolerance equality. Degenerate self-edges are dropped.
    pub fn insert_edge(&mut self, a: GeoPoint, b: GeoPoint) {
        let a = self.ensure_node(a);
        let b = self.ensure_node(b);
        if a.key() == b.key() {
            return;
        }
        self.road_network.push(Segment { a, b });
        if let Some(a_neighbors) = self.adjacency.get_mut(&a.key()) {
            if !a_neighbors.iter().any(|n| n.approx_eq(b)) {
                a_neighbors.push(b);
            }
        }
        if let Some(b_neighbors) = self.adjacency.get_mut(&b.key()) {
            if !b_neighbors.iter().any(|n| n.approx_eq(a)) {
                b_neighbors.push(a);
            }
        }
    }
}

/// Splits a raw segment into equal fractions so no piece exceeds the maximum
/// length. Returns the full point chain, endpoints included.
pub fn subdivide_points(a: GeoPoint, b: GeoPoint, max_segment_length_m: f64) -> Vec<GeoPoint> {
    let distance = haversine_m(a, b);
    if distance <= max_segment_length_m || max_segment_length_m <= 0.0 {
        return vec![a, b];
    }
    let pieces = (distance / max_segment_length_m).ceil() as usize;
    let mut chain = Vec::with_capacity(pieces + 1);
    chain.push(a);
    for i in 1..pieces {
        chain.push(interpolate(a, b, i as f64 / pieces as f64));
    }
    chain.push(b);
    chain
}

/// Builds the road graph from raw geometry. Absent or empty element lists
/// produce an empty graph; callers decide how loudly to report that.
pub fn build_road_graph(data: &OsmData, options: &GraphOptions) -> RoadGraph {
    let mut graph = RoadGraph::default();
    if data.elements.is_empty() {
        return graph;
    }

    let road_ways = collect_road_ways(data);
    for node_ids in &road_ways.ways {
        let way_points: Vec<GeoPoint> = node_ids
            .iter()
            .filter_map(|id| road_ways.node_coords.get(id).copied())
            .collect();
        for &point in &way_points {
            graph.ensure_node(point);
        }
        for pair in way_points.windows(2) {
            let chain = subdivide_points(pair[0], pair[1], options.max_segment_length_m);
            for step in chain.windows(2) {
                graph.insert_edge(step[0], step[1]);
            }
        }
    }
    graph
}
