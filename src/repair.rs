use std::collections::{BTreeSet, VecDeque};

use crate::geo::{degree_distance_sq, GeoPoint, NodeKey};
use crate::graph::{subdivide_points, RoadGraph};
use crate::pathfind::bfs_distance;

/// Dead-end connection thresholds. The distance and hop limits are tuned
/// empirically for street-scale graphs; nothing downstream depends on the
/// exact values beyond "produces a reasonably connected network".
#[derive(Clone, Copy, Debug)]
pub struct RepairOptions {
    pub max_passes: usize,
    pub max_connect_distance_m: f64,
    pub min_graph_distance_hops: u32,
    pub meters_per_degree: f64,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            max_passes: 500,
            max_connect_distance_m: 200.0,
            min_graph_distance_hops: 10,
            meters_per_degree: 111_320.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RepairReport {
    pub connections_made: usize,
    pub passes: usize,
    pub capped: bool,
}

/// Connects dead ends (degree-1 nodes) to physically close nodes that are
/// far away through the graph, creating genuinely new shortcuts instead of
/// redundant stubs. New edges are subdivided like any built segment.
///
/// Each pass recomputes the dead-end set, since a connection changes two
/// degrees at once. A node already reachable from the candidate within
/// `min_graph_distance_hops` is skipped; an unreachable candidate counts as
/// far enough, which lets the connector stitch separate components.
pub fn connect_dead_ends(
    graph: &mut RoadGraph,
    options: &RepairOptions,
    max_segment_length_m: f64,
) -> RepairReport {
    let mut report = RepairReport::default();
    let bfs_depth = options.min_graph_distance_hops + 5;

    for pass in 0..options.max_passes {
        report.passes = pass + 1;
        let dead_ends: Vec<GeoPoint> = graph
            .valid_positions
            .iter()
            .copied()
            .filter(|node| graph.degree(*node) == 1)
            .collect();
        if dead_ends.is_empty() {
            return report;
        }

        let mut fixed_this_pass = 0;
        for dead_end in dead_ends {
            // An earlier connection this pass may have bumped the degree.
            if graph.degree(dead_end) != 1 {
                continue;
            }

            let mut candidates: Vec<(f64, GeoPoint)> = graph
                .valid_positions
                .iter()
                .copied()
                .filter(|candidate| {
                    !candidate.approx_eq(dead_end)
                        && !graph
                            .neighbors(dead_end)
                            .iter()
                            .any(|neighbor| neighbor.approx_eq(*candidate))
                })
                .map(|candidate| (degree_distance_sq(dead_end, candidate), candidate))
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (distance_sq, candidate) in candidates {
                let meters = distance_sq.sqrt() * options.meters_per_degree;
                if meters > options.max_connect_distance_m {
                    break;
                }
                let hops = bfs_distance(dead_end, candidate, &graph.adjacency, bfs_depth);
                let far_enough = match hops {
                    Some(hops) => hops > options.min_graph_distance_hops,
                    None => true,
                };
                if far_enough {
                    let chain = subdivide_points(dead_end, candidate, max_segment_length_m);
                    for step in chain.windows(2) {
                        graph.insert_edge(step[0], step[1]);
                    }
                    report.connections_made += 1;
                    fixed_this_pass += 1;
                    break;
                }
            }
        }

        if fixed_this_pass == 0 {
            return report;
        }
    }

    // Pass budget exhausted while the network was still changing.
    report.capped = graph
        .valid_positions
        .iter()
        .any(|node| graph.degree(*node) == 1);
    report
}

/// Keeps only the largest connected component, discarding every node, edge
/// and adjacency entry outside it. Idempotent; ties go to the component
/// found first in key order.
pub fn remove_disconnected_islands(graph: &mut RoadGraph) -> usize {
    let mut visited: BTreeSet<NodeKey> = BTreeSet::new();
    let mut components: Vec<Vec<NodeKey>> = Vec::new();

    for &start in graph.adjacency.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(current) = queue.pop_front() {
            component.push(current);
            if let Some(neighbors) = graph.adjacency.get(&current) {
                for neighbor in neighbors {
                    let key = neighbor.key();
                    if visited.insert(key) {
                        queue.push_back(key);
                    }
                }
            }
        }
        components.push(component);
    }

    if components.len() <= 1 {
        return 0;
    }

    let mut largest = 0;
    for (index, component) in components.iter().enumerate() {
        if component.len() > components[largest].len() {
            largest = index;
        }
    }
    let keep: BTreeSet<NodeKey> = components[largest].iter().copied().collect();
    let pruned = graph.node_count() - keep.len();

    graph.valid_positions.retain(|node| keep.contains(&node.key()));
    graph.adjacency.retain(|key, _| keep.contains(key));
    for neighbors in graph.adjacency.values_mut() {
        neighbors.retain(|neighbor| keep.contains(&neighbor.key()));
    }
    graph
        .road_network
        .retain(|segment| keep.contains(&segment.a.key()) && keep.contains(&segment.b.key()));
    pruned
}
