use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::constants::{
    DANGER_ON_NODE_PENALTY, DANGER_PROXIMITY_PENALTY, DANGER_RADIUS_M,
};
use crate::geo::{haversine_m, GeoPoint, NodeKey};
use crate::graph::RoadGraph;

/// A* shortest path over the road graph, start and goal inclusive. Returns
/// an empty vec when the goal is unreachable or the graph is empty.
///
/// With `avoid_danger` set and a non-empty `danger_nodes`, stepping onto a
/// danger node costs an extra 1,000,000 m and stepping within the danger
/// radius costs 50,000 m per nearby danger node. The penalties dominate any
/// real detour without making dangerous routes impossible, so the search
/// stays complete when no safe path exists.
pub fn a_star_search(
    start: GeoPoint,
    goal: GeoPoint,
    graph: &RoadGraph,
    danger_nodes: &[GeoPoint],
    avoid_danger: bool,
) -> Vec<GeoPoint> {
    if graph.is_empty() {
        return Vec::new();
    }

    let mut open_set = vec![start];
    let mut came_from: BTreeMap<NodeKey, GeoPoint> = BTreeMap::new();
    let mut g_score: BTreeMap<NodeKey, f64> = BTreeMap::new();
    let mut f_score: BTreeMap<NodeKey, f64> = BTreeMap::new();
    for position in &graph.valid_positions {
        g_score.insert(position.key(), f64::INFINITY);
        f_score.insert(position.key(), f64::INFINITY);
    }
    g_score.insert(start.key(), 0.0);
    f_score.insert(start.key(), haversine_m(start, goal));

    let score_of = |scores: &BTreeMap<NodeKey, f64>, node: GeoPoint| {
        scores.get(&node.key()).copied().unwrap_or(f64::INFINITY)
    };

    while !open_set.is_empty() {
        let mut current_index = 0;
        for i in 1..open_set.len() {
            if score_of(&f_score, open_set[i]) < score_of(&f_score, open_set[current_index]) {
                current_index = i;
            }
        }
        let current = open_set.swap_remove(current_index);

        if current.approx_eq(goal) {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(&previous) = came_from.get(&cursor.key()) {
                cursor = previous;
                path.push(cursor);
            }
            path.reverse();
            return path;
        }

        for &neighbor in graph.neighbors(current) {
            let mut cost = haversine_m(current, neighbor);
            if avoid_danger && !danger_nodes.is_empty() {
                for &danger in danger_nodes {
                    if neighbor.approx_eq(danger) {
                        cost += DANGER_ON_NODE_PENALTY;
                        break;
                    }
                    if haversine_m(neighbor, danger) < DANGER_RADIUS_M {
                        cost += DANGER_PROXIMITY_PENALTY;
                    }
                }
            }

            let tentative = score_of(&g_score, current) + cost;
            if tentative < score_of(&g_score, neighbor) {
                came_from.insert(neighbor.key(), current);
                g_score.insert(neighbor.key(), tentative);
                f_score.insert(neighbor.key(), tentative + haversine_m(neighbor, goal));
                if !open_set.iter().any(|node| node.approx_eq(neighbor)) {
                    open_set.push(neighbor);
                }
            }
        }
    }
    Vec::new()
}

/// Hop count between two nodes via breadth-first expansion, `None` when the
/// goal is unreachable or deeper than `max_depth`. Edge weights are ignored;
/// this is a topological-distance oracle, not a shortest-path query.
pub fn bfs_distance(
    start: GeoPoint,
    goal: GeoPoint,
    adjacency: &BTreeMap<NodeKey, Vec<GeoPoint>>,
    max_depth: u32,
) -> Option<u32> {
    if start.approx_eq(goal) {
        return Some(0);
    }
    let goal_key = goal.key();
    let mut queue: VecDeque<(NodeKey, u32)> = VecDeque::new();
    let mut visited: BTreeSet<NodeKey> = BTreeSet::new();
    queue.push_back((start.key(), 0));
    visited.insert(start.key());

    while let Some((current, distance)) = queue.pop_front() {
        if distance >= max_depth {
            continue;
        }
        let Some(neighbors) = adjacency.get(&current) else {
            continue;
        };
        for neighbor in neighbors {
            let neighbor_key = neighbor.key();
            if neighbor_key == goal_key {
                return Some(distance + 1);
            }
            if visited.insert(neighbor_key) {
                queue.push_back((neighbor_key, distance + 1));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RoadGraph;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    /// A-B-C in a line, ~11 m per hop.
    fn line_graph() -> (RoadGraph, GeoPoint, GeoPoint, GeoPoint) {
        let a = point(25.0330, 121.5654);
        let b = point(25.0331, 121.5654);
        let c = point(25.0332, 121.5654);
        let mut graph = RoadGraph::default();
        graph.insert_edge(a, b);
        graph.insert_edge(b, c);
        (graph, a, b, c)
    }

    /// Two routes from start to goal: a direct middle node and a detour of
    /// two nodes slightly off-axis. The direct route is shorter.
    fn two_route_graph() -> (RoadGraph, GeoPoint, GeoPoint, GeoPoint) {
        let start = point(25.0330, 121.5654);
        let mid = point(25.0331, 121.5654);
        let goal = point(25.0332, 121.5654);
        let detour_a = point(25.03305, 121.56565);
        let detour_b = point(25.03315, 121.56565);
        let mut graph = RoadGraph::default();
        graph.insert_edge(start, mid);
        graph.insert_edge(mid, goal);
        graph.insert_edge(start, detour_a);
        graph.insert_edge(detour_a, detour_b);
        graph.insert_edge(detour_b, goal);
        (graph, start, mid, goal)
    }

    fn path_length(path: &[GeoPoint]) -> f64 {
        path.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
    }

    /// Exhaustive minimum over all simple paths, as an optimality baseline.
    fn brute_force_shortest(graph: &RoadGraph, start: GeoPoint, goal: GeoPoint) -> Option<f64> {
        fn walk(
            graph: &RoadGraph,
            current: GeoPoint,
            goal: GeoPoint,
            visited: &mut Vec<GeoPoint>,
            length: f64,
            best: &mut Option<f64>,
        ) {
            if current.approx_eq(goal) {
                *best = Some(best.map_or(length, |b: f64| b.min(length)));
                return;
            }
            for &neighbor in graph.neighbors(current) {
                if visited.iter().any(|seen| seen.approx_eq(neighbor)) {
                    continue;
                }
                visited.push(neighbor);
                walk(graph, neighbor, goal, visited, length + haversine_m(current, neighbor), best);
                visited.pop();
            }
        }
        let mut best = None;
        let mut visited = vec![start];
        walk(graph, start, goal, &mut visited, 0.0, &mut best);
        best
    }

    #[test]
    fn finds_the_line_path_start_to_goal_inclusive() {
        let (graph, a, b, c) = line_graph();
        let path = a_star_search(a, c, &graph, &[], false);
        assert_eq!(path.len(), 3);
        assert!(path[0].approx_eq(a));
        assert!(path[1].approx_eq(b));
        assert!(path[2].approx_eq(c));
    }

    #[test]
    fn shortest_route_wins_without_danger() {
        let (graph, start, mid, goal) = two_route_graph();
        let path = a_star_search(start, goal, &graph, &[], false);
        assert_eq!(path.len(), 3);
        assert!(path[1].approx_eq(mid));

        // Exhaustive baseline: no simple path is shorter.
        let baseline = brute_force_shortest(&graph, start, goal).expect("goal is reachable");
        assert!((path_length(&path) - baseline).abs() < 1e-9);
    }

    #[test]
    fn danger_on_the_short_route_forces_the_detour() {
        let (graph, start, mid, goal) = two_route_graph();
        let path = a_star_search(start, goal, &graph, &[mid], true);
        assert_eq!(path.len(), 4, "expected the detour, got {path:?}");
        assert!(!path.iter().any(|node| node.approx_eq(mid)));
    }

    #[test]
    fn only_route_is_taken_even_through_danger() {
        let (graph, a, b, c) = line_graph();
        let path = a_star_search(a, c, &graph, &[b], true);
        assert_eq!(path.len(), 3);
        assert!(path[1].approx_eq(b));
    }

    #[test]
    fn unreachable_goal_returns_empty() {
        let (mut graph, a, _, c) = line_graph();
        let island_a = point(25.1000, 121.6000);
        let island_b = point(25.1001, 121.6000);
        graph.insert_edge(island_a, island_b);
        assert!(a_star_search(a, island_a, &graph, &[], false).is_empty());
        assert!(!a_star_search(a, c, &graph, &[], false).is_empty());
    }

    #[test]
    fn empty_graph_returns_empty() {
        let graph = RoadGraph::default();
        let path = a_star_search(point(25.0, 121.5), point(25.1, 121.5), &graph, &[], false);
        assert!(path.is_empty());
    }

    #[test]
    fn start_equal_to_goal_returns_single_node() {
        let (graph, a, _, _) = line_graph();
        let path = a_star_search(a, a, &graph, &[], false);
        assert_eq!(path.len(), 1);
        assert!(path[0].approx_eq(a));
    }

    #[test]
    fn bfs_distance_counts_hops() {
        let (graph, a, b, c) = line_graph();
        assert_eq!(bfs_distance(a, c, &graph.adjacency, 100), Some(2));
        assert_eq!(bfs_distance(a, b, &graph.adjacency, 100), Some(1));
        assert_eq!(bfs_distance(a, a, &graph.adjacency, 100), Some(0));
    }

    #[test]
    fn bfs_distance_respects_max_depth() {
        let (graph, a, _, c) = line_graph();
        assert_eq!(bfs_distance(a, c, &graph.adjacency, 1), None);
        assert_eq!(bfs_distance(a, c, &graph.adjacency, 2), Some(2));
    }

    #[test]
    fn bfs_distance_unreachable_is_none() {
        let (mut graph, a, _, _) = line_graph();
        let island = point(25.2000, 121.7000);
        let island_b = point(25.2001, 121.7000);
        graph.insert_edge(island, island_b);
        assert_eq!(bfs_distance(a, island, &graph.adjacency, 100), None);
    }

    #[test]
    fn danger_cost_is_reflected_in_g_scores_on_the_only_path() {
        // The 3-node scenario: the path exists either way, the cost does not.
        let (graph, a, b, c) = line_graph();
        let plain = a_star_search(a, c, &graph, &[], false);
        let penalized = a_star_search(a, c, &graph, &[b], true);
        assert_eq!(plain.len(), penalized.len());
        // Both traverse A-B-C; the penalty only affects internal scoring, so
        // the returned geometry is identical.
        for (x, y) in plain.iter().zip(penalized.iter()) {
            assert!(x.approx_eq(*y));
        }
    }
}
