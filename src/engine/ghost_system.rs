use super::*;

impl GameEngine {
    /// One decision tick for every parked ghost: pick the next road node and
    /// emit a movement intent. Runs on the decision cadence, not per frame.
    pub(super) fn decide_ghost_moves(&mut self, now_ms: u64) {
        let pacman_position = movement::position_of(&self.pacman.movement);
        let Some(pacman_node) = self.world.graph.nearest_node(pacman_position) else {
            return;
        };

        for idx in 0..self.ghosts.len() {
            if self.ghosts[idx].is_eaten(now_ms) || self.ghosts[idx].movement.moving {
                continue;
            }

            let ghost_position = movement::position_of(&self.ghosts[idx].movement);
            let Some(current) = self.world.graph.nearest_node(ghost_position) else {
                continue;
            };
            let neighbors: Vec<GeoPoint> = self.world.graph.neighbors(current).to_vec();
            if neighbors.is_empty() {
                self.ghosts[idx].movement.moving = false;
                continue;
            }

            // The previous segment's start node; stepping straight back onto
            // it is only allowed when there is no other choice.
            let came_from = self.ghosts[idx].movement.start;
            let exclude_came_from = neighbors.len() > 1;
            let excluded =
                |node: GeoPoint| exclude_came_from && node.approx_eq(came_from);

            if self.ghosts[idx].scattering {
                match self.ghosts[idx].scatter_target {
                    Some(scatter) if haversine_m(current, scatter) < SCATTER_ARRIVAL_M => {
                        self.ghosts[idx].scattering = false;
                        self.ghosts[idx].scatter_target = None;
                    }
                    Some(_) => {}
                    None => self.ghosts[idx].scattering = false,
                }
            }

            let (target, fleeing) = if self.ghosts[idx].scattering {
                match self.ghosts[idx].scatter_target {
                    Some(scatter) => (scatter, false),
                    None => (pacman_node, self.ghosts[idx].scared),
                }
            } else {
                (pacman_node, self.ghosts[idx].scared)
            };

            let mut best_score = if fleeing { f64::NEG_INFINITY } else { f64::INFINITY };
            let mut best_next: Option<GeoPoint> = None;
            for &neighbor in &neighbors {
                if excluded(neighbor) {
                    continue;
                }
                let distance = haversine_m(neighbor, target);
                let better = if fleeing {
                    distance > best_score
                } else {
                    distance < best_score
                };
                if better {
                    best_score = distance;
                    best_next = Some(neighbor);
                }
            }

            if best_next.is_some() {
                let tied: Vec<GeoPoint> = neighbors
                    .iter()
                    .copied()
                    .filter(|&n| !excluded(n) && haversine_m(n, target) == best_score)
                    .collect();
                if !tied.is_empty() {
                    best_next = Some(tied[self.rng.pick_index(tied.len())]);
                }
            }

            // Every neighbor filtered out: take any step rather than stall
            // in a cul-de-sac.
            if best_next.is_none() {
                let unfiltered: Vec<GeoPoint> = neighbors
                    .iter()
                    .copied()
                    .filter(|&n| !excluded(n))
                    .collect();
                best_next = if unfiltered.is_empty() {
                    Some(neighbors[self.rng.pick_index(neighbors.len())])
                } else {
                    Some(unfiltered[self.rng.pick_index(unfiltered.len())])
                };
            }

            let Some(next) = best_next else {
                self.ghosts[idx].movement.moving = false;
                continue;
            };
            let total = haversine_m(current, next);
            self.ghosts[idx].movement = movement::start_segment(current, next, total);
            if !self.ghosts[idx].movement.moving {
                if let Some(scatter) = self.ghosts[idx].scatter_target {
                    if self.ghosts[idx].scattering && haversine_m(current, scatter) < SCATTER_ARRIVAL_M
                    {
                        self.ghosts[idx].scattering = false;
                        self.ghosts[idx].scatter_target = None;
                    }
                }
            }
        }
    }
}
