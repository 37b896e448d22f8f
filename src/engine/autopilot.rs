use super::*;

impl GameEngine {
    /// Autopilot step: validate the current plan against ghost positions,
    /// re-plan when empty, then consume the next node as a movement intent.
    /// Safety overrides plan continuity; an endangered plan is discarded
    /// whole rather than patched.
    pub(super) fn manage_autopilot(&mut self, now_ms: u64) {
        if !self.pacman.autopilot.enabled || self.pacman.movement.moving || self.ended {
            return;
        }

        if self.pacman.autopilot.clever && !self.pacman.autopilot.path.is_empty() {
            if let Some(&next_step) = self.pacman.autopilot.path.front() {
                let danger_nodes = self.active_ghost_nodes(now_ms);
                let endangered = danger_nodes
                    .iter()
                    .any(|ghost| haversine_m(next_step, *ghost) < DANGER_RADIUS_M);
                if endangered {
                    self.events.push(RuntimeEvent::ReplanForced {
                        level: AdvisoryLevel::Warn,
                        message: "route endangered by a ghost, replanning".to_string(),
                    });
                    self.pacman.autopilot.path.clear();
                    self.pacman.autopilot.target = None;
                }
            }
        }

        if self.pacman.autopilot.path.is_empty() {
            self.plan_next_target(now_ms);
        }

        if let Some(next) = self.pacman.autopilot.path.pop_front() {
            let position = movement::position_of(&self.pacman.movement);
            let Some(current) = self.world.graph.nearest_node(position) else {
                return;
            };
            let total = haversine_m(current, next);
            let segment = movement::start_segment(current, next, total);
            if segment.moving {
                self.pacman.facing = movement::facing_for_step(current, next, self.pacman.facing);
                self.pacman.movement = segment;
            }
            // A sub-threshold step is consumed without producing movement.
        }
    }

    /// Picks the nearest remaining collectible and asks the pathfinder for a
    /// route. Failures degrade a feature instead of retrying the same query:
    /// a clever-mode miss drops avoidance, a plain miss disables autopilot,
    /// and an empty collectible set is the completion signal.
    fn plan_next_target(&mut self, now_ms: u64) {
        if self.world.collectibles.is_empty() {
            self.pacman.autopilot.enabled = false;
            self.pacman.autopilot.clever = false;
            self.pacman.autopilot.path.clear();
            self.pacman.autopilot.target = None;
            self.events.push(RuntimeEvent::AutopilotDisabled {
                reason: AutopilotStopReason::NoCollectibles,
                level: AdvisoryLevel::Success,
                message: "no collectibles remain, autopilot off".to_string(),
            });
            return;
        }

        let position = movement::position_of(&self.pacman.movement);
        let Some(pacman_node) = self.world.graph.nearest_node(position) else {
            return;
        };

        let mut nearest: Option<GeoPoint> = None;
        let mut nearest_distance = f64::INFINITY;
        for item in &self.world.collectibles {
            let distance = haversine_m(position, item.position);
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest = Some(item.position);
            }
        }
        let Some(item_position) = nearest else {
            return;
        };
        let Some(target_node) = self.world.graph.nearest_node(item_position) else {
            return;
        };

        let clever = self.pacman.autopilot.clever;
        let danger_nodes = if clever {
            self.active_ghost_nodes(now_ms)
        } else {
            Vec::new()
        };
        let mut path = a_star_search(
            pacman_node,
            target_node,
            &self.world.graph,
            &danger_nodes,
            clever,
        );

        if path.is_empty() {
            self.pacman.autopilot.path.clear();
            self.pacman.autopilot.target = None;
            if clever {
                self.pacman.autopilot.clever = false;
                self.events.push(RuntimeEvent::AvoidanceDisabled {
                    level: AdvisoryLevel::Warn,
                    message: "no safe path to the nearest collectible, avoidance off".to_string(),
                });
            } else {
                self.pacman.autopilot.enabled = false;
                self.events.push(RuntimeEvent::AutopilotDisabled {
                    reason: AutopilotStopReason::NoReachableTarget,
                    level: AdvisoryLevel::Warn,
                    message: "no path to the nearest collectible, autopilot off".to_string(),
                });
            }
            return;
        }

        path.remove(0);
        let steps = path.len();
        self.pacman.autopilot.target = Some(target_node);
        self.pacman.autopilot.path = path.into_iter().collect();
        if steps > 0 {
            self.events.push(RuntimeEvent::AutopilotPlanned {
                steps,
                level: AdvisoryLevel::Info,
                message: format!(
                    "autopilot heading {} steps to ({:.4},{:.4})",
                    steps, target_node.lat, target_node.lng
                ),
            });
        }
    }

    /// Graph nodes currently occupied by threatening ghosts. Scared and
    /// eaten ghosts are harmless and never count as danger.
    pub(super) fn active_ghost_nodes(&self, now_ms: u64) -> Vec<GeoPoint> {
        self.ghosts
            .iter()
            .filter(|ghost| !ghost.scared && !ghost.is_eaten(now_ms))
            .filter_map(|ghost| {
                self.world
                    .graph
                    .nearest_node(movement::position_of(&ghost.movement))
            })
            .collect()
    }
}
