//! Turn-by-turn navigation state machine
//!
//! Tracks the current segment and instruction for an active route,
//! announces each instruction exactly once when the user comes within the
//! announce distance, and reports deviation. Rerouting policy lives in the
//! coordinator; this engine only detects and reports.

use crate::domain::geo::{distance_meters, Coordinate};
use crate::domain::route::{Instruction, Route, RouteSource};
use crate::services::route_provider::RouteProvider;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Navigation engine tuning
#[derive(Debug, Clone, Copy)]
pub struct NavigationConfig {
    /// Distance at which the next instruction is announced
    pub instruction_announce_m: f64,
    /// Deviation beyond this distance from the route signals reroute
    pub reroute_threshold_m: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self { instruction_announce_m: 100.0, reroute_threshold_m: 50.0 }
    }
}

/// What happened during a position update, in occurrence order
#[derive(Debug, Clone)]
pub enum NavUpdate {
    /// User strayed beyond the reroute threshold
    Deviated { deviation_m: f64 },
    /// An instruction came within announce distance (emitted once each)
    InstructionAnnounced { instruction: Instruction },
    /// Moved on to the next segment
    SegmentAdvanced { segment_index: usize },
    /// Last segment finished; engine has stopped itself
    Completed,
}

struct ActiveNavigation {
    route: Route,
    segment_index: usize,
    instruction_index: usize,
    /// (segment, instruction) pairs already announced
    announced: HashSet<(usize, usize)>,
}

pub struct NavigationEngine {
    provider: Arc<RouteProvider>,
    config: NavigationConfig,
    active: Option<ActiveNavigation>,
}

impl NavigationEngine {
    pub fn new(provider: Arc<RouteProvider>, config: NavigationConfig) -> Self {
        Self { provider, config, active: None }
    }

    /// Begin navigating a route from its first segment
    pub fn start(&mut self, route: Route) {
        info!(
            segments = route.segments.len(),
            distance_m = route.total_distance_m as u64,
            source = %route.source.as_str(),
            "navigation_started"
        );
        self.active = Some(ActiveNavigation {
            route,
            segment_index: 0,
            instruction_index: 0,
            announced: HashSet::new(),
        });
    }

    /// Clear all navigation state. Idempotent.
    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            info!("navigation_stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn route(&self) -> Option<&Route> {
        self.active.as_ref().map(|a| &a.route)
    }

    pub fn segment_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.segment_index)
    }

    /// Process one position fix, returning everything that happened
    pub fn update_position(&mut self, position: Coordinate) -> Vec<NavUpdate> {
        let mut updates = Vec::new();
        let Some(nav) = self.active.as_mut() else {
            return updates;
        };

        // Deviation is reported, not acted on - the coordinator decides
        let check =
            self.provider.check_reroute_needed(position, &nav.route, self.config.reroute_threshold_m);
        if check.needed {
            debug!(deviation_m = check.deviation_m as u64, "navigation_deviation");
            updates.push(NavUpdate::Deviated { deviation_m: check.deviation_m });
        }

        // Advance through instructions and segments by proximity
        let mut completed = false;
        loop {
            let Some(segment) = nav.route.segments.get(nav.segment_index) else {
                completed = true;
                break;
            };

            let Some(instruction) = segment.instructions.get(nav.instruction_index) else {
                // Instructions exhausted; move on once the segment's end is
                // actually reached (fallback segments may carry few or no
                // instructions)
                if distance_meters(position, segment.end) > self.config.instruction_announce_m {
                    break;
                }
                nav.segment_index += 1;
                nav.instruction_index = 0;
                if nav.segment_index < nav.route.segments.len() {
                    debug!(segment = nav.segment_index, "navigation_segment_advanced");
                    updates.push(NavUpdate::SegmentAdvanced { segment_index: nav.segment_index });
                    continue;
                }
                completed = true;
                break;
            };

            let dist = distance_meters(position, instruction.location);
            if dist > self.config.instruction_announce_m {
                break;
            }

            let key = (nav.segment_index, nav.instruction_index);
            if nav.announced.insert(key) {
                debug!(
                    segment = nav.segment_index,
                    instruction = nav.instruction_index,
                    text = %instruction.text,
                    "instruction_announced"
                );
                updates.push(NavUpdate::InstructionAnnounced { instruction: instruction.clone() });
            }
            nav.instruction_index += 1;
        }

        if completed {
            updates.push(NavUpdate::Completed);
            info!("navigation_completed");
            self.active = None;
        }

        updates
    }

    /// Recompute the route from `position` to the current route's final
    /// destination and restart navigation on it. Returns the new route's
    /// source (with fallback reason, if any) for event reporting.
    pub async fn reroute_from(&mut self, position: Coordinate) -> Option<RouteSource> {
        let destination = self.active.as_ref().and_then(|a| a.route.destination())?;
        let route = self.provider.calculate_route(position, destination).await;
        let source = route.source;
        info!(source = %source.as_str(), "navigation_rerouted");
        self.start(route);
        Some(source)
    }
}
