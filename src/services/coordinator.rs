//! Top-level guidance state machine
//!
//! Selects between guided-tour and back-on-track modes, forwards position
//! updates to the navigation engine, detects POI arrival, and emits
//! guidance events for the presentation layer. At most one mode is active
//! at a time; starting a mode always stops the previous one first.
//!
//! Position updates are consumed from a single channel in arrival order,
//! so a reroute triggered by one update always completes before the next
//! update is processed.

use crate::domain::geo::{distance_meters, Coordinate};
use crate::domain::poi::{PoiId, TourSequence};
use crate::domain::route::RouteSource;
use crate::io::events::{GuidanceEvent, GuidanceSender};
use crate::io::position::PositionUpdate;
use crate::services::navigation::{NavUpdate, NavigationEngine};
use crate::services::progress::{ProximityUpdate, TourProgressTracker};
use crate::services::route_provider::RouteProvider;
use crate::services::route_resolver::{ResolveOptions, ResolvedRoute, StoredRouteResolver};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Guidance tuning. The POI-reached radii are empirically tuned defaults,
/// kept adjustable rather than hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct GuidanceConfig {
    /// Direct-proximity auto-confirm radius when the POI itself does not
    /// override it
    pub poi_reached_radius_m: f64,
    /// Proximity to the calculated route's endpoint that suggests arrival
    pub route_end_radius_m: f64,
    /// Last-resort arrival radius (requires confirmation)
    pub extended_reach_radius_m: f64,
    /// Maximum POI distance for the route-endpoint arrival signal
    pub reach_safety_bound_m: f64,
    /// Distance to the main route at which back-on-track mode hands back
    pub return_threshold_m: f64,
    pub prefer_stored: bool,
    pub fallback_to_live: bool,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            poi_reached_radius_m: 30.0,
            route_end_radius_m: 20.0,
            extended_reach_radius_m: 120.0,
            reach_safety_bound_m: 200.0,
            return_threshold_m: 30.0,
            prefer_stored: true,
            fallback_to_live: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceMode {
    Idle,
    GuidedTour,
    BackOnTrack,
}

impl GuidanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceMode::Idle => "idle",
            GuidanceMode::GuidedTour => "guided_tour",
            GuidanceMode::BackOnTrack => "back_on_track",
        }
    }
}

/// What to start guidance for
#[derive(Debug, Clone)]
pub enum GuidanceRequest {
    /// Sequential traversal of the POI sequence (full or partial)
    GuidedTour { sequence: TourSequence },
    /// Recovery from `position` back to the active tour's main route
    BackOnTrack { position: Coordinate },
}

#[derive(Debug, thiserror::Error)]
pub enum GuidanceError {
    #[error("no route available: {reason}")]
    NoRouteAvailable { reason: String },
}

/// Guided-tour bookkeeping: the main route plus POI traversal position
struct TourState {
    sequence: TourSequence,
    main_route: ResolvedRoute,
    tour_step: usize,
}

pub struct GuidanceCoordinator {
    resolver: StoredRouteResolver,
    provider: Arc<RouteProvider>,
    nav: NavigationEngine,
    progress: TourProgressTracker,
    events: GuidanceSender,
    config: GuidanceConfig,
    mode: GuidanceMode,
    tour: Option<TourState>,
    /// In-flight POI-reached handling: while set, arrival signals are
    /// ignored so rapid successive updates cannot double-advance
    pending_reach: Option<PoiId>,
}

impl GuidanceCoordinator {
    pub fn new(
        resolver: StoredRouteResolver,
        provider: Arc<RouteProvider>,
        nav: NavigationEngine,
        progress: TourProgressTracker,
        events: GuidanceSender,
        config: GuidanceConfig,
    ) -> Self {
        Self {
            resolver,
            provider,
            nav,
            progress,
            events,
            config,
            mode: GuidanceMode::Idle,
            tour: None,
            pending_reach: None,
        }
    }

    pub fn mode(&self) -> GuidanceMode {
        self.mode
    }

    pub fn tour_step(&self) -> Option<usize> {
        self.tour.as_ref().map(|t| t.tour_step)
    }

    pub fn progress(&self) -> &TourProgressTracker {
        &self.progress
    }

    /// Start guidance, stopping any active mode first. A guided-tour start
    /// tears the previous tour down; a back-on-track start keeps the parked
    /// tour, since that is the route it recovers to.
    pub async fn start(&mut self, request: GuidanceRequest) -> Result<(), GuidanceError> {
        match request {
            GuidanceRequest::GuidedTour { sequence } => {
                self.stop();
                self.start_guided_tour(sequence).await
            }
            GuidanceRequest::BackOnTrack { position } => {
                self.suspend_active_mode();
                self.start_back_on_track(position).await
            }
        }
    }

    /// Stop guidance and clear all navigation state. Pending announcement
    /// or reroute work dies with the cleared state; nothing fires after
    /// this returns.
    pub fn stop(&mut self) {
        if self.mode != GuidanceMode::Idle {
            info!(mode = %self.mode.as_str(), "guidance_stopped");
            self.events.send(GuidanceEvent::TourStopped);
        }
        self.suspend_active_mode();
        self.tour = None;
    }

    /// Halt the active mode's navigation without discarding the tour
    fn suspend_active_mode(&mut self) {
        self.nav.stop();
        self.mode = GuidanceMode::Idle;
        self.pending_reach = None;
    }

    async fn start_guided_tour(&mut self, sequence: TourSequence) -> Result<(), GuidanceError> {
        if sequence.is_empty() {
            let reason = "tour sequence is empty".to_string();
            self.events.send(GuidanceEvent::GuidanceFailed { reason: reason.clone() });
            return Err(GuidanceError::NoRouteAvailable { reason });
        }

        let options = ResolveOptions {
            prefer_stored: self.config.prefer_stored,
            fallback_to_live: self.config.fallback_to_live,
        };
        let resolved = match self.resolver.get_tour_route(&sequence, options).await {
            Ok(r) => r,
            Err(e) => {
                let reason = e.to_string();
                warn!(reason = %reason, "guided_tour_start_failed");
                self.events.send(GuidanceEvent::GuidanceFailed { reason: reason.clone() });
                return Err(GuidanceError::NoRouteAvailable { reason });
            }
        };

        info!(
            pois = sequence.len(),
            source = %resolved.route.source.as_str(),
            distance_m = resolved.route.total_distance_m as u64,
            "guided_tour_started"
        );
        self.events.send(GuidanceEvent::TourStarted {
            source: resolved.route.source,
            poi_count: sequence.len(),
        });

        self.nav.start(resolved.route.clone());
        self.tour = Some(TourState {
            sequence,
            main_route: resolved,
            tour_step: 0,
        });
        self.mode = GuidanceMode::GuidedTour;
        Ok(())
    }

    /// Compute a recovery route from `position` to the nearest point on
    /// the main route and navigate it. The main route stays parked.
    async fn start_back_on_track(&mut self, position: Coordinate) -> Result<(), GuidanceError> {
        let Some(tour) = self.tour.as_ref() else {
            let reason = "no active tour route to recover to".to_string();
            self.events.send(GuidanceEvent::GuidanceFailed { reason: reason.clone() });
            return Err(GuidanceError::NoRouteAvailable { reason });
        };

        let check = self.resolver.is_on_route(&tour.main_route, position, f64::MAX);
        let rejoin = tour.main_route.flattened.get(check.closest_index).copied();
        let Some(rejoin) = rejoin else {
            let reason = "main route has no geometry".to_string();
            self.events.send(GuidanceEvent::GuidanceFailed { reason: reason.clone() });
            return Err(GuidanceError::NoRouteAvailable { reason });
        };

        self.events.send(GuidanceEvent::Recalculating);
        let recovery = self.provider.calculate_route(position, rejoin).await;
        let fallback_reason = match recovery.source {
            RouteSource::Fallback { reason } => Some(reason),
            _ => None,
        };

        info!(source = %recovery.source.as_str(), "back_on_track_started");
        self.events.send(GuidanceEvent::RerouteCompleted {
            source: recovery.source,
            fallback_reason,
        });

        self.nav.start(recovery);
        self.mode = GuidanceMode::BackOnTrack;
        self.pending_reach = None;
        Ok(())
    }

    /// Process one position fix
    pub async fn update_position(&mut self, position: Coordinate) {
        // Proximity discovery runs in every mode, independent of routing
        for update in self.progress.check_proximity(position) {
            match update {
                ProximityUpdate::Approaching { poi, distance_m } => {
                    self.events.send(GuidanceEvent::PoiApproaching { poi, distance_m });
                }
                ProximityUpdate::Discovered { poi, .. } => {
                    self.events.send(GuidanceEvent::PoiDiscovered { poi, at: position });
                }
            }
        }

        match self.mode {
            GuidanceMode::Idle => {}
            GuidanceMode::GuidedTour => self.update_guided_tour(position).await,
            GuidanceMode::BackOnTrack => self.update_back_on_track(position).await,
        }
    }

    async fn update_guided_tour(&mut self, position: Coordinate) {
        let mut deviated = None;
        for update in self.nav.update_position(position) {
            match update {
                NavUpdate::Deviated { deviation_m } => deviated = Some(deviation_m),
                NavUpdate::InstructionAnnounced { instruction } => {
                    self.events.send(GuidanceEvent::InstructionUpdated {
                        text: instruction.text,
                        distance_m: instruction.distance_m,
                    });
                }
                NavUpdate::SegmentAdvanced { segment_index } => {
                    debug!(segment = segment_index, "tour_segment_advanced");
                }
                // Route completion does not end the tour by itself; POI
                // arrival handling owns tour-step advancement
                NavUpdate::Completed => debug!("tour_route_navigation_complete"),
            }
        }

        // Arrival detection wins over deviation: approaching a POI from
        // off the route must ask for confirmation, not trigger a reroute
        self.detect_poi_reached(position);
        if self.mode != GuidanceMode::GuidedTour || self.pending_reach.is_some() {
            return;
        }

        if let Some(deviation_m) = deviated {
            info!(deviation_m = deviation_m as u64, "tour_deviation_detected");
            self.events.send(GuidanceEvent::DeviationDetected { deviation_m });
            // Auto-transition to recovery; the main route stays parked
            if self.start_back_on_track(position).await.is_err() {
                warn!("back_on_track_transition_failed");
            }
        }
    }

    async fn update_back_on_track(&mut self, position: Coordinate) {
        let Some(tour) = self.tour.as_ref() else {
            // Recovery without a tour cannot happen via public API
            self.stop();
            return;
        };

        // Returned to the main route: resume the parked tour without any
        // route recomputation
        let check = self.resolver.is_on_route(&tour.main_route, position, self.config.return_threshold_m);
        if check.on_route {
            info!(distance_m = check.distance_m as u64, "returned_to_main_route");
            self.events.send(GuidanceEvent::ReturnedToMainRoute);
            let main = tour.main_route.route.clone();
            self.nav.start(main);
            self.mode = GuidanceMode::GuidedTour;
            return;
        }

        let mut deviated = None;
        for update in self.nav.update_position(position) {
            match update {
                NavUpdate::Deviated { deviation_m } => deviated = Some(deviation_m),
                NavUpdate::InstructionAnnounced { instruction } => {
                    self.events.send(GuidanceEvent::InstructionUpdated {
                        text: instruction.text,
                        distance_m: instruction.distance_m,
                    });
                }
                NavUpdate::SegmentAdvanced { .. } => {}
                // Recovery route walked to its end but still outside the
                // return threshold; keep waiting for the on-route signal
                NavUpdate::Completed => debug!("recovery_route_complete"),
            }
        }

        // Strayed from the recovery route itself: recompute it in place
        if deviated.is_some() {
            self.events.send(GuidanceEvent::Recalculating);
            if let Some(source) = self.nav.reroute_from(position).await {
                let fallback_reason = match source {
                    RouteSource::Fallback { reason } => Some(reason),
                    _ => None,
                };
                self.events.send(GuidanceEvent::RerouteCompleted { source, fallback_reason });
            }
        }
    }

    /// Three-signal POI arrival detection:
    /// 1. direct proximity to the POI - auto-confirms
    /// 2. route-endpoint proximity within a POI safety bound - asks the user
    /// 3. extended proximity - asks the user
    fn detect_poi_reached(&mut self, position: Coordinate) {
        // In-flight guard: one reached-handling cycle at a time
        if self.pending_reach.is_some() {
            return;
        }
        let Some(tour) = self.tour.as_ref() else {
            return;
        };
        let Some(target) = tour.sequence.get(tour.tour_step) else {
            return;
        };

        let poi_distance = distance_meters(position, target.coordinate);
        // Per-POI radius can widen the configured default, never shrink it
        let direct_radius = target.proximity_radius_m.max(self.config.poi_reached_radius_m);

        if poi_distance <= direct_radius {
            let poi_id = target.id.clone();
            self.advance_tour_step(poi_id);
            return;
        }

        let near_route_end = self
            .current_leg_end()
            .map(|end| distance_meters(position, end) <= self.config.route_end_radius_m)
            .unwrap_or(false);

        let needs_confirmation = (near_route_end
            && poi_distance <= self.config.reach_safety_bound_m)
            || poi_distance <= self.config.extended_reach_radius_m;

        if needs_confirmation {
            debug!(poi = %target.id, distance_m = poi_distance as u64, "poi_reach_needs_confirmation");
            self.pending_reach = Some(target.id.clone());
            self.events.send(GuidanceEvent::PoiConfirmationRequested {
                poi: target.id.clone(),
                distance_m: poi_distance,
            });
        }
    }

    /// End of the navigation leg currently being walked, falling back to
    /// the main route's destination once navigation has finished
    fn current_leg_end(&self) -> Option<Coordinate> {
        if let (Some(route), Some(idx)) = (self.nav.route(), self.nav.segment_index()) {
            if let Some(seg) = route.segments.get(idx) {
                return Some(seg.end);
            }
        }
        self.tour.as_ref().and_then(|t| t.main_route.route.destination())
    }

    /// UI callback confirming the pending POI arrival
    pub fn confirm_poi_reached(&mut self) {
        if let Some(poi_id) = self.pending_reach.take() {
            self.advance_tour_step(poi_id);
        }
    }

    /// UI callback dismissing the pending arrival (user says "not there")
    pub fn dismiss_poi_reached(&mut self) {
        if let Some(poi_id) = self.pending_reach.take() {
            debug!(poi = %poi_id, "poi_reach_dismissed");
        }
    }

    fn advance_tour_step(&mut self, poi_id: PoiId) {
        let Some(tour) = self.tour.as_mut() else {
            return;
        };
        let reached_step = tour.tour_step;

        self.progress.mark_visited(&poi_id);
        info!(poi = %poi_id, tour_step = reached_step, "poi_reached");
        self.events.send(GuidanceEvent::PoiReached { poi: poi_id, tour_step: reached_step });

        tour.tour_step = (tour.tour_step + 1) % tour.sequence.len();
        self.pending_reach = None;

        // Wrap to zero after at least one advance: full tour complete
        if tour.tour_step == 0 {
            info!("tour_completed");
            self.events.send(GuidanceEvent::TourCompleted);
            self.stop();
        }
    }

    /// Consume position updates until the channel closes or shutdown is
    /// signaled. Single consumer: updates are strictly serialized, and any
    /// reroute completes before the next update is handled.
    pub async fn run(
        &mut self,
        mut position_rx: mpsc::Receiver<PositionUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                update = position_rx.recv() => {
                    match update {
                        Some(u) => self.update_position(u.coordinate).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    info!("guidance_shutdown");
                    break;
                }
            }
        }
        self.stop();
    }
}
