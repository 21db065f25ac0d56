//! Route computation with caching, rate limiting, and fallback synthesis
//!
//! The provider absorbs every routing API failure: callers always get a
//! usable `Route`. When the API is unreachable the provider synthesizes a
//! deterministic straight-line route with interpolated waypoints and
//! compass-annotated instructions, marked `RouteSource::Fallback` with the
//! failure reason attached.

use crate::domain::geo::{
    destination_point, distance_meters, initial_bearing, CompassDirection, Coordinate,
};
use crate::domain::poi::TourSequence;
use crate::domain::route::{
    nearest_point_on, Instruction, InstructionKind, Route, RouteSegment, RouteSource,
};
use crate::io::routing_api::{ApiRoute, RoutingApi};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Walking speed used for synthesized duration estimates
const WALKING_SPEED_MPS: f64 = 1.4;

/// Target spacing between synthesized fallback waypoints
const FALLBACK_WAYPOINT_SPACING_M: f64 = 200.0;

const FALLBACK_MIN_WAYPOINTS: usize = 2;
const FALLBACK_MAX_WAYPOINTS: usize = 8;

/// Provider tuning
#[derive(Debug, Clone)]
pub struct RouteProviderConfig {
    /// Maximum cached (start, end) route entries
    pub cache_capacity: usize,
    /// Minimum spacing between outbound routing requests
    pub min_request_interval: Duration,
}

impl Default for RouteProviderConfig {
    fn default() -> Self {
        Self { cache_capacity: 100, min_request_interval: Duration::from_millis(1000) }
    }
}

/// Bounded segment cache with FIFO eviction, keyed by rounded endpoints
struct SegmentCache {
    entries: HashMap<String, RouteSegment>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SegmentCache {
    fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new(), capacity }
    }

    fn key(start: Coordinate, end: Coordinate) -> String {
        let (slat, slon) = start.rounded();
        let (elat, elon) = end.rounded();
        format!("{slat:.5},{slon:.5}|{elat:.5},{elon:.5}")
    }

    fn get(&self, key: &str) -> Option<RouteSegment> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, segment: RouteSegment) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, segment);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, segment);
    }
}

/// Enforces minimum spacing between outbound requests, process-wide.
/// Waiters are delayed, never dropped; the tokio mutex serializes them.
struct RateGate {
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_request: tokio::sync::Mutex::new(None) }
    }

    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Result of a deviation check against a route
#[derive(Debug, Clone, Copy)]
pub struct RerouteCheck {
    pub needed: bool,
    pub deviation_m: f64,
    pub closest_index: usize,
}

pub struct RouteProvider {
    api: Arc<dyn RoutingApi>,
    cache: Mutex<SegmentCache>,
    gate: RateGate,
}

impl RouteProvider {
    pub fn new(api: Arc<dyn RoutingApi>, config: RouteProviderConfig) -> Self {
        Self {
            api,
            cache: Mutex::new(SegmentCache::new(config.cache_capacity)),
            gate: RateGate::new(config.min_request_interval),
        }
    }

    /// Compute a single-leg walking route. Never fails: API errors produce
    /// a synthesized fallback segment with the reason attached.
    pub async fn calculate_route(&self, start: Coordinate, end: Coordinate) -> Route {
        let (segment, source) = self.segment_between(start, end).await;
        Route::from_segments(vec![segment], source)
    }

    /// Concatenate pairwise legs through the ordered POI sequence. If any
    /// leg fell back, the whole route is marked fallback so downstream
    /// layers never mistake partially synthetic data for authoritative.
    pub async fn calculate_tour_route(&self, sequence: &TourSequence) -> Route {
        let pois = sequence.pois();
        let mut segments = Vec::with_capacity(pois.len().saturating_sub(1));
        let mut source = RouteSource::Live;

        for pair in pois.windows(2) {
            let (seg, seg_source) = self.segment_between(pair[0].coordinate, pair[1].coordinate).await;
            if let RouteSource::Fallback { .. } = seg_source {
                source = seg_source;
            }
            segments.push(seg);
        }

        let route = Route::from_segments(segments, source);
        info!(
            segments = route.segments.len(),
            distance_m = route.total_distance_m as u64,
            source = %route.source.as_str(),
            "tour_route_calculated"
        );
        route
    }

    /// Nearest-route-point deviation check
    pub fn check_reroute_needed(
        &self,
        position: Coordinate,
        route: &Route,
        threshold_m: f64,
    ) -> RerouteCheck {
        let flat = route.flatten_geometry();
        match nearest_point_on(&flat, position) {
            Some(hit) => RerouteCheck {
                needed: hit.distance_m > threshold_m,
                deviation_m: hit.distance_m,
                closest_index: hit.index,
            },
            None => RerouteCheck { needed: false, deviation_m: 0.0, closest_index: 0 },
        }
    }

    async fn segment_between(
        &self,
        start: Coordinate,
        end: Coordinate,
    ) -> (RouteSegment, RouteSource) {
        let key = SegmentCache::key(start, end);
        if let Some(segment) = self.cache.lock().get(&key) {
            debug!(key = %key, "route_cache_hit");
            return (segment, RouteSource::Live);
        }

        self.gate.acquire().await;

        match self.api.fetch_route(start, end).await {
            Ok(api_route) => {
                let segment = segment_from_api(start, end, api_route);
                self.cache.lock().insert(key, segment.clone());
                (segment, RouteSource::Live)
            }
            Err(e) => {
                let reason = e.failure_kind();
                warn!(error = %e, reason = %reason.as_str(), "routing_failed_using_fallback");
                // Fallback segments are not cached: the next attempt should
                // try the live API again.
                (synthesize_segment(start, end), RouteSource::Fallback { reason })
            }
        }
    }
}

fn segment_from_api(start: Coordinate, end: Coordinate, api: ApiRoute) -> RouteSegment {
    RouteSegment {
        start,
        end,
        geometry: api.geometry,
        instructions: api.instructions,
        distance_m: api.distance_m,
        duration_s: api.duration_s,
    }
}

/// Deterministic lateral jitter in [-1, 1] from the endpoint bits and the
/// waypoint index. No RNG state, so fallback routes are reproducible.
fn jitter_factor(start: Coordinate, end: Coordinate, index: usize) -> f64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for bits in [
        start.lat.to_bits(),
        start.lon.to_bits(),
        end.lat.to_bits(),
        end.lon.to_bits(),
        index as u64,
    ] {
        h ^= bits;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (h >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
}

/// Straight-line route synthesis: interpolated waypoints with small lateral
/// jitter for path plausibility, walking-speed duration, and three compass
/// annotated instructions.
fn synthesize_segment(start: Coordinate, end: Coordinate) -> RouteSegment {
    let direct_m = distance_meters(start, end);
    let bearing = initial_bearing(start, end);
    let direction = CompassDirection::from_bearing(bearing);

    let waypoints = ((direct_m / FALLBACK_WAYPOINT_SPACING_M).ceil() as usize)
        .clamp(FALLBACK_MIN_WAYPOINTS, FALLBACK_MAX_WAYPOINTS);

    let mut geometry = Vec::with_capacity(waypoints + 2);
    geometry.push(start);
    for i in 1..=waypoints {
        let frac = i as f64 / (waypoints + 1) as f64;
        let along = destination_point(start, bearing, direct_m * frac);
        // Up to ~15m sideways, shrinking to zero at the endpoints
        let lateral = jitter_factor(start, end, i) * 15.0 * (frac * (1.0 - frac) * 4.0);
        let point = destination_point(along, (bearing + 90.0) % 360.0, lateral);
        geometry.push(point);
    }
    geometry.push(end);

    let duration_s = direct_m / WALKING_SPEED_MPS;
    let midpoint = geometry[geometry.len() / 2];

    let instructions = vec![
        Instruction {
            kind: InstructionKind::Depart,
            text: format!("Head {direction} for about {} m", direct_m.round() as u64),
            distance_m: direct_m,
            location: start,
        },
        Instruction {
            kind: InstructionKind::Continue,
            text: format!("Continue {direction}"),
            distance_m: direct_m / 2.0,
            location: midpoint,
        },
        Instruction {
            kind: InstructionKind::Arrive,
            text: "You have arrived".to_string(),
            distance_m: 0.0,
            location: end,
        },
    ];

    RouteSegment { start, end, geometry, instructions, distance_m: direct_m, duration_s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::routing_api::RoutingError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock API: counts calls, optionally fails every request
    struct MockApi {
        calls: AtomicUsize,
        fail_with: Option<fn() -> RoutingError>,
    }

    impl MockApi {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), fail_with: None }
        }

        fn failing(f: fn() -> RoutingError) -> Self {
            Self { calls: AtomicUsize::new(0), fail_with: Some(f) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoutingApi for MockApi {
        async fn fetch_route(
            &self,
            start: Coordinate,
            end: Coordinate,
        ) -> Result<ApiRoute, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(f) = self.fail_with {
                return Err(f());
            }
            let d = distance_meters(start, end);
            Ok(ApiRoute {
                geometry: vec![start, end],
                instructions: vec![],
                distance_m: d,
                duration_s: d / 1.4,
            })
        }
    }

    fn provider(api: Arc<MockApi>) -> RouteProvider {
        // Zero interval keeps tests fast; the gate itself is tested below
        let config = RouteProviderConfig {
            cache_capacity: 3,
            min_request_interval: Duration::from_millis(0),
        };
        RouteProvider::new(api, config)
    }

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[tokio::test]
    async fn test_cache_idempotence_single_outbound_call() {
        let api = Arc::new(MockApi::ok());
        let p = provider(api.clone());

        let r1 = p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        let r2 = p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;

        assert_eq!(api.call_count(), 1);
        assert_eq!(r1.total_distance_m, r2.total_distance_m);
        assert_eq!(r1.segments[0].geometry, r2.segments[0].geometry);
        assert_eq!(r1.source, RouteSource::Live);
    }

    #[tokio::test]
    async fn test_cache_fifo_eviction() {
        let api = Arc::new(MockApi::ok());
        let p = provider(api.clone());

        // Fill capacity (3), then insert a fourth to evict the oldest
        p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        p.calculate_route(c(48.1, 2.0), c(48.11, 2.0)).await;
        p.calculate_route(c(48.2, 2.0), c(48.21, 2.0)).await;
        p.calculate_route(c(48.3, 2.0), c(48.31, 2.0)).await;
        assert_eq!(api.call_count(), 4);

        // Oldest evicted: refetch
        p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        assert_eq!(api.call_count(), 5);

        // Newest still cached
        p.calculate_route(c(48.3, 2.0), c(48.31, 2.0)).await;
        assert_eq!(api.call_count(), 5);
    }

    #[tokio::test]
    async fn test_fallback_availability() {
        let api = Arc::new(MockApi::failing(|| RoutingError::Network("down".into())));
        let p = provider(api);

        let start = c(48.0, 2.0);
        let end = c(48.01, 2.0); // ~1.1 km
        let route = p.calculate_route(start, end).await;

        assert_eq!(
            route.source,
            RouteSource::Fallback { reason: crate::domain::route::FailureKind::Network }
        );
        assert!(route.validate().is_ok());

        let direct = distance_meters(start, end);
        assert!((route.total_distance_m - direct).abs() / direct < 0.2);
        assert_eq!(route.segments[0].instructions.len(), 3);
        assert!((route.total_duration_s - direct / 1.4).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic() {
        let api = Arc::new(MockApi::failing(|| RoutingError::Timeout));
        let p = provider(api);

        let r1 = p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        let r2 = p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        assert_eq!(r1.segments[0].geometry, r2.segments[0].geometry);
    }

    #[tokio::test]
    async fn test_fallback_waypoint_bounds() {
        let api = Arc::new(MockApi::failing(|| RoutingError::Timeout));
        let p = provider(api);

        // Very short leg: minimum 2 intermediate waypoints (4 points total)
        let short = p.calculate_route(c(48.0, 2.0), c(48.0001, 2.0)).await;
        assert_eq!(short.segments[0].geometry.len(), FALLBACK_MIN_WAYPOINTS + 2);

        // Very long leg: capped at 8 intermediates
        let long = p.calculate_route(c(48.0, 2.0), c(48.1, 2.0)).await;
        assert_eq!(long.segments[0].geometry.len(), FALLBACK_MAX_WAYPOINTS + 2);
    }

    #[tokio::test]
    async fn test_fallback_not_cached() {
        let api = Arc::new(MockApi::failing(|| RoutingError::Timeout));
        let p = provider(api.clone());

        p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn test_tour_route_marks_fallback_when_any_leg_synthetic() {
        use crate::domain::poi::{Poi, TourSequence};

        let api = Arc::new(MockApi::failing(|| RoutingError::Timeout));
        let p = provider(api);

        let pois = vec![
            Poi {
                id: "a".into(),
                name: "A".into(),
                coordinate: c(48.0, 2.0),
                order: 0,
                proximity_radius_m: 30.0,
                description: String::new(),
            },
            Poi {
                id: "b".into(),
                name: "B".into(),
                coordinate: c(48.01, 2.0),
                order: 1,
                proximity_radius_m: 30.0,
                description: String::new(),
            },
            Poi {
                id: "c".into(),
                name: "C".into(),
                coordinate: c(48.02, 2.0),
                order: 2,
                proximity_radius_m: 30.0,
                description: String::new(),
            },
        ];
        let route = p.calculate_tour_route(&TourSequence::new(pois)).await;

        assert_eq!(route.segments.len(), 2);
        assert!(route.source.is_fallback());
        assert!(route.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_spaces_requests() {
        let api = Arc::new(MockApi::ok());
        let config = RouteProviderConfig {
            cache_capacity: 10,
            min_request_interval: Duration::from_millis(1000),
        };
        let p = RouteProvider::new(api.clone(), config);

        let t0 = Instant::now();
        p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;
        p.calculate_route(c(48.1, 2.0), c(48.11, 2.0)).await;

        assert_eq!(api.call_count(), 2);
        assert!(t0.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_check_reroute_needed() {
        let api = Arc::new(MockApi::ok());
        let p = provider(api);

        let route = p.calculate_route(c(48.0, 2.0), c(48.01, 2.0)).await;

        // On the route start
        let on = p.check_reroute_needed(c(48.0, 2.0), &route, 50.0);
        assert!(!on.needed);
        assert!(on.deviation_m < 1.0);

        // ~1.5km east of the corridor
        let off = p.check_reroute_needed(c(48.005, 2.02), &route, 50.0);
        assert!(off.needed);
        assert!(off.deviation_m > 1000.0);
    }
}
