//! Stored-vs-live route resolution for a tour
//!
//! Decides whether a previously persisted tour route can be reused for the
//! current POI set, falling through to live computation otherwise. Keeps
//! the resolved route's flattened geometry for cheap on-route checks.

use crate::domain::geo::Coordinate;
use crate::domain::poi::TourSequence;
use crate::domain::route::{nearest_point_on, Route, RouteSource};
use crate::services::route_provider::RouteProvider;
use crate::services::route_store::RouteStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub prefer_stored: bool,
    pub fallback_to_live: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { prefer_stored: true, fallback_to_live: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no stored route matches and live computation is disabled")]
    NoRouteAvailable,
}

/// A resolved tour route plus its flattened geometry
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub route: Route,
    /// All segment geometries concatenated, for nearest-point scans
    pub flattened: Vec<Coordinate>,
}

impl ResolvedRoute {
    pub fn new(route: Route) -> Self {
        let flattened = route.flatten_geometry();
        Self { route, flattened }
    }
}

/// Result of an on-route check against the resolved route
#[derive(Debug, Clone, Copy)]
pub struct OnRouteCheck {
    pub on_route: bool,
    pub distance_m: f64,
    pub closest_index: usize,
    /// Fraction of the flattened track already behind the user, [0, 1]
    pub progress: f64,
}

pub struct StoredRouteResolver {
    store: RouteStore,
    provider: Arc<RouteProvider>,
}

impl StoredRouteResolver {
    pub fn new(store: RouteStore, provider: Arc<RouteProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &RouteStore {
        &self.store
    }

    /// Resolve a route through the tour sequence: best matching stored
    /// route first (exact fingerprint, else same POI count and most
    /// recent), then live computation. Freshly computed live routes are
    /// persisted for next time.
    pub async fn get_tour_route(
        &self,
        sequence: &TourSequence,
        options: ResolveOptions,
    ) -> Result<ResolvedRoute, ResolveError> {
        if options.prefer_stored {
            if let Some(stored) = self.best_stored_match(sequence) {
                info!(route_id = %stored.0, "tour_route_resolved_from_store");
                let mut route = stored.1;
                route.source = RouteSource::Stored;
                return Ok(ResolvedRoute::new(route));
            }
        }

        if !options.fallback_to_live {
            return Err(ResolveError::NoRouteAvailable);
        }

        let route = self.provider.calculate_tour_route(sequence).await;
        debug!(source = %route.source.as_str(), "tour_route_resolved_live");

        // Persist live routes for reuse; fallback routes are kept out of
        // the store so a later run retries the API.
        if route.source == RouteSource::Live {
            let id = uuid::Uuid::now_v7().to_string();
            if let Err(e) =
                self.store.store(&id, route.clone(), sequence.fingerprint(), sequence.len())
            {
                warn!(error = %e, "route_persist_failed");
            }
        }

        Ok(ResolvedRoute::new(route))
    }

    /// Nearest-neighbor scan over a resolved route's flattened track
    pub fn is_on_route(
        &self,
        resolved: &ResolvedRoute,
        position: Coordinate,
        threshold_m: f64,
    ) -> OnRouteCheck {
        match nearest_point_on(&resolved.flattened, position) {
            Some(hit) => {
                let denom = resolved.flattened.len().saturating_sub(1).max(1);
                OnRouteCheck {
                    on_route: hit.distance_m <= threshold_m,
                    distance_m: hit.distance_m,
                    closest_index: hit.index,
                    progress: hit.index as f64 / denom as f64,
                }
            }
            None => OnRouteCheck { on_route: false, distance_m: f64::MAX, closest_index: 0, progress: 0.0 },
        }
    }

    /// Best stored candidate: exact fingerprint matches win, then routes
    /// with the same POI count, newest first. A candidate that no longer
    /// loads or validates is discarded and the next one is tried.
    fn best_stored_match(&self, sequence: &TourSequence) -> Option<(String, Route)> {
        let fingerprint = sequence.fingerprint();
        let listed = self.store.list(); // already newest-first

        let exact = listed.iter().filter(|m| m.poi_fingerprint == fingerprint);
        let same_count = listed
            .iter()
            .filter(|m| m.poi_fingerprint != fingerprint && m.poi_count == sequence.len());

        for meta in exact.chain(same_count) {
            // Undecodable or version-gated payloads read as absent and the
            // store drops them itself
            let Some(stored) = self.store.get(&meta.id) else {
                continue;
            };
            if let Err(e) = stored.route.validate() {
                warn!(route_id = %meta.id, error = %e, "stored_route_invalid_discarding");
                self.store.delete(&meta.id);
                continue;
            }
            return Some((stored.id, stored.route));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::poi::Poi;
    use crate::io::kv::{KeyValueBackend, MemoryBackend};
    use crate::io::routing_api::{ApiRoute, RoutingApi, RoutingError};
    use crate::services::route_provider::RouteProviderConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoutingApi for CountingApi {
        async fn fetch_route(
            &self,
            start: Coordinate,
            end: Coordinate,
        ) -> Result<ApiRoute, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let d = crate::domain::geo::distance_meters(start, end);
            Ok(ApiRoute {
                geometry: vec![start, end],
                instructions: vec![],
                distance_m: d,
                duration_s: d / 1.4,
            })
        }
    }

    fn poi(id: &str, order: u32, lat: f64) -> Poi {
        Poi {
            id: id.into(),
            name: id.to_uppercase(),
            coordinate: Coordinate::new(lat, 2.0),
            order,
            proximity_radius_m: 30.0,
            description: String::new(),
        }
    }

    fn sequence() -> TourSequence {
        TourSequence::new(vec![poi("a", 0, 48.0), poi("b", 1, 48.005), poi("c", 2, 48.01)])
    }

    fn resolver() -> (StoredRouteResolver, Arc<CountingApi>) {
        let api = Arc::new(CountingApi { calls: AtomicUsize::new(0) });
        let provider = Arc::new(RouteProvider::new(
            api.clone(),
            RouteProviderConfig { cache_capacity: 100, min_request_interval: Duration::ZERO },
        ));
        let store = RouteStore::new(Arc::new(MemoryBackend::new()));
        (StoredRouteResolver::new(store, provider), api)
    }

    #[tokio::test]
    async fn test_live_then_stored() {
        let (r, api) = resolver();
        let seq = sequence();

        // First resolve goes live and persists
        let first = r.get_tour_route(&seq, ResolveOptions::default()).await.unwrap();
        assert_eq!(first.route.source, RouteSource::Live);
        let live_calls = api.calls.load(Ordering::SeqCst);
        assert_eq!(live_calls, 2); // two legs

        // Second resolve is served from the store with no new calls
        let second = r.get_tour_route(&seq, ResolveOptions::default()).await.unwrap();
        assert_eq!(second.route.source, RouteSource::Stored);
        assert_eq!(api.calls.load(Ordering::SeqCst), live_calls);
        assert_eq!(second.flattened.len(), first.flattened.len());
    }

    #[tokio::test]
    async fn test_prefer_stored_false_goes_live() {
        let (r, api) = resolver();
        let seq = sequence();
        r.get_tour_route(&seq, ResolveOptions::default()).await.unwrap();
        let calls = api.calls.load(Ordering::SeqCst);

        let opts = ResolveOptions { prefer_stored: false, fallback_to_live: true };
        let again = r.get_tour_route(&seq, opts).await.unwrap();
        assert_eq!(again.route.source, RouteSource::Live);
        assert!(api.calls.load(Ordering::SeqCst) >= calls); // cache may absorb
    }

    #[tokio::test]
    async fn test_no_route_available() {
        let (r, _) = resolver();
        let opts = ResolveOptions { prefer_stored: true, fallback_to_live: false };
        let err = r.get_tour_route(&sequence(), opts).await.unwrap_err();
        assert!(matches!(err, ResolveError::NoRouteAvailable));
    }

    #[tokio::test]
    async fn test_same_count_match_when_fingerprint_differs() {
        let (r, _) = resolver();
        r.get_tour_route(&sequence(), ResolveOptions::default()).await.unwrap();

        // Same POI count, slightly moved coordinates: different fingerprint
        let moved = TourSequence::new(vec![
            poi("a", 0, 48.0001),
            poi("b", 1, 48.0051),
            poi("c", 2, 48.0101),
        ]);
        let resolved = r.get_tour_route(&moved, ResolveOptions::default()).await.unwrap();
        assert_eq!(resolved.route.source, RouteSource::Stored);
    }

    #[tokio::test]
    async fn test_stale_best_match_falls_back_to_next_candidate() {
        use crate::domain::route::RouteSegment;

        fn seg(start: Coordinate, end: Coordinate) -> RouteSegment {
            let d = crate::domain::geo::distance_meters(start, end);
            RouteSegment {
                start,
                end,
                geometry: vec![start, end],
                instructions: vec![],
                distance_m: d,
                duration_s: d / 1.4,
            }
        }

        fn tour_route() -> Route {
            let a = Coordinate::new(48.0, 2.0);
            let b = Coordinate::new(48.005, 2.0);
            let c = Coordinate::new(48.01, 2.0);
            Route::from_segments(vec![seg(a, b), seg(b, c)], RouteSource::Live)
        }

        let api = Arc::new(CountingApi { calls: AtomicUsize::new(0) });
        let provider = Arc::new(RouteProvider::new(
            api.clone(),
            RouteProviderConfig { cache_capacity: 100, min_request_interval: Duration::ZERO },
        ));
        let backend = Arc::new(MemoryBackend::new());
        let r = StoredRouteResolver::new(RouteStore::new(backend.clone()), provider);

        let seq = sequence();
        r.store().store("exact", tour_route(), seq.fingerprint(), seq.len()).unwrap();
        r.store().store("older", tour_route(), "other-tour".into(), seq.len()).unwrap();

        // The exact match is still indexed but its payload no longer decodes
        backend.set("route:exact", "garbage").unwrap();

        // The same-count candidate behind it is picked up; no live call
        let resolved = r.get_tour_route(&seq, ResolveOptions::default()).await.unwrap();
        assert_eq!(resolved.route.source, RouteSource::Stored);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(!r.store().has("exact"));
        assert!(r.store().has("older"));
    }

    #[tokio::test]
    async fn test_is_on_route_progress() {
        let (r, _) = resolver();
        let resolved = r.get_tour_route(&sequence(), ResolveOptions::default()).await.unwrap();

        let at_start = r.is_on_route(&resolved, Coordinate::new(48.0, 2.0), 50.0);
        assert!(at_start.on_route);
        assert_eq!(at_start.closest_index, 0);
        assert!(at_start.progress < 0.01);

        let at_end = r.is_on_route(&resolved, Coordinate::new(48.01, 2.0), 50.0);
        assert!(at_end.on_route);
        assert!((at_end.progress - 1.0).abs() < 1e-9);

        let far = r.is_on_route(&resolved, Coordinate::new(48.005, 2.05), 50.0);
        assert!(!far.on_route);
        assert!(far.distance_m > 1000.0);
    }
}
