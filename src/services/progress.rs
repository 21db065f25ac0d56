//! POI proximity discovery and visit bookkeeping
//!
//! Independent of routing: works purely from position fixes and the POI
//! list. The visited set is monotonic (only an explicit reset clears it)
//! and progress is persisted after every mutation.

use crate::domain::geo::{distance_meters, Coordinate};
use crate::domain::poi::{Poi, PoiId};
use crate::io::kv::KeyValueBackend;
use crate::services::route_store::epoch_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const PROGRESS_KEY: &str = "tour-progress";

/// Distance at which the one-time approaching alert fires
pub const DEFAULT_APPROACH_ALERT_M: f64 = 100.0;

/// Persisted visit state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourProgress {
    pub visited: HashSet<PoiId>,
    pub started_at: u64,
    pub last_visit_at: Option<u64>,
}

impl TourProgress {
    fn new() -> Self {
        Self { visited: HashSet::new(), started_at: epoch_ms(), last_visit_at: None }
    }
}

/// What a proximity check found, in POI order
#[derive(Debug, Clone)]
pub enum ProximityUpdate {
    /// First time within the alert distance of this POI
    Approaching { poi: PoiId, distance_m: f64 },
    /// Entered the POI's discovery radius for the first time
    Discovered { poi: PoiId, distance_m: f64 },
}

pub struct TourProgressTracker {
    pois: Vec<Poi>,
    backend: Arc<dyn KeyValueBackend>,
    progress: TourProgress,
    approach_alert_m: f64,
    /// POIs already alerted as approaching; re-armed only by reset
    alerted: HashSet<PoiId>,
}

impl TourProgressTracker {
    /// Create a tracker, resuming persisted progress if present
    pub fn new(pois: Vec<Poi>, backend: Arc<dyn KeyValueBackend>, approach_alert_m: f64) -> Self {
        let progress = backend
            .get(PROGRESS_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(error = %e, "tour_progress_undecodable_starting_fresh");
                    None
                }
            })
            .unwrap_or_else(TourProgress::new);

        if !progress.visited.is_empty() {
            info!(visited = progress.visited.len(), "tour_progress_resumed");
        }

        Self { pois, backend, progress, approach_alert_m, alerted: HashSet::new() }
    }

    pub fn progress(&self) -> &TourProgress {
        &self.progress
    }

    pub fn is_visited(&self, id: &PoiId) -> bool {
        self.progress.visited.contains(id)
    }

    pub fn visited_count(&self) -> usize {
        self.progress.visited.len()
    }

    /// Scan all POIs against the position: one-time approaching alerts at
    /// the alert distance, idempotent discovery inside the per-POI radius.
    pub fn check_proximity(&mut self, position: Coordinate) -> Vec<ProximityUpdate> {
        let mut updates = Vec::new();
        let mut discovered_any = false;

        for poi in &self.pois {
            if self.progress.visited.contains(&poi.id) {
                continue;
            }
            let distance_m = distance_meters(position, poi.coordinate);

            if distance_m <= poi.proximity_radius_m {
                info!(poi = %poi.id, distance_m = distance_m as u64, "poi_discovered");
                self.progress.visited.insert(poi.id.clone());
                self.progress.last_visit_at = Some(epoch_ms());
                discovered_any = true;
                updates.push(ProximityUpdate::Discovered { poi: poi.id.clone(), distance_m });
            } else if distance_m <= self.approach_alert_m && !self.alerted.contains(&poi.id) {
                self.alerted.insert(poi.id.clone());
                updates.push(ProximityUpdate::Approaching { poi: poi.id.clone(), distance_m });
            }
        }

        if discovered_any {
            self.persist();
        }
        updates
    }

    /// Record a visit directly (e.g. confirmed POI reach), idempotently
    pub fn mark_visited(&mut self, id: &PoiId) {
        if self.progress.visited.insert(id.clone()) {
            self.progress.last_visit_at = Some(epoch_ms());
            self.persist();
        }
    }

    /// Clear all progress, durably
    pub fn reset(&mut self) {
        self.progress = TourProgress::new();
        self.alerted.clear();
        self.backend.remove(PROGRESS_KEY);
        info!("tour_progress_reset");
    }

    fn persist(&self) {
        match serde_json::to_string(&self.progress) {
            Ok(json) => {
                if let Err(e) = self.backend.set(PROGRESS_KEY, &json) {
                    warn!(error = %e, "tour_progress_persist_failed");
                }
            }
            Err(e) => warn!(error = %e, "tour_progress_serialize_failed"),
        }
    }
}
