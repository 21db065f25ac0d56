//! Persistent storage for complete multi-POI tour routes
//!
//! Routes are stored as JSON under `route:{id}` with a side index of
//! metadata (`route-index`) so listing never deserializes full routes.
//! Stored data from a different format major version, or data that fails to
//! decode, is treated as absent - recomputation is always preferred over a
//! hard error.

use crate::domain::route::Route;
use crate::io::kv::KeyValueBackend;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted route format version. Bump the major to invalidate all stored
/// routes; minor/patch changes stay readable.
pub const ROUTE_FORMAT_VERSION: &str = "1.0.0";

const INDEX_KEY: &str = "route-index";
const VERSION_KEY: &str = "route-version";

fn route_key(id: &str) -> String {
    format!("route:{id}")
}

/// Current epoch milliseconds
pub fn epoch_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("route failed validation: {0}")]
    InvalidRoute(#[from] crate::domain::route::RouteValidationError),
    #[error("backend write failed: {0}")]
    Backend(#[from] crate::io::kv::KvError),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Metadata kept in the side index for fast listing and matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub id: String,
    pub poi_fingerprint: String,
    pub poi_count: usize,
    pub segment_count: usize,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
    pub created_at: u64,
}

/// Persisted wrapper around a Route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRoute {
    pub id: String,
    pub version: String,
    pub created_at: u64,
    pub route: Route,
    pub metadata: RouteMetadata,
}

pub struct RouteStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl RouteStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        let store = Self { backend };
        // Record the current format version for wholesale migration checks
        let _ = store.backend.set(VERSION_KEY, ROUTE_FORMAT_VERSION);
        store
    }

    /// Validate and persist a route with its metadata, updating the index
    pub fn store(
        &self,
        id: &str,
        route: Route,
        poi_fingerprint: String,
        poi_count: usize,
    ) -> Result<(), StoreError> {
        route.validate()?;

        let created_at = epoch_ms();
        let metadata = RouteMetadata {
            id: id.to_string(),
            poi_fingerprint,
            poi_count,
            segment_count: route.segments.len(),
            total_distance_m: route.total_distance_m,
            total_duration_s: route.total_duration_s,
            created_at,
        };
        let stored = StoredRoute {
            id: id.to_string(),
            version: ROUTE_FORMAT_VERSION.to_string(),
            created_at,
            route,
            metadata: metadata.clone(),
        };

        self.backend.set(&route_key(id), &serde_json::to_string(&stored)?)?;

        let mut index = self.load_index();
        index.insert(id.to_string(), metadata);
        self.save_index(&index)?;

        info!(route_id = %id, segments = stored.route.segments.len(), "route_stored");
        Ok(())
    }

    /// Fetch a stored route. Version-incompatible or undecodable data reads
    /// as absent, and the stale entry is dropped so it is not matched again.
    pub fn get(&self, id: &str) -> Option<StoredRoute> {
        let raw = self.backend.get(&route_key(id))?;

        let stored: StoredRoute = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(route_id = %id, error = %e, "stored_route_undecodable");
                self.delete(id);
                return None;
            }
        };

        if !version_compatible(&stored.version) {
            warn!(
                route_id = %id,
                stored_version = %stored.version,
                current_version = %ROUTE_FORMAT_VERSION,
                "stored_route_version_incompatible"
            );
            self.delete(id);
            return None;
        }

        debug!(route_id = %id, "stored_route_loaded");
        Some(stored)
    }

    /// Whether `id` resolves to a loadable, version-compatible route.
    /// Shares `get`'s absence semantics: a stale index entry reads as
    /// missing (and is dropped), never as present.
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All stored route metadata, from the index only
    pub fn list(&self) -> Vec<RouteMetadata> {
        let mut entries: Vec<_> = self.load_index().into_values().collect();
        entries.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        entries
    }

    pub fn delete(&self, id: &str) {
        self.backend.remove(&route_key(id));
        let mut index = self.load_index();
        if index.remove(id).is_some() {
            let _ = self.save_index(&index);
        }
    }

    pub fn clear_all(&self) {
        for meta in self.list() {
            self.backend.remove(&route_key(&meta.id));
        }
        self.backend.remove(INDEX_KEY);
        info!("route_store_cleared");
    }

    fn load_index(&self) -> HashMap<String, RouteMetadata> {
        let Some(raw) = self.backend.get(INDEX_KEY) else {
            return HashMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "route_index_undecodable_rebuilding_empty");
                HashMap::new()
            }
        }
    }

    fn save_index(&self, index: &HashMap<String, RouteMetadata>) -> Result<(), StoreError> {
        self.backend.set(INDEX_KEY, &serde_json::to_string(index)?)?;
        Ok(())
    }
}

/// Forward-incompatible format: the stored major must match the current
/// major. Unparseable versions are incompatible.
fn version_compatible(stored: &str) -> bool {
    let (Ok(stored), Ok(current)) = (Version::parse(stored), Version::parse(ROUTE_FORMAT_VERSION))
    else {
        return false;
    };
    stored.major == current.major
}
