//! Route data model: segments, instructions, provenance
//!
//! A route is an ordered list of contiguous segments, each carrying its own
//! geometry and maneuver instructions. Provenance (`RouteSource`) records
//! whether the route came from the live API, from storage, or was
//! synthesized as a fallback - and in the fallback case, why. That marker
//! travels with the route everywhere, including persistence.

use crate::domain::geo::{distance_meters, Coordinate};
use serde::{Deserialize, Serialize};

/// Maximum gap allowed between consecutive segments
pub const CONTIGUITY_TOLERANCE_M: f64 = 25.0;

/// Why the live routing API could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Forbidden,
    NotFound,
    Timeout,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Forbidden => "forbidden",
            FailureKind::NotFound => "not_found",
            FailureKind::Timeout => "timeout",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Where a route came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RouteSource {
    Live,
    Stored,
    Fallback { reason: FailureKind },
}

impl RouteSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, RouteSource::Fallback { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Live => "live",
            RouteSource::Stored => "stored",
            RouteSource::Fallback { .. } => "fallback",
        }
    }
}

/// Maneuver classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    Depart,
    Turn,
    Continue,
    Arrive,
}

/// A single maneuver, consumed strictly in order within its segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub text: String,
    pub distance_m: f64,
    pub location: Coordinate,
}

/// One leg of a route between two points (usually consecutive POIs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSegment {
    pub start: Coordinate,
    pub end: Coordinate,
    pub geometry: Vec<Coordinate>,
    pub instructions: Vec<Instruction>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// A complete walking route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub segments: Vec<RouteSegment>,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
    pub source: RouteSource,
}

/// Structural problems found by [`Route::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteValidationError {
    #[error("route has no segments")]
    NoSegments,
    #[error("segment {0} has empty geometry")]
    EmptyGeometry(usize),
    #[error("segments {0} and {1} are not contiguous")]
    Discontiguous(usize, usize),
}

impl Route {
    /// Build a route from segments, computing the totals
    pub fn from_segments(segments: Vec<RouteSegment>, source: RouteSource) -> Self {
        let total_distance_m = segments.iter().map(|s| s.distance_m).sum();
        let total_duration_s = segments.iter().map(|s| s.duration_s).sum();
        Self { segments, total_distance_m, total_duration_s, source }
    }

    /// Check structural invariants: at least one segment, geometry on every
    /// segment, and consecutive segments joined within tolerance.
    pub fn validate(&self) -> Result<(), RouteValidationError> {
        if self.segments.is_empty() {
            return Err(RouteValidationError::NoSegments);
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.geometry.is_empty() {
                return Err(RouteValidationError::EmptyGeometry(i));
            }
        }
        for i in 1..self.segments.len() {
            let gap = distance_meters(self.segments[i - 1].end, self.segments[i].start);
            if gap > CONTIGUITY_TOLERANCE_M {
                return Err(RouteValidationError::Discontiguous(i - 1, i));
            }
        }
        Ok(())
    }

    /// All segment geometries concatenated into one ordered coordinate list,
    /// for nearest-point scans during on-route checks.
    pub fn flatten_geometry(&self) -> Vec<Coordinate> {
        let cap = self.segments.iter().map(|s| s.geometry.len()).sum();
        let mut flat = Vec::with_capacity(cap);
        for seg in &self.segments {
            flat.extend_from_slice(&seg.geometry);
        }
        flat
    }

    /// Final coordinate of the route, if any
    pub fn destination(&self) -> Option<Coordinate> {
        self.segments.last().map(|s| s.end)
    }
}

/// Result of a nearest-point scan over a flattened coordinate list
#[derive(Debug, Clone, Copy)]
pub struct NearestPoint {
    pub index: usize,
    pub distance_m: f64,
}

/// Closest coordinate in `track` to `position`. O(n); tracks are bounded by
/// a single tour's waypoint count. Returns `None` on an empty track.
pub fn nearest_point_on(track: &[Coordinate], position: Coordinate) -> Option<NearestPoint> {
    track
        .iter()
        .enumerate()
        .map(|(i, &c)| NearestPoint { index: i, distance_m: distance_meters(position, c) })
        .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
}
