//! Points of interest and the canonical tour sequence
//!
//! POIs are immutable reference data loaded once at startup; their `order`
//! field defines the tour traversal sequence.

use crate::domain::geo::Coordinate;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Newtype wrapper for POI ids to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PoiId(pub String);

impl std::fmt::Display for PoiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoiId {
    fn from(s: &str) -> Self {
        PoiId(s.to_string())
    }
}

/// A fixed tour stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: PoiId,
    pub name: String,
    pub coordinate: Coordinate,
    /// Tour sequence index, lowest first
    pub order: u32,
    /// Discovery radius in meters
    #[serde(default = "default_proximity_radius")]
    pub proximity_radius_m: f64,
    #[serde(default)]
    pub description: String,
}

fn default_proximity_radius() -> f64 {
    30.0
}

impl Poi {
    /// Load POIs from a JSON file (array of POI objects)
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<Poi>> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading POI file {}", path.display()))?;
        let pois: Vec<Poi> = serde_json::from_str(&data)
            .with_context(|| format!("parsing POI file {}", path.display()))?;
        Ok(pois)
    }
}

/// Ordered POI sequence for a tour
#[derive(Debug, Clone)]
pub struct TourSequence {
    pois: Vec<Poi>,
}

impl TourSequence {
    /// Build a sequence from POIs, sorting by `order`
    pub fn new(mut pois: Vec<Poi>) -> Self {
        pois.sort_by_key(|p| p.order);
        Self { pois }
    }

    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<&Poi> {
        self.pois.get(step)
    }

    /// Identity of this POI set for stored-route matching: ids plus
    /// 5-decimal-rounded coordinates, in tour order.
    pub fn fingerprint(&self) -> String {
        self.pois
            .iter()
            .map(|p| {
                let (lat, lon) = p.coordinate.rounded();
                format!("{}@{lat:.5},{lon:.5}", p.id)
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(id: &str, order: u32, lat: f64, lon: f64) -> Poi {
        Poi {
            id: id.into(),
            name: id.to_uppercase(),
            coordinate: Coordinate::new(lat, lon),
            order,
            proximity_radius_m: 30.0,
            description: String::new(),
        }
    }

    #[test]
    fn test_sequence_sorts_by_order() {
        let seq = TourSequence::new(vec![
            poi("c", 2, 48.2, 2.2),
            poi("a", 0, 48.0, 2.0),
            poi("b", 1, 48.1, 2.1),
        ]);
        let ids: Vec<_> = seq.pois().iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fingerprint_stable_and_order_sensitive() {
        let seq1 = TourSequence::new(vec![poi("a", 0, 48.0, 2.0), poi("b", 1, 48.1, 2.1)]);
        let seq2 = TourSequence::new(vec![poi("b", 1, 48.1, 2.1), poi("a", 0, 48.0, 2.0)]);
        assert_eq!(seq1.fingerprint(), seq2.fingerprint());

        let swapped = TourSequence::new(vec![poi("a", 1, 48.0, 2.0), poi("b", 0, 48.1, 2.1)]);
        assert_ne!(seq1.fingerprint(), swapped.fingerprint());
    }

    #[test]
    fn test_poi_json_defaults() {
        let json = r#"{"id":"p1","name":"Gate","coordinate":{"lat":48.0,"lon":2.0},"order":0}"#;
        let p: Poi = serde_json::from_str(json).unwrap();
        assert_eq!(p.proximity_radius_m, 30.0);
        assert!(p.description.is_empty());
    }
}
