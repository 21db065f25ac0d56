//! Great-circle geometry on WGS84 coordinates
//!
//! All functions are pure; distances are in meters, bearings in degrees.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Round to 5 decimal places (~1.1 m) for cache keys and fingerprints
    pub fn rounded(&self) -> (f64, f64) {
        let r = |v: f64| (v * 1e5).round() / 1e5;
        (r(self.lat), r(self.lon))
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

/// Haversine great-circle distance in meters
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees [0, 360)
pub fn initial_bearing(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Point reached by traveling `distance_m` from `origin` on `bearing_deg`
pub fn destination_point(origin: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let brg = bearing_deg.to_radians();
    let ang = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * ang.cos() + lat1.cos() * ang.sin() * brg.cos()).asin();
    let lon2 = lon1
        + (brg.sin() * ang.sin() * lat1.cos()).atan2(ang.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Eight-way compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CompassDirection {
    /// Map a bearing in degrees to the nearest cardinal/intercardinal direction
    pub fn from_bearing(bearing_deg: f64) -> Self {
        let sector = (((bearing_deg % 360.0) + 360.0) % 360.0 + 22.5) / 45.0;
        match sector as u32 % 8 {
            0 => CompassDirection::North,
            1 => CompassDirection::NorthEast,
            2 => CompassDirection::East,
            3 => CompassDirection::SouthEast,
            4 => CompassDirection::South,
            5 => CompassDirection::SouthWest,
            6 => CompassDirection::West,
            _ => CompassDirection::NorthWest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompassDirection::North => "north",
            CompassDirection::NorthEast => "north-east",
            CompassDirection::East => "east",
            CompassDirection::SouthEast => "south-east",
            CompassDirection::South => "south",
            CompassDirection::SouthWest => "south-west",
            CompassDirection::West => "west",
            CompassDirection::NorthWest => "north-west",
        }
    }
}

impl std::fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = Coordinate::new(48.8584, 2.2945);
        assert!(distance_meters(p, p).abs() < TOL);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Coordinate::new(48.8584, 2.2945); // Eiffel Tower
        let b = Coordinate::new(48.8606, 2.3376); // Louvre
        let d1 = distance_meters(a, b);
        let d2 = distance_meters(b, a);
        assert!((d1 - d2).abs() < TOL);
        assert!(d1 > 0.0);
    }

    #[test]
    fn test_distance_known_pair() {
        // Eiffel Tower to Louvre, roughly 3.2 km
        let a = Coordinate::new(48.8584, 2.2945);
        let b = Coordinate::new(48.8606, 2.3376);
        let d = distance_meters(a, b);
        assert!(d > 3000.0 && d < 3400.0, "got {d}");
    }

    #[test]
    fn test_bearing_due_north() {
        let a = Coordinate::new(48.0, 2.0);
        let b = Coordinate::new(49.0, 2.0);
        let brg = initial_bearing(a, b);
        assert!(brg.abs() < 0.01 || (brg - 360.0).abs() < 0.01);
    }

    #[test]
    fn test_bearing_due_east() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        assert!((initial_bearing(a, b) - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_destination_point_round_trip() {
        let origin = Coordinate::new(48.8584, 2.2945);
        let dest = destination_point(origin, 45.0, 500.0);
        let d = distance_meters(origin, dest);
        assert!((d - 500.0).abs() < 1.0, "got {d}");
        let brg = initial_bearing(origin, dest);
        assert!((brg - 45.0).abs() < 0.5, "got {brg}");
    }

    #[test]
    fn test_compass_direction_sectors() {
        assert_eq!(CompassDirection::from_bearing(0.0), CompassDirection::North);
        assert_eq!(CompassDirection::from_bearing(359.0), CompassDirection::North);
        assert_eq!(CompassDirection::from_bearing(45.0), CompassDirection::NorthEast);
        assert_eq!(CompassDirection::from_bearing(90.0), CompassDirection::East);
        assert_eq!(CompassDirection::from_bearing(180.0), CompassDirection::South);
        assert_eq!(CompassDirection::from_bearing(270.0), CompassDirection::West);
        assert_eq!(CompassDirection::from_bearing(292.5), CompassDirection::NorthWest);
    }
}
