//! Domain models - geometry, POIs, and the route data model
//!
//! This module contains the canonical data types used throughout the system:
//! - `geo` - pure great-circle geometry (distance, bearing, destination)
//! - `poi` - points of interest and the ordered tour sequence
//! - `route` - routes, segments, instructions, and provenance

pub mod geo;
pub mod poi;
pub mod route;
