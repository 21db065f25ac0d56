//! Services - guidance logic and state management
//!
//! This module contains the core guidance services:
//! - `coordinator` - Top-level guidance mode machine and event source
//! - `navigation` - Turn-by-turn navigation over an active route
//! - `route_provider` - Route computation with caching and fallback
//! - `route_resolver` - Stored-vs-live route selection
//! - `route_store` - Versioned persistence of tour routes
//! - `progress` - POI discovery and visit tracking

pub mod coordinator;
pub mod navigation;
pub mod progress;
pub mod route_provider;
pub mod route_resolver;
pub mod route_store;

// Re-export commonly used types
pub use coordinator::{GuidanceConfig, GuidanceCoordinator, GuidanceMode, GuidanceRequest};
pub use navigation::{NavigationConfig, NavigationEngine};
pub use progress::TourProgressTracker;
pub use route_provider::{RouteProvider, RouteProviderConfig};
pub use route_resolver::{ResolveOptions, StoredRouteResolver};
pub use route_store::RouteStore;
