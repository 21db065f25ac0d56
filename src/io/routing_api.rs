//! HTTP client for the external pedestrian routing API
//!
//! The engine never depends on this call succeeding: every error is mapped
//! to a `RoutingError` variant so the provider can attach the reason to a
//! synthesized fallback route. Non-2xx statuses and malformed bodies are
//! expected conditions, not bugs.

use crate::domain::geo::Coordinate;
use crate::domain::route::{FailureKind, Instruction, InstructionKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Routing call failure taxonomy. Used for logging and fallback-reason
/// attachment only; never fatal to callers.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("routing API rejected the request (status {0})")]
    Forbidden(u16),
    #[error("no route found")]
    NotFound,
    #[error("routing request timed out")]
    Timeout,
    #[error("unparseable routing response: {0}")]
    InvalidResponse(String),
    #[error("routing request failed: {0}")]
    Unknown(String),
}

impl RoutingError {
    /// Collapse to the reason kind carried on fallback routes
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RoutingError::Network(_) => FailureKind::Network,
            RoutingError::Forbidden(_) => FailureKind::Forbidden,
            RoutingError::NotFound => FailureKind::NotFound,
            RoutingError::Timeout => FailureKind::Timeout,
            RoutingError::InvalidResponse(_) | RoutingError::Unknown(_) => FailureKind::Unknown,
        }
    }
}

/// A single leg as returned by the routing API
#[derive(Debug, Clone)]
pub struct ApiRoute {
    pub geometry: Vec<Coordinate>,
    pub instructions: Vec<Instruction>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Outbound routing interface. Implemented by the HTTP client and by test
/// doubles; injected into the RouteProvider at construction.
#[async_trait]
pub trait RoutingApi: Send + Sync {
    async fn fetch_route(&self, start: Coordinate, end: Coordinate)
        -> Result<ApiRoute, RoutingError>;
}

// Wire format of the routing service response
#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    distance: f64,
    duration: f64,
    geometry: WireGeometry,
    #[serde(default)]
    steps: Vec<WireStep>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    /// [lon, lat] pairs, GeoJSON axis order
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct WireStep {
    #[serde(rename = "type", default)]
    step_type: String,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    location: Option<[f64; 2]>,
}

pub struct HttpRoutingApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpRoutingApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        // Client built once for connection reuse; per-request timeout is
        // enforced again by an outer tokio timeout in fetch_route.
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), request_timeout }
    }

    fn parse_body(&self, body: &str) -> Result<ApiRoute, RoutingError> {
        let parsed: DirectionsResponse = serde_json::from_str(body)
            .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;

        let route = parsed.routes.into_iter().next().ok_or(RoutingError::NotFound)?;

        let geometry: Vec<Coordinate> = route
            .geometry
            .coordinates
            .iter()
            .map(|&[lon, lat]| Coordinate::new(lat, lon))
            .collect();
        if geometry.is_empty() {
            return Err(RoutingError::InvalidResponse("empty geometry".to_string()));
        }

        let fallback_loc = geometry[0];
        let instructions = route
            .steps
            .iter()
            .map(|s| Instruction {
                kind: match s.step_type.as_str() {
                    "depart" => InstructionKind::Depart,
                    "arrive" => InstructionKind::Arrive,
                    "turn" => InstructionKind::Turn,
                    _ => InstructionKind::Continue,
                },
                text: s.instruction.clone(),
                distance_m: s.distance,
                location: s
                    .location
                    .map(|[lon, lat]| Coordinate::new(lat, lon))
                    .unwrap_or(fallback_loc),
            })
            .collect();

        Ok(ApiRoute {
            geometry,
            instructions,
            distance_m: route.distance,
            duration_s: route.duration,
        })
    }
}

#[async_trait]
impl RoutingApi for HttpRoutingApi {
    async fn fetch_route(
        &self,
        start: Coordinate,
        end: Coordinate,
    ) -> Result<ApiRoute, RoutingError> {
        let url = format!(
            "{}/route/walking?start={:.6},{:.6}&end={:.6},{:.6}&steps=true",
            self.base_url, start.lon, start.lat, end.lon, end.lat
        );
        debug!(start = %start, end = %end, "routing_request");

        // Outer guard so a stalled connection can never exceed the budget
        let response =
            match tokio::time::timeout(self.request_timeout, self.client.get(&url).send()).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) if e.is_timeout() => return Err(RoutingError::Timeout),
                Ok(Err(e)) if e.is_connect() => return Err(RoutingError::Network(e.to_string())),
                Ok(Err(e)) => return Err(RoutingError::Unknown(e.to_string())),
                Err(_) => return Err(RoutingError::Timeout),
            };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RoutingError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!(status = %status.as_u16(), "routing_request_rejected");
            return Err(match status.as_u16() {
                401 | 403 => RoutingError::Forbidden(status.as_u16()),
                404 => RoutingError::NotFound,
                code => RoutingError::Unknown(format!("status {code}")),
            });
        }

        self.parse_body(&body)
    }
}
