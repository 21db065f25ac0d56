//! Typed channel for guidance events consumed by the presentation layer
//!
//! The engine never renders anything itself; map, audio, and notification
//! UI subscribe to this channel. Uses a bounded mpsc channel with try_send
//! so a slow consumer can never stall position processing.

use crate::domain::geo::Coordinate;
use crate::domain::poi::PoiId;
use crate::domain::route::{FailureKind, RouteSource};
use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted by the guidance coordinator and its sub-services
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum GuidanceEvent {
    TourStarted {
        source: RouteSource,
        poi_count: usize,
    },
    TourStopped,
    /// A new instruction became current
    InstructionUpdated {
        text: String,
        distance_m: f64,
    },
    DeviationDetected {
        deviation_m: f64,
    },
    /// Back within threshold of the main route; original route resumed
    ReturnedToMainRoute,
    /// Mid-guidance recalculation in progress
    Recalculating,
    RerouteCompleted {
        source: RouteSource,
        fallback_reason: Option<FailureKind>,
    },
    /// POI confirmed reached (directly or by user confirmation)
    PoiReached {
        poi: PoiId,
        tour_step: usize,
    },
    /// Near the POI but not close enough to auto-confirm; the UI must ask
    PoiConfirmationRequested {
        poi: PoiId,
        distance_m: f64,
    },
    TourCompleted,
    /// One-time heads-up that a POI is coming up
    PoiApproaching {
        poi: PoiId,
        distance_m: f64,
    },
    /// POI entered its discovery radius for the first time
    PoiDiscovered {
        poi: PoiId,
        at: Coordinate,
    },
    /// Guidance could not be started
    GuidanceFailed {
        reason: String,
    },
}

impl GuidanceEvent {
    /// Short name for structured logging
    pub fn name(&self) -> &'static str {
        match self {
            GuidanceEvent::TourStarted { .. } => "tour_started",
            GuidanceEvent::TourStopped => "tour_stopped",
            GuidanceEvent::InstructionUpdated { .. } => "instruction_updated",
            GuidanceEvent::DeviationDetected { .. } => "deviation_detected",
            GuidanceEvent::ReturnedToMainRoute => "returned_to_main_route",
            GuidanceEvent::Recalculating => "recalculating",
            GuidanceEvent::RerouteCompleted { .. } => "reroute_completed",
            GuidanceEvent::PoiReached { .. } => "poi_reached",
            GuidanceEvent::PoiConfirmationRequested { .. } => "poi_confirmation_requested",
            GuidanceEvent::TourCompleted => "tour_completed",
            GuidanceEvent::PoiApproaching { .. } => "poi_approaching",
            GuidanceEvent::PoiDiscovered { .. } => "poi_discovered",
            GuidanceEvent::GuidanceFailed { .. } => "guidance_failed",
        }
    }
}

/// Sender handle for guidance events
///
/// Clone this to share across producers. Non-blocking; if the channel is
/// full the event is dropped.
#[derive(Clone)]
pub struct GuidanceSender {
    tx: mpsc::Sender<GuidanceEvent>,
}

impl GuidanceSender {
    pub fn new(tx: mpsc::Sender<GuidanceEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: GuidanceEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Create a new guidance event channel pair
pub fn create_guidance_channel(buffer: usize) -> (GuidanceSender, mpsc::Receiver<GuidanceEvent>) {
    let (tx, rx) = mpsc::channel(buffer);
    (GuidanceSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_in_order() {
        let (sender, mut rx) = create_guidance_channel(8);
        sender.send(GuidanceEvent::Recalculating);
        sender.send(GuidanceEvent::TourStopped);

        assert_eq!(rx.recv().await.unwrap().name(), "recalculating");
        assert_eq!(rx.recv().await.unwrap().name(), "tour_stopped");
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (sender, mut rx) = create_guidance_channel(1);
        sender.send(GuidanceEvent::TourStopped);
        sender.send(GuidanceEvent::TourCompleted); // dropped

        assert_eq!(rx.recv().await.unwrap().name(), "tour_stopped");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&GuidanceEvent::DeviationDetected { deviation_m: 62.0 })
            .unwrap();
        assert!(json.contains(r#""event":"deviation_detected""#));
        assert!(json.contains("62"));
    }
}
