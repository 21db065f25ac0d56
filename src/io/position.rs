//! Position feed: the push source of (lat, lon) updates
//!
//! Real GPS and the simulated walker both feed the same bounded channel.
//! The walker interpolates along a coordinate path at walking speed on a
//! cancellable interval, replacing the original's timer polling.

use crate::domain::geo::{destination_point, distance_meters, initial_bearing, Coordinate};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// A single position fix
#[derive(Debug, Clone, Copy)]
pub struct PositionUpdate {
    pub coordinate: Coordinate,
    pub at: std::time::Instant,
}

impl PositionUpdate {
    pub fn now(coordinate: Coordinate) -> Self {
        Self { coordinate, at: std::time::Instant::now() }
    }
}

/// Walks a path of coordinates at a fixed speed, emitting position updates
pub struct SimulatedWalker {
    path: Vec<Coordinate>,
    speed_mps: f64,
    step_interval: Duration,
}

impl SimulatedWalker {
    pub fn new(path: Vec<Coordinate>, speed_mps: f64, step_interval: Duration) -> Self {
        Self { path, speed_mps, step_interval }
    }

    /// Emit positions until the path ends, the channel closes, or shutdown
    /// is signaled. Each tick advances `speed * interval` meters along the
    /// path, interpolating between vertices.
    pub async fn run(self, tx: mpsc::Sender<PositionUpdate>, mut shutdown: watch::Receiver<bool>) {
        if self.path.len() < 2 {
            return;
        }

        let step_m = self.speed_mps * self.step_interval.as_secs_f64();
        let mut ticker = tokio::time::interval(self.step_interval);
        let mut leg = 0usize;
        let mut pos = self.path[0];

        info!(vertices = self.path.len(), speed_mps = self.speed_mps, "walker_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("walker_stopped");
                    return;
                }
            }

            // Advance along the current leg, hopping vertices as needed
            let mut remaining = step_m;
            while remaining > 0.0 && leg + 1 < self.path.len() {
                let target = self.path[leg + 1];
                let to_target = distance_meters(pos, target);
                if to_target <= remaining {
                    remaining -= to_target;
                    pos = target;
                    leg += 1;
                } else {
                    let brg = initial_bearing(pos, target);
                    pos = destination_point(pos, brg, remaining);
                    remaining = 0.0;
                }
            }

            debug!(lat = pos.lat, lon = pos.lon, "walker_position");
            if tx.send(PositionUpdate::now(pos)).await.is_err() {
                return; // consumer gone
            }

            if leg + 1 >= self.path.len() {
                info!("walker_path_complete");
                return;
            }
        }
    }
}
