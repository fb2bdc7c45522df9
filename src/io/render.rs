//! Rendering collaborator - map drawing requests
//!
//! The monitor never waits on the renderer. Requests are fire-and-forget:
//! `RenderSender` enqueues them on a bounded channel and drops them when the
//! renderer falls behind. `run_render_worker` drains the channel off the hot
//! path.

use crate::domain::types::{GeoRegion, Position, RegionId};
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Sink for map drawing requests
pub trait RenderSink: Send + Sync {
    /// Draw the circle for a monitored region
    fn draw_region(&self, region: &GeoRegion);

    /// Remove the circle keyed by region identifier
    fn remove_region(&self, region_id: &RegionId);

    /// Move the camera to follow the device
    fn recenter(&self, position: &Position, zoom: f64);
}

/// A queued drawing request
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    DrawRegion(GeoRegion),
    RemoveRegion(RegionId),
    Recenter { position: Position, zoom: f64 },
}

/// Channel-backed render sink
///
/// Clone this to share across producers. Non-blocking: if the channel is
/// full, requests are dropped and counted.
#[derive(Clone)]
pub struct RenderSender {
    tx: mpsc::Sender<RenderCommand>,
    metrics: Arc<Metrics>,
}

impl RenderSender {
    pub fn new(tx: mpsc::Sender<RenderCommand>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    fn enqueue(&self, cmd: RenderCommand) {
        if self.tx.try_send(cmd).is_err() {
            self.metrics.record_render_dropped();
        }
    }
}

impl RenderSink for RenderSender {
    fn draw_region(&self, region: &GeoRegion) {
        self.enqueue(RenderCommand::DrawRegion(region.clone()));
    }

    fn remove_region(&self, region_id: &RegionId) {
        self.enqueue(RenderCommand::RemoveRegion(region_id.clone()));
    }

    fn recenter(&self, position: &Position, zoom: f64) {
        self.enqueue(RenderCommand::Recenter { position: *position, zoom });
    }
}

/// Create a render channel
///
/// Returns the sender (for the monitor) and the receiver (for the worker)
pub fn create_render_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (RenderSender, mpsc::Receiver<RenderCommand>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (RenderSender::new(tx, metrics), rx)
}

/// Drain render requests until the channel closes or shutdown is signalled
///
/// There is no map surface in this process; requests are logged so the
/// drawing stream can be followed with RUST_LOG=debug.
pub async fn run_render_worker(
    mut cmd_rx: mpsc::Receiver<RenderCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("render_worker_started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RenderCommand::DrawRegion(region)) => {
                        debug!(
                            region = %region.id(),
                            center = %region.center(),
                            radius_m = %region.radius_m(),
                            "render_draw_circle"
                        );
                    }
                    Some(RenderCommand::RemoveRegion(region_id)) => {
                        debug!(region = %region_id, "render_remove_circle");
                    }
                    Some(RenderCommand::Recenter { position, zoom }) => {
                        debug!(
                            lat = %position.lat,
                            lon = %position.lon,
                            zoom = %zoom,
                            "render_recenter"
                        );
                    }
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("render_worker_stopped");
}
