//! Location source interface and the signals it delivers
//!
//! The platform location service is modeled as two halves:
//! - `LocationSource`: calls the monitor makes into the service
//!   (start/stop region monitoring, authorization, position updates)
//! - `LocationSignal`: typed messages the service pushes back, drained by the
//!   monitor from a single-consumer channel

use crate::domain::types::{AuthorizationStatus, GeoRegion, Position, RegionId};
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Errors reported by the location service for a monitoring request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location service unavailable: {0}")]
    Unavailable(String),
    #[error("location service region limit of {0} reached")]
    RegionLimit(usize),
}

/// Calls into the platform location service
///
/// Implementations must not block: requests are handed to the service and
/// results come back later as `LocationSignal`s.
pub trait LocationSource: Send + Sync {
    /// Whether circular region monitoring is supported at all
    fn is_monitoring_available(&self) -> bool {
        true
    }

    /// Current platform authorization status
    fn authorization_status(&self) -> AuthorizationStatus;

    fn request_authorization(&self);

    fn start_updating_location(&self);

    fn start_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError>;

    fn stop_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError>;
}

/// Messages pushed by the location service
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSignal {
    /// New device fix
    Position(Position),
    /// Boundary crossing into a monitored region
    Entered { region_id: RegionId, ts: u64 },
    /// Boundary crossing out of a monitored region
    Exited { region_id: RegionId, ts: u64 },
    /// Region monitoring failed (region is None for service-wide failures)
    MonitoringFailed { region_id: Option<RegionId>, error: String, ts: u64 },
    AuthorizationChanged(AuthorizationStatus),
    /// Service-level error not tied to region monitoring
    LocationError { error: String },
}

impl LocationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSignal::Position(_) => "position",
            LocationSignal::Entered { .. } => "entered",
            LocationSignal::Exited { .. } => "exited",
            LocationSignal::MonitoringFailed { .. } => "monitoring_failed",
            LocationSignal::AuthorizationChanged(_) => "authorization_changed",
            LocationSignal::LocationError { .. } => "location_error",
        }
    }
}

/// Non-blocking sender for location signals
///
/// Clone this to share across producers. Uses try_send: if the monitor falls
/// behind and the channel is full the signal is dropped and counted.
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<LocationSignal>,
    metrics: Arc<Metrics>,
    last_drop_warn: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl SignalSender {
    pub fn new(tx: mpsc::Sender<LocationSignal>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics, last_drop_warn: Arc::new(parking_lot::Mutex::new(None)) }
    }

    /// Deliver a signal. Returns false once the monitor has gone away.
    pub fn send(&self, signal: LocationSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(signal)) => {
                self.metrics.record_signal_dropped();
                // Rate-limit warning to 1 per second
                let mut last = self.last_drop_warn.lock();
                if last.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
                    warn!(signal = %signal.as_str(), "location_signal_dropped: channel full");
                    *last = Some(Instant::now());
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Create a location signal channel pair
pub fn create_signal_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (SignalSender, mpsc::Receiver<LocationSignal>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (SignalSender::new(tx, metrics), rx)
}
