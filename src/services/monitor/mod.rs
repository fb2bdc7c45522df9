//! Geofence monitor - single owner of region and event state
//!
//! The Monitor is the central processor. It owns:
//! - the region registry (what is monitored)
//! - the event log (what happened)
//! - the position tracker (where the device is)
//!
//! Location signals and region commands arrive on bounded channels and are
//! handled one at a time by `run`, so no two mutations ever interleave.

mod handlers;

use crate::domain::types::{GeoRegion, Position, RegionId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::location::{LocationSignal, LocationSource};
use crate::io::render::RenderSink;
use crate::services::event_log::{EventLog, EventLogReader};
use crate::services::position::{AuthorizationState, PositionTracker};
use crate::services::registry::{RegionRegistry, RegistryError, RegistryView};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// Region management request from another task
#[derive(Debug)]
pub enum MonitorCommand {
    AddRegion { region: GeoRegion, reply: oneshot::Sender<Result<(), RegistryError>> },
    RemoveRegion { id: RegionId, reply: oneshot::Sender<Result<(), RegistryError>> },
}

/// Failure of a command sent through a `MonitorHandle`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("monitor is not running")]
    MonitorStopped,
}

/// Cloneable handle for submitting region commands to the monitor
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    /// Create a command channel
    ///
    /// Returns the handle (for producers) and the receiver (for `Monitor::run`)
    pub fn channel(buffer_size: usize) -> (Self, mpsc::Receiver<MonitorCommand>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (Self { tx }, rx)
    }

    pub async fn add_region(&self, region: GeoRegion) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::AddRegion { region, reply })
            .await
            .map_err(|_| CommandError::MonitorStopped)?;
        Ok(rx.await.map_err(|_| CommandError::MonitorStopped)??)
    }

    pub async fn remove_region(&self, id: RegionId) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::RemoveRegion { id, reply })
            .await
            .map_err(|_| CommandError::MonitorStopped)?;
        Ok(rx.await.map_err(|_| CommandError::MonitorStopped)??)
    }
}

/// Central processor for location signals and region commands
pub struct Monitor {
    /// Monitored regions
    pub(crate) registry: RegionRegistry,
    /// Recorded transitions and failures
    pub(crate) log: EventLog,
    /// Latest fix and authorization state
    pub(crate) position: PositionTracker,
    /// Platform location service
    pub(crate) source: Arc<dyn LocationSource>,
    /// Map drawing collaborator
    pub(crate) render: Arc<dyn RenderSink>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Monitor {
    pub fn new(
        config: &Config,
        source: Arc<dyn LocationSource>,
        render: Arc<dyn RenderSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: RegionRegistry::new(config.capacity(), source.clone()),
            log: EventLog::new(),
            position: PositionTracker::new(render.clone(), config.follow_zoom()),
            source,
            render,
            metrics,
        }
    }

    /// Check authorization and begin location delivery if allowed
    pub fn start(&mut self) {
        let status = self.source.authorization_status();
        info!(status = %status.as_str(), "monitor_starting");

        match self.position.on_authorization_status(status) {
            AuthorizationState::Unrequested => {
                self.source.request_authorization();
                self.position.mark_requested();
                info!("authorization_requested");
            }
            AuthorizationState::Granted => self.begin_monitoring(),
            AuthorizationState::Denied => self.warn_denied(),
            _ => {}
        }
    }

    /// Consume signals and commands until shutdown or the signal channel closes
    ///
    /// Queued signals are drained before the next command, so a removal never
    /// cancels a transition that was delivered ahead of it.
    pub async fn run(
        &mut self,
        mut signal_rx: mpsc::Receiver<LocationSignal>,
        mut command_rx: mpsc::Receiver<MonitorCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                signal = signal_rx.recv() => {
                    match signal {
                        Some(s) => self.process_signal(s),
                        None => break, // Channel closed
                    }
                }
                cmd = command_rx.recv(), if commands_open => {
                    match cmd {
                        Some(c) => self.process_command(c),
                        None => commands_open = false,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(events = %self.log.count(), regions = %self.registry.len(), "monitor_stopped");
    }

    /// Process a single location signal, dispatching to the appropriate handler
    pub fn process_signal(&mut self, signal: LocationSignal) {
        let process_start = Instant::now();

        match signal {
            LocationSignal::Position(position) => self.on_position_update(position),
            LocationSignal::Entered { region_id, ts } => self.on_enter(region_id, ts),
            LocationSignal::Exited { region_id, ts } => self.on_exit(region_id, ts),
            LocationSignal::MonitoringFailed { region_id, error, ts } => {
                self.on_monitoring_failure(region_id, error, ts)
            }
            LocationSignal::AuthorizationChanged(status) => self.on_authorization_changed(status),
            LocationSignal::LocationError { error } => self.on_location_error(&error),
        }

        // Record processing latency (lock-free)
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_signal_processed(latency_us);
    }

    /// Process a region command and send the result back
    pub fn process_command(&mut self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::AddRegion { region, reply } => {
                let _ = reply.send(self.add_region(region));
            }
            MonitorCommand::RemoveRegion { id, reply } => {
                let _ = reply.send(self.remove_region(&id));
            }
        }
    }

    pub fn registry_view(&self) -> RegistryView {
        self.registry.view()
    }

    pub fn log_reader(&self) -> EventLogReader {
        self.log.reader()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<Position>> {
        self.position.subscribe()
    }

    pub fn current_position(&self) -> Option<Position> {
        self.position.current()
    }

    pub fn authorization(&self) -> AuthorizationState {
        self.position.authorization()
    }
}
