//! Device position tracking and location authorization state
//!
//! The tracker keeps only the latest fix: every delivery replaces the
//! previous one and asks the renderer to follow it. History lives in the
//! event log, not here.

use crate::domain::types::{AuthorizationStatus, Position};
use crate::io::render::RenderSink;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Authorization lifecycle for location delivery
///
/// `Unrequested -> Requested -> {Granted, Denied}`, and `Granted` moves to
/// `Monitoring` once location updates are started. `Denied` is left only when
/// a later status signal says so; nothing here retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Unrequested,
    Requested,
    Granted,
    Denied,
    Monitoring,
}

impl AuthorizationState {
    /// Next state after the platform reports `status`
    pub fn on_status(self, status: AuthorizationStatus) -> Self {
        match status {
            s if s.is_authorized() => match self {
                AuthorizationState::Monitoring => AuthorizationState::Monitoring,
                _ => AuthorizationState::Granted,
            },
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                AuthorizationState::Denied
            }
            // Not determined: an outstanding request stays outstanding,
            // anything else was reset out-of-band
            _ => match self {
                AuthorizationState::Requested => AuthorizationState::Requested,
                _ => AuthorizationState::Unrequested,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationState::Unrequested => "unrequested",
            AuthorizationState::Requested => "requested",
            AuthorizationState::Granted => "granted",
            AuthorizationState::Denied => "denied",
            AuthorizationState::Monitoring => "monitoring",
        }
    }
}

/// Latest known device position
pub struct PositionTracker {
    current: Option<Position>,
    authorization: AuthorizationState,
    render: Arc<dyn RenderSink>,
    follow_zoom: f64,
    position_tx: watch::Sender<Option<Position>>,
}

impl PositionTracker {
    pub fn new(render: Arc<dyn RenderSink>, follow_zoom: f64) -> Self {
        let (position_tx, _) = watch::channel(None);
        Self {
            current: None,
            authorization: AuthorizationState::Unrequested,
            render,
            follow_zoom,
            position_tx,
        }
    }

    /// Replace the current position and ask the renderer to follow it
    pub fn on_position_update(&mut self, position: Position) {
        self.current = Some(position);
        self.position_tx.send_replace(Some(position));
        self.render.recenter(&position, self.follow_zoom);

        debug!(
            lat = %position.lat,
            lon = %position.lon,
            accuracy_m = %position.accuracy_m,
            "position_updated"
        );
    }

    /// Latest fix, None before the first update
    pub fn current(&self) -> Option<Position> {
        self.current
    }

    /// Receiver that always holds the latest fix
    pub fn subscribe(&self) -> watch::Receiver<Option<Position>> {
        self.position_tx.subscribe()
    }

    pub fn authorization(&self) -> AuthorizationState {
        self.authorization
    }

    /// Apply a platform status and return the new state
    pub fn on_authorization_status(&mut self, status: AuthorizationStatus) -> AuthorizationState {
        self.authorization = self.authorization.on_status(status);
        self.authorization
    }

    pub(crate) fn mark_requested(&mut self) {
        self.authorization = AuthorizationState::Requested;
    }

    pub(crate) fn mark_monitoring(&mut self) {
        self.authorization = AuthorizationState::Monitoring;
    }
}
