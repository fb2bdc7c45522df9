//! Signal and command handlers for the Monitor
//!
//! Transition handlers record what the location service reports. They never
//! infer a crossing from position data, and they never fail: a signal that
//! cannot be recorded is logged and counted instead.

use super::Monitor;
use crate::domain::events::MonitoringEvent;
use crate::domain::types::{AuthorizationStatus, GeoRegion, Position, RegionId};
use crate::services::position::AuthorizationState;
use crate::services::registry::RegistryError;
use tracing::{debug, info, warn};

impl Monitor {
    /// Handle the device entering a monitored region
    ///
    /// Signals for regions no longer in the registry (removed while the
    /// signal was in flight) are dropped.
    pub(crate) fn on_enter(&mut self, region_id: RegionId, ts: u64) {
        if !self.registry.contains(&region_id) {
            self.metrics.record_unknown_region();
            debug!(region = %region_id, ts = %ts, kind = "entered", "transition_for_unknown_region");
            return;
        }

        info!(region = %region_id, ts = %ts, "region_entered");
        self.metrics.record_entered();
        self.log.append(MonitoringEvent::Entered { region_id, ts });
    }

    /// Handle the device leaving a monitored region
    pub(crate) fn on_exit(&mut self, region_id: RegionId, ts: u64) {
        if !self.registry.contains(&region_id) {
            self.metrics.record_unknown_region();
            debug!(region = %region_id, ts = %ts, kind = "exited", "transition_for_unknown_region");
            return;
        }

        info!(region = %region_id, ts = %ts, "region_exited");
        self.metrics.record_exited();
        self.log.append(MonitoringEvent::Exited { region_id, ts });
    }

    /// Record a monitoring failure, with or without a region
    pub(crate) fn on_monitoring_failure(
        &mut self,
        region_id: Option<RegionId>,
        error: String,
        ts: u64,
    ) {
        warn!(
            region = %region_id.as_ref().map(|id| id.as_str()).unwrap_or("unknown"),
            error = %error,
            ts = %ts,
            "region_monitoring_failed"
        );
        self.metrics.record_monitoring_failure();
        self.log.append(MonitoringEvent::MonitoringFailed { region_id, ts, error });
    }

    pub(crate) fn on_position_update(&mut self, position: Position) {
        self.metrics.record_position_update();
        self.position.on_position_update(position);
    }

    /// React to a platform authorization change
    pub(crate) fn on_authorization_changed(&mut self, status: AuthorizationStatus) {
        let previous = self.position.authorization();
        let next = self.position.on_authorization_status(status);

        info!(
            status = %status.as_str(),
            from = %previous.as_str(),
            to = %next.as_str(),
            "authorization_changed"
        );

        match next {
            AuthorizationState::Granted => self.begin_monitoring(),
            AuthorizationState::Denied if previous != AuthorizationState::Denied => {
                self.warn_denied()
            }
            _ => {}
        }
    }

    /// Service-level location errors are diagnostic only
    pub(crate) fn on_location_error(&mut self, error: &str) {
        self.metrics.record_location_error();
        warn!(error = %error, "location_service_error");
    }

    /// Start location updates and draw every monitored region
    pub(crate) fn begin_monitoring(&mut self) {
        self.source.start_updating_location();
        self.position.mark_monitoring();

        let regions = self.registry.list();
        for region in &regions {
            self.render.draw_region(region);
        }

        info!(regions = %regions.len(), "monitoring_started");
    }

    pub(crate) fn warn_denied(&self) {
        warn!("location_services_denied: enable location services for this app in settings");
    }

    /// Register a region and draw it
    pub fn add_region(&mut self, region: GeoRegion) -> Result<(), RegistryError> {
        match self.registry.add(region.clone()) {
            Ok(()) => {
                self.render.draw_region(&region);
                self.metrics.set_regions_monitored(self.registry.len());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_region_rejected();
                info!(region = %region.id(), error = %e, "region_add_rejected");
                Err(e)
            }
        }
    }

    /// Unregister a region and erase it from the map
    ///
    /// Events already recorded for the region stay in the log.
    pub fn remove_region(&mut self, id: &RegionId) -> Result<(), RegistryError> {
        self.registry.remove(id)?;
        self.render.remove_region(id);
        self.metrics.set_regions_monitored(self.registry.len());
        Ok(())
    }
}
