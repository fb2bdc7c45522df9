//! Region registry - the set of monitored geofences
//!
//! The registry exclusively owns every `GeoRegion`. It enforces the
//! monitoring capacity before any call reaches the location source, and keeps
//! its local set and the platform's monitored set in step: a region the
//! platform refuses is rolled back out of the local set.
//!
//! Other tasks read the set through a `RegistryView`, which shares the map
//! behind a read lock. Only the registry owner mutates it.

use crate::domain::types::{GeoRegion, RegionId};
use crate::io::location::{LocationError, LocationSource};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Recoverable registry failures, returned to the caller
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("monitoring capacity of {capacity} regions reached")]
    CapacityExceeded { capacity: usize },
    #[error("region {0} is already monitored")]
    DuplicateIdentifier(RegionId),
    #[error("region {0} is not monitored")]
    NotFound(RegionId),
    #[error("region monitoring is not available")]
    MonitoringUnavailable,
    #[error("location service refused region {id}: {source}")]
    Rejected {
        id: RegionId,
        #[source]
        source: LocationError,
    },
}

type RegionMap = FxHashMap<RegionId, GeoRegion>;

/// Sorted copy of the map contents
fn sorted_regions(map: &RegionMap) -> Vec<GeoRegion> {
    let mut regions: Vec<GeoRegion> = map.values().cloned().collect();
    regions.sort_by(|a, b| a.id().cmp(b.id()));
    regions
}

/// Owner of the monitored region set
pub struct RegionRegistry {
    regions: Arc<RwLock<RegionMap>>,
    capacity: usize,
    source: Arc<dyn LocationSource>,
}

impl RegionRegistry {
    pub fn new(capacity: usize, source: Arc<dyn LocationSource>) -> Self {
        Self { regions: Arc::new(RwLock::new(FxHashMap::default())), capacity, source }
    }

    /// Start monitoring a region
    pub fn add(&mut self, region: GeoRegion) -> Result<(), RegistryError> {
        if !self.source.is_monitoring_available() {
            return Err(RegistryError::MonitoringUnavailable);
        }

        {
            let mut regions = self.regions.write();
            if regions.len() >= self.capacity {
                return Err(RegistryError::CapacityExceeded { capacity: self.capacity });
            }
            if regions.contains_key(region.id()) {
                return Err(RegistryError::DuplicateIdentifier(region.id().clone()));
            }
            regions.insert(region.id().clone(), region.clone());
        }

        // Platform half of the add; roll the local insert back if it fails
        if let Err(source) = self.source.start_monitoring(&region) {
            self.regions.write().remove(region.id());
            warn!(region = %region.id(), error = %source, "region_monitoring_rejected");
            return Err(RegistryError::Rejected { id: region.id().clone(), source });
        }

        info!(
            region = %region.id(),
            center = %region.center(),
            radius_m = %region.radius_m(),
            count = %self.len(),
            "region_added"
        );
        Ok(())
    }

    /// Stop monitoring a region
    ///
    /// The local removal stands even if the platform fails to stop: signals it
    /// still delivers for the region are dropped as unknown.
    pub fn remove(&mut self, id: &RegionId) -> Result<(), RegistryError> {
        let region =
            self.regions.write().remove(id).ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if let Err(e) = self.source.stop_monitoring(&region) {
            warn!(region = %id, error = %e, "region_stop_monitoring_failed");
        }

        info!(region = %id, count = %self.len(), "region_removed");
        Ok(())
    }

    /// Snapshot of all monitored regions, ordered by identifier
    pub fn list(&self) -> Vec<GeoRegion> {
        sorted_regions(&self.regions.read())
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.regions.read().contains_key(id)
    }

    pub fn get(&self, id: &RegionId) -> Option<GeoRegion> {
        self.regions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read-only handle for other tasks
    pub fn view(&self) -> RegistryView {
        RegistryView { regions: self.regions.clone() }
    }
}

/// Read-only view of the registry, safe to hold on other tasks
#[derive(Clone)]
pub struct RegistryView {
    regions: Arc<RwLock<RegionMap>>,
}

impl RegistryView {
    pub fn list(&self) -> Vec<GeoRegion> {
        sorted_regions(&self.regions.read())
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.regions.read().contains_key(id)
    }

    pub fn get(&self, id: &RegionId) -> Option<GeoRegion> {
        self.regions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AuthorizationStatus, Coordinate};
    use parking_lot::Mutex;

    /// Location source that records monitoring calls and can refuse starts
    #[derive(Default)]
    struct FakeSource {
        started: Mutex<Vec<RegionId>>,
        stopped: Mutex<Vec<RegionId>>,
        refuse_start: bool,
        unavailable: bool,
    }

    impl LocationSource for FakeSource {
        fn is_monitoring_available(&self) -> bool {
            !self.unavailable
        }

        fn authorization_status(&self) -> AuthorizationStatus {
            AuthorizationStatus::AuthorizedAlways
        }

        fn request_authorization(&self) {}

        fn start_updating_location(&self) {}

        fn start_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError> {
            if self.refuse_start {
                return Err(LocationError::Unavailable("test".to_string()));
            }
            self.started.lock().push(region.id().clone());
            Ok(())
        }

        fn stop_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError> {
            self.stopped.lock().push(region.id().clone());
            Ok(())
        }
    }

    fn region(id: &str) -> GeoRegion {
        GeoRegion::new(id, Coordinate::new(10.0, 20.0), 200.0).unwrap()
    }

    fn registry(capacity: usize) -> (RegionRegistry, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::default());
        (RegionRegistry::new(capacity, source.clone()), source)
    }

    #[test]
    fn test_add_starts_platform_monitoring() {
        let (mut registry, source) = registry(20);

        registry.add(region("home")).unwrap();

        assert!(registry.contains(&"home".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(*source.started.lock(), vec![RegionId::from("home")]);
    }

    #[test]
    fn test_capacity_exceeded_leaves_set_unchanged() {
        let (mut registry, source) = registry(1);
        registry.add(region("home")).unwrap();

        let err = registry.add(region("work")).unwrap_err();

        assert_eq!(err, RegistryError::CapacityExceeded { capacity: 1 });
        let ids: Vec<_> = registry.list().iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, vec![RegionId::from("home")]);
        // Capacity is checked before the platform is asked
        assert_eq!(source.started.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let (mut registry, _source) = registry(20);
        registry.add(region("home")).unwrap();

        let err = registry.add(region("home")).unwrap_err();

        assert_eq!(err, RegistryError::DuplicateIdentifier("home".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_platform_refusal_rolls_back() {
        let source = Arc::new(FakeSource { refuse_start: true, ..Default::default() });
        let mut registry = RegionRegistry::new(20, source);

        let err = registry.add(region("home")).unwrap_err();

        assert!(matches!(err, RegistryError::Rejected { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unavailable_monitoring_rejected() {
        let source = Arc::new(FakeSource { unavailable: true, ..Default::default() });
        let mut registry = RegionRegistry::new(20, source.clone());

        assert_eq!(registry.add(region("home")), Err(RegistryError::MonitoringUnavailable));
        assert!(source.started.lock().is_empty());
    }

    #[test]
    fn test_remove_stops_platform_monitoring() {
        let (mut registry, source) = registry(20);
        registry.add(region("home")).unwrap();

        registry.remove(&"home".into()).unwrap();

        assert!(!registry.contains(&"home".into()));
        assert_eq!(*source.stopped.lock(), vec![RegionId::from("home")]);
        assert_eq!(registry.remove(&"home".into()), Err(RegistryError::NotFound("home".into())));
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let (mut registry, _source) = registry(3);
        for i in 0..10 {
            let _ = registry.add(region(&format!("r{i}")));
            if i % 3 == 0 {
                let _ = registry.remove(&format!("r{}", i / 2).into());
            }
            assert!(registry.len() <= 3);
        }
    }

    #[test]
    fn test_view_tracks_registry() {
        let (mut registry, _source) = registry(20);
        let view = registry.view();

        registry.add(region("b")).unwrap();
        registry.add(region("a")).unwrap();

        let ids: Vec<_> = view.list().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(view.contains(&"a".into()));

        registry.remove(&"a".into()).unwrap();
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_get_returns_stored_region() {
        let (mut registry, _source) = registry(20);
        let view = registry.view();
        registry.add(region("home")).unwrap();

        assert_eq!(registry.get(&"home".into()), Some(region("home")));
        assert_eq!(view.get(&"home".into()), Some(region("home")));
        assert_eq!(view.get(&"work".into()), None);

        registry.remove(&"home".into()).unwrap();
        assert_eq!(view.get(&"home".into()), None);
    }
}
