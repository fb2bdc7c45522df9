//! Scripted location source
//!
//! Stands in for the platform location service by replaying a JSONL script.
//! Each line is one JSON object tagged by `type`:
//!
//! ```text
//! {"type":"authorization","status":"authorized_when_in_use"}
//! {"type":"add_region","id":"home","lat":10.0,"lon":20.0,"radius_m":200}
//! {"type":"position","lat":10.0,"lon":20.0,"accuracy":5.0}
//! {"type":"enter","region":"home","ts":100}
//! {"type":"exit","region":"home"}
//! {"type":"failure","error":"monitoring unavailable"}
//! {"type":"location_error","error":"gps unavailable"}
//! {"type":"remove_region","id":"home"}
//! {"type":"sleep","ms":500}
//! ```
//!
//! Blank lines and `#` comments are skipped. A missing `ts` means "now".
//! Positions are only delivered once location updates are running; after an
//! authorized `authorization` line the replay waits (up to one second) for the
//! monitor to start them, so a fix may directly follow the grant.
//! Enter/exit lines are forwarded as scripted, including for regions that are
//! no longer monitored, so removal races can be reproduced.

use crate::domain::types::{
    epoch_ms, AuthorizationStatus, Coordinate, GeoRegion, Position, RegionId,
};
use crate::infra::config::Config;
use crate::io::location::{LocationError, LocationSignal, LocationSource, SignalSender};
use crate::services::monitor::MonitorHandle;
use anyhow::Context;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Poll interval while waiting for location updates after a grant
const UPDATES_POLL: Duration = Duration::from_millis(1);
/// Give up waiting for location updates after this long
const UPDATES_WAIT: Duration = Duration::from_secs(1);

/// One line of a replay script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEntry {
    Position {
        lat: f64,
        lon: f64,
        #[serde(default)]
        accuracy: f64,
        ts: Option<u64>,
    },
    Enter {
        region: String,
        ts: Option<u64>,
    },
    Exit {
        region: String,
        ts: Option<u64>,
    },
    Failure {
        #[serde(default)]
        region: Option<String>,
        error: String,
        ts: Option<u64>,
    },
    Authorization {
        status: AuthorizationStatus,
    },
    LocationError {
        error: String,
    },
    AddRegion {
        id: Option<String>,
        lat: f64,
        lon: f64,
        radius_m: Option<f64>,
    },
    RemoveRegion {
        id: String,
    },
    Sleep {
        ms: u64,
    },
}

/// Parse a replay script, skipping comments, blank and malformed lines
pub fn parse_script(content: &str) -> Vec<ScriptEntry> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match serde_json::from_str::<ScriptEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(line = %(idx + 1), error = %e, "script_line_invalid");
                    None
                }
            }
        })
        .collect()
}

/// Load and parse a replay script from disk
pub fn load_script<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ScriptEntry>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay script {}", path.display()))?;
    Ok(parse_script(&content))
}

/// Location source driven by a replay script
pub struct ReplaySource {
    /// Regions the simulated platform is monitoring
    monitored: Mutex<FxHashSet<RegionId>>,
    region_limit: usize,
    monitoring_available: bool,
    status: Mutex<AuthorizationStatus>,
    updating: AtomicBool,
    distance_filter_m: f64,
    /// Last fix handed to the monitor, for the distance filter
    last_delivered: Mutex<Option<Coordinate>>,
}

impl ReplaySource {
    pub fn new(config: &Config) -> Self {
        Self {
            monitored: Mutex::new(FxHashSet::default()),
            region_limit: config.platform_region_limit(),
            monitoring_available: config.monitoring_available(),
            status: Mutex::new(config.initial_authorization()),
            updating: AtomicBool::new(false),
            distance_filter_m: config.distance_filter_m(),
            last_delivered: Mutex::new(None),
        }
    }

    /// Regions currently monitored on the platform side
    pub fn monitored_regions(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self.monitored.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Relaxed)
    }

    /// Apply the platform's delivery rules to a fix
    ///
    /// Fixes are only delivered after location updates were started, and only
    /// once the device moved at least the distance filter since the last one.
    fn accept_fix(&self, position: &Position) -> bool {
        if !self.is_updating() {
            return false;
        }

        let mut last = self.last_delivered.lock();
        let coordinate = position.coordinate();
        if let Some(prev) = *last {
            if self.distance_filter_m > 0.0 && prev.distance_to(&coordinate) < self.distance_filter_m
            {
                return false;
            }
        }
        *last = Some(coordinate);
        true
    }

    /// Hold the script until the monitor has started location updates
    ///
    /// A grant only turns updates on once the monitor handles it; fixes
    /// scripted right after the grant would otherwise be filtered.
    async fn wait_for_updates(&self, shutdown: &mut watch::Receiver<bool>) {
        let wait = async {
            while !self.is_updating() {
                tokio::time::sleep(UPDATES_POLL).await;
            }
        };
        tokio::select! {
            result = tokio::time::timeout(UPDATES_WAIT, wait) => {
                if result.is_err() {
                    warn!("replay_location_updates_not_started");
                }
            }
            _ = shutdown.changed() => {}
        }
    }

    /// Replay the script into the monitor
    ///
    /// Region commands go through the handle; everything else is pushed as a
    /// location signal. Returns when the script ends, the monitor goes away,
    /// or shutdown is signalled.
    pub async fn run(
        &self,
        entries: Vec<ScriptEntry>,
        signals: SignalSender,
        handle: MonitorHandle,
        default_radius_m: f64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(entries = %entries.len(), "replay_started");

        for entry in entries {
            if *shutdown.borrow() {
                info!("replay_shutdown");
                return;
            }

            let signal = match entry {
                ScriptEntry::Sleep { ms } => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
                ScriptEntry::AddRegion { id, lat, lon, radius_m } => {
                    let center = Coordinate::new(lat, lon);
                    let radius_m = radius_m.unwrap_or(default_radius_m);
                    let region = match id {
                        Some(id) => GeoRegion::new(id, center, radius_m),
                        None => GeoRegion::at_center(center, radius_m),
                    };
                    match region {
                        Ok(region) => {
                            if let Err(e) = handle.add_region(region).await {
                                warn!(error = %e, "replay_add_region_failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "replay_region_invalid"),
                    }
                    continue;
                }
                ScriptEntry::RemoveRegion { id } => {
                    if let Err(e) = handle.remove_region(RegionId(id)).await {
                        warn!(error = %e, "replay_remove_region_failed");
                    }
                    continue;
                }
                ScriptEntry::Position { lat, lon, accuracy, ts } => {
                    let position =
                        Position { lat, lon, accuracy_m: accuracy, ts: ts.unwrap_or_else(epoch_ms) };
                    if !self.accept_fix(&position) {
                        debug!(lat = %lat, lon = %lon, "replay_fix_filtered");
                        continue;
                    }
                    LocationSignal::Position(position)
                }
                ScriptEntry::Enter { region, ts } => LocationSignal::Entered {
                    region_id: RegionId(region),
                    ts: ts.unwrap_or_else(epoch_ms),
                },
                ScriptEntry::Exit { region, ts } => LocationSignal::Exited {
                    region_id: RegionId(region),
                    ts: ts.unwrap_or_else(epoch_ms),
                },
                ScriptEntry::Failure { region, error, ts } => LocationSignal::MonitoringFailed {
                    region_id: region.map(RegionId),
                    error,
                    ts: ts.unwrap_or_else(epoch_ms),
                },
                ScriptEntry::Authorization { status } => {
                    *self.status.lock() = status;
                    LocationSignal::AuthorizationChanged(status)
                }
                ScriptEntry::LocationError { error } => LocationSignal::LocationError { error },
            };

            let granted =
                matches!(&signal, LocationSignal::AuthorizationChanged(s) if s.is_authorized());

            if !signals.send(signal) {
                warn!("replay_signal_channel_closed");
                return;
            }

            if granted {
                self.wait_for_updates(&mut shutdown).await;
            }
        }

        info!("replay_finished");
    }
}

impl LocationSource for ReplaySource {
    fn is_monitoring_available(&self) -> bool {
        self.monitoring_available
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock()
    }

    fn request_authorization(&self) {
        // The answer arrives later as an `authorization` script line
        debug!("replay_authorization_requested");
    }

    fn start_updating_location(&self) {
        self.updating.store(true, Ordering::Relaxed);
        debug!("replay_location_updates_started");
    }

    fn start_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError> {
        let mut monitored = self.monitored.lock();
        if !monitored.contains(region.id()) && monitored.len() >= self.region_limit {
            return Err(LocationError::RegionLimit(self.region_limit));
        }
        monitored.insert(region.id().clone());
        Ok(())
    }

    fn stop_monitoring(&self, region: &GeoRegion) -> Result<(), LocationError> {
        self.monitored.lock().remove(region.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_entries() {
        let script = r#"
# demo
{"type":"add_region","id":"home","lat":10.0,"lon":20.0,"radius_m":200}
{"type":"enter","region":"home","ts":100}
{"type":"failure","error":"service unavailable","ts":7}

{"type":"authorization","status":"denied"}
{"type":"sleep","ms":5}
"#;
        let entries = parse_script(script);
        assert_eq!(entries.len(), 5);
        assert_eq!(
            entries[0],
            ScriptEntry::AddRegion {
                id: Some("home".to_string()),
                lat: 10.0,
                lon: 20.0,
                radius_m: Some(200.0)
            }
        );
        assert_eq!(entries[1], ScriptEntry::Enter { region: "home".to_string(), ts: Some(100) });
        assert_eq!(
            entries[2],
            ScriptEntry::Failure {
                region: None,
                error: "service unavailable".to_string(),
                ts: Some(7)
            }
        );
        assert_eq!(entries[3], ScriptEntry::Authorization { status: AuthorizationStatus::Denied });
    }

    #[test]
    fn test_parse_script_skips_malformed_lines() {
        let script = "not json\n{\"type\":\"teleport\"}\n{\"type\":\"exit\",\"region\":\"a\"}\n";
        let entries = parse_script(script);
        assert_eq!(entries, vec![ScriptEntry::Exit { region: "a".to_string(), ts: None }]);
    }

    #[test]
    fn test_platform_region_limit() {
        let source = ReplaySource::new(&Config::default());
        for i in 0..20 {
            let region = GeoRegion::at_center(Coordinate::new(i as f64, 0.0), 100.0).unwrap();
            source.start_monitoring(&region).unwrap();
        }
        let extra = GeoRegion::new("extra", Coordinate::new(0.0, 1.0), 100.0).unwrap();
        assert_eq!(source.start_monitoring(&extra), Err(LocationError::RegionLimit(20)));

        let first = GeoRegion::at_center(Coordinate::new(0.0, 0.0), 100.0).unwrap();
        source.stop_monitoring(&first).unwrap();
        assert!(source.start_monitoring(&extra).is_ok());
        assert_eq!(source.monitored_regions().len(), 20);
    }

    #[tokio::test]
    async fn test_fix_right_after_grant_is_delivered() {
        use crate::infra::metrics::Metrics;
        use crate::io::location::create_signal_channel;
        use std::sync::Arc;

        let source = Arc::new(ReplaySource::new(&Config::default()));
        let (signals, mut signal_rx) = create_signal_channel(8, Arc::new(Metrics::new()));
        let (handle, _command_rx) = MonitorHandle::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        // Stand-in monitor: a grant starts location updates
        let consumer_source = source.clone();
        let consumer = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(signal) = signal_rx.recv().await {
                if let LocationSignal::AuthorizationChanged(status) = &signal {
                    if status.is_authorized() {
                        consumer_source.start_updating_location();
                    }
                }
                received.push(signal.as_str());
            }
            received
        });

        let entries = parse_script(
            "{\"type\":\"authorization\",\"status\":\"authorized_always\"}\n\
             {\"type\":\"position\",\"lat\":10.0,\"lon\":20.0,\"ts\":1}\n",
        );
        source.run(entries, signals, handle, 200.0, shutdown_rx).await;

        let received = consumer.await.unwrap();
        assert_eq!(received, vec!["authorization_changed", "position"]);
    }

    #[test]
    fn test_fixes_need_updates_and_distance() {
        let source = ReplaySource::new(&Config::default());
        let fix = |lat: f64| Position { lat, lon: 0.0, accuracy_m: 5.0, ts: 1 };

        // Not delivered before location updates start
        assert!(!source.accept_fix(&fix(0.0)));

        source.start_updating_location();
        assert!(source.accept_fix(&fix(0.0)));
        // ~11 m away: under the 100 m filter
        assert!(!source.accept_fix(&fix(0.0001)));
        // ~111 m away from the last delivered fix
        assert!(source.accept_fix(&fix(0.001)));
    }
}
