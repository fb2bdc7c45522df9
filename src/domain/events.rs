//! Monitoring events recorded in the event log

use crate::domain::types::RegionId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// A recorded region transition or monitoring failure
///
/// Events are immutable once created. `ts` is epoch milliseconds as reported
/// by the location source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum MonitoringEvent {
    Entered {
        region_id: RegionId,
        ts: u64,
    },
    Exited {
        region_id: RegionId,
        ts: u64,
    },
    MonitoringFailed {
        /// None when the failure is not tied to a region (service unavailable)
        region_id: Option<RegionId>,
        ts: u64,
        error: String,
    },
}

impl MonitoringEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitoringEvent::Entered { .. } => "entered",
            MonitoringEvent::Exited { .. } => "exited",
            MonitoringEvent::MonitoringFailed { .. } => "monitoring_failed",
        }
    }

    pub fn region_id(&self) -> Option<&RegionId> {
        match self {
            MonitoringEvent::Entered { region_id, .. } | MonitoringEvent::Exited { region_id, .. } => {
                Some(region_id)
            }
            MonitoringEvent::MonitoringFailed { region_id, .. } => region_id.as_ref(),
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            MonitoringEvent::Entered { ts, .. }
            | MonitoringEvent::Exited { ts, .. }
            | MonitoringEvent::MonitoringFailed { ts, .. } => *ts,
        }
    }

    /// Human readable row for the event table
    pub fn describe(&self) -> String {
        let at = format_ts(self.ts());
        match self {
            MonitoringEvent::Entered { region_id, .. } => {
                format!("did Enter region: {region_id} at {at}")
            }
            MonitoringEvent::Exited { region_id, .. } => {
                format!("did Exit region: {region_id} at {at}")
            }
            MonitoringEvent::MonitoringFailed { region_id, error, .. } => {
                let region = region_id.as_ref().map(|id| id.as_str()).unwrap_or("Unknown");
                format!("monitoring did fail for region: {region} at {at}: {error}")
            }
        }
    }
}

/// Format epoch milliseconds as RFC 3339 (falls back to the raw number)
fn format_ts(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_rows() {
        let entered = MonitoringEvent::Entered { region_id: "home".into(), ts: 0 };
        assert_eq!(entered.describe(), "did Enter region: home at 1970-01-01T00:00:00.000Z");

        let failed = MonitoringEvent::MonitoringFailed {
            region_id: None,
            ts: 1_000,
            error: "service unavailable".to_string(),
        };
        assert_eq!(
            failed.describe(),
            "monitoring did fail for region: Unknown at 1970-01-01T00:00:01.000Z: service unavailable"
        );
        assert_eq!(failed.region_id(), None);
        assert_eq!(failed.kind(), "monitoring_failed");
    }

    #[test]
    fn test_serialize_tagged() {
        let exited = MonitoringEvent::Exited { region_id: "work".into(), ts: 150 };
        let json = serde_json::to_value(&exited).unwrap();
        assert_eq!(json, serde_json::json!({"t": "exited", "region_id": "work", "ts": 150}));
    }
}
