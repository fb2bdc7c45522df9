//! Event table display
//!
//! Periodically reads rows appended to the event log since the last refresh
//! and logs them, one line per event.

use crate::services::event_log::EventLogReader;
use crate::services::registry::RegistryView;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Rendered rows appended since `cursor`, and the new cursor
pub fn collect_new_rows(reader: &EventLogReader, cursor: usize) -> (Vec<String>, usize) {
    let events = reader.snapshot_from(cursor);
    let next = cursor + events.len();
    (events.iter().map(|e| e.describe()).collect(), next)
}

/// Log new event rows every `refresh_secs` until shutdown
pub async fn run_event_table(
    reader: EventLogReader,
    regions: RegistryView,
    refresh_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    let mut cursor = 0usize;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (rows, next) = collect_new_rows(&reader, cursor);
                for (offset, row) in rows.iter().enumerate() {
                    info!(row = %(cursor + offset), regions = %regions.len(), "{}", row);
                }
                cursor = next;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    // Flush anything that landed after the last tick
                    let (rows, _) = collect_new_rows(&reader, cursor);
                    for row in rows {
                        info!("{}", row);
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::MonitoringEvent;
    use crate::services::event_log::EventLog;

    #[test]
    fn test_collect_new_rows_advances_cursor() {
        let mut log = EventLog::new();
        let reader = log.reader();
        log.append(MonitoringEvent::Entered { region_id: "home".into(), ts: 0 });

        let (rows, cursor) = collect_new_rows(&reader, 0);
        assert_eq!(rows, vec!["did Enter region: home at 1970-01-01T00:00:00.000Z".to_string()]);
        assert_eq!(cursor, 1);

        let (rows, cursor) = collect_new_rows(&reader, cursor);
        assert!(rows.is_empty());
        assert_eq!(cursor, 1);

        log.append(MonitoringEvent::MonitoringFailed {
            region_id: None,
            ts: 0,
            error: "denied".to_string(),
        });
        let (rows, cursor) = collect_new_rows(&reader, cursor);
        assert_eq!(
            rows,
            vec!["monitoring did fail for region: Unknown at 1970-01-01T00:00:00.000Z: denied"
                .to_string()]
        );
        assert_eq!(cursor, 2);
    }
}
