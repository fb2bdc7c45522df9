//! Append-only log of monitoring events
//!
//! Events are kept in arrival order for the process lifetime. Nothing is
//! reordered, deduplicated or removed: a region that fires "entered" twice in
//! a row produces two entries.

use crate::domain::events::MonitoringEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventLogError {
    #[error("event index {index} out of range (log holds {count} events)")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Writable event log, held by the single monitor task
pub struct EventLog {
    reader: EventLogReader,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self { reader: EventLogReader { events: Arc::new(RwLock::new(Vec::new())) } }
    }

    /// Append an event at the end of the log
    pub fn append(&mut self, event: MonitoringEvent) {
        self.reader.events.write().push(event);
    }

    pub fn count(&self) -> usize {
        self.reader.count()
    }

    pub fn event_at(&self, index: usize) -> Result<MonitoringEvent, EventLogError> {
        self.reader.event_at(index)
    }

    pub fn snapshot(&self) -> Vec<MonitoringEvent> {
        self.reader.snapshot()
    }

    /// Read-only handle for display collaborators on other tasks
    pub fn reader(&self) -> EventLogReader {
        self.reader.clone()
    }
}

/// Read-only handle onto the event log
///
/// Snapshots reflect every append completed before the call; appends that
/// land while a caller iterates a snapshot show up in the next one.
#[derive(Clone)]
pub struct EventLogReader {
    events: Arc<RwLock<Vec<MonitoringEvent>>>,
}

impl EventLogReader {
    pub fn count(&self) -> usize {
        self.events.read().len()
    }

    pub fn event_at(&self, index: usize) -> Result<MonitoringEvent, EventLogError> {
        let events = self.events.read();
        events
            .get(index)
            .cloned()
            .ok_or(EventLogError::IndexOutOfRange { index, count: events.len() })
    }

    pub fn snapshot(&self) -> Vec<MonitoringEvent> {
        self.events.read().clone()
    }

    /// Events appended at or after `start` (empty if `start` is past the end)
    pub fn snapshot_from(&self, start: usize) -> Vec<MonitoringEvent> {
        let events = self.events.read();
        events.get(start..).map(|tail| tail.to_vec()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entered(id: &str, ts: u64) -> MonitoringEvent {
        MonitoringEvent::Entered { region_id: id.into(), ts }
    }

    #[test]
    fn test_append_keeps_order_and_duplicates() {
        let mut log = EventLog::new();
        log.append(entered("r1", 1));
        log.append(entered("r1", 1));
        log.append(MonitoringEvent::Exited { region_id: "r1".into(), ts: 2 });

        assert_eq!(log.count(), 3);
        assert_eq!(log.event_at(0).unwrap(), entered("r1", 1));
        assert_eq!(log.event_at(1).unwrap(), entered("r1", 1));
        assert_eq!(log.snapshot()[2].kind(), "exited");
    }

    #[test]
    fn test_event_at_out_of_range() {
        let mut log = EventLog::new();
        assert_eq!(log.event_at(0), Err(EventLogError::IndexOutOfRange { index: 0, count: 0 }));

        log.append(entered("r1", 1));
        assert_eq!(log.event_at(1), Err(EventLogError::IndexOutOfRange { index: 1, count: 1 }));
    }

    #[test]
    fn test_reader_sees_later_appends() {
        let mut log = EventLog::new();
        let reader = log.reader();
        let before = reader.snapshot();

        log.append(entered("r1", 1));
        log.append(entered("r2", 2));

        assert!(before.is_empty());
        assert_eq!(reader.count(), 2);
        assert_eq!(reader.snapshot_from(1), vec![entered("r2", 2)]);
        assert!(reader.snapshot_from(5).is_empty());
    }
}
