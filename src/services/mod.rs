//! Services - business logic and state management
//!
//! This module contains the core geofence services:
//! - `monitor` - Single owner that serializes signals and region commands
//! - `registry` - Monitored region set with capacity enforcement
//! - `event_log` - Append-only log of transitions and failures
//! - `position` - Latest device position and authorization state

pub mod event_log;
pub mod monitor;
pub mod position;
pub mod registry;

// Re-export commonly used types
pub use event_log::{EventLog, EventLogError, EventLogReader};
pub use monitor::{CommandError, Monitor, MonitorCommand, MonitorHandle};
pub use position::{AuthorizationState, PositionTracker};
pub use registry::{RegionRegistry, RegistryError, RegistryView};
