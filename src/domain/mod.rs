//! Domain models - core value types and monitoring events
//!
//! This module contains the canonical data types used throughout the system:
//! - `GeoRegion` - a circular monitored area
//! - `Position` - a single device fix
//! - `AuthorizationStatus` - platform location permission state
//! - `MonitoringEvent` - entries recorded in the event log

pub mod events;
pub mod types;

// Re-export commonly used types at module level
pub use events::MonitoringEvent;
pub use types::{AuthorizationStatus, Coordinate, GeoRegion, Position, RegionError, RegionId};
