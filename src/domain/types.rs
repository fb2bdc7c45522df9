//! Shared types for the geofence monitor

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Mean Earth radius used for great-circle distances (meters)
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for region identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        RegionId(s.to_string())
    }
}

impl From<String> for RegionId {
    fn from(s: String) -> Self {
        RegionId(s)
    }
}

/// Errors raised when constructing an invalid region
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("radius must be a positive number of meters, got {0}")]
    InvalidRadius(f64),
    #[error("latitude must be within [-90, 90], got {0}")]
    InvalidLatitude(f64),
    #[error("longitude must be within [-180, 180], got {0}")]
    InvalidLongitude(f64),
    #[error("region identifier must not be empty")]
    EmptyIdentifier,
}

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check the coordinate lies on the globe
    pub fn validate(&self) -> Result<(), RegionError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(RegionError::InvalidLatitude(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(RegionError::InvalidLongitude(self.lon));
        }
        Ok(())
    }

    /// Great-circle (haversine) distance in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Circular monitored area
///
/// Immutable once built. Construction validates the center and radius, so
/// every `GeoRegion` in the system satisfies `radius_m > 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoRegion {
    id: RegionId,
    center: Coordinate,
    radius_m: f64,
}

impl GeoRegion {
    pub fn new(
        id: impl Into<RegionId>,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<Self, RegionError> {
        let id = id.into();
        if id.0.trim().is_empty() {
            return Err(RegionError::EmptyIdentifier);
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(RegionError::InvalidRadius(radius_m));
        }
        center.validate()?;

        Ok(Self { id, center, radius_m })
    }

    /// Region whose identifier is derived from the center coordinate text
    pub fn at_center(center: Coordinate, radius_m: f64) -> Result<Self, RegionError> {
        Self::new(center.to_string(), center, radius_m)
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }
}

/// A single reported device position (a "fix")
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,
    /// Epoch milliseconds
    pub ts: u64,
}

impl Position {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Location authorization status as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Denied,
    Restricted,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    #[inline]
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationStatus::AuthorizedWhenInUse | AuthorizationStatus::AuthorizedAlways)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationStatus::NotDetermined => "not_determined",
            AuthorizationStatus::Denied => "denied",
            AuthorizationStatus::Restricted => "restricted",
            AuthorizationStatus::AuthorizedWhenInUse => "authorized_when_in_use",
            AuthorizationStatus::AuthorizedAlways => "authorized_always",
        }
    }
}

impl std::str::FromStr for AuthorizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "not_determined" => AuthorizationStatus::NotDetermined,
            "denied" => AuthorizationStatus::Denied,
            "restricted" => AuthorizationStatus::Restricted,
            "authorized_when_in_use" => AuthorizationStatus::AuthorizedWhenInUse,
            "authorized_always" => AuthorizationStatus::AuthorizedAlways,
            other => return Err(format!("unknown authorization status: {other}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_rejects_non_positive_radius() {
        let center = Coordinate::new(10.0, 20.0);
        assert_eq!(GeoRegion::new("home", center, 0.0), Err(RegionError::InvalidRadius(0.0)));
        assert_eq!(GeoRegion::new("home", center, -5.0), Err(RegionError::InvalidRadius(-5.0)));
        assert!(GeoRegion::new("home", center, f64::NAN).is_err());
        assert!(GeoRegion::new("home", center, 200.0).is_ok());
    }

    #[test]
    fn test_region_rejects_bad_center() {
        assert_eq!(
            GeoRegion::new("x", Coordinate::new(91.0, 0.0), 10.0),
            Err(RegionError::InvalidLatitude(91.0))
        );
        assert_eq!(
            GeoRegion::new("x", Coordinate::new(0.0, -180.5), 10.0),
            Err(RegionError::InvalidLongitude(-180.5))
        );
        assert_eq!(
            GeoRegion::new("  ", Coordinate::new(0.0, 0.0), 10.0),
            Err(RegionError::EmptyIdentifier)
        );
    }

    #[test]
    fn test_identifier_derived_from_center() {
        let region = GeoRegion::at_center(Coordinate::new(10.0, 20.5), 200.0).unwrap();
        assert_eq!(region.id().as_str(), "10.000000,20.500000");
        assert_eq!(region.radius_m(), 200.0);
    }

    #[test]
    fn test_distance_to() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        // One degree of longitude at the equator is ~111.2 km
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 100.0, "distance was {d}");
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_authorization_status_from_str() {
        assert_eq!(
            "authorized_always".parse::<AuthorizationStatus>().unwrap(),
            AuthorizationStatus::AuthorizedAlways
        );
        assert!(!AuthorizationStatus::Restricted.is_authorized());
        assert!(AuthorizationStatus::AuthorizedWhenInUse.is_authorized());
        assert!("sometimes".parse::<AuthorizationStatus>().is_err());
    }
}
