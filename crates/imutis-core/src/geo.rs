//! # Geo Math
//!
//! Great-circle distance, activity classification and the movement filter
//! that throttles continuous location sampling.
//!
//! ## Movement Filter
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sample Admission (per fix)                           │
//! │                                                                         │
//! │   fix ──► first fix? ── yes ──────────────────────────► EMIT            │
//! │              │                                                          │
//! │              no                                                         │
//! │              ▼                                                          │
//! │   elapsed >= min_interval  AND  distance >= min_distance                │
//! │              │                                    │                     │
//! │             yes                                   no                    │
//! │              ▼                                    ▼                     │
//! │   EMIT, remember fix                          DROP (keep last emitted)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use crate::types::{Activity, PositionFix};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Speed (m/s) above which a subject counts as traveling.
pub const TRAVELING_SPEED_THRESHOLD: f64 = 1.0;

/// Haversine distance in meters between two WGS84 coordinates.
///
/// ```rust
/// use imutis_core::geo::distance_meters;
///
/// let d = distance_meters(0.0, 0.0, 0.0, 1.0);
/// assert!((d - 111_195.0).abs() < 50.0);
/// ```
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

impl Activity {
    /// Traveling iff the reported speed is strictly above 1 m/s.
    ///
    /// A missing speed reading counts as browsing.
    pub fn from_speed(speed: Option<f64>) -> Self {
        match speed {
            Some(s) if s > TRAVELING_SPEED_THRESHOLD => Activity::Traveling,
            _ => Activity::Browsing,
        }
    }
}

// =============================================================================
// Movement Filter
// =============================================================================

/// Thresholds a fix must clear before it is emitted as a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementThresholds {
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        MovementThresholds {
            min_interval: Duration::from_secs(10),
            min_distance_m: 10.0,
        }
    }
}

/// Stateful admission stage between the raw provider feed and subscribers.
///
/// Both thresholds are measured against the last *emitted* fix, so slow
/// drift accumulates until it crosses the distance threshold.
#[derive(Debug, Clone)]
pub struct MovementFilter {
    thresholds: MovementThresholds,
    last_emitted: Option<PositionFix>,
}

impl MovementFilter {
    pub fn new(thresholds: MovementThresholds) -> Self {
        MovementFilter {
            thresholds,
            last_emitted: None,
        }
    }

    pub fn thresholds(&self) -> MovementThresholds {
        self.thresholds
    }

    /// Returns true and records the fix if it should be emitted.
    pub fn admit(&mut self, fix: &PositionFix) -> bool {
        let admitted = match &self.last_emitted {
            None => true,
            Some(last) => {
                let elapsed = fix
                    .timestamp
                    .signed_duration_since(last.timestamp)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let moved = distance_meters(
                    last.latitude,
                    last.longitude,
                    fix.latitude,
                    fix.longitude,
                );
                elapsed >= self.thresholds.min_interval && moved >= self.thresholds.min_distance_m
            }
        };

        if admitted {
            self.last_emitted = Some(*fix);
        }
        admitted
    }

    /// Forgets the last emitted fix so the next one is admitted.
    pub fn reset(&mut self) {
        self.last_emitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fix_at(secs: i64, lat: f64, lon: f64) -> PositionFix {
        PositionFix {
            latitude: lat,
            longitude: lon,
            accuracy: Some(5.0),
            speed: None,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let d = distance_meters(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn test_identical_points_are_zero() {
        for (lat, lon) in [(0.0, 0.0), (4.0511, 9.7679), (-89.9, 179.9), (45.0, -120.0)] {
            assert_eq!(distance_meters(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = distance_meters(4.0511, 9.7679, 3.848, 11.502);
        let b = distance_meters(3.848, 11.502, 4.0511, 9.7679);
        assert!((a - b).abs() < 1e-6);
        // Douala to Yaoundé is roughly 195 km as the crow flies
        assert!(a > 180_000.0 && a < 210_000.0);
    }

    #[test]
    fn test_activity_from_speed() {
        assert_eq!(Activity::from_speed(Some(1.5)), Activity::Traveling);
        assert_eq!(Activity::from_speed(Some(1.0)), Activity::Browsing);
        assert_eq!(Activity::from_speed(Some(0.0)), Activity::Browsing);
        assert_eq!(Activity::from_speed(None), Activity::Browsing);
    }

    #[test]
    fn test_filter_requires_both_thresholds() {
        let mut filter = MovementFilter::new(MovementThresholds::default());

        assert!(filter.admit(&fix_at(0, 0.0, 0.0)));
        // far enough, too soon
        assert!(!filter.admit(&fix_at(5, 0.0, 0.001)));
        // late enough, too close (~1 m)
        assert!(!filter.admit(&fix_at(20, 0.0, 0.00001)));
        // both satisfied (~111 m after 30 s)
        assert!(filter.admit(&fix_at(30, 0.0, 0.001)));
    }

    #[test]
    fn test_filter_measures_from_last_emitted() {
        let mut filter = MovementFilter::new(MovementThresholds {
            min_interval: Duration::from_secs(10),
            min_distance_m: 10.0,
        });

        assert!(filter.admit(&fix_at(0, 0.0, 0.0)));
        // ~5.5 m each step: rejected individually, accepted once cumulative >= 10 m
        assert!(!filter.admit(&fix_at(11, 0.0, 0.00005)));
        assert!(filter.admit(&fix_at(22, 0.0, 0.0001)));

        filter.reset();
        assert!(filter.admit(&fix_at(23, 0.0, 0.0001)));
    }
}
