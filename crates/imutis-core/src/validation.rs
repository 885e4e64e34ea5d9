//! # Validation Module
//!
//! Input validation and normalization helpers.
//!
//! ## Usage
//! ```rust
//! use imutis_core::validation::{normalize_fingerprint, validate_coordinates};
//!
//! let fp = normalize_fingerprint(&[Some("Apple"), Some("iPhone 15"), None]);
//! assert_eq!(fp, "Apple-iPhone_15-unknown");
//!
//! assert!(validate_coordinates(4.05, 9.76).is_ok());
//! assert!(validate_coordinates(120.0, 9.76).is_err());
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::UNKNOWN;

// =============================================================================
// Fingerprint
// =============================================================================

/// Joins device attributes with `-`, then replaces every whitespace
/// character with `_`.
///
/// Missing or blank parts become `unknown` so the fingerprint always has the
/// same number of segments.
pub fn normalize_fingerprint(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .map(|p| match p {
            Some(v) if !v.trim().is_empty() => *v,
            _ => UNKNOWN,
        })
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

// =============================================================================
// Coordinates
// =============================================================================

/// Validates a WGS84 latitude/longitude pair.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> ValidationResult<()> {
    check_axis("latitude", latitude, 90.0)?;
    check_axis("longitude", longitude, 180.0)
}

fn check_axis(field: &str, value: f64, limit: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if value < -limit || value > limit {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: -limit,
            max: limit,
        });
    }
    Ok(())
}

// =============================================================================
// Identifiers
// =============================================================================

/// Validates the subject a location sample is attributed to.
pub fn validate_subject_id(subject_id: &str) -> ValidationResult<()> {
    if subject_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "subject_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a minimum-distance threshold in meters.
pub fn validate_min_distance(meters: f64) -> ValidationResult<()> {
    if !meters.is_finite() || meters < 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "minimum_distance_m".to_string(),
        });
    }
    Ok(())
}
