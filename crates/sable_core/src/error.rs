//! Typed validation errors for records entering or leaving the store.
//!
//! Live operations clamp out-of-range numbers instead of failing; these
//! errors are raised only by the explicit `validate()` checks.

/// A specific reason a record failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("{0} is not a finite number")]
    NonFinite(&'static str),

    #[error("Unknown emotion type: {0}")]
    UnknownEmotionType(String),

    #[error("Unknown body parameter: {0}")]
    UnknownBodyParam(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Check that `value` is finite and inside `[min, max]`.
pub fn check_range(
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(field));
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Check the common `[0, 1]` range.
pub fn check_unit(field: &'static str, value: f32) -> Result<(), ValidationError> {
    check_range(field, value, 0.0, 1.0)
}

/// Replace NaN/Inf with `fallback`.
#[inline]
pub(crate) fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected, resetting to fallback {}", fallback);
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range_accepts_bounds() {
        assert!(check_range("valence", -1.0, -1.0, 1.0).is_ok());
        assert!(check_unit("energy", 1.0).is_ok());
        assert!(check_unit("energy", 0.0).is_ok());
    }

    #[test]
    fn test_check_range_rejects_outside() {
        let err = check_unit("stress", 1.2).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "stress", .. }));
        assert_eq!(
            check_unit("stress", f32::NAN).unwrap_err(),
            ValidationError::NonFinite("stress")
        );
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        assert_eq!(sanitize_f32(f32::INFINITY, 0.5), 0.5);
        assert_eq!(sanitize_f32(0.25, 0.5), 0.25);
    }
}
