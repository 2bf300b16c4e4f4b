//! Small validation helpers shared across the transport sub-controllers.

/// Returns `value` if it is finite, otherwise `None`. Used to sanitize
/// externally-supplied or derived floats before they're stored or pushed to
/// the audio engine.
pub fn normalize_bpm(bpm: Option<f32>) -> Option<f32> {
    match bpm {
        Some(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => None,
    }
}

pub fn ensure_finite(value: f32, what: &str) -> Result<f32, String> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{what} must be finite, got {value:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bpm_rejects_non_positive_and_nonfinite() {
        assert_eq!(normalize_bpm(Some(120.0)), Some(120.0));
        assert_eq!(normalize_bpm(Some(0.0)), None);
        assert_eq!(normalize_bpm(Some(-1.0)), None);
        assert_eq!(normalize_bpm(Some(f32::NAN)), None);
        assert_eq!(normalize_bpm(None), None);
    }

    #[test]
    fn ensure_finite_rejects_nan_and_infinity() {
        assert!(ensure_finite(1.0, "x").is_ok());
        assert!(ensure_finite(f32::NAN, "x").is_err());
        assert!(ensure_finite(f32::INFINITY, "x").is_err());
    }
}
