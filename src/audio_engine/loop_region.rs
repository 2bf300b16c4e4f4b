//! Derivation of a pad's effective loop region: user intent (manual
//! endpoints, or bars + beat snap) reduced to integer output-frame
//! boundaries so stem tables stay phase-locked (see
//! [`crate::audio_engine::mixer`]).

/// Quantize a time to an integer output-sample boundary.
///
/// `quantize(t) * fs` is always an integer (up to floating point rounding of
/// the division), which is the invariant the voice engine's phase-lock
/// depends on.
pub fn quantize(time_s: f32, sample_rate_hz: u32) -> f32 {
    if sample_rate_hz == 0 || !time_s.is_finite() {
        return time_s;
    }
    let frames = (time_s as f64 * sample_rate_hz as f64).round().max(0.0);
    (frames / sample_rate_hz as f64) as f32
}

/// Return the beat time closest to `target_s`; identity when `beats` is
/// empty.
pub fn snap_to_nearest_beat(target_s: f32, beats: &[f32]) -> f32 {
    beats
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - target_s)
                .abs()
                .partial_cmp(&(b - target_s).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(target_s)
}

/// Inputs needed to derive a pad's effective loop region.
#[derive(Debug, Clone, Copy)]
pub struct LoopRegionInputs<'a> {
    pub loop_auto: bool,
    pub loop_bars: u32,
    pub loop_start_s: f32,
    pub loop_end_s: Option<f32>,
    pub bpm: Option<f32>,
    pub beats: &'a [f32],
    pub sample_rate_hz: u32,
}

/// Derive the effective loop region per §4.2: never stored directly as
/// frames, always re-derived from project state.
///
/// Returns `(effective_start_s, effective_end_s)`; `effective_end_s` is
/// `None` to mean "loop to sample end".
pub fn effective_region(inputs: LoopRegionInputs<'_>) -> (f32, Option<f32>) {
    let LoopRegionInputs {
        loop_auto,
        loop_bars,
        loop_start_s,
        loop_end_s,
        bpm,
        beats,
        sample_rate_hz,
    } = inputs;

    if !loop_auto {
        let start_s = quantize(loop_start_s, sample_rate_hz);
        let end_s = loop_end_s.map(|e| quantize(e, sample_rate_hz)).filter(|e| *e > start_s);
        return (start_s, end_s);
    }

    let start_s = quantize(snap_to_nearest_beat(loop_start_s, beats), sample_rate_hz);

    let bpm = match bpm.filter(|b| b.is_finite() && *b > 0.0) {
        Some(bpm) => bpm,
        None => {
            let end_s = loop_end_s.map(|e| quantize(e, sample_rate_hz)).filter(|e| *e > start_s);
            return (start_s, end_s);
        }
    };

    let bars = loop_bars.max(1);
    let duration_s = (bars as f32 * 4.0) * 60.0 / bpm;
    let end_s = quantize(
        snap_to_nearest_beat(start_s + duration_s, beats),
        sample_rate_hz,
    );

    if end_s <= start_s {
        (start_s, None)
    } else {
        (start_s, Some(end_s))
    }
}

/// Compute the default loop region for a freshly loaded or reset pad:
/// auto-loop anchored at the first downbeat (falling back to the first beat,
/// then 0.0), four bars, snapped and quantised.
pub fn default_region(
    downbeats: &[f32],
    beats: &[f32],
    bpm: Option<f32>,
    sample_rate_hz: u32,
) -> (f32, Option<f32>, bool) {
    let anchor = downbeats
        .first()
        .or_else(|| beats.first())
        .copied()
        .unwrap_or(0.0);
    let start_s = quantize(snap_to_nearest_beat(anchor, beats), sample_rate_hz);

    let bpm = match bpm.filter(|b| b.is_finite() && *b > 0.0) {
        Some(bpm) => bpm,
        None => return (start_s, None, true),
    };

    let duration_s = (4 * 4) as f32 * 60.0 / bpm;
    let end_s = quantize(
        snap_to_nearest_beat(start_s + duration_s, beats),
        sample_rate_hz,
    );
    (start_s, Some(end_s), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_is_integer_frames() {
        let q = quantize(0.37123, 44_100);
        let frames = (q as f64) * 44_100.0;
        assert!((frames - frames.round()).abs() < 1e-6);
    }

    #[test]
    fn quantize_handles_zero_rate() {
        assert_eq!(quantize(1.5, 0), 1.5);
    }

    #[test]
    fn snap_returns_identity_when_no_beats() {
        assert_eq!(snap_to_nearest_beat(1.23, &[]), 1.23);
    }

    #[test]
    fn snap_picks_closest_beat() {
        let beats = [0.0, 0.5, 1.0, 1.5];
        assert_eq!(snap_to_nearest_beat(0.9, &beats), 1.0);
        assert_eq!(snap_to_nearest_beat(0.2, &beats), 0.0);
    }

    #[test]
    fn effective_region_manual_clears_end_if_not_after_start() {
        let (start, end) = effective_region(LoopRegionInputs {
            loop_auto: false,
            loop_bars: 4,
            loop_start_s: 1.0,
            loop_end_s: Some(0.5),
            bpm: None,
            beats: &[],
            sample_rate_hz: 44_100,
        });
        assert!((start - 1.0).abs() < 1e-4);
        assert_eq!(end, None);
    }

    #[test]
    fn effective_region_auto_with_bpm_120_four_bars_is_8_seconds() {
        let (start, end) = effective_region(LoopRegionInputs {
            loop_auto: true,
            loop_bars: 4,
            loop_start_s: 0.0,
            loop_end_s: None,
            bpm: Some(120.0),
            beats: &[],
            sample_rate_hz: 48_000,
        });
        assert!((start - 0.0).abs() < 1e-6);
        assert!((end.unwrap() - 8.0).abs() < 1e-4);
    }

    #[test]
    fn effective_region_auto_without_bpm_passes_through_quantize() {
        let (start, end) = effective_region(LoopRegionInputs {
            loop_auto: true,
            loop_bars: 4,
            loop_start_s: 0.25,
            loop_end_s: Some(1.0),
            bpm: None,
            beats: &[],
            sample_rate_hz: 44_100,
        });
        assert!(start >= 0.0);
        assert!(end.is_some());
    }

    #[test]
    fn default_region_anchors_on_first_downbeat() {
        let (start, end, auto) = default_region(&[2.0], &[0.0, 1.0, 2.0, 3.0], Some(120.0), 44_100);
        assert!((start - 2.0).abs() < 1e-4);
        assert!(end.is_some());
        assert!(auto);
    }

    #[test]
    fn default_region_without_analysis_has_no_end() {
        let (start, end, auto) = default_region(&[], &[], None, 44_100);
        assert_eq!(start, 0.0);
        assert_eq!(end, None);
        assert!(auto);
    }
}
