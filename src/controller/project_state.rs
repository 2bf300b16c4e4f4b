//! Persisted project state: everything that survives a restart.
//!
//! Mirrors the shape of the Python project's Pydantic `ProjectState` model,
//! but as a plain serde struct; validation happens at the setter layer in
//! [`crate::controller::transport`], not on every field assignment.

use serde::{Deserialize, Serialize};

use crate::audio_engine::constants::{NUM_BANKS, NUM_SAMPLES};
use crate::messages::SampleAnalysis;

fn none_paths() -> Vec<Option<String>> {
    vec![None; NUM_SAMPLES]
}

fn none_analysis() -> Vec<Option<SampleAnalysis>> {
    vec![None; NUM_SAMPLES]
}

fn none_bpm() -> Vec<Option<f32>> {
    vec![None; NUM_SAMPLES]
}

fn none_key() -> Vec<Option<String>> {
    vec![None; NUM_SAMPLES]
}

fn ones() -> Vec<f32> {
    vec![1.0; NUM_SAMPLES]
}

fn zeros() -> Vec<f32> {
    vec![0.0; NUM_SAMPLES]
}

fn true_flags() -> Vec<bool> {
    vec![true; NUM_SAMPLES]
}

fn four_bars() -> Vec<u32> {
    vec![4; NUM_SAMPLES]
}

fn none_ends() -> Vec<Option<f32>> {
    vec![None; NUM_SAMPLES]
}

fn zero_offsets() -> Vec<i64> {
    vec![0; NUM_SAMPLES]
}

/// The state that gets written to `samples/flitzis_looper.config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    /// Per-pad path to its cached WAV, relative to the project root (POSIX
    /// separators), or `None` if the pad is empty.
    pub sample_paths: Vec<Option<String>>,

    /// Per-pad analysis result (bpm/key/beat grid), if the pad has been
    /// analyzed at least once.
    pub sample_analysis: Vec<Option<SampleAnalysis>>,

    /// Per-pad user-entered BPM override, taking priority over analysis.
    pub manual_bpm: Vec<Option<f32>>,

    /// Per-pad user-entered musical key override.
    pub manual_key: Vec<Option<String>>,

    pub pad_gain: Vec<f32>,
    pub pad_eq_low_db: Vec<f32>,
    pub pad_eq_mid_db: Vec<f32>,
    pub pad_eq_high_db: Vec<f32>,

    pub pad_loop_auto: Vec<bool>,
    pub pad_loop_bars: Vec<u32>,
    pub pad_loop_start_s: Vec<f32>,
    pub pad_loop_end_s: Vec<Option<f32>>,

    /// Integer sample offset applied to the detected beat grid before
    /// snapping, so a slightly early/late beat-detector anchor can be
    /// nudged without re-analyzing the source.
    pub pad_grid_offset_samples: Vec<i64>,

    pub multi_loop: bool,
    pub key_lock: bool,
    pub bpm_lock: bool,

    pub volume: f32,
    pub speed: f32,

    pub selected_pad: usize,
    pub selected_bank: usize,

    pub sidebar_left_expanded: bool,
    pub sidebar_right_expanded: bool,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            sample_paths: none_paths(),
            sample_analysis: none_analysis(),
            manual_bpm: none_bpm(),
            manual_key: none_key(),
            pad_gain: ones(),
            pad_eq_low_db: zeros(),
            pad_eq_mid_db: zeros(),
            pad_eq_high_db: zeros(),
            pad_loop_auto: true_flags(),
            pad_loop_bars: four_bars(),
            pad_loop_start_s: zeros(),
            pad_loop_end_s: none_ends(),
            pad_grid_offset_samples: zero_offsets(),
            multi_loop: false,
            key_lock: false,
            bpm_lock: false,
            volume: 1.0,
            speed: 1.0,
            selected_pad: 0,
            selected_bank: 0,
            sidebar_left_expanded: true,
            sidebar_right_expanded: true,
        }
    }
}

impl ProjectState {
    /// Force every per-pad array to exactly [`NUM_SAMPLES`] entries and clamp
    /// `selected_bank`, so a hand-edited or stale project file can never
    /// desync the rest of the controller from the pad grid's fixed shape.
    pub fn normalize(&mut self) {
        fn resize<T: Clone + Default>(v: &mut Vec<T>, fill: T) {
            v.resize(NUM_SAMPLES, fill);
        }

        resize(&mut self.sample_paths, None);
        resize(&mut self.sample_analysis, None);
        resize(&mut self.manual_bpm, None);
        resize(&mut self.manual_key, None);
        resize(&mut self.pad_gain, 1.0);
        resize(&mut self.pad_eq_low_db, 0.0);
        resize(&mut self.pad_eq_mid_db, 0.0);
        resize(&mut self.pad_eq_high_db, 0.0);
        resize(&mut self.pad_loop_auto, true);
        resize(&mut self.pad_loop_bars, 4);
        resize(&mut self.pad_loop_start_s, 0.0);
        resize(&mut self.pad_loop_end_s, None);
        resize(&mut self.pad_grid_offset_samples, 0);

        if self.selected_bank >= NUM_BANKS {
            self.selected_bank = 0;
        }
        if self.selected_pad >= NUM_SAMPLES {
            self.selected_pad = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_full_length_arrays() {
        let state = ProjectState::default();
        assert_eq!(state.sample_paths.len(), NUM_SAMPLES);
        assert_eq!(state.pad_gain.len(), NUM_SAMPLES);
        assert!(state.pad_gain.iter().all(|g| *g == 1.0));
        assert!(state.pad_loop_auto.iter().all(|a| *a));
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let state: ProjectState = serde_json::from_str(r#"{"volume": 0.5}"#).unwrap();
        assert_eq!(state.volume, 0.5);
        assert_eq!(state.speed, 1.0);
        assert_eq!(state.sample_paths.len(), NUM_SAMPLES);
    }

    #[test]
    fn normalize_fixes_truncated_arrays() {
        let mut state = ProjectState::default();
        state.pad_gain.truncate(3);
        state.selected_bank = 999;
        state.normalize();
        assert_eq!(state.pad_gain.len(), NUM_SAMPLES);
        assert_eq!(state.selected_bank, 0);
    }

    #[test]
    fn missing_grid_offset_samples_loads_as_zero() {
        let mut state: ProjectState = serde_json::from_str(r#"{"volume": 0.5}"#).unwrap();
        state.normalize();
        assert_eq!(state.pad_grid_offset_samples[0], 0);
    }

    #[test]
    fn round_trips_through_json() {
        let mut state = ProjectState::default();
        state.sample_paths[5] = Some("samples/abc.wav".to_string());
        state.manual_bpm[5] = Some(128.0);

        let json = serde_json::to_string(&state).unwrap();
        let restored: ProjectState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.sample_paths[5].as_deref(), Some("samples/abc.wav"));
        assert_eq!(restored.manual_bpm[5], Some(128.0));
    }
}
