//! Runtime-only state: everything that resets on every process start.
//!
//! Never persisted; rebuilt from scratch each run and partly re-seeded from
//! [`crate::controller::project_state::ProjectState`] when pads are restored.

use std::collections::{HashMap, HashSet};

use crate::audio_engine::constants::NUM_SAMPLES;

pub struct SessionState {
    pub active_sample_ids: HashSet<usize>,
    pub paused_sample_ids: HashSet<usize>,
    pub pressed_pads: Vec<bool>,

    pub pad_peak: Vec<f32>,
    pub pad_peak_updated_at: Vec<f64>,
    pub pad_playhead_s: Vec<Option<f32>>,
    pub pad_playhead_updated_at: Vec<f64>,

    pub loading_sample_ids: HashSet<usize>,
    pub pending_sample_paths: HashMap<usize, String>,
    pub sample_load_progress: HashMap<usize, f32>,
    pub sample_load_stage: HashMap<usize, String>,
    pub sample_load_errors: HashMap<usize, String>,

    pub analyzing_sample_ids: HashSet<usize>,
    pub sample_analysis_progress: HashMap<usize, f32>,
    pub sample_analysis_stage: HashMap<usize, String>,
    pub sample_analysis_errors: HashMap<usize, String>,

    pub file_dialog_pad_id: Option<usize>,
    pub waveform_editor_pad_id: Option<usize>,

    pub tap_bpm_pad_id: Option<usize>,
    pub tap_bpm_timestamps: Vec<f64>,

    pub bpm_lock_anchor_pad_id: Option<usize>,
    pub bpm_lock_anchor_bpm: Option<f32>,
    pub master_bpm: Option<f32>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active_sample_ids: HashSet::new(),
            paused_sample_ids: HashSet::new(),
            pressed_pads: vec![false; NUM_SAMPLES],
            pad_peak: vec![0.0; NUM_SAMPLES],
            pad_peak_updated_at: vec![0.0; NUM_SAMPLES],
            pad_playhead_s: vec![None; NUM_SAMPLES],
            pad_playhead_updated_at: vec![0.0; NUM_SAMPLES],
            loading_sample_ids: HashSet::new(),
            pending_sample_paths: HashMap::new(),
            sample_load_progress: HashMap::new(),
            sample_load_stage: HashMap::new(),
            sample_load_errors: HashMap::new(),
            analyzing_sample_ids: HashSet::new(),
            sample_analysis_progress: HashMap::new(),
            sample_analysis_stage: HashMap::new(),
            sample_analysis_errors: HashMap::new(),
            file_dialog_pad_id: None,
            waveform_editor_pad_id: None,
            tap_bpm_pad_id: None,
            tap_bpm_timestamps: Vec::new(),
            bpm_lock_anchor_pad_id: None,
            bpm_lock_anchor_bpm: None,
            master_bpm: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sample_loaded(&self, id: usize) -> bool {
        !self.loading_sample_ids.contains(&id) && !self.pending_sample_paths.contains_key(&id)
    }

    pub fn is_sample_loading(&self, id: usize) -> bool {
        self.loading_sample_ids.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_full_length_arrays() {
        let session = SessionState::new();
        assert_eq!(session.pad_peak.len(), NUM_SAMPLES);
        assert!(session.active_sample_ids.is_empty());
        assert!(session.pad_playhead_s.iter().all(Option::is_none));
    }
}
