//! BPM overrides, tap-tempo detection, and master-BPM computation.
//!
//! Grounded 1:1 on `controller/transport/bpm.py`'s `BpmController`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio_engine::constants::{NUM_SAMPLES, TAP_BPM_MIN_TAPS, TAP_BPM_WINDOW};
use crate::controller::validation::normalize_bpm;
use crate::controller::Controller;

fn id_out_of_range(id: usize) -> PyErr {
    PyValueError::new_err(format!(
        "id out of range (expected 0..{}, got {id})",
        NUM_SAMPLES - 1
    ))
}

impl Controller {
    /// Effective BPM for a pad: manual override if set, else the analysis
    /// result, else unknown. Doesn't validate `id` (callers already have).
    pub(crate) fn effective_bpm_raw(&self, id: usize) -> Option<f32> {
        if let Some(manual) = self.project.manual_bpm[id] {
            return Some(manual);
        }
        self.project.sample_analysis[id].as_ref().map(|a| a.bpm)
    }

    pub(crate) fn recompute_master_bpm(&mut self) {
        if !self.project.bpm_lock {
            self.session.master_bpm = None;
            return;
        }

        let anchor_bpm = match normalize_bpm(self.session.bpm_lock_anchor_bpm) {
            Some(bpm) => bpm,
            None => {
                self.session.master_bpm = None;
                return;
            }
        };

        let master_bpm = anchor_bpm * self.project.speed;
        self.session.master_bpm = Some(master_bpm);
        let _ = self.audio.set_master_bpm(master_bpm);
    }

    /// Push a pad's current effective BPM to the audio engine, and if that
    /// pad is the BPM-lock anchor, recapture the anchor and recompute the
    /// master BPM.
    pub(crate) fn on_pad_bpm_changed(&mut self, id: usize) {
        let bpm = normalize_bpm(self.effective_bpm_raw(id));
        let _ = self.audio.set_pad_bpm(id, bpm);

        if self.session.bpm_lock_anchor_pad_id != Some(id) {
            return;
        }

        self.session.bpm_lock_anchor_bpm = bpm;
        self.recompute_master_bpm();
    }
}

#[pymethods]
impl Controller {
    pub fn effective_bpm(&self, id: usize) -> PyResult<Option<f32>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.effective_bpm_raw(id))
    }

    pub fn set_manual_bpm(&mut self, id: usize, bpm: f32) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(PyValueError::new_err(format!(
                "bpm must be finite and > 0, got {bpm:?}"
            )));
        }

        self.project.manual_bpm[id] = Some(bpm);
        self.on_pad_bpm_changed(id);
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn clear_manual_bpm(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        self.project.manual_bpm[id] = None;
        self.on_pad_bpm_changed(id);
        self.persistence.mark_dirty();
        Ok(())
    }

    /// Register a tap-tempo event for `id` at monotonic time `now_s`
    /// (caller-supplied seconds, since pyo3 code can't call a wall clock
    /// directly from Rust without going through Python's `time.monotonic`).
    ///
    /// Switching the tapped pad resets the sliding window. A non-increasing
    /// timestamp (tapping two pads "simultaneously", or replaying an old
    /// event) is ignored rather than corrupting the average.
    pub fn tap_bpm(&mut self, id: usize, now_s: f64) -> PyResult<Option<f32>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        if self.session.tap_bpm_pad_id != Some(id) {
            self.session.tap_bpm_pad_id = Some(id);
            self.session.tap_bpm_timestamps.clear();
        }

        if let Some(&last) = self.session.tap_bpm_timestamps.last()
            && now_s <= last
        {
            return Ok(None);
        }

        self.session.tap_bpm_timestamps.push(now_s);
        let excess = self
            .session
            .tap_bpm_timestamps
            .len()
            .saturating_sub(TAP_BPM_WINDOW);
        if excess > 0 {
            self.session.tap_bpm_timestamps.drain(0..excess);
        }

        if self.session.tap_bpm_timestamps.len() < TAP_BPM_MIN_TAPS {
            return Ok(None);
        }

        let timestamps = &self.session.tap_bpm_timestamps;
        let avg_interval = timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .sum::<f64>()
            / (timestamps.len() - 1) as f64;

        if avg_interval <= 0.0 {
            return Ok(None);
        }

        let bpm = 60.0 / avg_interval;
        if !bpm.is_finite() {
            return Ok(None);
        }

        let bpm = bpm as f32;
        self.project.manual_bpm[id] = Some(bpm);
        self.on_pad_bpm_changed(id);
        self.persistence.mark_dirty();
        Ok(Some(bpm))
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::project_state::ProjectState;
    use crate::controller::session_state::SessionState;
    use crate::controller::Controller;

    fn new_controller() -> Controller {
        Controller::new_headless(ProjectState::default(), SessionState::new())
    }

    #[test]
    fn tap_bpm_needs_three_taps() {
        let mut controller = new_controller();
        assert_eq!(controller.tap_bpm(0, 0.0).unwrap(), None);
        assert_eq!(controller.tap_bpm(0, 0.5).unwrap(), None);
        let bpm = controller.tap_bpm(0, 1.0).unwrap();
        assert!((bpm.unwrap() - 120.0).abs() < 1e-3);
    }

    #[test]
    fn tap_bpm_resets_window_on_pad_switch() {
        let mut controller = new_controller();
        controller.tap_bpm(0, 0.0).unwrap();
        controller.tap_bpm(0, 0.5).unwrap();
        controller.tap_bpm(1, 1.0).unwrap();
        controller.tap_bpm(1, 1.5).unwrap();
        let bpm = controller.tap_bpm(1, 2.0).unwrap();
        assert!((bpm.unwrap() - 120.0).abs() < 1e-3);
    }

    #[test]
    fn tap_bpm_ignores_non_increasing_timestamps() {
        let mut controller = new_controller();
        controller.tap_bpm(0, 1.0).unwrap();
        assert_eq!(controller.tap_bpm(0, 1.0).unwrap(), None);
        assert_eq!(controller.tap_bpm(0, 0.5).unwrap(), None);
    }

    #[test]
    fn manual_bpm_overrides_analysis() {
        let mut controller = new_controller();
        controller.set_manual_bpm(0, 140.0).unwrap();
        assert_eq!(controller.effective_bpm(0).unwrap(), Some(140.0));
        controller.clear_manual_bpm(0).unwrap();
        assert_eq!(controller.effective_bpm(0).unwrap(), None);
    }

    #[test]
    fn set_manual_bpm_rejects_non_positive() {
        let mut controller = new_controller();
        assert!(controller.set_manual_bpm(0, 0.0).is_err());
        assert!(controller.set_manual_bpm(0, f32::NAN).is_err());
    }
}
