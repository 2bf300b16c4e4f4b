//! Global playback modes: multi-loop, key lock, BPM lock, volume, speed.
//!
//! Grounded 1:1 on `controller/transport/global_params.py`'s
//! `GlobalParametersController`.

use pyo3::prelude::*;

use crate::audio_engine::constants::{SPEED_MAX, SPEED_MIN, VOLUME_MAX, VOLUME_MIN};
use crate::controller::validation::{ensure_finite, normalize_bpm};
use crate::controller::Controller;
use pyo3::exceptions::PyValueError;

#[pymethods]
impl Controller {
    pub fn set_multi_loop(&mut self, enabled: bool) -> PyResult<()> {
        self.project.multi_loop = enabled;
        let _ = self.audio.set_multi_loop(enabled);
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_key_lock(&mut self, enabled: bool) -> PyResult<()> {
        if enabled == self.project.key_lock {
            return Ok(());
        }

        let _ = self.audio.set_key_lock(enabled);
        self.project.key_lock = enabled;
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_bpm_lock(&mut self, enabled: bool) -> PyResult<()> {
        if enabled == self.project.bpm_lock {
            return Ok(());
        }

        self.project.bpm_lock = enabled;

        if enabled {
            let anchor_pad_id = self.project.selected_pad;
            let anchor_bpm = normalize_bpm(self.effective_bpm_raw(anchor_pad_id));
            self.session.bpm_lock_anchor_pad_id = Some(anchor_pad_id);
            self.session.bpm_lock_anchor_bpm = anchor_bpm;
        } else {
            self.session.bpm_lock_anchor_pad_id = None;
            self.session.bpm_lock_anchor_bpm = None;
        }

        let _ = self.audio.set_bpm_lock(enabled);
        self.recompute_master_bpm();
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) -> PyResult<()> {
        ensure_finite(volume, "volume").map_err(PyValueError::new_err)?;
        let clamped = volume.clamp(VOLUME_MIN, VOLUME_MAX);
        let _ = self.audio.set_volume(clamped);
        self.project.volume = clamped;
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f32) -> PyResult<()> {
        ensure_finite(speed, "speed").map_err(PyValueError::new_err)?;
        let clamped = speed.clamp(SPEED_MIN, SPEED_MAX);
        let _ = self.audio.set_speed(clamped);
        self.project.speed = clamped;
        self.recompute_master_bpm();
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn reset_speed(&mut self) -> PyResult<()> {
        self.set_speed(1.0)
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
    fn set_volume_clamps_out_of_range() {
        let mut controller = new_controller();
        controller.set_volume(5.0).unwrap();
        assert_eq!(controller.project.volume, 1.0);
        controller.set_volume(-5.0).unwrap();
        assert_eq!(controller.project.volume, 0.0);
    }

    #[test]
    fn set_volume_rejects_nonfinite() {
        let mut controller = new_controller();
        assert!(controller.set_volume(f32::NAN).is_err());
    }

    #[test]
    fn reset_speed_restores_unity() {
        let mut controller = new_controller();
        controller.set_speed(1.5).unwrap();
        controller.reset_speed().unwrap();
        assert_eq!(controller.project.speed, 1.0);
    }

    #[test]
    fn bpm_lock_anchors_and_clears() {
        let mut controller = new_controller();
        controller.set_manual_bpm(0, 120.0).unwrap();
        controller.project.selected_pad = 0;

        controller.set_bpm_lock(true).unwrap();
        assert_eq!(controller.session.bpm_lock_anchor_pad_id, Some(0));
        assert_eq!(controller.session.master_bpm, Some(120.0));

        controller.set_bpm_lock(false).unwrap();
        assert_eq!(controller.session.bpm_lock_anchor_pad_id, None);
        assert_eq!(controller.session.master_bpm, None);
    }
}
