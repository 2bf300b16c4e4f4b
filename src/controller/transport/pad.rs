//! Per-pad gain, EQ, and manual key override.
//!
//! Grounded 1:1 on `controller/transport/pad.py`'s `PadController`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio_engine::constants::{
    NUM_SAMPLES, PAD_EQ_DB_MAX, PAD_EQ_DB_MIN, PAD_GAIN_MAX, PAD_GAIN_MIN,
};
use crate::controller::validation::ensure_finite;
use crate::controller::Controller;

fn id_out_of_range(id: usize) -> PyErr {
    PyValueError::new_err(format!(
        "id out of range (expected 0..{}, got {id})",
        NUM_SAMPLES - 1
    ))
}

#[pymethods]
impl Controller {
    pub fn set_pad_gain(&mut self, id: usize, gain: f32) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        ensure_finite(gain, "gain").map_err(PyValueError::new_err)?;

        let clamped = gain.clamp(PAD_GAIN_MIN, PAD_GAIN_MAX);
        let _ = self.audio.set_pad_gain(id, clamped);
        self.project.pad_gain[id] = clamped;
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_pad_eq(&mut self, id: usize, low_db: f32, mid_db: f32, high_db: f32) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        for (value, what) in [(low_db, "low_db"), (mid_db, "mid_db"), (high_db, "high_db")] {
            ensure_finite(value, what).map_err(PyValueError::new_err)?;
        }

        let low_db = low_db.clamp(PAD_EQ_DB_MIN, PAD_EQ_DB_MAX);
        let mid_db = mid_db.clamp(PAD_EQ_DB_MIN, PAD_EQ_DB_MAX);
        let high_db = high_db.clamp(PAD_EQ_DB_MIN, PAD_EQ_DB_MAX);

        let _ = self.audio.set_pad_eq(id, low_db, mid_db, high_db);
        self.project.pad_eq_low_db[id] = low_db;
        self.project.pad_eq_mid_db[id] = mid_db;
        self.project.pad_eq_high_db[id] = high_db;
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn set_manual_key(&mut self, id: usize, key: String) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if key.is_empty() {
            return Err(PyValueError::new_err("key must be a non-empty string"));
        }

        self.project.manual_key[id] = Some(key);
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn clear_manual_key(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        self.project.manual_key[id] = None;
        self.persistence.mark_dirty();
        Ok(())
    }

    pub fn effective_key(&self, id: usize) -> PyResult<Option<String>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        if let Some(manual) = &self.project.manual_key[id] {
            return Ok(Some(manual.clone()));
        }
        Ok(self.project.sample_analysis[id].as_ref().map(|a| a.key.clone()))
    }

    // --- File-open dialog and waveform-editor target pad (session state
    // only; the dialog/plot widgets themselves are an external collaborator,
    // see `controller/ui/context.py`'s `open_file_dialog`/
    // `close_file_dialog` and `waveform_editor_open`/`waveform_editor_pad_id`
    // assignments). ---

    pub fn open_file_dialog(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        self.session.file_dialog_pad_id = Some(id);
        Ok(())
    }

    pub fn close_file_dialog(&mut self) {
        self.session.file_dialog_pad_id = None;
    }

    pub fn file_dialog_pad_id(&self) -> Option<usize> {
        self.session.file_dialog_pad_id
    }

    pub fn open_waveform_editor(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        self.session.waveform_editor_pad_id = Some(id);
        Ok(())
    }

    pub fn close_waveform_editor(&mut self) {
        self.session.waveform_editor_pad_id = None;
    }

    pub fn waveform_editor_pad_id(&self) -> Option<usize> {
        self.session.waveform_editor_pad_id
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
    fn set_pad_gain_clamps() {
        let mut controller = new_controller();
        controller.set_pad_gain(0, 5.0).unwrap();
        assert_eq!(controller.project.pad_gain[0], 1.0);
    }

    #[test]
    fn set_pad_eq_clamps_each_band() {
        let mut controller = new_controller();
        controller.set_pad_eq(0, -100.0, 100.0, 0.0).unwrap();
        assert_eq!(controller.project.pad_eq_low_db[0], -24.0);
        assert_eq!(controller.project.pad_eq_mid_db[0], 24.0);
        assert_eq!(controller.project.pad_eq_high_db[0], 0.0);
    }

    #[test]
    fn manual_key_overrides_and_clears() {
        let mut controller = new_controller();
        assert_eq!(controller.effective_key(0).unwrap(), None);
        controller.set_manual_key(0, "Am".to_string()).unwrap();
        assert_eq!(controller.effective_key(0).unwrap().as_deref(), Some("Am"));
        controller.clear_manual_key(0).unwrap();
        assert_eq!(controller.effective_key(0).unwrap(), None);
    }

    #[test]
    fn set_manual_key_rejects_empty() {
        let mut controller = new_controller();
        assert!(controller.set_manual_key(0, String::new()).is_err());
    }

    #[test]
    fn file_dialog_and_waveform_editor_target_pads_open_and_close() {
        let mut controller = new_controller();
        assert_eq!(controller.file_dialog_pad_id(), None);
        controller.open_file_dialog(2).unwrap();
        assert_eq!(controller.file_dialog_pad_id(), Some(2));
        controller.close_file_dialog();
        assert_eq!(controller.file_dialog_pad_id(), None);

        assert_eq!(controller.waveform_editor_pad_id(), None);
        controller.open_waveform_editor(5).unwrap();
        assert_eq!(controller.waveform_editor_pad_id(), Some(5));
        controller.close_waveform_editor();
        assert_eq!(controller.waveform_editor_pad_id(), None);
    }

    #[test]
    fn open_file_dialog_rejects_out_of_range_pad() {
        let mut controller = new_controller();
        assert!(controller.open_file_dialog(NUM_SAMPLES).is_err());
    }
}
