//! Pad triggering, stopping, pause/resume.
//!
//! Grounded 1:1 on `controller/transport/playback.py`'s
//! `PadPlaybackController`. Active/paused-pad bookkeeping is deliberately
//! *not* updated here: it's driven purely by the audio thread's
//! `SampleStarted`/`SampleStopped` messages (see
//! [`crate::controller::metering`]) so a dropped or reordered control
//! message can never desync session state from what's actually playing.
//! Pause/resume are the one exception, since there's no dedicated
//! pause/resume acknowledgement message; they're applied optimistically,
//! matching the Python original.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio_engine::constants::NUM_SAMPLES;
use crate::controller::Controller;

fn id_out_of_range(id: usize) -> PyErr {
    PyValueError::new_err(format!(
        "id out of range (expected 0..{}, got {id})",
        NUM_SAMPLES - 1
    ))
}

#[pymethods]
impl Controller {
    /// Trigger or retrigger a pad's loop. Stops every other active pad first
    /// unless multi-loop is enabled.
    pub fn trigger_pad(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if self.project.sample_paths[id].is_none() {
            return Ok(());
        }

        if !self.project.multi_loop {
            self.stop_all_pads()?;
        }

        self.apply_effective_loop_region_to_audio(id);
        self.audio.play_sample(id, 1.0)
    }

    /// Trigger a pad without stopping any other currently-playing pad,
    /// regardless of multi-loop. Used by workflows (e.g. the waveform
    /// editor) where starting preview playback must not disturb the mix.
    pub fn trigger_pad_keep_others(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if self.project.sample_paths[id].is_none() {
            return Ok(());
        }

        self.apply_effective_loop_region_to_audio(id);
        self.audio.play_sample(id, 1.0)
    }

    pub fn stop_pad(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if !self.session.active_sample_ids.contains(&id) {
            return Ok(());
        }

        self.audio.stop_sample(id)
    }

    pub fn stop_all_pads(&mut self) -> PyResult<()> {
        self.audio.stop_all()
    }

    pub fn pause_pad(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if !self.session.active_sample_ids.contains(&id) {
            return Ok(());
        }
        if self.session.paused_sample_ids.contains(&id) {
            return Ok(());
        }

        self.audio.pause_sample(id)?;
        self.session.paused_sample_ids.insert(id);
        Ok(())
    }

    pub fn resume_pad(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if !self.session.active_sample_ids.contains(&id) {
            return Ok(());
        }
        if !self.session.paused_sample_ids.contains(&id) {
            return Ok(());
        }

        self.audio.resume_sample(id)?;
        self.session.paused_sample_ids.remove(&id);
        Ok(())
    }

    /// Record whether a pad's on-screen button is currently held down, so
    /// the UI can debounce repeated trigger events while a pad is pressed.
    pub fn set_pad_pressed(&mut self, id: usize, pressed: bool) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        self.session.pressed_pads[id] = pressed;
        Ok(())
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
    fn trigger_pad_on_empty_pad_is_noop() {
        let mut controller = new_controller();
        controller.trigger_pad(0).unwrap();
    }

    #[test]
    fn pause_resume_noop_when_not_active() {
        let mut controller = new_controller();
        controller.pause_pad(0).unwrap();
        assert!(!controller.session.paused_sample_ids.contains(&0));
        controller.resume_pad(0).unwrap();
        assert!(!controller.session.paused_sample_ids.contains(&0));
    }

    #[test]
    fn set_pad_pressed_tracks_hold_state() {
        let mut controller = new_controller();
        controller.set_pad_pressed(3, true).unwrap();
        assert!(controller.session.pressed_pads[3]);
        controller.set_pad_pressed(3, false).unwrap();
        assert!(!controller.session.pressed_pads[3]);
    }

    #[test]
    fn stop_pad_on_inactive_pad_is_noop() {
        let mut controller = new_controller();
        controller.stop_pad(0).unwrap();
    }
}
