//! Per-pad loop-region editing: start/end/auto/bars/grid-offset, and
//! derivation + publication of the effective region to the audio engine.
//!
//! Grounded 1:1 on `controller/transport/loop.py`'s `PadLoopController`, with
//! the quantize/snap math itself living in
//! [`crate::audio_engine::loop_region`] (already grounded there) rather than
//! reimplemented here.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio_engine::constants::NUM_SAMPLES;
use crate::audio_engine::loop_region::{
    LoopRegionInputs, default_region, effective_region, quantize, snap_to_nearest_beat,
};
use crate::controller::Controller;
use crate::controller::validation::ensure_finite;

fn id_out_of_range(id: usize) -> PyErr {
    PyValueError::new_err(format!(
        "id out of range (expected 0..{}, got {id})",
        NUM_SAMPLES - 1
    ))
}

impl Controller {
    fn sample_rate_hz(&self) -> u32 {
        self.audio.output_sample_rate_opt().unwrap_or(44_100)
    }

    /// The pad's detected beat grid, shifted by its `grid_offset_samples` so
    /// a slightly mis-detected anchor can be nudged without re-analyzing.
    fn shifted_beats(&self, id: usize) -> Vec<f32> {
        let offset_s =
            self.project.pad_grid_offset_samples[id] as f32 / self.sample_rate_hz() as f32;
        self.project.sample_analysis[id]
            .as_ref()
            .map(|a| a.beat_grid.beats.iter().map(|b| b + offset_s).collect())
            .unwrap_or_default()
    }

    fn shifted_downbeats(&self, id: usize) -> Vec<f32> {
        let offset_s =
            self.project.pad_grid_offset_samples[id] as f32 / self.sample_rate_hz() as f32;
        self.project.sample_analysis[id]
            .as_ref()
            .map(|a| a.beat_grid.downbeats.iter().map(|b| b + offset_s).collect())
            .unwrap_or_default()
    }

    pub(crate) fn effective_loop_region_raw(&self, id: usize) -> (f32, Option<f32>) {
        let beats = self.shifted_beats(id);
        effective_region(LoopRegionInputs {
            loop_auto: self.project.pad_loop_auto[id],
            loop_bars: self.project.pad_loop_bars[id],
            loop_start_s: self.project.pad_loop_start_s[id],
            loop_end_s: self.project.pad_loop_end_s[id],
            bpm: self.effective_bpm_raw(id),
            beats: &beats,
            sample_rate_hz: self.sample_rate_hz(),
        })
    }

    /// Re-derive and push a pad's effective loop region to the audio engine.
    /// A no-op for empty pads (there's nothing to play yet).
    pub(crate) fn apply_effective_loop_region_to_audio(&mut self, id: usize) {
        if self.project.sample_paths[id].is_none() {
            return;
        }
        let (start_s, end_s) = self.effective_loop_region_raw(id);
        let _ = self.audio.set_pad_loop_region(id, start_s, end_s);
    }
}

#[pymethods]
impl Controller {
    pub fn effective_loop_region(&self, id: usize) -> PyResult<(f32, Option<f32>)> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.effective_loop_region_raw(id))
    }

    /// Reset a pad's loop region to the computed default: auto-loop anchored
    /// at the first downbeat (or first beat, or 0.0), four bars.
    pub fn reset_loop_region(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        let downbeats = self.shifted_downbeats(id);
        let beats = self.shifted_beats(id);
        let bpm = self.effective_bpm_raw(id);
        let sample_rate_hz = self.sample_rate_hz();
        let (start_s, end_s, auto) = default_region(&downbeats, &beats, bpm, sample_rate_hz);

        self.project.pad_loop_start_s[id] = start_s;
        self.project.pad_loop_end_s[id] = end_s;
        self.project.pad_loop_auto[id] = auto;
        self.project.pad_loop_bars[id] = 4;
        self.persistence.mark_dirty();

        self.apply_effective_loop_region_to_audio(id);
        Ok(())
    }

    pub fn set_loop_auto(&mut self, id: usize, enabled: bool) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if enabled == self.project.pad_loop_auto[id] {
            return Ok(());
        }

        self.project.pad_loop_auto[id] = enabled;
        if enabled {
            let beats = self.shifted_beats(id);
            let start_s = snap_to_nearest_beat(self.project.pad_loop_start_s[id], &beats);
            self.project.pad_loop_start_s[id] = quantize(start_s, self.sample_rate_hz());
        }

        self.persistence.mark_dirty();
        self.apply_effective_loop_region_to_audio(id);
        Ok(())
    }

    pub fn set_loop_bars(&mut self, id: usize, bars: u32) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        let bars = bars.max(1);
        if bars == self.project.pad_loop_bars[id] {
            return Ok(());
        }

        self.project.pad_loop_bars[id] = bars;
        self.persistence.mark_dirty();
        self.apply_effective_loop_region_to_audio(id);
        Ok(())
    }

    pub fn set_loop_start(&mut self, id: usize, start_s: f32) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        ensure_finite(start_s, "start_s").map_err(PyValueError::new_err)?;

        let mut start_s = start_s.max(0.0);
        if self.project.pad_loop_auto[id] {
            let beats = self.shifted_beats(id);
            start_s = snap_to_nearest_beat(start_s, &beats);
        }
        start_s = quantize(start_s, self.sample_rate_hz());

        self.project.pad_loop_start_s[id] = start_s;
        self.persistence.mark_dirty();
        self.apply_effective_loop_region_to_audio(id);
        Ok(())
    }

    /// Set a pad's loop end. Passing `None` means "loop to sample end"; a
    /// finite value that doesn't land after the (quantized) start is also
    /// normalized to `None` rather than rejected, so a click that produces
    /// end ≤ start degrades gracefully instead of erroring.
    pub fn set_loop_end(&mut self, id: usize, end_s: Option<f32>) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        let end_s = match end_s {
            None => None,
            Some(e) => {
                ensure_finite(e, "end_s").map_err(PyValueError::new_err)?;
                let e = quantize(e.max(0.0), self.sample_rate_hz());
                let start_s = quantize(self.project.pad_loop_start_s[id], self.sample_rate_hz());
                if e <= start_s { None } else { Some(e) }
            }
        };

        self.project.pad_loop_end_s[id] = end_s;
        self.persistence.mark_dirty();
        self.apply_effective_loop_region_to_audio(id);
        Ok(())
    }

    pub fn set_grid_offset_samples(&mut self, id: usize, offset: i64) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if offset == self.project.pad_grid_offset_samples[id] {
            return Ok(());
        }

        self.project.pad_grid_offset_samples[id] = offset;
        self.persistence.mark_dirty();
        self.apply_effective_loop_region_to_audio(id);
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
    fn set_loop_end_before_start_clears_to_none() {
        let mut controller = new_controller();
        controller.set_loop_start(0, 2.0).unwrap();
        controller.set_loop_end(0, Some(1.0)).unwrap();
        assert_eq!(controller.project.pad_loop_end_s[0], None);
    }

    #[test]
    fn set_loop_end_rejects_nonfinite() {
        let mut controller = new_controller();
        assert!(controller.set_loop_end(0, Some(f32::NAN)).is_err());
    }

    #[test]
    fn effective_region_without_analysis_passes_through_quantize() {
        let mut controller = new_controller();
        controller.set_loop_start(0, 0.1).unwrap();
        let (start, end) = controller.effective_loop_region(0).unwrap();
        assert!(start >= 0.0);
        assert_eq!(end, None);
    }

    #[test]
    fn set_grid_offset_samples_is_idempotent_noop_when_unchanged() {
        let mut controller = new_controller();
        controller.set_grid_offset_samples(0, 0).unwrap();
        assert_eq!(controller.project.pad_grid_offset_samples[0], 0);
        controller.set_grid_offset_samples(0, 128).unwrap();
        assert_eq!(controller.project.pad_grid_offset_samples[0], 128);
    }

    #[test]
    fn reset_loop_region_defaults_to_auto_four_bars() {
        let mut controller = new_controller();
        controller.project.pad_loop_bars[0] = 8;
        controller.project.pad_loop_auto[0] = false;
        controller.reset_loop_region(0).unwrap();
        assert!(controller.project.pad_loop_auto[0]);
        assert_eq!(controller.project.pad_loop_bars[0], 4);
    }
}
