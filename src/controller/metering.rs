//! Drains `AudioMessage`s from the audio thread into [`SessionState`] and
//! decays peak meters.
//!
//! Grounded on `controller/metering.py`'s `MeteringController`: peaks decay
//! exponentially with a fixed half-life, and pad lifecycle (`active_sample_ids`
//! / `paused_sample_ids`) is driven purely by `SampleStarted`/`SampleStopped`
//! messages rather than optimistically set by the trigger/stop call sites;
//! the audio thread is the only source of truth for whether a voice is
//! actually playing.

use crate::audio_engine::constants::{NUM_SAMPLES, PEAK_DECAY_HALF_LIFE_S, PEAK_FLOOR};
use crate::messages::AudioMessage;

use super::Controller;

impl Controller {
    /// Decay every pad's peak meter toward zero given the elapsed time since
    /// its last update, snapping to exactly zero below [`PEAK_FLOOR`].
    fn decay_pad_peaks(&mut self, now: f64) {
        for id in 0..NUM_SAMPLES {
            let peak = self.session.pad_peak[id];
            if peak <= 0.0 {
                continue;
            }

            let last = self.session.pad_peak_updated_at[id];
            let dt = now - last;
            if dt <= 0.0 {
                continue;
            }

            let decayed = peak as f64 * 0.5f64.powf(dt / PEAK_DECAY_HALF_LIFE_S as f64);
            self.session.pad_peak[id] = if decayed < PEAK_FLOOR as f64 {
                0.0
            } else {
                decayed as f32
            };
            self.session.pad_peak_updated_at[id] = now;
        }
    }

    fn handle_audio_message(&mut self, msg: AudioMessage, now: f64) {
        match msg {
            AudioMessage::Pong() | AudioMessage::Stopped() => {}

            AudioMessage::PadPeak { id, peak } => {
                if id >= NUM_SAMPLES || !peak.is_finite() {
                    return;
                }
                let peak = peak.clamp(0.0, 1.0);
                if peak > self.session.pad_peak[id] {
                    self.session.pad_peak[id] = peak;
                }
                self.session.pad_peak_updated_at[id] = now;
            }

            AudioMessage::PadPlayhead { id, position_s } => {
                if id >= NUM_SAMPLES || !position_s.is_finite() || position_s < 0.0 {
                    return;
                }
                self.session.pad_playhead_s[id] = Some(position_s);
                self.session.pad_playhead_updated_at[id] = now;
            }

            AudioMessage::SampleStarted { id } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                self.session.active_sample_ids.insert(id);
                self.session.paused_sample_ids.remove(&id);
            }

            AudioMessage::SampleStopped { id } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                self.session.active_sample_ids.remove(&id);
                self.session.paused_sample_ids.remove(&id);
                self.session.pad_peak[id] = 0.0;
                self.session.pad_peak_updated_at[id] = now;
            }
        }
    }

    /// Decay peaks and drain every pending audio-thread message. Intended to
    /// be called once per UI frame with a monotonic clock reading.
    pub(crate) fn pump_audio_messages(&mut self, now: f64) {
        self.decay_pad_peaks(now);
        while let Some(msg) = self.audio.try_recv_audio_message() {
            self.handle_audio_message(msg, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::project_state::ProjectState;
    use crate::controller::session_state::SessionState;

    fn new_controller_for_test() -> Controller {
        Controller::new_headless(ProjectState::default(), SessionState::new())
    }

    #[test]
    fn pad_peak_message_clamps_and_takes_max() {
        let mut controller = new_controller_for_test();
        controller.handle_audio_message(AudioMessage::PadPeak { id: 2, peak: 1.5 }, 1.0);
        assert_eq!(controller.session.pad_peak[2], 1.0);

        controller.handle_audio_message(AudioMessage::PadPeak { id: 2, peak: 0.2 }, 1.1);
        assert_eq!(controller.session.pad_peak[2], 1.0);
    }

    #[test]
    fn peak_decays_with_half_life() {
        let mut controller = new_controller_for_test();
        controller.session.pad_peak[0] = 1.0;
        controller.session.pad_peak_updated_at[0] = 0.0;

        controller.decay_pad_peaks(PEAK_DECAY_HALF_LIFE_S as f64);
        assert!((controller.session.pad_peak[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn peak_below_floor_snaps_to_zero() {
        let mut controller = new_controller_for_test();
        controller.session.pad_peak[0] = PEAK_FLOOR;
        controller.session.pad_peak_updated_at[0] = 0.0;

        controller.decay_pad_peaks(10.0);
        assert_eq!(controller.session.pad_peak[0], 0.0);
    }

    #[test]
    fn sample_started_and_stopped_drive_active_ids() {
        let mut controller = new_controller_for_test();
        controller.handle_audio_message(AudioMessage::SampleStarted { id: 5 }, 0.0);
        assert!(controller.session.active_sample_ids.contains(&5));

        controller.session.paused_sample_ids.insert(5);
        controller.handle_audio_message(AudioMessage::SampleStopped { id: 5 }, 0.0);
        assert!(!controller.session.active_sample_ids.contains(&5));
        assert!(!controller.session.paused_sample_ids.contains(&5));
        assert_eq!(controller.session.pad_peak[5], 0.0);
    }

    #[test]
    fn invalid_playhead_is_ignored() {
        let mut controller = new_controller_for_test();
        controller.handle_audio_message(
            AudioMessage::PadPlayhead {
                id: 0,
                position_s: f32::NAN,
            },
            0.0,
        );
        assert!(controller.session.pad_playhead_s[0].is_none());
    }
}
