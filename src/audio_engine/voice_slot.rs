//! Per-pad voice.
//!
//! One `VoiceSlot` lives for the whole process lifetime per pad (NUM_SAMPLES
//! of them, owned by [`crate::audio_engine::mixer::RtMixer`]). A voice reads
//! through a single phasor shared by the dry table and every active stem
//! table, so muting/unmuting a stem never touches alignment.

use crate::audio_engine::eq3::Eq3State;
use crate::audio_engine::stems::PadSource;
use crate::messages::SampleBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Playing,
    Paused,
}

pub struct VoiceSlot {
    pub state: VoiceState,
    pub dry: Option<SampleBuffer>,
    pub source: PadSource,
    pub velocity: f32,

    /// Position within the loop region, in source-table frames. Always in
    /// `[0, loop_len)` once a voice is playing; advanced by the mixer each
    /// render call.
    pub phasor_frame: f64,

    /// Post-mix (main + stems) EQ state, one per output channel.
    pub eq_state: Vec<Eq3State>,

    /// One-pole smoothed [0, 1] crossfade applied to the dry table. Targets 1
    /// when no stem is active (or stems are absent), 0 otherwise.
    pub main_mute_coef: f32,

    /// Whether the previous render block read from the pitch-cache tables
    /// rather than the dry ones. The mixer resets `phasor_frame` to 0 on any
    /// transition between the two, since dry-space and pitched-space frame
    /// counts differ.
    pub last_used_pitched: bool,
}

impl VoiceSlot {
    pub fn new(channels: usize) -> Self {
        Self {
            state: VoiceState::Idle,
            dry: None,
            source: PadSource::Dry,
            velocity: 0.0,
            phasor_frame: 0.0,
            eq_state: vec![Eq3State::default(); channels],
            main_mute_coef: 1.0,
            last_used_pitched: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, VoiceState::Idle)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, VoiceState::Playing)
    }

    /// Start (or restart) playback from `start_frame` within the loop region.
    pub fn trigger(&mut self, velocity: f32, start_frame: usize) {
        self.state = VoiceState::Playing;
        self.velocity = velocity;
        self.phasor_frame = start_frame as f64;
        self.last_used_pitched = false;
        for state in &mut self.eq_state {
            state.reset();
        }
    }

    pub fn stop(&mut self) {
        self.state = VoiceState::Idle;
        self.velocity = 0.0;
        self.phasor_frame = 0.0;
        for state in &mut self.eq_state {
            state.reset();
        }
    }

    /// Retain `phasor_frame` and go silent; `resume` continues from here.
    pub fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.state = VoiceState::Playing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_voice_is_idle() {
        let voice = VoiceSlot::new(2);
        assert!(!voice.is_active());
        assert!(!voice.is_playing());
    }

    #[test]
    fn trigger_then_pause_then_resume() {
        let mut voice = VoiceSlot::new(1);
        voice.trigger(0.8, 10);
        assert!(voice.is_playing());

        voice.pause();
        assert!(voice.is_active());
        assert!(!voice.is_playing());
        assert_eq!(voice.phasor_frame, 10.0);

        voice.resume();
        assert!(voice.is_playing());
        assert_eq!(voice.phasor_frame, 10.0);
    }

    #[test]
    fn stop_resets_phasor_and_eq() {
        let mut voice = VoiceSlot::new(1);
        voice.trigger(1.0, 42);
        voice.eq_state[0] = Eq3State::default();
        voice.stop();
        assert!(!voice.is_active());
        assert_eq!(voice.phasor_frame, 0.0);
    }

    #[test]
    fn pause_on_idle_voice_is_noop() {
        let mut voice = VoiceSlot::new(1);
        voice.pause();
        assert!(!voice.is_active());
    }
}
