//! Real-time audio mixer implementation.
//!
//! [`RtMixer`] owns one persistent [`VoiceSlot`] per pad (no voice-stealing
//! pool: `NUM_SAMPLES` pads, `NUM_SAMPLES` voices). A voice's main table and
//! every active stem table are driven by a single shared phasor, so muting a
//! stem can never desync it from the rest of the pad's material. Pitch
//! correction under tempo change is read from [`PitchCacheTable`] (rendered
//! off the audio thread, never computed inline here).

use std::sync::Arc;

use crate::audio_engine::constants::{
    NUM_SAMPLES, NUM_STEMS, PAD_EQ_DB_MAX, PAD_EQ_DB_MIN, PAD_GAIN_MAX, PAD_GAIN_MIN, SPEED_MAX,
    SPEED_MIN, VOLUME_MAX, VOLUME_MIN,
};
use crate::audio_engine::constants::MUTE_SMOOTH_SECONDS;
use crate::audio_engine::eq3::{Eq3Coeffs, coeffs_for_eq3};
use crate::audio_engine::pitch_cache::{PitchCacheTable, SourceSlot};
use crate::audio_engine::stems::{PadSource, StemSlot};
use crate::audio_engine::voice_slot::VoiceSlot;
use crate::messages::{SampleBuffer, StemKind};

fn step_toward(current: f32, target: f32, frames: usize, sample_rate_hz: f32) -> f32 {
    if frames == 0 || sample_rate_hz <= 0.0 {
        return target;
    }
    let dt = frames as f32 / sample_rate_hz;
    let tau = MUTE_SMOOTH_SECONDS.max(1e-4);
    let alpha = (1.0 - (-dt / tau).exp()).clamp(0.0, 1.0);
    current + (target - current) * alpha
}

/// An owned, immutable-enough-to-read-without-a-lock view of a table to mix
/// from this block: either the dry loop segment or a pitch-cache entry.
struct SourceView {
    samples: Arc<[f32]>,
    channels: usize,
    /// Offset, in frames, into `samples` where the loop/segment begins.
    offset: usize,
    /// Length, in frames, of the loop/segment (the phasor's modulus).
    len: usize,
}

/// Fixed-capacity (at most `NUM_STEMS`) set of the stem kinds loaded on a
/// pad's voice this block. Stack-allocated so collecting it inside `render`
/// never touches the allocator.
#[derive(Default)]
struct StemSet {
    kinds: [StemKind; NUM_STEMS],
    len: usize,
}

impl StemSet {
    fn push(&mut self, kind: StemKind) {
        if self.len < self.kinds.len() {
            self.kinds[self.len] = kind;
            self.len += 1;
        }
    }

    fn iter(&self) -> std::slice::Iter<'_, StemKind> {
        self.kinds[..self.len].iter()
    }
}

impl Default for StemKind {
    fn default() -> Self {
        StemKind::Vocals
    }
}

pub struct RtMixer {
    channels: usize,
    sample_rate_hz: f32,
    volume: f32,
    speed: f32,
    bpm_lock_enabled: bool,
    key_lock_enabled: bool,
    multi_loop: bool,
    master_bpm: Option<f32>,
    pad_bpm: [Option<f32>; NUM_SAMPLES],
    pad_gain: [f32; NUM_SAMPLES],
    pad_eq: [Eq3Coeffs; NUM_SAMPLES],
    pad_loop_start_frame: [usize; NUM_SAMPLES],
    pad_loop_end_frame: [Option<usize>; NUM_SAMPLES],
    pad_playhead_frame: [Option<usize>; NUM_SAMPLES],
    voices: Vec<VoiceSlot>,
    pitch_cache: Arc<Vec<PitchCacheTable>>,
}

impl RtMixer {
    pub fn new(channels: usize, sample_rate_hz: f32, pitch_cache: Arc<Vec<PitchCacheTable>>) -> Self {
        let sample_rate_hz = if sample_rate_hz.is_finite() && sample_rate_hz > 0.0 {
            sample_rate_hz
        } else {
            44_100.0
        };

        Self {
            channels,
            sample_rate_hz,
            volume: VOLUME_MAX,
            speed: 1.0,
            bpm_lock_enabled: false,
            key_lock_enabled: false,
            multi_loop: false,
            master_bpm: None,
            pad_bpm: std::array::from_fn(|_| None),
            pad_gain: std::array::from_fn(|_| 1.0),
            pad_eq: std::array::from_fn(|_| coeffs_for_eq3(sample_rate_hz, 0.0, 0.0, 0.0)),
            pad_loop_start_frame: std::array::from_fn(|_| 0),
            pad_loop_end_frame: std::array::from_fn(|_| None),
            pad_playhead_frame: std::array::from_fn(|_| None),
            voices: (0..NUM_SAMPLES).map(|_| VoiceSlot::new(channels)).collect(),
            pitch_cache,
        }
    }

    pub fn load_sample(&mut self, id: usize, sample: SampleBuffer) {
        if id >= NUM_SAMPLES || sample.channels != self.channels {
            return;
        }
        self.voices[id].stop();
        self.voices[id].dry = Some(sample);
        self.voices[id].source = PadSource::Dry;
        self.pitch_cache[id].invalidate_all();
    }

    pub fn load_stem(&mut self, id: usize, stem: StemKind, sample: SampleBuffer) {
        if id >= NUM_SAMPLES || sample.channels != self.channels {
            return;
        }
        self.voices[id].source.set_stem(stem, sample);
        self.pitch_cache[id].slot(SourceSlot::Stem(stem)).invalidate();
    }

    pub fn unload_stem(&mut self, id: usize, stem: StemKind) {
        if id >= NUM_SAMPLES {
            return;
        }
        self.voices[id].source.unload_stem(stem);
        self.pitch_cache[id].slot(SourceSlot::Stem(stem)).invalidate();
    }

    pub fn set_stem_muted(&mut self, id: usize, stem: StemKind, muted: bool) {
        if id >= NUM_SAMPLES {
            return;
        }
        self.voices[id].source.set_stem_muted(stem, muted);
    }

    pub fn set_stem_gain(&mut self, id: usize, stem: StemKind, gain: f32) {
        if id >= NUM_SAMPLES || !gain.is_finite() || !(PAD_GAIN_MIN..=PAD_GAIN_MAX).contains(&gain) {
            return;
        }
        self.voices[id].source.set_stem_gain(stem, gain);
    }

    /// Trigger a pad. In exclusive mode (`multi_loop == false`) every other
    /// active voice is stopped first; their ids are appended to
    /// `stopped_out` (cleared by the caller before each call) so the caller
    /// can emit `SampleStopped` for them. Returns whether playback started.
    pub fn play_sample(&mut self, id: usize, velocity: f32, stopped_out: &mut Vec<usize>) -> bool {
        if id >= NUM_SAMPLES || !velocity.is_finite() || !(VOLUME_MIN..=VOLUME_MAX).contains(&velocity) {
            return false;
        }
        if self.voices[id].dry.is_none() {
            return false;
        }

        if !self.multi_loop {
            for other in 0..NUM_SAMPLES {
                if other != id && self.voices[other].is_active() {
                    self.voices[other].stop();
                    stopped_out.push(other);
                }
            }
        }

        self.voices[id].trigger(velocity, 0);
        true
    }

    /// Stop all voices playing a specific sample. Returns whether a voice was
    /// actually stopped (i.e. whether `SampleStopped` should be emitted).
    pub fn stop_sample(&mut self, id: usize) -> bool {
        if id >= NUM_SAMPLES || !self.voices[id].is_active() {
            return false;
        }
        self.voices[id].stop();
        true
    }

    pub fn pause_sample(&mut self, id: usize) -> bool {
        if id >= NUM_SAMPLES {
            return false;
        }
        let was_playing = self.voices[id].is_playing();
        self.voices[id].pause();
        was_playing
    }

    pub fn resume_sample(&mut self, id: usize) -> bool {
        if id >= NUM_SAMPLES {
            return false;
        }
        let was_paused = self.voices[id].state == crate::audio_engine::voice_slot::VoiceState::Paused;
        self.voices[id].resume();
        was_paused
    }

    /// Stops every active voice, appending their ids to `stopped_out`.
    pub fn stop_all(&mut self, stopped_out: &mut Vec<usize>) {
        for (id, voice) in self.voices.iter_mut().enumerate() {
            if voice.is_active() {
                voice.stop();
                stopped_out.push(id);
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_finite() && (VOLUME_MIN..=VOLUME_MAX).contains(&volume) {
            self.volume = volume;
        }
    }

    pub fn set_speed(&mut self, speed: f32) {
        if speed.is_finite() && (SPEED_MIN..=SPEED_MAX).contains(&speed) {
            self.speed = speed;
        }
    }

    pub fn set_bpm_lock(&mut self, enabled: bool) {
        self.bpm_lock_enabled = enabled;
        if !enabled {
            self.master_bpm = None;
        }
    }

    pub fn set_key_lock(&mut self, enabled: bool) {
        self.key_lock_enabled = enabled;
    }

    pub fn set_multi_loop(&mut self, enabled: bool) {
        self.multi_loop = enabled;
    }

    pub fn set_master_bpm(&mut self, bpm: f32) {
        if bpm.is_finite() && bpm > 0.0 {
            self.master_bpm = Some(bpm);
        }
    }

    pub fn set_pad_bpm(&mut self, id: usize, bpm: Option<f32>) {
        if id >= NUM_SAMPLES {
            return;
        }
        self.pad_bpm[id] = bpm.filter(|v| v.is_finite() && *v > 0.0);
    }

    pub fn set_pad_gain(&mut self, id: usize, gain: f32) {
        if id >= NUM_SAMPLES || !gain.is_finite() || !(PAD_GAIN_MIN..=PAD_GAIN_MAX).contains(&gain) {
            return;
        }
        self.pad_gain[id] = gain;
    }

    pub fn set_pad_eq(&mut self, id: usize, low_db: f32, mid_db: f32, high_db: f32) {
        if id >= NUM_SAMPLES {
            return;
        }
        let all = [low_db, mid_db, high_db];
        if all.iter().any(|v| !v.is_finite() || !(PAD_EQ_DB_MIN..=PAD_EQ_DB_MAX).contains(v)) {
            return;
        }
        self.pad_eq[id] = coeffs_for_eq3(self.sample_rate_hz, low_db, mid_db, high_db);
    }

    /// Set the pad's *effective* loop region, already derived and quantised
    /// by the transport controller. Invalidates the pitch-shift cache for
    /// this pad, since pitched tables are rendered from the loop segment.
    pub fn set_pad_loop_region(&mut self, id: usize, start_s: f32, end_s: Option<f32>) {
        if id >= NUM_SAMPLES || !start_s.is_finite() || start_s < 0.0 {
            return;
        }

        let start_frame = (start_s as f64 * self.sample_rate_hz as f64).round().max(0.0) as usize;
        let end_frame = end_s.and_then(|end_s| {
            if !end_s.is_finite() || end_s < 0.0 {
                return None;
            }
            Some((end_s as f64 * self.sample_rate_hz as f64).round().max(0.0) as usize)
        });

        self.pad_loop_start_frame[id] = start_frame;
        self.pad_loop_end_frame[id] = end_frame;
        self.pitch_cache[id].invalidate_all();
    }

    pub fn unload_sample(&mut self, id: usize) {
        if id >= NUM_SAMPLES {
            return;
        }
        self.voices[id].stop();
        self.voices[id].dry = None;
        self.voices[id].source = PadSource::Dry;
        self.pitch_cache[id].invalidate_all();
    }

    pub fn pad_playhead_seconds(&self, id: usize) -> Option<f32> {
        if id >= NUM_SAMPLES {
            return None;
        }
        let frame = self.pad_playhead_frame[id]?;
        Some(frame as f32 / self.sample_rate_hz)
    }

    fn tempo_ratio_for_pad(&self, id: usize) -> f32 {
        let mut ratio = self.speed;
        if self.bpm_lock_enabled
            && let (Some(master_bpm), Some(pad_bpm)) = (self.master_bpm, self.pad_bpm[id])
        {
            ratio = master_bpm / pad_bpm;
        }
        if !ratio.is_finite() {
            ratio = 1.0;
        }
        ratio.clamp(SPEED_MIN, SPEED_MAX)
    }

    /// Renders audio frames to the output buffer and fills `pad_peaks` with
    /// this block's per-pad peak (not accumulated across calls; the caller
    /// coalesces across its own publish interval). Any voice that has to
    /// self-stop mid-render (missing table, degenerate loop) has its id
    /// appended to `stopped_out`.
    pub fn render(
        &mut self,
        output: &mut [f32],
        pad_peaks: &mut [f32; NUM_SAMPLES],
        stopped_out: &mut Vec<usize>,
    ) {
        pad_peaks.fill(0.0);
        output.fill(0.0);
        self.pad_playhead_frame.fill(None);

        if self.channels == 0 {
            return;
        }
        let frames = output.len() / self.channels;
        if frames == 0 {
            return;
        }
        let channels = self.channels;

        for id in 0..NUM_SAMPLES {
            if !self.voices[id].is_playing() {
                continue;
            }

            let Some(dry) = self.voices[id].dry.clone() else {
                self.voices[id].stop();
                stopped_out.push(id);
                continue;
            };

            let dry_frames = dry.frames();
            if dry_frames == 0 {
                self.voices[id].stop();
                stopped_out.push(id);
                continue;
            }

            let mut loop_start = self.pad_loop_start_frame[id].min(dry_frames.saturating_sub(1));
            let mut loop_end = self.pad_loop_end_frame[id].unwrap_or(dry_frames).min(dry_frames);
            if loop_end <= loop_start {
                loop_start = 0;
                loop_end = dry_frames;
            }
            let loop_len = loop_end - loop_start;
            if loop_len == 0 {
                self.voices[id].stop();
                stopped_out.push(id);
                continue;
            }

            let ratio = self.tempo_ratio_for_pad(id);
            let is_unity = (ratio - 1.0).abs() < 1e-6;
            let want_pitched = self.key_lock_enabled && !is_unity;

            let mut stems_present = StemSet::default();
            if let PadSource::WithStems { stems } = &self.voices[id].source {
                for kind in StemKind::ALL {
                    if stems[kind.index()].is_some() {
                        stems_present.push(kind);
                    }
                }
            }

            let table = &self.pitch_cache[id];
            let mut use_pitched = false;
            let mut main_view = SourceView {
                samples: dry.samples.clone(),
                channels: dry.channels,
                offset: loop_start,
                len: loop_len,
            };
            let mut stem_views: [Option<SourceView>; 5] = Default::default();

            if want_pitched {
                let main_entry = table.slot(SourceSlot::Main).get_if_current(ratio);
                let mut stem_entries: [Option<Arc<crate::audio_engine::pitch_cache::PitchEntry>>; 5] =
                    Default::default();
                let mut all_ready = main_entry.is_some();
                for kind in stems_present.iter() {
                    let entry = table.slot(SourceSlot::Stem(*kind)).get_if_current(ratio);
                    all_ready &= entry.is_some();
                    stem_entries[kind.index()] = entry;
                }

                if all_ready {
                    let main_entry = main_entry.unwrap();
                    main_view = SourceView {
                        samples: main_entry.table.samples.clone(),
                        channels: main_entry.table.channels,
                        offset: 0,
                        len: main_entry.table.frames(),
                    };
                    for kind in stems_present.iter() {
                        let entry = stem_entries[kind.index()].take().unwrap();
                        stem_views[kind.index()] = Some(SourceView {
                            samples: entry.table.samples.clone(),
                            channels: entry.table.channels,
                            offset: 0,
                            len: entry.table.frames(),
                        });
                    }
                    use_pitched = true;
                } else {
                    table.slot(SourceSlot::Main).request_render(ratio);
                    for kind in stems_present.iter() {
                        table.slot(SourceSlot::Stem(*kind)).request_render(ratio);
                    }
                }
            }

            if main_view.len == 0 {
                self.voices[id].stop();
                stopped_out.push(id);
                continue;
            }

            if use_pitched {
                for kind in stems_present.iter() {
                    if stem_views[kind.index()].is_none() {
                        // Stem lacked a ready pitched entry even though main
                        // did; this pad can't phase-lock pitched this block.
                        use_pitched = false;
                        break;
                    }
                }
            }
            if !use_pitched {
                main_view = SourceView {
                    samples: dry.samples.clone(),
                    channels: dry.channels,
                    offset: loop_start,
                    len: loop_len,
                };
                for kind in stems_present.iter() {
                    if let PadSource::WithStems { stems } = &self.voices[id].source
                        && let Some(stem) = &stems[kind.index()]
                    {
                        stem_views[kind.index()] = Some(SourceView {
                            samples: stem.table.samples.clone(),
                            channels: stem.table.channels,
                            offset: loop_start,
                            len: loop_len,
                        });
                    }
                }
            }

            let voice = &mut self.voices[id];
            if voice.last_used_pitched != use_pitched {
                voice.phasor_frame = 0.0;
                voice.last_used_pitched = use_pitched;
            }

            let has_active_stem = match &voice.source {
                PadSource::Dry => false,
                PadSource::WithStems { stems } => stems.iter().flatten().any(|s| !s.muted),
            };
            let main_target = if has_active_stem { 0.0 } else { 1.0 };
            voice.main_mute_coef = step_toward(voice.main_mute_coef, main_target, frames, self.sample_rate_hz);
            let main_mute_coef = voice.main_mute_coef;

            let mut stem_gains_coefs: [Option<(f32, f32)>; 5] = Default::default();
            if let PadSource::WithStems { stems } = &mut voice.source {
                for kind in stems_present.iter() {
                    if let Some(stem) = &mut stems[kind.index()] {
                        let target = if stem.muted { 0.0 } else { 1.0 };
                        stem.mute_coef = step_toward(stem.mute_coef, target, frames, self.sample_rate_hz);
                        stem_gains_coefs[kind.index()] = Some((stem.gain, stem.mute_coef));
                    }
                }
            }

            let base_phasor = voice.phasor_frame;
            let delta = if use_pitched { 1.0 } else { ratio as f64 };

            let eq = self.pad_eq[id];
            let pad_gain = self.pad_gain[id];
            let volume = self.volume;
            let eq_state = &mut voice.eq_state;

            for frame in 0..frames {
                let pos = base_phasor + frame as f64 * delta;
                let idx0 = (pos.floor() as i64).rem_euclid(main_view.len as i64) as usize;
                let idx1 = (idx0 + 1) % main_view.len;
                let frac = pos.fract().max(0.0) as f32;

                let out_base = frame * channels;
                for channel in 0..channels {
                    let read = |view: &SourceView, idx: usize| -> f32 {
                        let ch = channel.min(view.channels.saturating_sub(1));
                        view.samples[(view.offset + idx) * view.channels + ch]
                    };

                    let m0 = read(&main_view, idx0);
                    let m1 = read(&main_view, idx1);
                    let mut mixed = (m0 + (m1 - m0) * frac) * main_mute_coef;

                    for kind in stems_present.iter() {
                        if let (Some(view), Some((gain, coef))) =
                            (&stem_views[kind.index()], stem_gains_coefs[kind.index()])
                        {
                            if view.len == 0 {
                                continue;
                            }
                            let sidx0 = idx0 % view.len;
                            let sidx1 = (sidx0 + 1) % view.len;
                            let s0 = read(view, sidx0);
                            let s1 = read(view, sidx1);
                            mixed += (s0 + (s1 - s0) * frac) * gain * coef;
                        }
                    }

                    if let Some(state) = eq_state.get_mut(channel) {
                        mixed = eq.process(state, mixed);
                    }

                    let sample_out = mixed * voice.velocity * volume * pad_gain;
                    output[out_base + channel] += sample_out;

                    let peak = sample_out.abs();
                    if peak > pad_peaks[id] {
                        pad_peaks[id] = peak;
                    }
                }
            }

            voice.phasor_frame = (base_phasor + frames as f64 * delta).rem_euclid(main_view.len as f64);

            let reported_frame = if use_pitched {
                let frac_pos = voice.phasor_frame / (main_view.len as f64).max(1.0);
                loop_start as f64 + frac_pos * (loop_len as f64)
            } else {
                loop_start as f64 + voice.phasor_frame
            };
            self.pad_playhead_frame[id] = Some(reported_frame.round() as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use super::*;

    fn create_test_sample(channels: usize, frames: usize, value: f32) -> SampleBuffer {
        let samples = vec![value; channels * frames];
        SampleBuffer {
            channels,
            samples: StdArc::from(samples.into_boxed_slice()),
        }
    }

    fn new_mixer(channels: usize, sample_rate_hz: f32) -> RtMixer {
        let pitch_cache = Arc::new((0..NUM_SAMPLES).map(|_| PitchCacheTable::default()).collect());
        RtMixer::new(channels, sample_rate_hz, pitch_cache)
    }

    #[test]
    fn tempo_ratio_speed_only() {
        let mut mixer = new_mixer(2, 44_100.0);
        mixer.set_speed(1.25);
        assert!((mixer.tempo_ratio_for_pad(0) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn tempo_ratio_bpm_lock() {
        let mut mixer = new_mixer(2, 44_100.0);
        mixer.set_speed(1.0);
        mixer.set_bpm_lock(true);
        mixer.set_master_bpm(120.0);
        mixer.set_pad_bpm(0, Some(90.0));
        assert!((mixer.tempo_ratio_for_pad(0) - (120.0 / 90.0)).abs() < 1e-6);

        mixer.set_pad_bpm(0, None);
        assert!((mixer.tempo_ratio_for_pad(0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn load_sample_rejects_channel_mismatch() {
        let mut mixer = new_mixer(2, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 100, 0.5));
        assert!(mixer.voices[0].dry.is_none());
    }

    #[test]
    fn play_sample_requires_loaded_dry() {
        let mut mixer = new_mixer(2, 44_100.0);
        let mut stopped = Vec::new();
        assert!(!mixer.play_sample(0, 0.8, &mut stopped));

        mixer.load_sample(0, create_test_sample(2, 100, 0.5));
        assert!(mixer.play_sample(0, 0.8, &mut stopped));
        assert!(mixer.voices[0].is_playing());
    }

    #[test]
    fn exclusive_mode_stops_other_voices() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 100, 0.5));
        mixer.load_sample(1, create_test_sample(1, 100, 0.5));
        let mut stopped = Vec::new();

        mixer.play_sample(0, 1.0, &mut stopped);
        stopped.clear();
        mixer.play_sample(1, 1.0, &mut stopped);

        assert_eq!(stopped, vec![0]);
        assert!(!mixer.voices[0].is_active());
        assert!(mixer.voices[1].is_playing());
    }

    #[test]
    fn multi_loop_allows_layering() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.set_multi_loop(true);
        mixer.load_sample(0, create_test_sample(1, 100, 0.5));
        mixer.load_sample(1, create_test_sample(1, 100, 0.5));
        let mut stopped = Vec::new();

        mixer.play_sample(0, 1.0, &mut stopped);
        mixer.play_sample(1, 1.0, &mut stopped);

        assert!(stopped.is_empty());
        assert!(mixer.voices[0].is_playing());
        assert!(mixer.voices[1].is_playing());
    }

    #[test]
    fn pause_then_resume_preserves_phasor() {
        let mut mixer = new_mixer(1, 10.0);
        mixer.load_sample(0, create_test_sample(1, 20, 0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        let mut output = vec![0.0; 5];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        mixer.render(&mut output, &mut pad_peaks, &mut stopped);

        assert!(mixer.pause_sample(0));
        let phasor_at_pause = mixer.voices[0].phasor_frame;

        let mut silent = vec![0.0; 5];
        mixer.render(&mut silent, &mut pad_peaks, &mut stopped);
        assert!(silent.iter().all(|&s| s == 0.0));
        assert_eq!(mixer.voices[0].phasor_frame, phasor_at_pause);

        assert!(mixer.resume_sample(0));
        assert!(mixer.voices[0].is_playing());
    }

    #[test]
    fn render_silence_with_no_voices() {
        let mut mixer = new_mixer(2, 44_100.0);
        let mut output = vec![1.0; 200];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        let mut stopped = Vec::new();
        mixer.render(&mut output, &mut pad_peaks, &mut stopped);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn render_produces_nonzero_output() {
        let mut mixer = new_mixer(2, 44_100.0);
        mixer.load_sample(0, create_test_sample(2, 10, 0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        let mut output = vec![0.0; 20];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        mixer.render(&mut output, &mut pad_peaks, &mut stopped);

        assert!(output.iter().any(|&s| s != 0.0));
        assert!(pad_peaks[0] > 0.0);
    }

    #[test]
    fn render_loops_sample_past_its_end() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 5, 0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        let mut output = vec![0.0; 20];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        mixer.render(&mut output, &mut pad_peaks, &mut stopped);

        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-5));
    }

    #[test]
    fn render_respects_custom_loop_region() {
        let mut mixer = new_mixer(1, 10.0);
        mixer.load_sample(0, create_test_sample(1, 20, 0.5));
        mixer.set_pad_loop_region(0, 0.2, Some(0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        for _ in 0..20 {
            let mut output = vec![0.0; 1];
            mixer.render(&mut output, &mut pad_peaks, &mut stopped);
            let seconds = mixer.pad_playhead_seconds(0).unwrap();
            assert!((0.2..0.5 + 1e-6).contains(&seconds));
        }
    }

    #[test]
    fn pad_gain_scales_output() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 5, 0.8));
        mixer.set_pad_gain(0, 0.25);
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        let mut output = vec![0.0; 20];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        mixer.render(&mut output, &mut pad_peaks, &mut stopped);

        let expected = 0.8 * 0.25;
        assert!(output.iter().all(|&s| (s - expected).abs() < 1e-6));
    }

    #[test]
    fn stems_mix_with_main_and_respect_mute() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 10, 0.3));
        mixer.load_stem(0, StemKind::Bass, create_test_sample(1, 10, 0.2));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        // Smoothing needs a few blocks to settle near its target.
        let mut output = vec![0.0; 10];
        let mut pad_peaks = [0.0_f32; NUM_SAMPLES];
        for _ in 0..50 {
            mixer.render(&mut output, &mut pad_peaks, &mut stopped);
        }
        // main should be ~silent, bass stem audible.
        assert!(output.iter().all(|&s| (s - 0.2).abs() < 0.05));

        mixer.set_stem_muted(0, StemKind::Bass, true);
        for _ in 0..50 {
            mixer.render(&mut output, &mut pad_peaks, &mut stopped);
        }
        // main comes back once the only stem is muted.
        assert!(output.iter().all(|&s| (s - 0.3).abs() < 0.05));
    }

    #[test]
    fn stop_all_reports_every_stopped_id() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.set_multi_loop(true);
        mixer.load_sample(0, create_test_sample(1, 10, 0.5));
        mixer.load_sample(1, create_test_sample(1, 10, 0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);
        mixer.play_sample(1, 1.0, &mut stopped);

        stopped.clear();
        mixer.stop_all(&mut stopped);
        stopped.sort();
        assert_eq!(stopped, vec![0, 1]);
    }

    #[test]
    fn unload_sample_stops_voice_and_clears_dry() {
        let mut mixer = new_mixer(1, 44_100.0);
        mixer.load_sample(0, create_test_sample(1, 10, 0.5));
        let mut stopped = Vec::new();
        mixer.play_sample(0, 1.0, &mut stopped);

        mixer.unload_sample(0);
        assert!(!mixer.voices[0].is_active());
        assert!(mixer.voices[0].dry.is_none());
    }
}
