//! Worker-rendered pitch-shift cache.
//!
//! Per §4.3, pitch-corrected tables must never be rendered on the audio
//! thread. Each pad owns a [`PitchCacheSlot`]: the audio thread only ever
//! reads it via a lock-free pointer load and, if it wants a render that
//! isn't there yet, posts the request through two plain atomics (no lock,
//! no allocation). A background worker (spawned once by `AudioEngine::run`)
//! polls those requests, renders off a pad's dry table with
//! [`StretchProcessor`], and publishes the result by pointer swap.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;

use crate::audio_engine::stretch_processor::StretchProcessor;
use crate::messages::{SampleBuffer, StemKind};

/// How often the background worker polls for pending render requests.
pub const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// A rendered pitch-shifted table, tagged with the (quantised) speed it was
/// rendered for.
pub struct PitchEntry {
    pub speed_bucket: f32,
    pub table: SampleBuffer,
}

/// Quantise a speed to a cache key granularity. Coarser than float equality
/// so tiny UI jitter doesn't cause constant re-rendering.
pub fn speed_bucket(speed: f32) -> f32 {
    (speed * 100.0).round() / 100.0
}

/// Per-pad slot in the pitch-shift cache.
pub struct PitchCacheSlot {
    entry: ArcSwapOption<PitchEntry>,
    wants_render: AtomicBool,
    rendering: AtomicBool,
    requested_speed_bits: AtomicU32,
}

impl Default for PitchCacheSlot {
    fn default() -> Self {
        Self {
            entry: ArcSwapOption::const_empty(),
            wants_render: AtomicBool::new(false),
            rendering: AtomicBool::new(false),
            requested_speed_bits: AtomicU32::new(0),
        }
    }
}

impl PitchCacheSlot {
    /// Lock-free read: the currently published table, if it matches `speed`.
    pub fn get_if_current(&self, speed: f32) -> Option<Arc<PitchEntry>> {
        let bucket = speed_bucket(speed);
        self.entry
            .load_full()
            .filter(|entry| (entry.speed_bucket - bucket).abs() < 1e-6)
    }

    /// Called from the audio thread: record that this pad wants a render for
    /// `speed`. Wait-free (two atomic stores), never blocks, never allocates.
    pub fn request_render(&self, speed: f32) {
        self.requested_speed_bits
            .store(speed_bucket(speed).to_bits(), Ordering::Relaxed);
        self.wants_render.store(true, Ordering::Release);
    }

    /// Drop any cached entry; called when the source PCM or loop endpoints
    /// change, invalidating whatever was rendered before.
    pub fn invalidate(&self) {
        self.entry.store(None);
    }

    fn take_request(&self) -> Option<f32> {
        if !self.wants_render.swap(false, Ordering::AcqRel) {
            return None;
        }
        if self
            .rendering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Already rendering; request will be reconsidered once it's done
            // if the flag gets re-set by a later call.
            return None;
        }
        Some(f32::from_bits(
            self.requested_speed_bits.load(Ordering::Relaxed),
        ))
    }

    fn publish(&self, speed_bucket: f32, table: SampleBuffer) {
        self.entry
            .store(Some(Arc::new(PitchEntry { speed_bucket, table })));
        self.rendering.store(false, Ordering::Release);
    }

    fn fail(&self) {
        self.rendering.store(false, Ordering::Release);
    }
}

/// Which of a pad's tables a pitch-cache entry belongs to: the dry/main
/// table, or one of its five stems. Main and stems are pitch-shifted
/// independently (each keeps its own `PitchCacheSlot`) but always at the same
/// speed bucket, so their rendered lengths match and the shared phasor stays
/// valid across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSlot {
    Main,
    Stem(StemKind),
}

impl SourceSlot {
    pub const COUNT: usize = 1 + 5;

    pub fn index(self) -> usize {
        match self {
            SourceSlot::Main => 0,
            SourceSlot::Stem(kind) => 1 + kind.index(),
        }
    }
}

/// A pad's six pitch-cache slots (main + 5 stems).
pub struct PitchCacheTable {
    slots: [PitchCacheSlot; SourceSlot::COUNT],
}

impl Default for PitchCacheTable {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| PitchCacheSlot::default()),
        }
    }
}

impl PitchCacheTable {
    pub fn slot(&self, which: SourceSlot) -> &PitchCacheSlot {
        &self.slots[which.index()]
    }

    pub fn invalidate_all(&self) {
        for slot in &self.slots {
            slot.invalidate();
        }
    }
}

/// The loop-region-extracted, not-yet-pitched segments for one pad, kept up
/// to date by the (non-realtime) controller thread whenever a pad's source
/// or loop region changes. The worker renders from these, never from the
/// realtime mixer's own copies.
#[derive(Default, Clone)]
pub struct PadSourceSegments {
    pub main: Option<SampleBuffer>,
    pub stems: [Option<SampleBuffer>; 5],
}

impl PadSourceSegments {
    fn get(&self, which: SourceSlot) -> Option<&SampleBuffer> {
        match which {
            SourceSlot::Main => self.main.as_ref(),
            SourceSlot::Stem(kind) => self.stems[kind.index()].as_ref(),
        }
    }
}

pub fn transpose_semitones_for_tempo_ratio(ratio: f32) -> f32 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0.0;
    }
    -12.0 * ratio.log2()
}

/// Offline render of a pitch-corrected table: `dry` resampled in time by
/// `1/speed` while `signalsmith-dsp` restores the pitch that the time change
/// would otherwise introduce, so the voice engine can play the result at a
/// phasor rate of 1x and still land on the sped-up/slowed-down duration.
pub fn render_pitched_table(dry: &SampleBuffer, speed: f32) -> SampleBuffer {
    let channels = dry.channels.max(1);
    let input_frames = dry.frames();
    if input_frames == 0 || !speed.is_finite() || speed <= 0.0 {
        return dry.clone();
    }

    let output_frames = ((input_frames as f64) / speed as f64).round().max(1.0) as usize;

    let mut stretch = StretchProcessor::new(channels);
    stretch.set_transpose_semitones(transpose_semitones_for_tempo_ratio(speed));

    {
        let input = stretch.input_buffers_mut(input_frames);
        for (ch, buf) in input.iter_mut().enumerate() {
            for (frame, sample) in buf.iter_mut().enumerate() {
                *sample = dry.samples[frame * channels + ch];
            }
        }
    }

    stretch.process(input_frames, output_frames);

    let output = stretch.output_buffers();
    let mut interleaved = vec![0.0f32; output_frames * channels];
    for (ch, buf) in output.iter().enumerate() {
        for (frame, sample) in buf.iter().enumerate().take(output_frames) {
            interleaved[frame * channels + ch] = *sample;
        }
    }

    SampleBuffer {
        channels,
        samples: Arc::from(interleaved.into_boxed_slice()),
    }
}

/// Spawn the long-lived background worker that renders pending pitch-cache
/// requests for every pad's main table and every loaded stem. Stops once
/// `shutdown` is observed set.
pub fn spawn_worker(
    tables: Arc<Vec<PitchCacheTable>>,
    segments: Arc<Mutex<Vec<PadSourceSegments>>>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    const ALL_SLOTS: [SourceSlot; SourceSlot::COUNT] = [
        SourceSlot::Main,
        SourceSlot::Stem(StemKind::Vocals),
        SourceSlot::Stem(StemKind::Melody),
        SourceSlot::Stem(StemKind::Bass),
        SourceSlot::Stem(StemKind::Drums),
        SourceSlot::Stem(StemKind::Instrumental),
    ];

    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Acquire) {
            for (id, table) in tables.iter().enumerate() {
                for which in ALL_SLOTS {
                    let slot = table.slot(which);
                    let Some(speed) = slot.take_request() else {
                        continue;
                    };
                    let dry = segments
                        .lock()
                        .ok()
                        .and_then(|cache| cache.get(id).and_then(|s| s.get(which).cloned()));
                    match dry {
                        Some(dry) => {
                            let table = render_pitched_table(&dry, speed);
                            slot.publish(speed, table);
                        }
                        None => slot.fail(),
                    }
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(frames: usize) -> SampleBuffer {
        SampleBuffer {
            channels: 1,
            samples: Arc::from(
                (0..frames)
                    .map(|i| (i as f32 / frames as f32) * 2.0 - 1.0)
                    .collect::<Vec<_>>()
                    .into_boxed_slice(),
            ),
        }
    }

    #[test]
    fn render_shortens_table_for_speed_above_one() {
        let dry = table(1000);
        let out = render_pitched_table(&dry, 1.25);
        assert!(out.frames() < dry.frames());
    }

    #[test]
    fn render_lengthens_table_for_speed_below_one() {
        let dry = table(1000);
        let out = render_pitched_table(&dry, 0.5);
        assert!(out.frames() > dry.frames());
    }

    #[test]
    fn render_is_identity_length_at_speed_one() {
        let dry = table(500);
        let out = render_pitched_table(&dry, 1.0);
        assert_eq!(out.frames(), dry.frames());
    }

    #[test]
    fn transpose_is_zero_at_unity_ratio() {
        assert_eq!(transpose_semitones_for_tempo_ratio(1.0), 0.0);
    }

    #[test]
    fn transpose_is_finite_for_degenerate_ratio() {
        assert_eq!(transpose_semitones_for_tempo_ratio(0.0), 0.0);
        assert_eq!(transpose_semitones_for_tempo_ratio(f32::NAN), 0.0);
    }

    #[test]
    fn slot_returns_entry_only_when_speed_matches() {
        let slot = PitchCacheSlot::default();
        slot.publish(speed_bucket(1.25), table(10));
        assert!(slot.get_if_current(1.25).is_some());
        assert!(slot.get_if_current(1.30).is_none());
    }

    #[test]
    fn slot_request_then_take_round_trips_speed() {
        let slot = PitchCacheSlot::default();
        slot.request_render(1.5);
        let taken = slot.take_request();
        assert_eq!(taken, Some(speed_bucket(1.5)));
        // Request is now in flight; a second immediate take must be empty.
        assert_eq!(slot.take_request(), None);
    }

    #[test]
    fn slot_invalidate_clears_entry() {
        let slot = PitchCacheSlot::default();
        slot.publish(1.0, table(10));
        slot.invalidate();
        assert!(slot.get_if_current(1.0).is_none());
    }

    #[test]
    fn source_slot_indices_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in StemKind::ALL {
            assert!(seen.insert(SourceSlot::Stem(kind).index()));
        }
        assert!(seen.insert(SourceSlot::Main.index()));
        assert_eq!(seen.len(), SourceSlot::COUNT);
    }

    #[test]
    fn pitch_cache_table_slots_are_independent() {
        let t = PitchCacheTable::default();
        t.slot(SourceSlot::Main).publish(1.0, table(5));
        assert!(t.slot(SourceSlot::Main).get_if_current(1.0).is_some());
        assert!(
            t.slot(SourceSlot::Stem(StemKind::Vocals))
                .get_if_current(1.0)
                .is_none()
        );
    }

    #[test]
    fn invalidate_all_clears_every_slot() {
        let t = PitchCacheTable::default();
        t.slot(SourceSlot::Main).publish(1.0, table(5));
        t.slot(SourceSlot::Stem(StemKind::Bass)).publish(1.0, table(5));
        t.invalidate_all();
        assert!(t.slot(SourceSlot::Main).get_if_current(1.0).is_none());
        assert!(
            t.slot(SourceSlot::Stem(StemKind::Bass))
                .get_if_current(1.0)
                .is_none()
        );
    }
}
