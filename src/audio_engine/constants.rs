//! Audio engine configuration constants and limits.

/// Number of sample banks available.
pub const NUM_BANKS: usize = 6;

/// Size of the sample grid (GRID_SIZE x GRID_SIZE).
pub const GRID_SIZE: usize = 6;

/// Total number of pads in the grid.
pub const NUM_PADS: usize = GRID_SIZE.pow(2);

/// Total number of sample slots (pads x banks).
pub const NUM_SAMPLES: usize = NUM_PADS * NUM_BANKS;

/// Number of stem slots a pad's voice can carry (vocals, melody, bass,
/// drums, instrumental).
pub const NUM_STEMS: usize = 5;

/// Time constant for the one-pole main/stem mute crossfade.
pub const MUTE_SMOOTH_SECONDS: f32 = 0.015;

/// Maximum per-frame step for tempo-ratio smoothing (fraction of ratio per
/// audio callback).
pub const TEMPO_RATIO_MAX_STEP: f32 = 0.05;

/// Half-life, in seconds, of the exponential peak-meter decay.
pub const PEAK_DECAY_HALF_LIFE_S: f32 = 0.25;

/// Peaks below this value snap to zero.
pub const PEAK_FLOOR: f32 = 1e-4;

/// Size of the tap-tempo sliding window.
pub const TAP_BPM_WINDOW: usize = 5;

/// Minimum number of taps required before tap BPM returns a value.
pub const TAP_BPM_MIN_TAPS: usize = 3;

/// Default debounce interval, in seconds, between persistence flushes.
pub const PERSIST_DEBOUNCE_SECONDS: f64 = 10.0;

/// Minimum playback speed multiplier (50%).
pub const SPEED_MIN: f32 = 0.5;

/// Maximum playback speed multiplier (200%).
pub const SPEED_MAX: f32 = 2.0;

/// Minimum volume level (silence).
pub const VOLUME_MIN: f32 = 0.0;

/// Maximum volume level (100%).
pub const VOLUME_MAX: f32 = 1.0;

/// Minimum per-pad gain.
pub const PAD_GAIN_MIN: f32 = 0.0;

/// Maximum per-pad gain.
pub const PAD_GAIN_MAX: f32 = 1.0;

/// Minimum per-band EQ gain in dB.
pub const PAD_EQ_DB_MIN: f32 = -24.0;

/// Maximum per-band EQ gain in dB.
pub const PAD_EQ_DB_MAX: f32 = 24.0;
