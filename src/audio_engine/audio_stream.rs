//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Stream initialization and configuration
//! - Audio callback setup
//! - Real-time message processing
//! - Error handling for audio stream operations

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::audio_engine::constants::NUM_SAMPLES;
use crate::audio_engine::mixer::RtMixer;
use crate::audio_engine::pitch_cache::{PadSourceSegments, PitchCacheTable, spawn_worker};
use crate::messages::{AudioMessage, ControlMessage};

/// Handle to the audio stream with associated message channels.
///
/// Also carries the handles the non-realtime controller needs to keep the
/// pitch-shift cache fed: `pitch_segments` is written to whenever a pad's dry
/// sample, a stem, or a loop region changes (never read by the audio
/// callback itself), and `pitch_cache` is the same table the realtime mixer
/// reads lock-free.
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub producer: Arc<Mutex<Producer<ControlMessage>>>,
    pub consumer: Arc<Mutex<Consumer<AudioMessage>>>,
    pub output_channels: usize,
    pub output_sample_rate: u32,
    pub pitch_cache: Arc<Vec<PitchCacheTable>>,
    pub pitch_segments: Arc<Mutex<Vec<PadSourceSegments>>>,
    pitch_worker_shutdown: Arc<AtomicBool>,
    pitch_worker: Option<JoinHandle<()>>,
}

impl Drop for AudioStreamHandle {
    fn drop(&mut self) {
        self.pitch_worker_shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.pitch_worker.take() {
            let _ = handle.join();
        }
    }
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Default to `info` to avoid extremely expensive debug/trace logging during analysis.
    // Users can override via `RUST_LOG`, e.g. `RUST_LOG=debug` when troubleshooting.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Create and configure the audio stream
///
/// This function:
/// 1. Sets up the default audio device
/// 2. Configures the stream with appropriate parameters
/// 3. Creates ring buffers for message passing
/// 4. Initializes the mixer and spawns the pitch-shift cache worker
/// 5. Builds and returns the audio stream
pub fn create_audio_stream() -> Result<AudioStreamHandle, Box<dyn std::error::Error>> {
    setup_logger();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No audio device found")?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate();
    let channels = config.channels();

    log::info!(
        "Starting AudioEngine... ({} ch@{} Hz)",
        channels,
        sample_rate
    );

    // Create ring buffer for incoming messages (Python->Rust)
    let (producer_in, mut consumer_in) = RingBuffer::new(1024);

    // Create ring buffer for outgoing messages (Rust->Python)
    let (mut producer_out, consumer_out) = RingBuffer::new(1024);

    let pitch_cache: Arc<Vec<PitchCacheTable>> =
        Arc::new((0..NUM_SAMPLES).map(|_| PitchCacheTable::default()).collect());
    let pitch_segments: Arc<Mutex<Vec<PadSourceSegments>>> =
        Arc::new(Mutex::new(vec![PadSourceSegments::default(); NUM_SAMPLES]));
    let pitch_worker_shutdown = Arc::new(AtomicBool::new(false));
    let pitch_worker = spawn_worker(
        pitch_cache.clone(),
        pitch_segments.clone(),
        pitch_worker_shutdown.clone(),
    );

    let mut mixer = RtMixer::new(channels as usize, sample_rate as f32, pitch_cache.clone());

    // Publish per-pad peak/playhead updates at roughly 30 Hz rather than once
    // per callback: the UI doesn't need (and a ring buffer of this size
    // can't sustain) an update every ~10 ms block.
    let publish_interval_frames = ((sample_rate as f32 / 30.0).round() as usize).max(1);
    let mut publish_counter = 0usize;
    let mut accum_peaks = vec![0.0f32; NUM_SAMPLES];

    // Create stream config
    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(512),
    };

    // Create audio stream with callback
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut stopped = Vec::new();

            // Process incoming messages in real-time
            while let Ok(message) = consumer_in.pop() {
                match message {
                    ControlMessage::Ping() => {
                        let _ = producer_out.push(AudioMessage::Pong());
                    }
                    ControlMessage::LoadSample { id, sample } => {
                        mixer.load_sample(id, sample);
                    }
                    ControlMessage::LoadStem { id, stem, sample } => {
                        mixer.load_stem(id, stem, sample);
                    }
                    ControlMessage::UnloadStem { id, stem } => {
                        mixer.unload_stem(id, stem);
                    }
                    ControlMessage::SetStemMuted { id, stem, muted } => {
                        mixer.set_stem_muted(id, stem, muted);
                    }
                    ControlMessage::SetStemGain { id, stem, gain } => {
                        mixer.set_stem_gain(id, stem, gain);
                    }
                    ControlMessage::PlaySample { id, volume } => {
                        stopped.clear();
                        if mixer.play_sample(id, volume, &mut stopped) {
                            let _ = producer_out.push(AudioMessage::SampleStarted { id });
                        }
                        for stopped_id in stopped.drain(..) {
                            let _ = producer_out.push(AudioMessage::SampleStopped { id: stopped_id });
                        }
                    }
                    ControlMessage::StopSample { id } => {
                        if mixer.stop_sample(id) {
                            let _ = producer_out.push(AudioMessage::SampleStopped { id });
                        }
                    }
                    ControlMessage::PauseSample { id } => {
                        mixer.pause_sample(id);
                    }
                    ControlMessage::ResumeSample { id } => {
                        mixer.resume_sample(id);
                    }
                    ControlMessage::StopAll() => {
                        stopped.clear();
                        mixer.stop_all(&mut stopped);
                        for stopped_id in stopped.drain(..) {
                            let _ = producer_out.push(AudioMessage::SampleStopped { id: stopped_id });
                        }
                    }
                    ControlMessage::UnloadSample { id } => {
                        mixer.unload_sample(id);
                    }
                    ControlMessage::SetSpeed(speed) => {
                        mixer.set_speed(speed);
                    }
                    ControlMessage::SetBpmLock(enabled) => {
                        mixer.set_bpm_lock(enabled);
                    }
                    ControlMessage::SetKeyLock(enabled) => {
                        mixer.set_key_lock(enabled);
                    }
                    ControlMessage::SetMultiLoop(enabled) => {
                        mixer.set_multi_loop(enabled);
                    }
                    ControlMessage::SetMasterBpm(bpm) => {
                        mixer.set_master_bpm(bpm);
                    }
                    ControlMessage::SetPadBpm { id, bpm } => {
                        mixer.set_pad_bpm(id, bpm);
                    }
                    ControlMessage::SetPadGain { id, gain } => {
                        mixer.set_pad_gain(id, gain);
                    }
                    ControlMessage::SetPadEq {
                        id,
                        low_db,
                        mid_db,
                        high_db,
                    } => {
                        mixer.set_pad_eq(id, low_db, mid_db, high_db);
                    }
                    ControlMessage::SetPadLoopRegion { id, start_s, end_s } => {
                        mixer.set_pad_loop_region(id, start_s, end_s);
                    }
                    ControlMessage::SetVolume(volume) => {
                        mixer.set_volume(volume);
                    }
                }
            }

            // Render audio
            let mut pad_peaks = [0.0f32; NUM_SAMPLES];
            stopped.clear();
            mixer.render(data, &mut pad_peaks, &mut stopped);
            for stopped_id in stopped.drain(..) {
                let _ = producer_out.push(AudioMessage::SampleStopped { id: stopped_id });
            }

            for (accum, block) in accum_peaks.iter_mut().zip(pad_peaks.iter()) {
                if *block > *accum {
                    *accum = *block;
                }
            }

            let frames_this_block = data.len() / (channels as usize).max(1);
            publish_counter += frames_this_block;
            if publish_counter >= publish_interval_frames {
                publish_counter = 0;
                for id in 0..NUM_SAMPLES {
                    if accum_peaks[id] > 0.0 {
                        let _ = producer_out.push(AudioMessage::PadPeak {
                            id,
                            peak: accum_peaks[id],
                        });
                        accum_peaks[id] = 0.0;
                    }
                    if let Some(position_s) = mixer.pad_playhead_seconds(id) {
                        let _ = producer_out.push(AudioMessage::PadPlayhead { id, position_s });
                    }
                }
            }
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(AudioStreamHandle {
        stream,
        producer: Arc::new(Mutex::new(producer_in)),
        consumer: Arc::new(Mutex::new(consumer_out)),
        output_channels: channels as usize,
        output_sample_rate: sample_rate,
        pitch_cache,
        pitch_segments,
        pitch_worker_shutdown,
        pitch_worker: Some(pitch_worker),
    })
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), Box<dyn std::error::Error>> {
    stream.play()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_setup() {
        // This test just verifies that logger setup doesn't panic
        // Multiple calls should be safe (though only the first takes effect)
        setup_logger();
        setup_logger(); // Should not panic
    }

    #[test]
    fn test_audio_stream_creation() {
        // This is a basic smoke test to ensure the function signature is correct
        // Actual stream creation requires audio hardware
        if cpal::default_host().default_output_device().is_none() {
            return; // Skip test if no audio device available
        }

        let result = create_audio_stream();
        // We expect this to potentially fail in test environments,
        // but we want to ensure the function exists and has the right signature
        match result {
            Ok(_) => {
                // If it works, that's great
            }
            Err(_) => {
                // Expected in many test environments
            }
        }
    }
}
