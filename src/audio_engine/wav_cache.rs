//! Content-addressed WAV cache under `samples/<hash>.wav`.
//!
//! The teacher's loader calls a `cache_audio_file_for_project` helper that
//! was never defined in the retrieved source; this module supplies it,
//! grounded on the project file's cache contract (store the resampled,
//! device-rate asset once, keyed by content so repeated loads of the same
//! audio are free) and on the teacher's own `write_pcm16_wav` test helper,
//! generalized here to 32-bit float PCM.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::audio_engine::errors::SampleLoadError;

/// Hash decoded PCM content (plus channel count and sample rate, so two
/// files that happen to share sample bytes at different rates don't alias)
/// and return the hex digest used as the cache filename stem.
pub fn content_hash(samples: &[f32], channels: usize, sample_rate_hz: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channels.to_le_bytes());
    hasher.update(sample_rate_hz.to_le_bytes());
    for s in samples {
        hasher.update(s.to_le_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Write `samples` (interleaved, float32) as a canonical WAV under
/// `assets_dir/<hash>.wav`, unless it already exists (content-addressed
/// caches never need to be rewritten). Returns the path relative to
/// `assets_dir`'s parent, using POSIX separators, so the path written to
/// the project file is portable across machines.
pub fn cache_audio_file_for_project(
    assets_dir: &Path,
    samples: &[f32],
    channels: usize,
    sample_rate_hz: u32,
) -> Result<PathBuf, SampleLoadError> {
    std::fs::create_dir_all(assets_dir)?;

    let hash = content_hash(samples, channels, sample_rate_hz);
    let file_name = format!("{hash}.wav");
    let full_path = assets_dir.join(&file_name);

    if !full_path.exists() {
        write_f32_wav(&full_path, channels as u16, sample_rate_hz, samples)?;
    }

    let dir_name = assets_dir
        .file_name()
        .map(|n| n.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    Ok(PathBuf::from(format!("{dir_name}/{file_name}")))
}

/// Write interleaved 32-bit float PCM samples as a WAVE_FORMAT_IEEE_FLOAT
/// WAV file (format tag 3).
pub fn write_f32_wav(
    path: &Path,
    channels: u16,
    sample_rate_hz: u32,
    samples: &[f32],
) -> std::io::Result<()> {
    let bits_per_sample = 32u16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate_hz * u32::from(block_align);
    let data_len_bytes = u32::try_from(samples.len() * 4).expect("sample data too large");
    let chunk_size = 36 + data_len_bytes;

    let mut file = File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&chunk_size.to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&3u16.to_le_bytes())?; // WAVE_FORMAT_IEEE_FLOAT
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate_hz.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_len_bytes.to_le_bytes())?;
    for sample in samples {
        file.write_all(&sample.to_le_bytes())?;
    }

    file.sync_all()?;
    Ok(())
}

/// Read a WAV file's header just far enough to recover the sample rate,
/// without decoding the audio data. Used when restoring a pad from project
/// state to reject stale caches whose rate no longer matches the output
/// device.
pub fn probe_wav_sample_rate(path: &Path) -> std::io::Result<u32> {
    use std::io::{Read, Seek};

    let mut file = File::open(path)?;
    let mut riff_header = [0u8; 12];
    file.read_exact(&mut riff_header)?;
    if &riff_header[0..4] != b"RIFF" || &riff_header[8..12] != b"WAVE" {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "not a RIFF/WAVE file",
        ));
    }

    loop {
        let mut chunk_header = [0u8; 8];
        file.read_exact(&mut chunk_header)?;
        let chunk_id = &chunk_header[0..4];
        let chunk_len = u32::from_le_bytes(chunk_header[4..8].try_into().unwrap());

        if chunk_id == b"fmt " {
            let mut fmt = vec![0u8; chunk_len as usize];
            file.read_exact(&mut fmt)?;
            if fmt.len() < 8 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "fmt chunk too short",
                ));
            }
            let sample_rate = u32::from_le_bytes(fmt[4..8].try_into().unwrap());
            return Ok(sample_rate);
        }

        // Skip this chunk (chunks are word-aligned).
        let skip = chunk_len as u64 + (chunk_len % 2) as u64;
        file.seek_relative(skip as i64)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_order_sensitive() {
        let a = content_hash(&[0.1, 0.2, 0.3], 1, 44_100);
        let b = content_hash(&[0.1, 0.2, 0.3], 1, 44_100);
        let c = content_hash(&[0.3, 0.2, 0.1], 1, 44_100);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn content_hash_depends_on_rate_and_channels() {
        let a = content_hash(&[0.1, 0.2], 1, 44_100);
        let b = content_hash(&[0.1, 0.2], 1, 48_000);
        let c = content_hash(&[0.1, 0.2], 2, 44_100);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cache_writes_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let assets_dir = tmp.path().join("samples");
        let samples = vec![0.0f32, 0.5, -0.5, 1.0];

        let path1 = cache_audio_file_for_project(&assets_dir, &samples, 2, 44_100).unwrap();
        let full1 = tmp.path().join(&path1);
        assert!(full1.exists());
        let modified1 = std::fs::metadata(&full1).unwrap().modified().unwrap();

        let path2 = cache_audio_file_for_project(&assets_dir, &samples, 2, 44_100).unwrap();
        assert_eq!(path1, path2);
        let modified2 = std::fs::metadata(&full1).unwrap().modified().unwrap();
        assert_eq!(modified1, modified2);
    }

    #[test]
    fn round_trips_sample_rate_via_probe() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.wav");
        write_f32_wav(&path, 2, 48_000, &[0.0, 0.0, 0.1, -0.1]).unwrap();
        assert_eq!(probe_wav_sample_rate(&path).unwrap(), 48_000);
    }
}
