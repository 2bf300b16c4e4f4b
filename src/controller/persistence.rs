//! Debounced, atomic persistence for [`ProjectState`].
//!
//! Grounded on `controller/persistence.py`'s `ProjectPersistence`: a dirty
//! flag plus a monotonic last-write timestamp, flushed at most once every
//! [`PERSIST_DEBOUNCE_SECONDS`]. Writes go to a temp file in the same
//! directory, fsynced, then renamed over the config file so a reader never
//! observes a partial write.
//!
//! Unlike the Python version, this tracker doesn't own the [`ProjectState`]
//! itself ([`Controller`](super::Controller) does); it only tracks whether a
//! write is owed and where to put it.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use crate::audio_engine::constants::PERSIST_DEBOUNCE_SECONDS;

use super::project_state::ProjectState;

pub const PROJECT_ASSETS_DIR: &str = "samples";
pub const PROJECT_CONFIG_FILE_NAME: &str = "flitzis_looper.config.json";

/// Errors from writing the project file to disk. Load failures are not
/// represented here: a missing or corrupt config file falls back to
/// [`ProjectState::default`] rather than surfacing an error (see
/// [`ProjectPersistence::load`]).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write project file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize project state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Debounce/IO tracker for writing a [`ProjectState`] to disk.
pub struct ProjectPersistence {
    config_path: PathBuf,
    dirty: bool,
    last_write: Option<Instant>,
}

pub fn default_config_path() -> PathBuf {
    Path::new(PROJECT_ASSETS_DIR).join(PROJECT_CONFIG_FILE_NAME)
}

impl ProjectPersistence {
    pub fn new() -> Self {
        Self::with_config_path(default_config_path())
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            dirty: false,
            last_write: None,
        }
    }

    /// Load a [`ProjectState`] from `config_path`, falling back to defaults
    /// when the file is missing or fails to parse (a hand-edited or
    /// corrupted config file must never stop the engine from starting).
    pub fn load(config_path: &Path) -> ProjectState {
        let mut state = match std::fs::read_to_string(config_path) {
            Ok(text) => serde_json::from_str::<ProjectState>(&text).unwrap_or_default(),
            Err(_) => ProjectState::default(),
        };
        state.normalize();
        state
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write `project` to disk if dirty and the debounce window has elapsed
    /// since the last write. Returns whether a write actually happened.
    pub fn maybe_flush(
        &mut self,
        project: &ProjectState,
        now: Instant,
    ) -> Result<bool, PersistenceError> {
        if !self.dirty {
            return Ok(false);
        }

        if let Some(last) = self.last_write
            && now.saturating_duration_since(last).as_secs_f64() < PERSIST_DEBOUNCE_SECONDS
        {
            return Ok(false);
        }

        self.flush(project, now)?;
        Ok(true)
    }

    /// Unconditionally serialize and write `project`, bypassing the debounce
    /// window. Used on clean shutdown.
    pub fn flush(&mut self, project: &ProjectState, now: Instant) -> Result<(), PersistenceError> {
        let text = serde_json::to_string_pretty(project)?;
        atomic_write(&self.config_path, &text)?;
        self.dirty = false;
        self.last_write = Some(now);
        Ok(())
    }
}

impl Default for ProjectPersistence {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `contents` to `path` by creating a sibling temp file, fsyncing it,
/// and renaming it over `path`. The rename is atomic on the same filesystem,
/// so a crash mid-write never leaves a truncated config file behind.
fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PROJECT_CONFIG_FILE_NAME.to_string());
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maybe_flush_is_noop_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut persistence = ProjectPersistence::with_config_path(path);
        assert!(
            !persistence
                .maybe_flush(&ProjectState::default(), Instant::now())
                .unwrap()
        );
    }

    #[test]
    fn maybe_flush_writes_once_dirty_and_not_debounced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut persistence = ProjectPersistence::with_config_path(path.clone());

        persistence.mark_dirty();
        assert!(
            persistence
                .maybe_flush(&ProjectState::default(), Instant::now())
                .unwrap()
        );
        assert!(path.exists());
        assert!(!persistence.is_dirty());
    }

    #[test]
    fn maybe_flush_respects_debounce_window() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut persistence = ProjectPersistence::with_config_path(path.clone());
        let project = ProjectState::default();

        let t0 = Instant::now();
        persistence.mark_dirty();
        assert!(persistence.maybe_flush(&project, t0).unwrap());

        persistence.mark_dirty();
        assert!(!persistence.maybe_flush(&project, t0).unwrap());
    }

    #[test]
    fn flush_round_trips_state_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut project = ProjectState::default();
        project.volume = 0.25;
        project.sample_paths[3] = Some("samples/abc.wav".to_string());

        let mut persistence = ProjectPersistence::with_config_path(path.clone());
        persistence.flush(&project, Instant::now()).unwrap();

        let restored = ProjectPersistence::load(&path);
        assert_eq!(restored.volume, 0.25);
        assert_eq!(restored.sample_paths[3].as_deref(), Some("samples/abc.wav"));
    }

    #[test]
    fn load_falls_back_to_default_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        let state = ProjectPersistence::load(&path);
        assert_eq!(state, ProjectState::default());
    }

    #[test]
    fn load_falls_back_to_default_when_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, b"not json").unwrap();
        let state = ProjectPersistence::load(&path);
        assert_eq!(state, ProjectState::default());
    }
}
