//! Async sample loading/analysis orchestration, and restore-from-project.
//!
//! Grounded on `controller/loader.py`'s `LoaderController`, adapted from its
//! dict-based duck-typed event dispatch to Rust's typed
//! [`crate::messages::LoaderEvent`] enum.

use std::path::{Component, Path, PathBuf};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::audio_engine::constants::NUM_SAMPLES;
use crate::audio_engine::wav_cache::probe_wav_sample_rate;
use crate::messages::{BackgroundTaskKind, LoaderEvent};

use super::Controller;

fn id_out_of_range(id: usize) -> PyErr {
    PyValueError::new_err(format!(
        "id out of range (expected 0..{}, got {id})",
        NUM_SAMPLES - 1
    ))
}

/// A cached sample path is only trusted for restore if it's a relative,
/// POSIX-separated path rooted at `samples/`; anything else (absolute,
/// Windows-separated, outside the project) is treated as stale.
fn parse_cached_sample_path(path: &str) -> Option<PathBuf> {
    if path.contains('\\') {
        return None;
    }
    let rel = Path::new(path);
    let mut components = rel.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "samples" => {}
        _ => return None,
    }
    if rel.is_absolute() {
        return None;
    }
    Some(rel.to_path_buf())
}

impl Controller {
    fn clear_analysis_task_state(&mut self, id: usize) {
        self.session.analyzing_sample_ids.remove(&id);
        self.clear_analysis_task_messages(id);
    }

    fn clear_analysis_task_messages(&mut self, id: usize) {
        self.session.sample_analysis_errors.remove(&id);
        self.session.sample_analysis_progress.remove(&id);
        self.session.sample_analysis_stage.remove(&id);
    }

    fn clear_restored_pad(&mut self, id: usize) {
        self.project.sample_paths[id] = None;
        self.project.sample_analysis[id] = None;
        self.on_pad_bpm_changed(id);
    }

    fn store_sample_analysis(&mut self, id: usize, analysis: crate::messages::SampleAnalysis) {
        self.project.sample_analysis[id] = Some(analysis);
        self.on_pad_bpm_changed(id);
        self.persistence.mark_dirty();
    }

    fn handle_loader_event(&mut self, event: LoaderEvent) {
        match event {
            LoaderEvent::Started { id } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                if self.project.sample_paths[id].is_none() {
                    self.project.sample_analysis[id] = None;
                    self.persistence.mark_dirty();
                }
                self.session.loading_sample_ids.insert(id);
                self.session.sample_load_errors.remove(&id);
                self.session.sample_load_progress.remove(&id);
                self.session.sample_load_stage.remove(&id);
                self.clear_analysis_task_state(id);
            }

            LoaderEvent::Progress { id, percent, stage } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                self.session.sample_load_stage.insert(id, stage);
                self.session.sample_load_progress.insert(id, percent);
            }

            LoaderEvent::Success {
                id,
                cached_path,
                analysis,
                ..
            } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                self.session.loading_sample_ids.remove(&id);
                self.session.sample_load_errors.remove(&id);
                self.session.sample_load_progress.remove(&id);
                self.session.sample_load_stage.remove(&id);
                self.session.pending_sample_paths.remove(&id);

                if self.project.sample_paths[id].as_deref() != Some(cached_path.as_str()) {
                    self.project.sample_paths[id] = Some(cached_path);
                    self.persistence.mark_dirty();
                }

                if let Some(analysis) = analysis {
                    self.store_sample_analysis(id, analysis);
                }
                self.clear_analysis_task_state(id);
            }

            LoaderEvent::Error { id, error } => {
                if id >= NUM_SAMPLES {
                    return;
                }
                self.session.loading_sample_ids.remove(&id);
                self.session.sample_load_progress.remove(&id);
                self.session.sample_load_stage.remove(&id);
                self.session.pending_sample_paths.remove(&id);
                self.clear_analysis_task_state(id);

                if self.project.sample_paths[id].is_some() {
                    self.clear_restored_pad(id);
                    self.persistence.mark_dirty();
                }
                self.session.sample_load_errors.insert(id, error);
            }

            LoaderEvent::TaskStarted { id, task } => {
                if id >= NUM_SAMPLES || task != BackgroundTaskKind::Analysis {
                    return;
                }
                self.session.analyzing_sample_ids.insert(id);
                self.clear_analysis_task_messages(id);
            }

            LoaderEvent::TaskProgress {
                id,
                task,
                percent,
                stage,
            } => {
                if id >= NUM_SAMPLES || task != BackgroundTaskKind::Analysis {
                    return;
                }
                self.session.sample_analysis_stage.insert(id, stage);
                self.session.sample_analysis_progress.insert(id, percent);
            }

            LoaderEvent::TaskSuccess { id, task, analysis } => {
                if id >= NUM_SAMPLES || task != BackgroundTaskKind::Analysis {
                    return;
                }
                self.store_sample_analysis(id, analysis);
                self.clear_analysis_task_state(id);
            }

            LoaderEvent::TaskError { id, task, error } => {
                if id >= NUM_SAMPLES || task != BackgroundTaskKind::Analysis {
                    return;
                }
                self.session.analyzing_sample_ids.remove(&id);
                self.session.sample_analysis_progress.remove(&id);
                self.session.sample_analysis_stage.remove(&id);
                self.session.sample_analysis_errors.insert(id, error);
            }
        }
    }

    /// Drain every pending loader event from the audio engine's background
    /// threads, updating project/session state. Call once per UI frame.
    pub(crate) fn pump_loader_events(&mut self) {
        while let Some(event) = self.audio.try_recv_loader_event() {
            self.handle_loader_event(event);
        }
    }
}

#[pymethods]
impl Controller {
    /// Load an audio file into a pad slot on a background thread, replacing
    /// whatever is already there. Progress/completion arrive later via
    /// [`Controller::pump`].
    pub fn load_sample_async(&mut self, id: usize, path: String) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        if self.is_sample_loaded(id)? {
            self.unload_sample(id)?;
        }

        self.project.sample_analysis[id] = None;
        self.persistence.mark_dirty();

        self.session.sample_load_errors.remove(&id);
        self.session.sample_load_progress.remove(&id);
        self.session.sample_load_stage.remove(&id);
        self.clear_analysis_task_state(id);

        self.session.pending_sample_paths.insert(id, path.clone());
        self.session.loading_sample_ids.insert(id);

        self.audio.load_sample_async(id, path, Some(true))
    }

    /// Stop playback and unload a pad, deleting its cached asset if it was
    /// written under `samples/` by this project (not an externally-managed
    /// path).
    pub fn unload_sample(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }

        self.session.active_sample_ids.remove(&id);
        self.session.paused_sample_ids.remove(&id);
        self.session.loading_sample_ids.remove(&id);
        self.session.pending_sample_paths.remove(&id);
        self.session.sample_load_progress.remove(&id);
        self.session.sample_load_stage.remove(&id);
        self.session.sample_load_errors.remove(&id);
        self.clear_analysis_task_state(id);

        let old_path = self.project.sample_paths[id].clone();

        self.audio.unload_sample(id)?;
        self.project.sample_paths[id] = None;
        self.project.sample_analysis[id] = None;
        self.on_pad_bpm_changed(id);
        self.persistence.mark_dirty();

        if let Some(old_path) = old_path
            && let Some(rel) = parse_cached_sample_path(&old_path)
        {
            let _ = std::fs::remove_file(rel);
        }

        Ok(())
    }

    pub fn analyze_sample_async(&mut self, id: usize) -> PyResult<()> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        if self.is_sample_loading(id)? {
            return Ok(());
        }

        self.clear_analysis_task_messages(id);
        self.session.analyzing_sample_ids.insert(id);

        if let Err(err) = self.audio.analyze_sample_async(id) {
            self.session.analyzing_sample_ids.remove(&id);
            self.session
                .sample_analysis_errors
                .insert(id, err.to_string());
        }
        Ok(())
    }

    /// Schedule restore loads for every cached sample referenced by the
    /// current project, rejecting paths that don't live under `samples/` or
    /// whose cached sample rate no longer matches the output device.
    pub fn restore_samples_from_project_state(&mut self) -> PyResult<()> {
        let Some(output_sample_rate) = self.audio.output_sample_rate_opt() else {
            return Ok(());
        };

        let mut changed = false;
        for id in 0..NUM_SAMPLES {
            let Some(path) = self.project.sample_paths[id].clone() else {
                continue;
            };

            let Some(rel) = parse_cached_sample_path(&path) else {
                self.clear_restored_pad(id);
                changed = true;
                continue;
            };

            let usable = probe_wav_sample_rate(&rel)
                .map(|rate| rate == output_sample_rate)
                .unwrap_or(false);
            if !usable {
                self.clear_restored_pad(id);
                changed = true;
                continue;
            }

            let path_str = rel.to_string_lossy().replace('\\', "/");
            self.session.pending_sample_paths.insert(id, path_str.clone());
            self.session.loading_sample_ids.insert(id);

            if self.audio.load_sample_async(id, path_str, Some(false)).is_err() {
                self.session.loading_sample_ids.remove(&id);
                self.session.pending_sample_paths.remove(&id);
                self.clear_restored_pad(id);
                changed = true;
            }
        }

        if changed {
            self.persistence.mark_dirty();
        }
        Ok(())
    }

    pub fn is_sample_loaded(&self, id: usize) -> PyResult<bool> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.project.sample_paths[id].is_some())
    }

    pub fn is_sample_loading(&self, id: usize) -> PyResult<bool> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.session.loading_sample_ids.contains(&id))
    }

    pub fn pending_sample_path(&self, id: usize) -> PyResult<Option<String>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.session.pending_sample_paths.get(&id).cloned())
    }

    pub fn sample_load_error(&self, id: usize) -> PyResult<Option<String>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.session.sample_load_errors.get(&id).cloned())
    }

    pub fn sample_load_progress(&self, id: usize) -> PyResult<Option<f32>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.session.sample_load_progress.get(&id).copied())
    }

    pub fn sample_load_stage(&self, id: usize) -> PyResult<Option<String>> {
        if id >= NUM_SAMPLES {
            return Err(id_out_of_range(id));
        }
        Ok(self.session.sample_load_stage.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::project_state::ProjectState;
    use crate::controller::session_state::SessionState;
    use crate::messages::{BeatGridData, SampleAnalysis};

    fn new_controller() -> Controller {
        Controller::new_headless(ProjectState::default(), SessionState::new())
    }

    #[test]
    fn parse_cached_sample_path_rejects_outside_samples_dir() {
        assert!(parse_cached_sample_path("other/foo.wav").is_none());
        assert!(parse_cached_sample_path("/abs/samples/foo.wav").is_none());
        assert!(parse_cached_sample_path("samples\\foo.wav").is_none());
        assert!(parse_cached_sample_path("samples/foo.wav").is_some());
    }

    #[test]
    fn loader_started_event_marks_pad_loading() {
        let mut controller = new_controller();
        controller.handle_loader_event(LoaderEvent::Started { id: 1 });
        assert!(controller.session.loading_sample_ids.contains(&1));
    }

    #[test]
    fn loader_success_event_sets_sample_path_and_analysis() {
        let mut controller = new_controller();
        controller.session.loading_sample_ids.insert(0);
        controller.handle_loader_event(LoaderEvent::Success {
            id: 0,
            duration_sec: 2.0,
            cached_path: "samples/abc.wav".to_string(),
            analysis: Some(SampleAnalysis {
                bpm: 120.0,
                key: "Am".to_string(),
                beat_grid: BeatGridData::default(),
            }),
        });

        assert!(!controller.session.loading_sample_ids.contains(&0));
        assert_eq!(
            controller.project.sample_paths[0].as_deref(),
            Some("samples/abc.wav")
        );
        assert_eq!(
            controller.project.sample_analysis[0].as_ref().unwrap().bpm,
            120.0
        );
    }

    #[test]
    fn loader_error_event_clears_pad_and_records_message() {
        let mut controller = new_controller();
        controller.project.sample_paths[0] = Some("samples/abc.wav".to_string());
        controller.session.loading_sample_ids.insert(0);

        controller.handle_loader_event(LoaderEvent::Error {
            id: 0,
            error: "decode failed".to_string(),
        });

        assert!(controller.project.sample_paths[0].is_none());
        assert_eq!(
            controller.session.sample_load_errors.get(&0).map(String::as_str),
            Some("decode failed")
        );
    }

    #[test]
    fn task_events_ignore_non_analysis_tasks() {
        let mut controller = new_controller();
        controller.handle_loader_event(LoaderEvent::TaskStarted {
            id: 0,
            task: BackgroundTaskKind::Analysis,
        });
        assert!(controller.session.analyzing_sample_ids.contains(&0));
    }
}
