//! Per-voice stem tables.
//!
//! The source reconstructs a dynamic "stems" dict defensively
//! (`ensure_stems_structure`) every time it is touched. Here the shape is
//! fixed at compile time: a voice either has no stems (`Dry`) or has the
//! full five-slot array, each slot independently present or absent.

use crate::messages::{SampleBuffer, StemKind};

/// One stem table plus its mixing state.
#[derive(Debug, Clone)]
pub struct StemSlot {
    pub table: SampleBuffer,
    pub muted: bool,
    pub gain: f32,
    /// Smoothed [0, 1] mix coefficient, one-pole filtered toward `muted`'s
    /// target (0 when muted, 1 when not).
    pub mute_coef: f32,
}

impl StemSlot {
    pub fn new(table: SampleBuffer) -> Self {
        Self {
            table,
            muted: false,
            gain: 1.0,
            mute_coef: 1.0,
        }
    }
}

/// A pad's source material: dry only, or dry plus up to five stems sharing
/// its phasor.
#[derive(Debug, Clone, Default)]
pub enum PadSource {
    #[default]
    Dry,
    WithStems {
        stems: [Option<StemSlot>; 5],
    },
}

impl PadSource {
    pub fn has_any_active_stem(&self) -> bool {
        match self {
            PadSource::Dry => false,
            PadSource::WithStems { stems } => {
                stems.iter().flatten().any(|s| !s.muted)
            }
        }
    }

    pub fn stem_mut(&mut self, kind: StemKind) -> Option<&mut Option<StemSlot>> {
        match self {
            PadSource::Dry => None,
            PadSource::WithStems { stems } => Some(&mut stems[kind.index()]),
        }
    }

    pub fn ensure_with_stems(&mut self) -> &mut [Option<StemSlot>; 5] {
        if let PadSource::Dry = self {
            *self = PadSource::WithStems {
                stems: Default::default(),
            };
        }
        match self {
            PadSource::WithStems { stems } => stems,
            PadSource::Dry => unreachable!(),
        }
    }

    pub fn set_stem(&mut self, kind: StemKind, table: SampleBuffer) {
        let stems = self.ensure_with_stems();
        stems[kind.index()] = Some(StemSlot::new(table));
    }

    pub fn unload_stem(&mut self, kind: StemKind) {
        if let PadSource::WithStems { stems } = self {
            stems[kind.index()] = None;
        }
    }

    pub fn set_stem_muted(&mut self, kind: StemKind, muted: bool) {
        if let Some(slot) = self.stem_mut(kind).and_then(|s| s.as_mut()) {
            slot.muted = muted;
        }
    }

    pub fn set_stem_gain(&mut self, kind: StemKind, gain: f32) {
        if let Some(slot) = self.stem_mut(kind).and_then(|s| s.as_mut()) {
            slot.gain = gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn table() -> SampleBuffer {
        SampleBuffer {
            channels: 1,
            samples: Arc::from(vec![0.0f32; 4].into_boxed_slice()),
        }
    }

    #[test]
    fn dry_has_no_active_stems() {
        let src = PadSource::Dry;
        assert!(!src.has_any_active_stem());
    }

    #[test]
    fn setting_a_stem_activates_it() {
        let mut src = PadSource::Dry;
        src.set_stem(StemKind::Vocals, table());
        assert!(src.has_any_active_stem());
    }

    #[test]
    fn muting_the_only_stem_deactivates() {
        let mut src = PadSource::Dry;
        src.set_stem(StemKind::Bass, table());
        src.set_stem_muted(StemKind::Bass, true);
        assert!(!src.has_any_active_stem());
    }

    #[test]
    fn unloading_clears_the_slot() {
        let mut src = PadSource::Dry;
        src.set_stem(StemKind::Drums, table());
        src.unload_stem(StemKind::Drums);
        assert!(!src.has_any_active_stem());
    }
}
