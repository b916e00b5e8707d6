//! Score: a loaded file prepared for playback: merged timeline plus the
//! tempo and signature maps derived from it.

use crate::event::Timeline;
use crate::file::MidiFile;
use crate::tempo::{TempoMap, TempoMapError, TimeSignatureMap};

#[derive(Debug, Clone)]
pub struct Score {
    timeline: Timeline,
    tempo: TempoMap,
    signatures: TimeSignatureMap,
}

impl Score {
    /// Merge the file's tracks and build its maps in one pass.
    pub fn from_file(file: &MidiFile) -> Result<Self, TempoMapError> {
        let timeline = Timeline::merge(file);
        let tempo = TempoMap::from_timeline(&timeline, file.ticks_per_beat)?;
        let signatures = TimeSignatureMap::from_timeline(&timeline, file.ticks_per_beat)?;
        log::debug!(
            "score: {} events, {} tempo entries, {} signatures, {:.0}ms",
            timeline.len(),
            tempo.entries().len(),
            signatures.entries().len(),
            timeline.duration_ms()
        );
        Ok(Self {
            timeline,
            tempo,
            signatures,
        })
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.tempo.ticks_per_beat()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn signatures(&self) -> &TimeSignatureMap {
        &self.signatures
    }
}
