//! The active session, if any.

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::file::MidiFile;
use crate::playback::PlaybackLoop;
use crate::record::InputRecorder;
use crate::score::Score;

/// Exactly one of these holds at any time.
pub(super) enum Session {
    Idle,
    Recording(Recording),
    Playing(Playing),
}

impl Session {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording(_) => "recording",
            Self::Playing(_) => "playing",
        }
    }

    pub(super) fn clock(&self) -> Option<&SharedClock> {
        match self {
            Self::Idle => None,
            Self::Recording(r) => Some(&r.clock),
            Self::Playing(p) => Some(&p.clock),
        }
    }

    pub(super) fn playback(&self) -> Option<&PlaybackLoop> {
        match self {
            Self::Idle => None,
            Self::Recording(r) => Some(&r.playback),
            Self::Playing(p) => Some(&p.playback),
        }
    }

    pub(super) fn filename(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Recording(r) => Some(&r.filename),
            Self::Playing(p) => Some(&p.filename),
        }
    }
}

/// Recording into `filename`: the source file plays back (with the
/// metronome) while the recorder captures input.
pub(super) struct Recording {
    pub filename: String,
    pub file: MidiFile,
    pub score: Arc<Score>,
    pub clock: SharedClock,
    pub playback: PlaybackLoop,
    pub recorder: InputRecorder,
}

/// A finished take whose file could not be written yet.
pub(super) struct Unsaved {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub(super) struct Playing {
    pub filename: String,
    pub clock: SharedClock,
    pub playback: PlaybackLoop,
}
