//! Playback: the real-time scheduler, metronome beats, and the loop thread.

pub mod metronome;
pub mod runner;
pub mod scheduler;

pub use metronome::{Beat, BeatTracker, MetronomeConfig};
pub use runner::{reset_messages, PlaybackLoop};
pub use scheduler::PlaybackScheduler;
