//! pianola: record and replay a MIDI instrument.
//!
//! A [`clock::VirtualClock`] drives both directions: the playback
//! scheduler turns clock time into ticks through the file's tempo map,
//! and the input recorder stamps incoming messages with clock time and
//! quantizes them back to ticks. [`session::SessionController`] ties the
//! two to a MIDI backend and the file store.

pub mod clock;
pub mod config;
pub mod event;
pub mod file;
pub mod midi;
pub mod playback;
pub mod record;
pub mod score;
pub mod session;
pub mod tempo;
