//! Tempo and time-signature maps.

pub mod map;
pub mod signature;

use thiserror::Error;

pub use map::{TempoCursor, TempoEntry, TempoMap};
pub use signature::{SignatureEntry, TimeSignatureMap};

/// Tempo of a file with no SET_TEMPO event: 120 BPM.
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// Milliseconds spanned by `ticks` at a constant tempo.
///
/// Every tick-to-time conversion goes through here so the merged timeline
/// and the tempo map agree to the last bit.
pub fn ticks_to_ms(ticks: u64, micros_per_beat: u32, ticks_per_beat: u16) -> f64 {
    ticks as f64 * f64::from(micros_per_beat) / (1000.0 * f64::from(ticks_per_beat))
}

/// Fractional tick count spanned by `ms` at a constant tempo.
pub fn ms_to_ticks(ms: f64, micros_per_beat: u32, ticks_per_beat: u16) -> f64 {
    ms * 1000.0 * f64::from(ticks_per_beat) / f64::from(micros_per_beat)
}

/// A tempo or signature map that cannot drive a clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TempoMapError {
    #[error("ticks per beat must be positive")]
    ZeroTicksPerBeat,
    #[error("entry {index} at tick {tick} does not follow the previous entry")]
    Unordered { index: usize, tick: u64 },
    #[error("zero tempo at tick {tick}")]
    ZeroTempo { tick: u64 },
    #[error("invalid time signature {numerator}/2^{denominator_power} at tick {tick}")]
    InvalidSignature {
        tick: u64,
        numerator: u8,
        denominator_power: u8,
    },
}
