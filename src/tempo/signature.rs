//! Time-signature map: where bars restart and how long a beat is.

use super::TempoMapError;
use crate::event::{MetaEvent, Timeline};

/// A time signature taking effect at `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureEntry {
    pub tick: u64,
    /// Beats per bar.
    pub numerator: u8,
    /// Beat unit as a power of two: 2 = quarter, 3 = eighth.
    pub denominator_power: u8,
}

impl SignatureEntry {
    pub const FOUR_FOUR: Self = Self {
        tick: 0,
        numerator: 4,
        denominator_power: 2,
    };

    pub fn new(tick: u64, numerator: u8, denominator_power: u8) -> Self {
        Self {
            tick,
            numerator,
            denominator_power,
        }
    }

    /// Beat length in ticks: `2^(2 - denominator_power) × ticks_per_beat`,
    /// rounded down.
    pub fn beat_ticks(&self, ticks_per_beat: u16) -> u64 {
        let ticks = u64::from(ticks_per_beat);
        match self.denominator_power {
            p @ 0..=2 => ticks << (2 - p),
            p if p < 64 => ticks >> (p - 2),
            _ => 0,
        }
    }
}

/// Ordered time signatures of a file. Always has an entry at tick 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSignatureMap {
    ticks_per_beat: u16,
    entries: Vec<SignatureEntry>,
}

impl TimeSignatureMap {
    /// Validate and wrap a list of entries.
    ///
    /// Entries must be strictly increasing in tick. When nothing is declared
    /// at tick 0 the map starts in 4/4.
    pub fn new(ticks_per_beat: u16, mut entries: Vec<SignatureEntry>) -> Result<Self, TempoMapError> {
        if ticks_per_beat == 0 {
            return Err(TempoMapError::ZeroTicksPerBeat);
        }
        if entries.first().map_or(true, |e| e.tick > 0) {
            entries.insert(0, SignatureEntry::FOUR_FOUR);
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].tick <= pair[0].tick {
                return Err(TempoMapError::Unordered {
                    index: index + 1,
                    tick: pair[1].tick,
                });
            }
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| e.numerator == 0 || e.beat_ticks(ticks_per_beat) == 0)
        {
            return Err(TempoMapError::InvalidSignature {
                tick: bad.tick,
                numerator: bad.numerator,
                denominator_power: bad.denominator_power,
            });
        }
        Ok(Self {
            ticks_per_beat,
            entries,
        })
    }

    /// Collect the TIME_SIGNATURE events of a merged timeline.
    ///
    /// Several signatures on the same tick collapse to the last one.
    pub fn from_timeline(timeline: &Timeline, ticks_per_beat: u16) -> Result<Self, TempoMapError> {
        let mut entries: Vec<SignatureEntry> = Vec::new();
        for (event, meta) in timeline.meta_events() {
            let MetaEvent::TimeSignature {
                numerator,
                denominator_power,
                ..
            } = *meta
            else {
                continue;
            };
            let entry = SignatureEntry::new(event.play_tick, numerator, denominator_power);
            match entries.last_mut() {
                Some(last) if last.tick == entry.tick => *last = entry,
                _ => entries.push(entry),
            }
        }
        Self::new(ticks_per_beat, entries)
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    /// Signature in force at `tick`.
    pub fn at(&self, tick: u64) -> &SignatureEntry {
        let index = self.entries.partition_point(|e| e.tick <= tick) - 1;
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_length_follows_denominator() {
        assert_eq!(SignatureEntry::new(0, 4, 2).beat_ticks(480), 480);
        assert_eq!(SignatureEntry::new(0, 6, 3).beat_ticks(480), 240);
        assert_eq!(SignatureEntry::new(0, 2, 1).beat_ticks(480), 960);
        assert_eq!(SignatureEntry::new(0, 1, 0).beat_ticks(480), 1920);
        assert_eq!(SignatureEntry::new(0, 4, 5).beat_ticks(480), 60);
    }

    #[test]
    fn default_is_four_four() {
        let map = TimeSignatureMap::new(480, vec![]).unwrap();
        assert_eq!(map.entries(), &[SignatureEntry::FOUR_FOUR]);
    }

    #[test]
    fn declared_signature_at_zero_replaces_default() {
        let map = TimeSignatureMap::new(480, vec![SignatureEntry::new(0, 3, 2)]).unwrap();
        assert_eq!(map.entries().len(), 1);
        assert_eq!(map.at(10_000).numerator, 3);
    }

    #[test]
    fn lookup_by_tick() {
        let map = TimeSignatureMap::new(480, vec![SignatureEntry::new(4800, 3, 2)]).unwrap();
        assert_eq!(map.at(4799).numerator, 4);
        assert_eq!(map.at(4800).numerator, 3);
    }

    #[test]
    fn rejects_zero_numerator() {
        let err = TimeSignatureMap::new(480, vec![SignatureEntry::new(0, 0, 2)]).unwrap_err();
        assert!(matches!(err, TempoMapError::InvalidSignature { numerator: 0, .. }));
    }

    #[test]
    fn rejects_beat_shorter_than_a_tick() {
        let err = TimeSignatureMap::new(24, vec![SignatureEntry::new(0, 4, 7)]).unwrap_err();
        assert!(matches!(err, TempoMapError::InvalidSignature { .. }));
    }

    #[test]
    fn rejects_unordered_entries() {
        let err = TimeSignatureMap::new(
            480,
            vec![SignatureEntry::new(960, 3, 2), SignatureEntry::new(960, 4, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, TempoMapError::Unordered { .. }));
    }
}
