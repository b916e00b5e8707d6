//! Metronome: beat positions from the signature map and the click sound.

use serde::{Deserialize, Serialize};

use crate::tempo::{TempoCursor, TempoMap, TimeSignatureMap};

/// A beat on both time axes. `index` is the position in the bar; 0 is the
/// downbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    pub tick: u64,
    pub time_ms: f64,
    pub index: u8,
}

/// Walks the beats of a score in order.
///
/// A bar restarts exactly on a time-signature change: when the change falls
/// on or before the next regular beat, the beat snaps to it with index 0.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    next: Beat,
    signature: usize,
    tempo_cursor: TempoCursor,
}

impl BeatTracker {
    /// Start at the downbeat on tick 0.
    pub fn new(tempo: &TempoMap) -> Self {
        let mut tempo_cursor = TempoCursor::default();
        let time_ms = tempo.tick_to_time_with(&mut tempo_cursor, 0);
        Self {
            next: Beat {
                tick: 0,
                time_ms,
                index: 0,
            },
            signature: 0,
            tempo_cursor,
        }
    }

    /// The next beat that has not been passed yet.
    pub fn next_beat(&self) -> Beat {
        self.next
    }

    /// Move past the current beat and return the following one.
    pub fn advance(&mut self, tempo: &TempoMap, signatures: &TimeSignatureMap) -> Beat {
        let entries = signatures.entries();
        let current = entries[self.signature];
        let beat_tick = self.next.tick + current.beat_ticks(signatures.ticks_per_beat());

        match entries.get(self.signature + 1) {
            Some(change) if change.tick <= beat_tick => {
                self.signature += 1;
                self.next.tick = change.tick;
                self.next.index = 0;
            }
            _ => {
                self.next.tick = beat_tick;
                self.next.index = (self.next.index + 1) % current.numerator;
            }
        }
        self.next.time_ms = tempo.tick_to_time_with(&mut self.tempo_cursor, self.next.tick);
        self.next
    }
}

/// Click sound settings (the `metronome:` config section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Whether sessions start with the metronome on.
    pub enabled: bool,
    pub channel: u8,
    pub accent_note: u8,
    pub regular_note: u8,
    pub velocity: u8,
}

impl MetronomeConfig {
    /// NOTE_ON then NOTE_OFF for one click.
    pub fn click(&self, accent: bool) -> [[u8; 3]; 2] {
        let channel = self.channel & 0x0F;
        let note = (if accent { self.accent_note } else { self.regular_note }) & 0x7F;
        [
            [0x90 | channel, note, self.velocity & 0x7F],
            [0x80 | channel, note, 0],
        ]
    }
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: 0,
            accent_note: 0x7F,
            regular_note: 0x78,
            velocity: 0x55,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::SignatureEntry;
    use assert_approx_eq::assert_approx_eq;

    fn beats(signatures: &TimeSignatureMap, tempo: &TempoMap, count: usize) -> Vec<(u64, u8)> {
        let mut tracker = BeatTracker::new(tempo);
        let mut out = vec![(tracker.next_beat().tick, tracker.next_beat().index)];
        for _ in 1..count {
            let beat = tracker.advance(tempo, signatures);
            out.push((beat.tick, beat.index));
        }
        out
    }

    #[test]
    fn four_four_cycles_every_480_ticks() {
        let tempo = TempoMap::constant(480, 500_000).unwrap();
        let signatures = TimeSignatureMap::new(480, vec![]).unwrap();
        let got = beats(&signatures, &tempo, 6);
        assert_eq!(got, vec![(0, 0), (480, 1), (960, 2), (1440, 3), (1920, 0), (2400, 1)]);
    }

    #[test]
    fn six_eight_uses_eighth_beats() {
        let tempo = TempoMap::constant(480, 500_000).unwrap();
        let signatures = TimeSignatureMap::new(480, vec![SignatureEntry::new(0, 6, 3)]).unwrap();
        let got = beats(&signatures, &tempo, 7);
        assert_eq!(got[1], (240, 1));
        assert_eq!(got[6], (1440, 0));
    }

    #[test]
    fn off_beat_signature_change_restarts_the_bar() {
        let tempo = TempoMap::constant(480, 500_000).unwrap();
        let signatures = TimeSignatureMap::new(480, vec![SignatureEntry::new(700, 3, 2)]).unwrap();
        let got = beats(&signatures, &tempo, 4);
        assert_eq!(got, vec![(0, 0), (480, 1), (700, 0), (1180, 1)]);
    }

    #[test]
    fn beat_time_follows_tempo_map() {
        let tempo = TempoMap::constant(480, 1_000_000).unwrap();
        let signatures = TimeSignatureMap::new(480, vec![]).unwrap();
        let mut tracker = BeatTracker::new(&tempo);
        assert_eq!(tracker.next_beat().time_ms, 0.0);
        assert_approx_eq!(tracker.advance(&tempo, &signatures).time_ms, 1000.0);
    }

    #[test]
    fn click_messages() {
        let config = MetronomeConfig::default();
        assert_eq!(config.click(true), [[0x90, 0x7F, 0x55], [0x80, 0x7F, 0]]);
        assert_eq!(config.click(false), [[0x90, 0x78, 0x55], [0x80, 0x78, 0]]);
        let on_ten = MetronomeConfig { channel: 9, ..config };
        assert_eq!(on_ten.click(false)[0][0], 0x99);
    }
}
