//! Tempo map: tick ↔ millisecond conversion across tempo changes.

use super::{ms_to_ticks, ticks_to_ms, TempoMapError, DEFAULT_MICROS_PER_BEAT};
use crate::event::{MetaEvent, Timeline};

/// One tempo segment: from `tick` (reached at `time_ms`) onwards the tempo
/// is `micros_per_beat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEntry {
    pub tick: u64,
    pub time_ms: f64,
    pub micros_per_beat: u32,
}

impl TempoEntry {
    pub fn new(tick: u64, time_ms: f64, micros_per_beat: u32) -> Self {
        Self {
            tick,
            time_ms,
            micros_per_beat,
        }
    }
}

/// Forward-moving lookup position into a [`TempoMap`].
///
/// Queries in non-decreasing order advance the cursor in amortized O(1);
/// a query that goes backwards falls back to a binary search.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempoCursor {
    index: usize,
}

/// Ordered tempo segments of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ticks_per_beat: u16,
    entries: Vec<TempoEntry>,
}

impl TempoMap {
    /// Validate and wrap a list of entries.
    ///
    /// Entries must be strictly increasing in both tick and time. An empty
    /// list, or one that does not start at tick 0, gets the implicit
    /// 120 BPM entry at the front.
    pub fn new(ticks_per_beat: u16, mut entries: Vec<TempoEntry>) -> Result<Self, TempoMapError> {
        if ticks_per_beat == 0 {
            return Err(TempoMapError::ZeroTicksPerBeat);
        }
        if entries.first().map_or(true, |e| e.tick > 0) {
            entries.insert(0, TempoEntry::new(0, 0.0, DEFAULT_MICROS_PER_BEAT));
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].tick <= pair[0].tick || pair[1].time_ms <= pair[0].time_ms {
                return Err(TempoMapError::Unordered {
                    index: index + 1,
                    tick: pair[1].tick,
                });
            }
        }
        if let Some(zero) = entries.iter().find(|e| e.micros_per_beat == 0) {
            return Err(TempoMapError::ZeroTempo { tick: zero.tick });
        }
        Ok(Self {
            ticks_per_beat,
            entries,
        })
    }

    /// A map with a single constant tempo.
    pub fn constant(ticks_per_beat: u16, micros_per_beat: u32) -> Result<Self, TempoMapError> {
        Self::new(ticks_per_beat, vec![TempoEntry::new(0, 0.0, micros_per_beat)])
    }

    /// Collect the SET_TEMPO events of a merged timeline.
    ///
    /// Several tempo events on the same tick collapse to the last one.
    pub fn from_timeline(timeline: &Timeline, ticks_per_beat: u16) -> Result<Self, TempoMapError> {
        let mut entries: Vec<TempoEntry> = Vec::new();
        for (event, meta) in timeline.meta_events() {
            let MetaEvent::SetTempo { micros_per_beat } = *meta else {
                continue;
            };
            let entry = TempoEntry::new(event.play_tick, event.play_time, micros_per_beat);
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

    pub fn entries(&self) -> &[TempoEntry] {
        &self.entries
    }

    /// Tempo in force at `tick`.
    pub fn micros_per_beat_at(&self, tick: u64) -> u32 {
        self.entries[self.index_for_tick(tick)].micros_per_beat
    }

    /// Absolute milliseconds (at 1.0x) of `tick`.
    pub fn tick_to_time(&self, tick: u64) -> f64 {
        self.time_in_entry(self.index_for_tick(tick), tick)
    }

    /// Absolute tick reached at `time_ms`, rounded down. Negative times map to 0.
    pub fn time_to_tick(&self, time_ms: f64) -> u64 {
        self.tick_in_entry(self.index_for_time(time_ms), time_ms)
    }

    /// [`tick_to_time`](Self::tick_to_time) through a forward cursor.
    pub fn tick_to_time_with(&self, cursor: &mut TempoCursor, tick: u64) -> f64 {
        if self.entries[cursor.index].tick > tick {
            cursor.index = self.index_for_tick(tick);
        } else {
            while cursor.index + 1 < self.entries.len() && self.entries[cursor.index + 1].tick <= tick {
                cursor.index += 1;
            }
        }
        self.time_in_entry(cursor.index, tick)
    }

    /// [`time_to_tick`](Self::time_to_tick) through a forward cursor.
    pub fn time_to_tick_with(&self, cursor: &mut TempoCursor, time_ms: f64) -> u64 {
        if self.entries[cursor.index].time_ms > time_ms {
            cursor.index = self.index_for_time(time_ms);
        } else {
            while cursor.index + 1 < self.entries.len()
                && self.entries[cursor.index + 1].time_ms <= time_ms
            {
                cursor.index += 1;
            }
        }
        self.tick_in_entry(cursor.index, time_ms)
    }

    fn time_in_entry(&self, index: usize, tick: u64) -> f64 {
        let entry = &self.entries[index];
        entry.time_ms + ticks_to_ms(tick - entry.tick, entry.micros_per_beat, self.ticks_per_beat)
    }

    fn tick_in_entry(&self, index: usize, time_ms: f64) -> u64 {
        let entry = &self.entries[index];
        let offset = ms_to_ticks(
            (time_ms - entry.time_ms).max(0.0),
            entry.micros_per_beat,
            self.ticks_per_beat,
        );
        // Absorb float noise so exact beat boundaries don't floor to the tick before.
        entry.tick + (offset + 1e-6).floor() as u64
    }

    fn index_for_tick(&self, tick: u64) -> usize {
        // entries[0].tick == 0, so the partition point is always >= 1.
        self.entries.partition_point(|e| e.tick <= tick) - 1
    }

    fn index_for_time(&self, time_ms: f64) -> usize {
        self.entries
            .partition_point(|e| e.time_ms <= time_ms)
            .saturating_sub(1)
    }
}
