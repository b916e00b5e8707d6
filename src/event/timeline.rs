//! Merged, time-stamped event list.
//!
//! The timeline is built in one merge pass over a file's tracks. Each
//! [`TimedEvent`] leaves the pass with its absolute tick and its absolute
//! millisecond time, computed with the tempo in force at that point.

use super::types::{EventKind, MetaEvent, RawEvent, TimedEvent};
use crate::file::{Format, MidiFile};
use crate::tempo::{ticks_to_ms, DEFAULT_MICROS_PER_BEAT};

/// Events of a whole file, sorted by play tick.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<TimedEvent>,
}

impl Timeline {
    /// Merge the tracks of `file` into a single sorted timeline.
    ///
    /// Format 1 files with several tracks are merged by absolute tick; ties go
    /// to the lower track index and in-track order is preserved. Other files
    /// are walked track after track with a running tick count.
    pub fn merge(file: &MidiFile) -> Self {
        let ordered = if file.format == Format::Parallel && file.tracks.len() > 1 {
            merge_parallel(&file.tracks)
        } else {
            walk_sequential(&file.tracks)
        };

        let ticks_per_beat = file.ticks_per_beat.max(1);
        // Start of the current tempo segment: (tick, time, tempo).
        let mut segment = (0u64, 0.0f64, DEFAULT_MICROS_PER_BEAT);

        let events = ordered
            .into_iter()
            .map(|(track, play_tick, event)| {
                let (start_tick, start_time, tempo) = segment;
                let play_time =
                    start_time + ticks_to_ms(play_tick - start_tick, tempo, ticks_per_beat);
                if let EventKind::Meta(MetaEvent::SetTempo { micros_per_beat }) = event.kind {
                    segment = (play_tick, play_time, micros_per_beat);
                }
                TimedEvent {
                    event,
                    track,
                    play_tick,
                    play_time,
                }
            })
            .collect();

        Self { events }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&TimedEvent> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over meta events of the timeline.
    pub fn meta_events(&self) -> impl Iterator<Item = (&TimedEvent, &MetaEvent)> {
        self.events.iter().filter_map(|e| match &e.event.kind {
            EventKind::Meta(meta) => Some((e, meta)),
            _ => None,
        })
    }

    /// Play time of the last event, in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.play_time)
    }
}

fn walk_sequential(tracks: &[Vec<RawEvent>]) -> Vec<(usize, u64, RawEvent)> {
    let mut tick = 0u64;
    let mut out = Vec::with_capacity(tracks.iter().map(Vec::len).sum());
    for (track, events) in tracks.iter().enumerate() {
        for event in events {
            tick += u64::from(event.delta);
            out.push((track, tick, event.clone()));
        }
    }
    out
}

fn merge_parallel(tracks: &[Vec<RawEvent>]) -> Vec<(usize, u64, RawEvent)> {
    // Per-track read position and absolute tick of the event at that position.
    let mut positions = vec![0usize; tracks.len()];
    let mut heads: Vec<Option<u64>> = tracks
        .iter()
        .map(|t| t.first().map(|e| u64::from(e.delta)))
        .collect();
    let mut out = Vec::with_capacity(tracks.iter().map(Vec::len).sum());

    loop {
        let next = heads
            .iter()
            .enumerate()
            .filter_map(|(track, head)| head.map(|tick| (tick, track)))
            .min();
        let Some((tick, track)) = next else {
            break;
        };

        let events = &tracks[track];
        out.push((track, tick, events[positions[track]].clone()));
        positions[track] += 1;
        heads[track] = events
            .get(positions[track])
            .map(|e| tick + u64::from(e.delta));
    }
    out
}
