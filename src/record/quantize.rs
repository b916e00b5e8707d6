//! Quantization: captured time-domain input to tick-delta tracks.

use std::collections::BTreeSet;

use super::CapturedEvent;
use crate::event::{passes_relay_filter, ChannelEvent, RawEvent, Subtype};
use crate::tempo::{TempoCursor, TempoMap};

/// Pedal values at or above this count as pressed.
const PEDAL_DOWN: u8 = 64;

/// The two tracks a recording produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedTracks {
    pub notes: Vec<RawEvent>,
    pub pedal: Vec<RawEvent>,
}

impl RecordedTracks {
    /// Tracks that received events, in file order: notes, then pedal.
    pub fn into_tracks(self) -> Vec<Vec<RawEvent>> {
        [self.notes, self.pedal]
            .into_iter()
            .filter(|track| !track.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.pedal.is_empty()
    }
}

/// Builds one delta-encoded track, remembering the last absolute tick.
#[derive(Default)]
struct TrackBuilder {
    events: Vec<RawEvent>,
    last_tick: u64,
}

impl TrackBuilder {
    fn push(&mut self, tick: u64, event: ChannelEvent) {
        let tick = tick.max(self.last_tick);
        let delta = u32::try_from(tick - self.last_tick).unwrap_or(u32::MAX);
        self.events.push(RawEvent::channel(delta, event));
        self.last_tick = tick;
    }

    fn finish(mut self) -> Vec<RawEvent> {
        if !self.events.is_empty() {
            self.events.push(RawEvent::end_of_track(0));
        }
        self.events
    }
}

/// Convert captured events into a notes track and a pedal track.
///
/// Events that do not pass the relay filter are skipped. Each event is placed on the tick `tempo` gives for its time; its delta
/// is measured from the previous event of the same track, or from tick 0
/// for the first one. Notes still sounding and pedals still down at
/// `stop_ms` are released on the stop tick. Non-empty tracks end with
/// END_OF_TRACK.
pub fn quantize(events: &[CapturedEvent], tempo: &TempoMap, stop_ms: Option<f64>) -> RecordedTracks {
    let mut ordered: Vec<&CapturedEvent> = events
        .iter()
        .filter(|captured| passes_relay_filter(&captured.event))
        .collect();
    ordered.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));

    let mut cursor = TempoCursor::default();
    let mut notes = TrackBuilder::default();
    let mut pedal = TrackBuilder::default();
    // Keyed by (channel, key or controller) so release order is stable.
    let mut held_notes: BTreeSet<(u8, u8)> = BTreeSet::new();
    let mut pedals_down: BTreeSet<(u8, u8)> = BTreeSet::new();

    for captured in ordered {
        let tick = tempo.time_to_tick_with(&mut cursor, captured.time_ms);
        let event = captured.event;
        match event.subtype {
            Subtype::NoteOn if event.param2 > 0 => {
                held_notes.insert((event.channel, event.param1));
                notes.push(tick, event);
            }
            Subtype::NoteOn | Subtype::NoteOff => {
                held_notes.remove(&(event.channel, event.param1));
                notes.push(tick, event);
            }
            // Only pedal controllers are left.
            _ => {
                if event.param2 >= PEDAL_DOWN {
                    pedals_down.insert((event.channel, event.param1));
                } else {
                    pedals_down.remove(&(event.channel, event.param1));
                }
                pedal.push(tick, event);
            }
        }
    }

    if let Some(stop_ms) = stop_ms {
        let stop_tick = tempo.time_to_tick(stop_ms);
        for (channel, key) in held_notes {
            notes.push(stop_tick, ChannelEvent::note_off(channel, key, 0));
        }
        for (channel, controller) in pedals_down {
            pedal.push(stop_tick, ChannelEvent::controller(channel, controller, 0));
        }
    }

    RecordedTracks {
        notes: notes.finish(),
        pedal: pedal.finish(),
    }
}
