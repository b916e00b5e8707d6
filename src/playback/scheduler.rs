//! Playback scheduler: sends due events and metronome clicks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::metronome::{BeatTracker, MetronomeConfig};
use crate::clock::SharedClock;
use crate::event::{passes_relay_filter, EventKind};
use crate::midi::MidiSink;
use crate::score::Score;

/// Consumes a score's timeline against the virtual clock.
///
/// The event cursor only moves forward. Filtered-out events are skipped,
/// never replayed.
pub struct PlaybackScheduler {
    score: Arc<Score>,
    clock: SharedClock,
    cursor: usize,
    beats: BeatTracker,
    metronome: MetronomeConfig,
    metronome_enabled: Arc<AtomicBool>,
    filter_enabled: bool,
    send_failures: u64,
}

impl PlaybackScheduler {
    pub fn new(score: Arc<Score>, clock: SharedClock, metronome: MetronomeConfig) -> Self {
        let beats = BeatTracker::new(score.tempo());
        Self {
            score,
            clock,
            cursor: 0,
            beats,
            metronome_enabled: Arc::new(AtomicBool::new(metronome.enabled)),
            metronome,
            filter_enabled: true,
            send_failures: 0,
        }
    }

    /// Relay every channel event instead of notes and pedals only.
    pub fn with_filter(mut self, enabled: bool) -> Self {
        self.filter_enabled = enabled;
        self
    }

    /// Flag read on every beat. Flip it from any thread.
    pub fn metronome_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.metronome_enabled)
    }

    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.metronome_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Index of the next event to play.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.score.timeline().len()
    }

    /// One scheduling pass: sample the clock and emit everything due.
    pub fn tick(&mut self, out: &mut dyn MidiSink) -> f64 {
        let now = self
            .clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sample();
        self.advance_to(now, out);
        now
    }

    /// Emit the beats and events due at virtual time `now`. Returns the
    /// number of event messages sent.
    pub fn advance_to(&mut self, now: f64, out: &mut dyn MidiSink) -> usize {
        let score = Arc::clone(&self.score);

        while now >= self.beats.next_beat().time_ms {
            let beat = self.beats.next_beat();
            if self.metronome_enabled.load(Ordering::Relaxed) {
                for message in self.metronome.click(beat.index == 0) {
                    self.send(out, &message);
                }
            }
            self.beats.advance(score.tempo(), score.signatures());
        }

        let mut sent = 0;
        let mut buf = [0u8; 3];
        while let Some(event) = score.timeline().get(self.cursor) {
            if event.play_time > now {
                break;
            }
            self.cursor += 1;
            let EventKind::Channel(channel) = &event.event.kind else {
                continue;
            };
            if self.filter_enabled && !passes_relay_filter(channel) {
                continue;
            }
            self.send(out, channel.encode(&mut buf));
            sent += 1;
        }
        sent
    }

    fn send(&mut self, out: &mut dyn MidiSink, message: &[u8]) {
        if let Err(e) = out.send(message) {
            // A disconnected port would fail on every pass.
            if self.send_failures == 0 {
                log::warn!("MIDI send to {} failed: {e}", out.name());
            } else {
                log::debug!("MIDI send to {} failed: {e}", out.name());
            }
            self.send_failures += 1;
        }
    }
}
