//! Input recorder: captures live input in the time domain and turns it
//! into tick-delta tracks when recording ends.
//!
//! The input callback runs on the driver's thread. It only filters, stamps
//! the message with the virtual clock and hands it over a channel; all tick
//! math happens in [`InputRecorder::finalize`].

pub mod quantize;

use std::sync::mpsc;

use crate::clock::SharedClock;
use crate::event::{passes_relay_filter, ChannelEvent};
use crate::midi::{InputHandler, InputPort, MidiBackend, PortError, PortSelector};
use crate::tempo::TempoMap;

pub use quantize::{quantize, RecordedTracks};

/// A filtered input message and the virtual time it arrived at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedEvent {
    pub time_ms: f64,
    pub event: ChannelEvent,
}

/// Parse and filter one raw input message, stamping it with `clock`.
///
/// Returns `None` for anything but notes and pedals, and for messages
/// arriving during the lead-in (negative virtual time).
pub fn capture(clock: &SharedClock, message: &[u8]) -> Option<CapturedEvent> {
    let Some(event) = ChannelEvent::from_bytes(message) else {
        log::trace!("ignoring unparsable input {message:02X?}");
        return None;
    };
    if !passes_relay_filter(&event) {
        log::trace!("filtered input {event:?}");
        return None;
    }
    let time_ms = clock.lock().unwrap_or_else(|e| e.into_inner()).sample();
    if time_ms < 0.0 {
        log::debug!("dropping input during lead-in at {time_ms:.1}ms");
        return None;
    }
    Some(CapturedEvent { time_ms, event })
}

pub struct InputRecorder {
    clock: SharedClock,
    sender: mpsc::Sender<CapturedEvent>,
    receiver: mpsc::Receiver<CapturedEvent>,
    port: Option<Box<dyn InputPort>>,
    captured: Vec<CapturedEvent>,
    stop_ms: Option<f64>,
}

impl InputRecorder {
    pub fn new(clock: SharedClock) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            clock,
            sender,
            receiver,
            port: None,
            captured: Vec::new(),
            stop_ms: None,
        }
    }

    /// The callback to register with an input port.
    pub fn handler(&self) -> InputHandler {
        let clock = SharedClock::clone(&self.clock);
        let sender = self.sender.clone();
        Box::new(move |message: &[u8]| {
            if let Some(event) = capture(&clock, message) {
                let _ = sender.send(event);
            }
        })
    }

    /// Open the input port and begin capturing.
    pub fn start(&mut self, backend: &dyn MidiBackend, selector: Option<&PortSelector>) -> Result<(), PortError> {
        let port = backend.open_input(selector, self.handler())?;
        self.port = Some(port);
        log::info!("recording started");
        Ok(())
    }

    /// Close the input port and note the stop time. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
            self.stop_ms = Some(self.clock.lock().unwrap_or_else(|e| e.into_inner()).sample());
            log::info!("recording stopped");
        }
        self.drain();
    }

    pub fn is_capturing(&self) -> bool {
        self.port.is_some()
    }

    /// Everything captured so far.
    pub fn captured(&mut self) -> &[CapturedEvent] {
        self.drain();
        &self.captured
    }

    /// Quantize the capture into tracks on `tempo`'s tick grid.
    pub fn finalize(&mut self, tempo: &TempoMap) -> RecordedTracks {
        self.drain();
        let tracks = quantize(&self.captured, tempo, self.stop_ms);
        log::debug!(
            "recorded {} events into {} note / {} pedal track events",
            self.captured.len(),
            tracks.notes.len(),
            tracks.pedal.len()
        );
        tracks
    }

    fn drain(&mut self) {
        self.captured.extend(self.receiver.try_iter());
    }
}

impl Drop for InputRecorder {
    fn drop(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
        }
    }
}
