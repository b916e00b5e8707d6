//! Relay filter: which channel messages pass during live relay and capture.
//!
//! Only notes and the three piano pedals get through. Everything else
//! (program changes, volume, pitch bend, ...) is suppressed.

use super::types::{ChannelEvent, Subtype};

/// Damper (sustain) pedal.
pub const SUSTAIN: u8 = 0x40;
/// Sostenuto pedal.
pub const SOSTENUTO: u8 = 0x42;
/// Soft (una corda) pedal.
pub const SOFT: u8 = 0x43;

pub const PEDAL_CONTROLLERS: [u8; 3] = [SUSTAIN, SOSTENUTO, SOFT];

/// Whether the message survives the relay filter.
pub fn passes_relay_filter(event: &ChannelEvent) -> bool {
    match event.subtype {
        Subtype::NoteOn | Subtype::NoteOff => true,
        Subtype::Controller => is_pedal(event.param1),
        _ => false,
    }
}

pub fn is_pedal(controller: u8) -> bool {
    PEDAL_CONTROLLERS.contains(&controller)
}
