//! Event data model: decoded track events and their timed, merged form.
//!
//! A [`RawEvent`] is one event as stored in a track: a tick delta since the
//! previous event of that track plus what happened. A [`TimedEvent`] is the
//! same event after the merge pass has placed it on the absolute tick and
//! millisecond axes.

/// Channel-message kind, the high nibble of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subtype {
    NoteOff = 0x8,
    NoteOn = 0x9,
    NoteAftertouch = 0xA,
    Controller = 0xB,
    ProgramChange = 0xC,
    ChannelAftertouch = 0xD,
    PitchBend = 0xE,
}

impl Subtype {
    /// Decode the high nibble of a status byte.
    pub fn from_status(status: u8) -> Option<Self> {
        match status >> 4 {
            0x8 => Some(Self::NoteOff),
            0x9 => Some(Self::NoteOn),
            0xA => Some(Self::NoteAftertouch),
            0xB => Some(Self::Controller),
            0xC => Some(Self::ProgramChange),
            0xD => Some(Self::ChannelAftertouch),
            0xE => Some(Self::PitchBend),
            _ => None,
        }
    }

    /// Number of data bytes following the status byte.
    pub fn data_len(self) -> usize {
        match self {
            Self::ProgramChange | Self::ChannelAftertouch => 1,
            _ => 2,
        }
    }
}

/// A channel voice message: `status = subtype << 4 | channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelEvent {
    pub subtype: Subtype,
    /// MIDI channel (0–15).
    pub channel: u8,
    pub param1: u8,
    /// Zero for one-data-byte messages.
    pub param2: u8,
}

impl ChannelEvent {
    pub fn new(subtype: Subtype, channel: u8, param1: u8, param2: u8) -> Self {
        Self {
            subtype,
            channel: channel & 0x0F,
            param1: param1 & 0x7F,
            param2: param2 & 0x7F,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(Subtype::NoteOn, channel, note, velocity)
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(Subtype::NoteOff, channel, note, velocity)
    }

    pub fn controller(channel: u8, controller: u8, value: u8) -> Self {
        Self::new(Subtype::Controller, channel, controller, value)
    }

    pub fn status(&self) -> u8 {
        ((self.subtype as u8) << 4) | self.channel
    }

    /// Parse a raw wire message. Returns `None` for system messages and
    /// truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let subtype = Subtype::from_status(status)?;
        if data.len() < subtype.data_len() {
            return None;
        }
        let param2 = if subtype.data_len() == 2 { data[1] } else { 0 };
        Some(Self::new(subtype, status & 0x0F, data[0], param2))
    }

    /// Serialize into `buf`, returning the 2 or 3 bytes that make up the
    /// message.
    pub fn encode<'a>(&self, buf: &'a mut [u8; 3]) -> &'a [u8] {
        buf[0] = self.status();
        buf[1] = self.param1;
        buf[2] = self.param2;
        &buf[..1 + self.subtype.data_len()]
    }
}

/// Meta events the timing engine understands. Anything else is carried
/// through untouched as [`MetaEvent::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    SetTempo {
        micros_per_beat: u32,
    },
    TimeSignature {
        numerator: u8,
        /// Denominator as a power of two (2 = quarter note).
        denominator_power: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    },
    EndOfTrack,
    Other {
        meta_type: u8,
        data: Vec<u8>,
    },
}

/// What a track event does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Channel(ChannelEvent),
    Meta(MetaEvent),
    SysEx { data: Vec<u8>, escape: bool },
}

/// One decoded event as stored in a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Ticks since the previous event in the same track.
    pub delta: u32,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn channel(delta: u32, event: ChannelEvent) -> Self {
        Self {
            delta,
            kind: EventKind::Channel(event),
        }
    }

    pub fn meta(delta: u32, meta: MetaEvent) -> Self {
        Self {
            delta,
            kind: EventKind::Meta(meta),
        }
    }

    pub fn end_of_track(delta: u32) -> Self {
        Self::meta(delta, MetaEvent::EndOfTrack)
    }

    pub fn channel_event(&self) -> Option<&ChannelEvent> {
        match &self.kind {
            EventKind::Channel(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self.kind, EventKind::Meta(MetaEvent::EndOfTrack))
    }
}

/// A track event placed on the absolute tick and millisecond axes.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub event: RawEvent,
    /// Index of the source track.
    pub track: usize,
    /// Absolute ticks from the start of the file.
    pub play_tick: u64,
    /// Absolute milliseconds at 1.0x speed, derived from the tempo map.
    pub play_time: f64,
}
