//! Standard MIDI file codec over `midly`.
//!
//! Files are decoded into owned [`RawEvent`] tracks so a loaded file can
//! outlive the byte buffer it came from and so recorded tracks can be
//! appended before the file is written back.

use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{ChannelEvent, EventKind, MetaEvent, RawEvent, Subtype};

const MAX_DELTA: u32 = 0x0FFF_FFFF;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid MIDI file: {0}")]
    Parse(#[from] midly::Error),
    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,
    #[error("failed to encode MIDI file: {0}")]
    Write(#[from] std::io::Error),
}

/// Track layout declared in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Format 0.
    SingleTrack,
    /// Format 1: tracks play simultaneously.
    Parallel,
    /// Format 2: tracks play one after another.
    Sequential,
}

impl From<midly::Format> for Format {
    fn from(format: midly::Format) -> Self {
        match format {
            midly::Format::SingleTrack => Self::SingleTrack,
            midly::Format::Parallel => Self::Parallel,
            midly::Format::Sequential => Self::Sequential,
        }
    }
}

impl From<Format> for midly::Format {
    fn from(format: Format) -> Self {
        match format {
            Format::SingleTrack => Self::SingleTrack,
            Format::Parallel => Self::Parallel,
            Format::Sequential => Self::Sequential,
        }
    }
}

/// Tempo and meter of a newly created recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationOptions {
    pub ticks_per_beat: u16,
    pub bpm: f64,
    pub numerator: u8,
    /// Written denominator (4 = quarter note). Must be a power of two.
    pub denominator: u8,
}

impl CreationOptions {
    pub fn micros_per_beat(&self) -> u32 {
        if self.bpm.is_finite() && self.bpm > 0.0 {
            (60_000_000.0 / self.bpm).round().clamp(1.0, 16_777_215.0) as u32
        } else {
            1_000_000
        }
    }

    /// Denominator as the power of two stored in TIME_SIGNATURE events.
    pub fn denominator_power(&self) -> u8 {
        self.denominator.max(1).ilog2() as u8
    }
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            bpm: 60.0,
            numerator: 4,
            denominator: 4,
        }
    }
}

/// A decoded MIDI file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    pub format: Format,
    pub ticks_per_beat: u16,
    pub tracks: Vec<Vec<RawEvent>>,
}

impl MidiFile {
    /// A fresh format-1 file holding only a conductor track.
    pub fn with_conductor(options: &CreationOptions) -> Self {
        let conductor = vec![
            RawEvent::meta(
                0,
                MetaEvent::SetTempo {
                    micros_per_beat: options.micros_per_beat(),
                },
            ),
            RawEvent::meta(
                0,
                MetaEvent::TimeSignature {
                    numerator: options.numerator,
                    denominator_power: options.denominator_power(),
                    clocks_per_click: 24,
                    thirty_seconds_per_quarter: 8,
                },
            ),
            RawEvent::end_of_track(0),
        ];
        Self {
            format: Format::Parallel,
            ticks_per_beat: options.ticks_per_beat.clamp(1, 0x7FFF),
            tracks: vec![conductor],
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(ticks) => ticks.as_int(),
            Timing::Timecode(..) => return Err(CodecError::UnsupportedTiming),
        };
        let tracks = smf
            .tracks
            .iter()
            .map(|track| track.iter().filter_map(decode_event).collect())
            .collect();
        Ok(Self {
            format: smf.header.format.into(),
            ticks_per_beat,
            tracks,
        })
    }

    /// Serialize to standard MIDI file bytes. Tracks missing a final
    /// END_OF_TRACK get one.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let tracks: Vec<Vec<TrackEvent<'_>>> = self
            .tracks
            .iter()
            .map(|track| {
                let mut events: Vec<TrackEvent<'_>> = track.iter().map(encode_event).collect();
                if !track.last().is_some_and(RawEvent::is_end_of_track) {
                    events.push(TrackEvent {
                        delta: u28::new(0),
                        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
                    });
                }
                events
            })
            .collect();
        let smf = Smf {
            header: Header::new(
                self.format.into(),
                Timing::Metrical(u15::from_int_lossy(self.ticks_per_beat)),
            ),
            tracks,
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;
        Ok(bytes)
    }

    /// Append a track. A single-track file becomes format 1.
    pub fn add_track(&mut self, events: Vec<RawEvent>) {
        if self.format == Format::SingleTrack {
            self.format = Format::Parallel;
        }
        self.tracks.push(events);
    }
}

fn decode_event(event: &TrackEvent<'_>) -> Option<RawEvent> {
    let delta = event.delta.as_int();
    let kind = match event.kind {
        TrackEventKind::Midi { channel, message } => {
            EventKind::Channel(decode_message(channel.as_int(), message))
        }
        TrackEventKind::Meta(meta) => EventKind::Meta(decode_meta(meta)?),
        TrackEventKind::SysEx(data) => EventKind::SysEx {
            data: data.to_vec(),
            escape: false,
        },
        TrackEventKind::Escape(data) => EventKind::SysEx {
            data: data.to_vec(),
            escape: true,
        },
    };
    Some(RawEvent { delta, kind })
}

fn decode_message(channel: u8, message: MidiMessage) -> ChannelEvent {
    match message {
        MidiMessage::NoteOff { key, vel } => ChannelEvent::note_off(channel, key.as_int(), vel.as_int()),
        MidiMessage::NoteOn { key, vel } => ChannelEvent::note_on(channel, key.as_int(), vel.as_int()),
        MidiMessage::Aftertouch { key, vel } => {
            ChannelEvent::new(Subtype::NoteAftertouch, channel, key.as_int(), vel.as_int())
        }
        MidiMessage::Controller { controller, value } => {
            ChannelEvent::controller(channel, controller.as_int(), value.as_int())
        }
        MidiMessage::ProgramChange { program } => {
            ChannelEvent::new(Subtype::ProgramChange, channel, program.as_int(), 0)
        }
        MidiMessage::ChannelAftertouch { vel } => {
            ChannelEvent::new(Subtype::ChannelAftertouch, channel, vel.as_int(), 0)
        }
        MidiMessage::PitchBend { bend } => {
            let value = bend.0.as_int();
            ChannelEvent::new(Subtype::PitchBend, channel, (value & 0x7F) as u8, (value >> 7) as u8)
        }
    }
}

fn decode_meta(meta: MetaMessage<'_>) -> Option<MetaEvent> {
    let other = |meta_type: u8, data: &[u8]| MetaEvent::Other {
        meta_type,
        data: data.to_vec(),
    };
    let event = match meta {
        MetaMessage::Tempo(tempo) => MetaEvent::SetTempo {
            micros_per_beat: tempo.as_int(),
        },
        MetaMessage::TimeSignature(numerator, denominator_power, clocks_per_click, thirty_seconds) => {
            MetaEvent::TimeSignature {
                numerator,
                denominator_power,
                clocks_per_click,
                thirty_seconds_per_quarter: thirty_seconds,
            }
        }
        MetaMessage::EndOfTrack => MetaEvent::EndOfTrack,
        MetaMessage::TrackNumber(number) => other(
            0x00,
            &number.map(u16::to_be_bytes).map(|b| b.to_vec()).unwrap_or_default(),
        ),
        MetaMessage::Text(data) => other(0x01, data),
        MetaMessage::Copyright(data) => other(0x02, data),
        MetaMessage::TrackName(data) => other(0x03, data),
        MetaMessage::InstrumentName(data) => other(0x04, data),
        MetaMessage::Lyric(data) => other(0x05, data),
        MetaMessage::Marker(data) => other(0x06, data),
        MetaMessage::CuePoint(data) => other(0x07, data),
        MetaMessage::ProgramName(data) => other(0x08, data),
        MetaMessage::DeviceName(data) => other(0x09, data),
        MetaMessage::MidiChannel(channel) => other(0x20, &[channel.as_int()]),
        MetaMessage::MidiPort(port) => other(0x21, &[port.as_int()]),
        MetaMessage::KeySignature(sharps, minor) => other(0x59, &[sharps as u8, u8::from(minor)]),
        MetaMessage::SequencerSpecific(data) => other(0x7F, data),
        MetaMessage::Unknown(meta_type, data) => other(meta_type, data),
        MetaMessage::SmpteOffset(_) => {
            log::debug!("dropping SMPTE offset meta event");
            return None;
        }
    };
    Some(event)
}

fn encode_event(event: &RawEvent) -> TrackEvent<'_> {
    let kind = match &event.kind {
        EventKind::Channel(channel) => TrackEventKind::Midi {
            channel: u4::from_int_lossy(channel.channel),
            message: encode_message(channel),
        },
        EventKind::Meta(meta) => TrackEventKind::Meta(encode_meta(meta)),
        EventKind::SysEx { data, escape: false } => TrackEventKind::SysEx(data),
        EventKind::SysEx { data, escape: true } => TrackEventKind::Escape(data),
    };
    TrackEvent {
        delta: u28::from_int_lossy(event.delta.min(MAX_DELTA)),
        kind,
    }
}

fn encode_message(event: &ChannelEvent) -> MidiMessage {
    let p1 = u7::from_int_lossy(event.param1);
    let p2 = u7::from_int_lossy(event.param2);
    match event.subtype {
        Subtype::NoteOff => MidiMessage::NoteOff { key: p1, vel: p2 },
        Subtype::NoteOn => MidiMessage::NoteOn { key: p1, vel: p2 },
        Subtype::NoteAftertouch => MidiMessage::Aftertouch { key: p1, vel: p2 },
        Subtype::Controller => MidiMessage::Controller {
            controller: p1,
            value: p2,
        },
        Subtype::ProgramChange => MidiMessage::ProgramChange { program: p1 },
        Subtype::ChannelAftertouch => MidiMessage::ChannelAftertouch { vel: p1 },
        Subtype::PitchBend => {
            let value = u16::from(event.param1) | (u16::from(event.param2) << 7);
            MidiMessage::PitchBend {
                bend: PitchBend(u14::from_int_lossy(value)),
            }
        }
    }
}

fn encode_meta(meta: &MetaEvent) -> MetaMessage<'_> {
    match meta {
        MetaEvent::SetTempo { micros_per_beat } => MetaMessage::Tempo(u24::from_int_lossy(*micros_per_beat)),
        MetaEvent::TimeSignature {
            numerator,
            denominator_power,
            clocks_per_click,
            thirty_seconds_per_quarter,
        } => MetaMessage::TimeSignature(
            *numerator,
            *denominator_power,
            *clocks_per_click,
            *thirty_seconds_per_quarter,
        ),
        MetaEvent::EndOfTrack => MetaMessage::EndOfTrack,
        MetaEvent::Other { meta_type, data } => MetaMessage::Unknown(*meta_type, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_track() -> Vec<RawEvent> {
        vec![
            RawEvent::channel(0, ChannelEvent::note_on(0, 60, 100)),
            RawEvent::channel(480, ChannelEvent::note_off(0, 60, 0)),
            RawEvent::end_of_track(0),
        ]
    }

    #[test]
    fn conductor_file_layout() {
        let file = MidiFile::with_conductor(&CreationOptions::default());
        assert_eq!(file.format, Format::Parallel);
        assert_eq!(file.ticks_per_beat, 480);
        assert_eq!(file.tracks.len(), 1);
        assert_eq!(
            file.tracks[0][0],
            RawEvent::meta(0, MetaEvent::SetTempo { micros_per_beat: 1_000_000 })
        );
        assert!(matches!(
            file.tracks[0][1].kind,
            EventKind::Meta(MetaEvent::TimeSignature {
                numerator: 4,
                denominator_power: 2,
                ..
            })
        ));
        assert!(file.tracks[0][2].is_end_of_track());
    }

    #[test]
    fn creation_options_convert_bpm_and_denominator() {
        let options = CreationOptions {
            ticks_per_beat: 96,
            bpm: 120.0,
            numerator: 6,
            denominator: 8,
        };
        assert_eq!(options.micros_per_beat(), 500_000);
        assert_eq!(options.denominator_power(), 3);
    }

    #[test]
    fn encoded_file_decodes_to_same_tracks() {
        let mut file = MidiFile::with_conductor(&CreationOptions::default());
        file.add_track(note_track());
        let bytes = file.encode().unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(MidiFile::decode(&bytes).unwrap(), file);
    }

    #[test]
    fn encode_terminates_open_tracks() {
        let file = MidiFile {
            format: Format::SingleTrack,
            ticks_per_beat: 480,
            tracks: vec![vec![RawEvent::channel(0, ChannelEvent::note_on(0, 60, 1))]],
        };
        let decoded = MidiFile::decode(&file.encode().unwrap()).unwrap();
        assert_eq!(decoded.tracks[0].len(), 2);
        assert!(decoded.tracks[0][1].is_end_of_track());
    }

    #[test]
    fn add_track_promotes_single_track_file() {
        let mut file = MidiFile {
            format: Format::SingleTrack,
            ticks_per_beat: 480,
            tracks: vec![note_track()],
        };
        file.add_track(note_track());
        assert_eq!(file.format, Format::Parallel);
        assert_eq!(file.tracks.len(), 2);
    }

    #[test]
    fn unknown_meta_and_pitch_bend_survive() {
        let file = MidiFile {
            format: Format::SingleTrack,
            ticks_per_beat: 480,
            tracks: vec![vec![
                RawEvent::meta(
                    0,
                    MetaEvent::Other {
                        meta_type: 0x03,
                        data: b"piano".to_vec(),
                    },
                ),
                RawEvent::channel(10, ChannelEvent::new(Subtype::PitchBend, 2, 0x11, 0x55)),
                RawEvent::end_of_track(0),
            ]],
        };
        assert_eq!(MidiFile::decode(&file.encode().unwrap()).unwrap(), file);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(MidiFile::decode(b"not a midi file"), Err(CodecError::Parse(_))));
        assert!(MidiFile::decode(&[]).is_err());
    }
}
