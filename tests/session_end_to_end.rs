//! Session controller against a loopback device and a hand-driven clock:
//! record, append and play back real files in a temporary directory.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pianola::clock::ManualTimeSource;
use pianola::config::{Config, SpeedConfig};
use pianola::event::{ChannelEvent, EventKind, MetaEvent, RawEvent};
use pianola::file::{CreationOptions, Format, MidiFile, StoreError};
use pianola::midi::LoopbackBackend;
use pianola::playback::reset_messages;
use pianola::session::{SessionController, SessionError};
use pianola::tempo::TempoMapError;

struct Rig {
    _dir: tempfile::TempDir,
    source: ManualTimeSource,
    backend: LoopbackBackend,
    controller: SessionController,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("midi"),
        ..Config::default()
    };
    let source = ManualTimeSource::new();
    let backend = LoopbackBackend::new();
    let controller = SessionController::new(config, Arc::new(backend.clone()))
        .unwrap()
        .with_time_source(Arc::new(source.clone()));
    Rig {
        _dir: dir,
        source,
        backend,
        controller,
    }
}

fn options() -> CreationOptions {
    CreationOptions {
        ticks_per_beat: 480,
        bpm: 60.0,
        numerator: 4,
        denominator: 4,
    }
}

/// Poll until `condition` holds; the playback thread runs on its own.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn channel_events(track: &[RawEvent]) -> Vec<(u32, ChannelEvent)> {
    track
        .iter()
        .filter_map(|e| e.channel_event().map(|c| (e.delta, *c)))
        .collect()
}

/// Record one bar: C at beat 1, sustain from beat 1 to beat 3.
fn record_take(rig: &mut Rig, append: Option<&str>) -> String {
    assert!(rig.controller.start_recording(append, Some(options())));
    let name = rig.controller.current_file().unwrap().to_string();

    rig.source.advance(100.0 + 1000.0);
    assert!(rig.backend.inject(&[0x90, 60, 100]));
    assert!(rig.backend.inject(&[0xB0, 0x40, 127]));
    rig.source.advance(500.0);
    assert!(rig.backend.inject(&[0x80, 60, 0]));
    rig.source.advance(500.0);
    assert!(rig.backend.inject(&[0xB0, 0x40, 0]));
    rig.source.advance(500.0);

    let saved = rig.controller.stop_recording().unwrap();
    assert_eq!(saved, name);
    saved
}

#[test]
fn recording_writes_conductor_notes_and_pedal_tracks() {
    let mut rig = rig();
    let name = record_take(&mut rig, None);
    assert!(name.ends_with(".mid"));
    assert!(rig.controller.is_idle());
    assert!(!rig.backend.input_open());
    assert!(!rig.backend.output_open());
    assert_eq!(rig.controller.list_files(), vec![name.clone()]);

    let file = MidiFile::decode(&rig.controller.store().read(&name).unwrap()).unwrap();
    assert_eq!(file.ticks_per_beat, 480);
    assert_eq!(file.tracks.len(), 3);
    for track in &file.tracks {
        assert!(track.last().is_some_and(RawEvent::is_end_of_track));
    }

    let conductor: Vec<&MetaEvent> = file.tracks[0]
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Meta(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(
        conductor[0],
        &MetaEvent::SetTempo {
            micros_per_beat: 1_000_000
        }
    );
    assert!(matches!(
        conductor[1],
        MetaEvent::TimeSignature {
            numerator: 4,
            denominator_power: 2,
            ..
        }
    ));

    assert_eq!(
        channel_events(&file.tracks[1]),
        vec![
            (480, ChannelEvent::note_on(0, 60, 100)),
            (240, ChannelEvent::note_off(0, 60, 0)),
        ]
    );
    assert_eq!(
        channel_events(&file.tracks[2]),
        vec![
            (480, ChannelEvent::controller(0, 0x40, 127)),
            (480, ChannelEvent::controller(0, 0x40, 0)),
        ]
    );
}

#[test]
fn second_start_is_refused_while_recording() {
    let mut rig = rig();
    assert!(rig.controller.start_recording(None, Some(options())));
    let name = rig.controller.current_file().unwrap().to_string();
    assert!(!rig.controller.start_recording(None, Some(options())));
    assert!(!rig.controller.start_playing(&name));
    assert_eq!(rig.controller.current_file(), Some(name.as_str()));
    assert_eq!(rig.controller.stop_recording(), Some(name));
    assert_eq!(rig.controller.stop_recording(), None);
}

#[test]
fn consecutive_recordings_get_distinct_names() {
    let mut rig = rig();
    let first = record_take(&mut rig, None);
    let second = record_take(&mut rig, None);
    assert_ne!(first, second);
    assert_eq!(rig.controller.list_files().len(), 2);
}

#[test]
fn append_plays_the_source_and_saves_a_new_file() {
    let mut rig = rig();
    let source_name = record_take(&mut rig, None);
    let stem = source_name.trim_end_matches(".mid");
    rig.backend.take_sent();

    assert!(rig.controller.start_recording(Some(&source_name), None));
    let appended = rig.controller.current_file().unwrap().to_string();
    assert_eq!(appended, format!("{stem}-append-1.mid"));

    // The source's note plays back at beat 1.
    rig.source.advance(100.0 + 1000.0);
    assert!(wait_for(|| rig.backend.sent().contains(&vec![0x90, 60, 100])));
    assert!(rig.backend.inject(&[0x90, 64, 90]));
    rig.source.advance(1000.0);
    let saved = rig.controller.stop_recording().unwrap();
    assert_eq!(saved, appended);

    // Playback ends by silencing the instrument.
    let sent = rig.backend.sent();
    let tail: Vec<Vec<u8>> = reset_messages().map(|m| m.to_vec()).collect();
    assert!(sent.ends_with(&tail));

    let original = MidiFile::decode(&rig.controller.store().read(&source_name).unwrap()).unwrap();
    let file = MidiFile::decode(&rig.controller.store().read(&saved).unwrap()).unwrap();
    assert_eq!(file.tracks.len(), original.tracks.len() + 1);
    assert_eq!(&file.tracks[..original.tracks.len()], &original.tracks[..]);
    assert_eq!(
        channel_events(file.tracks.last().unwrap()),
        vec![
            (480, ChannelEvent::note_on(0, 64, 90)),
            (480, ChannelEvent::note_off(0, 64, 0)),
        ]
    );

    // Appending to the append continues the counter.
    assert!(rig.controller.start_recording(Some(&saved), None));
    assert_eq!(rig.controller.current_file(), Some(format!("{stem}-append-2.mid").as_str()));
    rig.controller.flush();
}

#[test]
fn playback_sends_the_file_then_resets() {
    let mut rig = rig();
    let name = record_take(&mut rig, None);
    rig.backend.take_sent();

    assert!(rig.controller.start_playing(&name));
    assert!(rig.controller.is_playing());
    assert_eq!(rig.controller.current_file(), Some(name.as_str()));
    assert!(!rig.controller.delete_file(&name));

    rig.source.advance(100.0 + 2000.0);
    assert!(wait_for(|| rig.backend.sent().contains(&vec![0xB0, 0x40, 0])));
    assert!(rig.controller.stop_playing());
    assert!(rig.controller.is_idle());

    let sent = rig.backend.take_sent();
    let played: Vec<Vec<u8>> = sent[..4].to_vec();
    assert_eq!(
        played,
        vec![
            vec![0x90, 60, 100],
            vec![0xB0, 0x40, 127],
            vec![0x80, 60, 0],
            vec![0xB0, 0x40, 0],
        ]
    );
    assert_eq!(sent.len(), 4 + reset_messages().count());
    assert!(rig.controller.delete_file(&name));
    assert!(rig.controller.list_files().is_empty());
}

#[test]
fn speed_and_metronome_carry_into_the_next_session() {
    let mut rig = rig();
    assert!(rig.controller.set_speed(2.0));
    assert!(rig.controller.set_metronome_enabled(true));
    assert!(rig.controller.start_recording(None, Some(options())));

    // 100ms lead-in at 2x passes in 50ms of wall time.
    rig.source.advance(50.0);
    assert_eq!(rig.controller.elapsed_ms(), Some(0.0));
    // The downbeat click.
    assert!(wait_for(|| rig.backend.sent().contains(&vec![0x90, 0x7F, 0x55])));

    assert!(rig.controller.set_speed(0.5));
    rig.source.advance(100.0);
    assert_eq!(rig.controller.elapsed_ms(), Some(50.0));
    rig.controller.flush();
    assert!(rig.controller.is_idle());
}

#[test]
fn rename_moves_a_file() {
    let mut rig = rig();
    let name = record_take(&mut rig, None);
    assert!(rig.controller.rename_file(&name, "etude.mid"));
    assert_eq!(rig.controller.list_files(), vec!["etude.mid".to_string()]);
    assert!(rig.controller.start_playing("etude.mid"));
    assert!(!rig.controller.rename_file("etude.mid", "other.mid"));
    assert!(rig.controller.stop_playing());
    assert!(!rig.controller.rename_file("missing.mid", "other.mid"));
}

#[test]
fn zero_tempo_file_is_refused_without_side_effects() {
    let mut rig = rig();
    let file = MidiFile {
        format: Format::SingleTrack,
        ticks_per_beat: 480,
        tracks: vec![vec![
            RawEvent::meta(0, MetaEvent::SetTempo { micros_per_beat: 0 }),
            RawEvent::channel(480, ChannelEvent::note_on(0, 60, 100)),
            RawEvent::end_of_track(0),
        ]],
    };
    rig.controller
        .store()
        .write("broken.mid", &file.encode().unwrap())
        .unwrap();

    assert!(matches!(
        rig.controller.try_start_playing("broken.mid"),
        Err(SessionError::TempoMap(TempoMapError::ZeroTempo { tick: 0 }))
    ));
    assert!(rig.controller.is_idle());
    assert!(!rig.backend.output_open());

    assert!(matches!(
        rig.controller.try_start_recording(Some("broken.mid"), None),
        Err(SessionError::TempoMap(_))
    ));
    assert!(rig.controller.is_idle());
    assert!(!rig.backend.input_open());
    assert!(!rig.backend.output_open());
    assert_eq!(rig.controller.list_files(), vec!["broken.mid".to_string()]);

    // The plain forms report the same failure as `false`.
    assert!(!rig.controller.start_playing("broken.mid"));
    assert!(!rig.controller.start_recording(Some("broken.mid"), None));
    assert!(rig.controller.is_idle());
}

#[test]
fn unwritable_take_is_kept_until_the_write_succeeds() {
    let mut rig = rig();
    assert!(rig.controller.start_recording(None, Some(options())));
    let name = rig.controller.current_file().unwrap().to_string();
    rig.source.advance(100.0 + 1000.0);
    assert!(rig.backend.inject(&[0x90, 60, 100]));
    rig.source.advance(1000.0);

    // A directory where the placeholder was makes the write fail.
    let path = rig.controller.store().dir().join(&name);
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();
    assert!(matches!(
        rig.controller.try_stop_recording(),
        Err(SessionError::Store(StoreError::Io { .. }))
    ));
    assert!(rig.controller.is_idle());
    assert!(!rig.backend.input_open());
    assert_eq!(rig.controller.unsaved_file(), Some(name.as_str()));
    assert!(!rig.controller.delete_file(&name));

    fs::remove_dir(&path).unwrap();
    assert_eq!(rig.controller.try_stop_recording().unwrap(), Some(name.clone()));
    assert_eq!(rig.controller.unsaved_file(), None);
    assert_eq!(rig.controller.try_stop_recording().unwrap(), None);

    let file = MidiFile::decode(&rig.controller.store().read(&name).unwrap()).unwrap();
    assert_eq!(
        channel_events(&file.tracks[1]),
        vec![
            (480, ChannelEvent::note_on(0, 60, 100)),
            (480, ChannelEvent::note_off(0, 60, 0)),
        ]
    );
}

#[test]
fn flush_drops_a_take_that_still_cannot_be_written() {
    let mut rig = rig();
    assert!(rig.controller.start_recording(None, Some(options())));
    let name = rig.controller.current_file().unwrap().to_string();
    rig.source.advance(100.0 + 500.0);
    assert!(rig.backend.inject(&[0x90, 60, 100]));

    // Removing the data directory makes both the write and the retry fail.
    let dir = rig.controller.store().dir().to_path_buf();
    fs::remove_dir_all(&dir).unwrap();
    assert_eq!(rig.controller.stop_recording(), None);
    assert_eq!(rig.controller.unsaved_file(), Some(name.as_str()));

    rig.controller.flush();
    assert_eq!(rig.controller.unsaved_file(), None);
    assert!(!dir.join(&name).exists());
}

#[test]
fn invalid_config_is_refused_by_the_controller() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("midi"),
        speed: SpeedConfig {
            min: 2.0,
            max: 1.0,
            step: 0.1,
        },
        ..Config::default()
    };
    let result = SessionController::new(config, Arc::new(LoopbackBackend::new()));
    assert!(matches!(result, Err(SessionError::Config(_))));
}
