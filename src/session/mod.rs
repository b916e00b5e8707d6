//! Session controller: owns the record/playback lifecycle.
//!
//! At most one session is active. Starting a recording while playing (or the
//! reverse) is refused rather than queued. Speed and metronome settings
//! survive between sessions and apply to the next one.
//!
//! Every operation comes in two forms: `try_*` returns a `Result` so the
//! caller can see why something failed, and the plain form logs the error
//! and answers `false`/`None`.

mod state;

use std::io;
use std::mem;
use std::sync::Arc;

use thiserror::Error;

use self::state::{Playing, Recording, Session, Unsaved};
use crate::clock::{ClockError, SharedClock, SystemTimeSource, TimeSource, VirtualClock};
use crate::config::{Config, ConfigError};
use crate::file::{self, CodecError, CreationOptions, FileStore, MidiFile, StoreError};
use crate::midi::{MidiBackend, PortError};
use crate::playback::{PlaybackLoop, PlaybackScheduler};
use crate::record::InputRecorder;
use crate::score::Score;
use crate::tempo::TempoMapError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("malformed tempo map: {0}")]
    TempoMap(#[from] TempoMapError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error("failed to start playback thread: {0}")]
    Thread(#[from] io::Error),
}

/// Input and output device names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

pub struct SessionController {
    config: Config,
    backend: Arc<dyn MidiBackend>,
    store: FileStore,
    time_source: Arc<dyn TimeSource>,
    session: Session,
    unsaved: Option<Unsaved>,
    speed: f64,
    metronome_enabled: bool,
}

impl SessionController {
    /// Open the file store at `config.data_dir`; time comes from the
    /// system clock.
    pub fn new(config: Config, backend: Arc<dyn MidiBackend>) -> Result<Self, SessionError> {
        config.validate()?;
        let store = FileStore::open(&config.data_dir)?;
        Ok(Self {
            metronome_enabled: config.metronome.enabled,
            config,
            backend,
            store,
            time_source: Arc::new(SystemTimeSource::new()),
            session: Session::Idle,
            unsaved: None,
            speed: 1.0,
        })
    }

    /// Drive session clocks from `source` instead of the system clock.
    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = source;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.session, Session::Recording(_))
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.session, Session::Playing(_))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.session, Session::Idle)
    }

    /// File being recorded or played.
    pub fn current_file(&self) -> Option<&str> {
        self.session.filename()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome_enabled
    }

    /// Current virtual time of the active session.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.session
            .clock()
            .map(|clock| clock.lock().unwrap_or_else(|e| e.into_inner()).sample())
    }

    // -- recording --

    /// Start recording. With `append`, the named file plays back and the
    /// take is saved under a fresh `-append-<n>` name; otherwise a new file
    /// is created from `options` (or the configured defaults).
    pub fn try_start_recording(
        &mut self,
        append: Option<&str>,
        options: Option<CreationOptions>,
    ) -> Result<bool, SessionError> {
        if !self.is_idle() {
            log::warn!("cannot start recording while {}", self.session.name());
            return Ok(false);
        }

        let (file, filename) = match append {
            Some(source) => {
                let file = MidiFile::decode(&self.store.read(source)?)?;
                let filename = file::append_name(source, |name| self.store.exists(name));
                (file, filename)
            }
            None => {
                let options = options.unwrap_or(self.config.recording);
                let filename = file::default_name(&chrono::Local::now(), |name| self.store.exists(name));
                (MidiFile::with_conductor(&options), filename)
            }
        };
        let score = Arc::new(Score::from_file(&file)?);

        let clock = self.new_clock()?;
        let output = self.backend.open_output(self.config.midi.output_port.as_ref())?;
        let mut recorder = InputRecorder::new(Arc::clone(&clock));
        recorder.start(self.backend.as_ref(), self.config.midi.input_port.as_ref())?;
        self.store.reserve(&filename)?;

        clock.lock().unwrap_or_else(|e| e.into_inner()).start();
        let playback = PlaybackLoop::start(self.scheduler(&score, &clock), output)?;

        log::info!("recording to {filename}");
        self.session = Session::Recording(Recording {
            filename,
            file,
            score,
            clock,
            playback,
            recorder,
        });
        Ok(true)
    }

    /// Stop recording and write the file. Returns the file name, or `None`
    /// when not recording.
    ///
    /// A take that cannot be written stays in memory under its reserved
    /// name; calling this again while idle retries the write.
    pub fn try_stop_recording(&mut self) -> Result<Option<String>, SessionError> {
        if !self.is_recording() {
            return match self.unsaved.take() {
                Some(take) => self.save(take).map(Some),
                None => Ok(None),
            };
        }
        let Session::Recording(mut recording) = mem::replace(&mut self.session, Session::Idle) else {
            return Ok(None);
        };

        recording.playback.stop();
        recording.recorder.stop();
        let tracks = recording.recorder.finalize(recording.score.tempo());
        for track in tracks.into_tracks() {
            recording.file.add_track(track);
        }
        let bytes = match recording.file.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.discard_placeholder(&recording.filename);
                return Err(e.into());
            }
        };
        self.save(Unsaved {
            filename: recording.filename,
            bytes,
        })
        .map(Some)
    }

    /// Name of a finished take still waiting to be written.
    pub fn unsaved_file(&self) -> Option<&str> {
        self.unsaved.as_ref().map(|take| take.filename.as_str())
    }

    pub fn start_recording(&mut self, append: Option<&str>, options: Option<CreationOptions>) -> bool {
        self.try_start_recording(append, options)
            .unwrap_or_else(|e| log_false("start recording", e))
    }

    pub fn stop_recording(&mut self) -> Option<String> {
        self.try_stop_recording().unwrap_or_else(|e| {
            log::error!("failed to stop recording: {e}");
            None
        })
    }

    // -- playback --

    /// Play `filename`. Replaces a playback already running; refused while
    /// recording.
    pub fn try_start_playing(&mut self, filename: &str) -> Result<bool, SessionError> {
        if self.is_recording() {
            log::warn!("cannot start playing while recording");
            return Ok(false);
        }

        let file = MidiFile::decode(&self.store.read(filename)?)?;
        let score = Arc::new(Score::from_file(&file)?);
        self.try_stop_playing()?;

        let clock = self.new_clock()?;
        let output = self.backend.open_output(self.config.midi.output_port.as_ref())?;
        clock.lock().unwrap_or_else(|e| e.into_inner()).start();
        let playback = PlaybackLoop::start(self.scheduler(&score, &clock), output)?;

        log::info!("playing {filename}");
        self.session = Session::Playing(Playing {
            filename: filename.to_string(),
            clock,
            playback,
        });
        Ok(true)
    }

    /// Stop playback. `Ok(false)` when nothing was playing.
    pub fn try_stop_playing(&mut self) -> Result<bool, SessionError> {
        if !self.is_playing() {
            return Ok(false);
        }
        if let Session::Playing(mut playing) = mem::replace(&mut self.session, Session::Idle) {
            playing.playback.stop();
            log::info!("stopped playing {}", playing.filename);
        }
        Ok(true)
    }

    pub fn start_playing(&mut self, filename: &str) -> bool {
        self.try_start_playing(filename)
            .unwrap_or_else(|e| log_false("start playing", e))
    }

    pub fn stop_playing(&mut self) -> bool {
        self.try_stop_playing()
            .unwrap_or_else(|e| log_false("stop playing", e))
    }

    /// Stop whichever session is active. A take that still cannot be
    /// written is dropped and its placeholder removed.
    pub fn flush(&mut self) {
        if self.is_recording() {
            self.stop_recording();
        }
        if self.is_playing() {
            self.stop_playing();
        }
        if let Some(take) = self.unsaved.take() {
            if let Err(e) = self.store.write(&take.filename, &take.bytes) {
                log::error!(
                    "dropping unsaved recording {} ({} bytes): {e}",
                    take.filename,
                    take.bytes.len()
                );
                self.discard_placeholder(&take.filename);
            }
        }
    }

    // -- settings --

    /// Set the playback speed, snapped to the configured steps. Applies to
    /// the running session at once and to later sessions.
    pub fn try_set_speed(&mut self, multiplier: f64) -> Result<bool, SessionError> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ClockError::InvalidSpeed(multiplier).into());
        }
        let speed = self.config.speed.snap(multiplier);
        if let Some(clock) = self.session.clock() {
            clock.lock().unwrap_or_else(|e| e.into_inner()).set_speed(speed)?;
        }
        self.speed = speed;
        log::info!("speed set to {speed:.2}x");
        Ok(true)
    }

    pub fn set_speed(&mut self, multiplier: f64) -> bool {
        self.try_set_speed(multiplier)
            .unwrap_or_else(|e| log_false("set speed", e))
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) -> bool {
        self.metronome_enabled = enabled;
        if let Some(playback) = self.session.playback() {
            playback.set_metronome_enabled(enabled);
        }
        log::info!("metronome {}", if enabled { "on" } else { "off" });
        true
    }

    // -- files and ports --

    pub fn try_list_files(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.store.list()?)
    }

    pub fn list_files(&self) -> Vec<String> {
        self.try_list_files().unwrap_or_else(|e| {
            log::error!("failed to list files: {e}");
            Vec::new()
        })
    }

    pub fn try_rename_file(&self, from: &str, to: &str) -> Result<bool, SessionError> {
        if self.is_in_use(from) || self.is_in_use(to) {
            log::warn!("cannot rename {from}: file in use");
            return Ok(false);
        }
        self.store.rename(from, to)?;
        Ok(true)
    }

    pub fn rename_file(&self, from: &str, to: &str) -> bool {
        self.try_rename_file(from, to)
            .unwrap_or_else(|e| log_false("rename file", e))
    }

    pub fn try_delete_file(&self, name: &str) -> Result<bool, SessionError> {
        if self.is_in_use(name) {
            log::warn!("cannot delete {name}: file in use");
            return Ok(false);
        }
        self.store.delete(name)?;
        Ok(true)
    }

    pub fn delete_file(&self, name: &str) -> bool {
        self.try_delete_file(name)
            .unwrap_or_else(|e| log_false("delete file", e))
    }

    pub fn list_ports(&self) -> Result<PortList, SessionError> {
        Ok(PortList {
            inputs: self.backend.input_names()?,
            outputs: self.backend.output_names()?,
        })
    }

    fn is_in_use(&self, name: &str) -> bool {
        self.session.filename() == Some(name) || self.unsaved_file() == Some(name)
    }

    fn save(&mut self, take: Unsaved) -> Result<String, SessionError> {
        match self.store.write(&take.filename, &take.bytes) {
            Ok(()) => {
                log::info!("recording saved to {}", take.filename);
                Ok(take.filename)
            }
            Err(e) => {
                log::error!(
                    "cannot write {}, keeping the take in memory until the next stop",
                    take.filename
                );
                self.unsaved = Some(take);
                Err(e.into())
            }
        }
    }

    /// Remove the empty file reserved for a take that will not be written.
    fn discard_placeholder(&self, name: &str) {
        match self.store.delete(name) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => log::warn!("placeholder {name} left behind: {e}"),
        }
    }

    fn new_clock(&self) -> Result<SharedClock, ClockError> {
        let mut clock = VirtualClock::starting_at(Arc::clone(&self.time_source), -self.config.lead_in_ms);
        clock.set_speed(self.speed)?;
        Ok(clock.shared())
    }

    fn scheduler(&self, score: &Arc<Score>, clock: &SharedClock) -> PlaybackScheduler {
        let scheduler = PlaybackScheduler::new(Arc::clone(score), Arc::clone(clock), self.config.metronome);
        scheduler.set_metronome_enabled(self.metronome_enabled);
        scheduler
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.flush();
    }
}

fn log_false(action: &str, error: SessionError) -> bool {
    log::error!("failed to {action}: {error}");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::midi::LoopbackBackend;

    fn controller() -> (tempfile::TempDir, LoopbackBackend, SessionController) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let backend = LoopbackBackend::new();
        let controller = SessionController::new(config, Arc::new(backend.clone()))
            .unwrap()
            .with_time_source(Arc::new(ManualTimeSource::new()));
        (dir, backend, controller)
    }

    #[test]
    fn starts_idle() {
        let (_dir, _backend, c) = controller();
        assert!(c.is_idle());
        assert_eq!(c.speed(), 1.0);
        assert!(!c.metronome_enabled());
        assert!(c.elapsed_ms().is_none());
    }

    #[test]
    fn invalid_state_calls_are_harmless() {
        let (_dir, _backend, mut c) = controller();
        assert_eq!(c.stop_recording(), None);
        assert!(!c.stop_playing());
        assert!(!c.start_playing("missing.mid"));
        assert!(!c.delete_file("missing.mid"));
        assert!(!c.rename_file("missing.mid", "other.mid"));
        assert!(c.is_idle());
    }

    #[test]
    fn speed_is_validated_and_snapped() {
        let (_dir, _backend, mut c) = controller();
        assert!(!c.set_speed(0.0));
        assert!(!c.set_speed(-1.0));
        assert!(!c.set_speed(f64::NAN));
        assert_eq!(c.speed(), 1.0);
        assert!(c.set_speed(1.52));
        assert_eq!(c.speed(), 1.5);
        assert!(matches!(
            c.try_set_speed(f64::INFINITY),
            Err(SessionError::Clock(ClockError::InvalidSpeed(_)))
        ));
    }

    #[test]
    fn settings_apply_without_a_session() {
        let (_dir, _backend, mut c) = controller();
        assert!(c.set_metronome_enabled(true));
        assert!(c.metronome_enabled());
    }

    #[test]
    fn recording_and_playing_are_exclusive() {
        let (_dir, _backend, mut c) = controller();
        assert!(c.start_recording(None, None));
        assert!(!c.start_recording(None, None));
        let name = c.current_file().unwrap().to_string();
        assert!(!c.start_playing(&name));
        assert!(c.is_recording());

        let saved = c.stop_recording().unwrap();
        assert_eq!(saved, name);
        assert!(c.start_playing(&saved));
        assert!(!c.start_recording(None, None));
        assert!(c.stop_playing());
        assert!(c.is_idle());
    }

    #[test]
    fn port_failure_keeps_idle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let backend = LoopbackBackend::with_ports(vec![], vec![]);
        let mut c = SessionController::new(config, Arc::new(backend)).unwrap();
        assert!(matches!(
            c.try_start_recording(None, None),
            Err(SessionError::Port(PortError::Unavailable(_)))
        ));
        assert!(c.is_idle());
        assert!(c.list_files().is_empty());
    }

    #[test]
    fn file_in_use_cannot_be_deleted() {
        let (_dir, _backend, mut c) = controller();
        assert!(c.start_recording(None, None));
        let name = c.current_file().unwrap().to_string();
        assert!(!c.delete_file(&name));
        c.flush();
        assert!(c.is_idle());
        assert!(c.delete_file(&name));
    }

    #[test]
    fn lists_ports() {
        let (_dir, _backend, c) = controller();
        let ports = c.list_ports().unwrap();
        assert_eq!(ports.inputs, vec!["Loopback In"]);
        assert_eq!(ports.outputs, vec!["Loopback Out"]);
    }
}
