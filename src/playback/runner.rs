//! Playback loop: runs a scheduler on a dedicated thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::scheduler::PlaybackScheduler;
use crate::midi::MidiSink;

/// Controllers zeroed on stop: sustain, sostenuto, soft, reset all
/// controllers, all notes off.
const RESET_CONTROLLERS: [u8; 5] = [0x40, 0x42, 0x43, 0x79, 0x7B];
const RESET_CHANNELS: u8 = 3;

/// The messages that leave the instrument with no held note or pedal.
pub fn reset_messages() -> impl Iterator<Item = [u8; 3]> {
    (0..RESET_CHANNELS)
        .flat_map(|channel| RESET_CONTROLLERS.map(|controller| [0xB0 | channel, controller, 0]))
}

/// A scheduler polled as fast as possible on its own thread.
///
/// Every iteration runs one scheduling pass and yields. The thread owns
/// no timer: latency is bounded by how quickly the OS hands the thread back.
pub struct PlaybackLoop {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    output: Arc<Mutex<Box<dyn MidiSink>>>,
    metronome_enabled: Arc<AtomicBool>,
    stopped: bool,
}

impl PlaybackLoop {
    pub fn start(mut scheduler: PlaybackScheduler, output: Box<dyn MidiSink>) -> io::Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let output = Arc::new(Mutex::new(output));
        let metronome_enabled = scheduler.metronome_flag();

        let stop_clone = Arc::clone(&stop_flag);
        let output_clone = Arc::clone(&output);
        let thread = thread::Builder::new()
            .name("pianola-playback".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Acquire) {
                    {
                        let mut out = output_clone.lock().unwrap_or_else(|e| e.into_inner());
                        scheduler.tick(out.as_mut());
                    }
                    thread::yield_now();
                }
            })?;

        log::info!("playback started");
        Ok(Self {
            stop_flag,
            thread: Some(thread),
            output,
            metronome_enabled,
            stopped: false,
        })
    }

    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.metronome_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome_enabled.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop, silence the instrument and close the port.
    ///
    /// The reset is sent even if the loop thread panicked.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop_flag.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("playback thread panicked");
            }
        }

        let mut out = self.output.lock().unwrap_or_else(|e| e.into_inner());
        for message in reset_messages() {
            if let Err(e) = out.send(&message) {
                log::warn!("reset message {message:02X?} not sent: {e}");
            }
        }
        out.close();
        log::info!("playback stopped");
    }
}

impl Drop for PlaybackLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
