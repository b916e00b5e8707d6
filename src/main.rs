//! pianola: record and replay a MIDI instrument.
//!
//! `record` and `play` run until stopped. While they run, stdin takes one
//! command per line:
//! - `+` / `-`: speed up / slow down by one step
//! - `=<x>`: set the speed multiplier
//! - `m`: toggle the metronome
//! - `q`: stop
//!
//! Ctrl-C stops as well.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};

use pianola::config::Config;
use pianola::file::CreationOptions;
use pianola::midi::MidirBackend;
use pianola::session::SessionController;

#[derive(Parser)]
#[command(name = "pianola", version, about = "Record and replay a MIDI instrument")]
struct Cli {
    /// Config file (default: ~/.pianola/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the MIDI files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Initial speed multiplier
    #[arg(long, global = true)]
    speed: Option<f64>,
    /// Start with the metronome on
    #[arg(long, global = true)]
    metronome: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new take
    Record {
        /// Play this file while recording and save under an -append-N name
        #[arg(long)]
        append: Option<String>,
        /// Tempo of a new file
        #[arg(long)]
        bpm: Option<f64>,
        /// Time signature of a new file, e.g. 3/4
        #[arg(long)]
        time_signature: Option<TimeSignature>,
    },
    /// Play a file through the instrument
    Play { file: String },
    /// List recorded files
    List,
    /// Rename a file
    Rename { from: String, to: String },
    /// Delete a file
    Delete { file: String },
    /// List MIDI devices
    Ports,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

impl FromStr for TimeSignature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("expected N/D with D a power of two, got {s:?}");
        let (n, d) = s.split_once('/').ok_or_else(invalid)?;
        let numerator: u8 = n.trim().parse().map_err(|_| invalid())?;
        let denominator: u8 = d.trim().parse().map_err(|_| invalid())?;
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(invalid());
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

/// A line typed while a session runs.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    Faster,
    Slower,
    Speed(f64),
    ToggleMetronome,
    Stop,
}

fn parse_control(line: &str) -> Option<Control> {
    match line.trim() {
        "+" => Some(Control::Faster),
        "-" => Some(Control::Slower),
        "m" => Some(Control::ToggleMetronome),
        "q" => Some(Control::Stop),
        other => other
            .strip_prefix('=')
            .and_then(|x| x.trim().parse().ok())
            .map(Control::Speed),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    if cli.metronome {
        config.metronome.enabled = true;
    }

    let backend = Arc::new(MidirBackend::new(config.midi.client_name.clone()));
    let mut controller = match SessionController::new(config, backend) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    if let Some(speed) = cli.speed {
        if !controller.set_speed(speed) {
            eprintln!("invalid speed {speed}");
            process::exit(2);
        }
    }

    let ok = match cli.command {
        Command::Record {
            append,
            bpm,
            time_signature,
        } => {
            let mut options: CreationOptions = controller.config().recording;
            if let Some(bpm) = bpm {
                options.bpm = bpm;
            }
            if let Some(sig) = time_signature {
                options.numerator = sig.numerator;
                options.denominator = sig.denominator;
            }
            match controller.try_start_recording(append.as_deref(), Some(options)) {
                Ok(true) => {
                    println!(
                        "recording to {} (+/- speed, m metronome, q stop)",
                        controller.current_file().unwrap_or("?")
                    );
                    run_controls(&mut controller);
                    match controller.try_stop_recording() {
                        Ok(Some(name)) => {
                            println!("saved {name}");
                            true
                        }
                        Ok(None) => false,
                        Err(e) => {
                            // Dropping the controller retries the write once.
                            eprintln!("cannot save recording: {e}");
                            false
                        }
                    }
                }
                Ok(false) => false,
                Err(e) => {
                    eprintln!("cannot record: {e}");
                    false
                }
            }
        }
        Command::Play { file } => match controller.try_start_playing(&file) {
            Ok(true) => {
                println!("playing {file} (+/- speed, m metronome, q stop)");
                run_controls(&mut controller);
                controller.stop_playing()
            }
            Ok(false) => false,
            Err(e) => {
                eprintln!("cannot play {file}: {e}");
                false
            }
        },
        Command::List => match controller.try_list_files() {
            Ok(files) => {
                for name in files {
                    println!("{name}");
                }
                true
            }
            Err(e) => {
                eprintln!("{e}");
                false
            }
        },
        Command::Rename { from, to } => report(controller.try_rename_file(&from, &to)),
        Command::Delete { file } => report(controller.try_delete_file(&file)),
        Command::Ports => match controller.list_ports() {
            Ok(ports) => {
                println!("inputs:");
                for (i, name) in ports.inputs.iter().enumerate() {
                    println!("  {i}: {name}");
                }
                println!("outputs:");
                for (i, name) in ports.outputs.iter().enumerate() {
                    println!("  {i}: {name}");
                }
                true
            }
            Err(e) => {
                eprintln!("{e}");
                false
            }
        },
    };

    drop(controller);
    if !ok {
        process::exit(1);
    }
}

fn report(result: Result<bool, pianola::session::SessionError>) -> bool {
    match result {
        Ok(done) => done,
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}

/// Apply stdin and Ctrl-C controls until a stop is requested.
fn run_controls(controller: &mut SessionController) {
    let (tx, rx) = mpsc::channel();

    let ctrlc_tx = tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Control::Stop);
    }) {
        log::warn!("Ctrl-C handler not installed: {e}");
    }

    // Detached: a blocked stdin read must not keep the session alive.
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_control(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("unknown command {:?}", line.trim()),
            }
        }
    });

    let speeds = controller.config().speed;
    for control in rx {
        match control {
            Control::Faster => {
                controller.set_speed(speeds.offset(controller.speed(), 1));
            }
            Control::Slower => {
                controller.set_speed(speeds.offset(controller.speed(), -1));
            }
            Control::Speed(x) => {
                controller.set_speed(x);
            }
            Control::ToggleMetronome => {
                let enabled = !controller.metronome_enabled();
                controller.set_metronome_enabled(enabled);
            }
            Control::Stop => break,
        }
        println!(
            "speed {:.2}x, metronome {}",
            controller.speed(),
            if controller.metronome_enabled() { "on" } else { "off" }
        );
    }
}
