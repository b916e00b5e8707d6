//! MIDI ports: the driver seam, the midir driver, and an in-process loopback.

pub mod config;
pub mod driver;
pub mod loopback;
pub mod port;

pub use config::MidiConfig;
pub use driver::MidirBackend;
pub use loopback::LoopbackBackend;
pub use port::{select_port, InputHandler, InputPort, MidiBackend, MidiSink, PortError, PortSelector};
