//! Port abstraction: what the engine needs from a MIDI driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("MIDI init: {0}")]
    Init(String),
    #[error("no MIDI {0} ports available")]
    Unavailable(&'static str),
    #[error("MIDI {kind} port {selector} not found")]
    NotFound { kind: &'static str, selector: String },
    #[error("MIDI connect: {0}")]
    Connect(String),
    #[error("MIDI send: {0}")]
    Send(String),
}

/// Called from the driver thread with each incoming message.
pub type InputHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// An open output port.
pub trait MidiSink: Send {
    fn name(&self) -> &str;

    /// Send one 1–3 byte message.
    fn send(&mut self, message: &[u8]) -> Result<(), PortError>;

    /// Close the port. Further sends fail; closing twice is a no-op.
    fn close(&mut self);
}

/// An open input port delivering messages to its [`InputHandler`].
pub trait InputPort: Send {
    fn name(&self) -> &str;

    /// Stop delivering messages. Closing twice is a no-op.
    fn close(&mut self);
}

/// A MIDI driver able to enumerate and open ports.
pub trait MidiBackend: Send + Sync {
    fn input_names(&self) -> Result<Vec<String>, PortError>;

    fn output_names(&self) -> Result<Vec<String>, PortError>;

    fn open_output(&self, selector: Option<&PortSelector>) -> Result<Box<dyn MidiSink>, PortError>;

    fn open_input(
        &self,
        selector: Option<&PortSelector>,
        handler: InputHandler,
    ) -> Result<Box<dyn InputPort>, PortError>;
}

/// Which port to open: a position in the port list or a name substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSelector {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for PortSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Pick a port from `names`.
///
/// Without a selector the first port that is not a "Through" port wins,
/// falling back to port 0.
pub fn select_port(
    kind: &'static str,
    names: &[String],
    selector: Option<&PortSelector>,
) -> Result<usize, PortError> {
    if names.is_empty() {
        return Err(PortError::Unavailable(kind));
    }
    let not_found = |selector: &PortSelector| PortError::NotFound {
        kind,
        selector: selector.to_string(),
    };
    match selector {
        None => Ok(names.iter().position(|n| !n.contains("Through")).unwrap_or(0)),
        Some(s @ PortSelector::Index(i)) => (*i < names.len()).then_some(*i).ok_or_else(|| not_found(s)),
        Some(s @ PortSelector::Name(filter)) => names
            .iter()
            .position(|n| n.contains(filter.as_str()))
            .ok_or_else(|| not_found(s)),
    }
}
