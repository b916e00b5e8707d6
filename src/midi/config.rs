//! MIDI configuration: client name and port selection.

use serde::{Deserialize, Serialize};

use super::port::PortSelector;

/// The `midi:` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Client name announced to the MIDI subsystem.
    #[serde(default = "MidiConfig::default_client_name")]
    pub client_name: String,
    /// Port the instrument sends on. None = first non-"Through" port.
    #[serde(default)]
    pub input_port: Option<PortSelector>,
    /// Port the instrument listens on. None = first non-"Through" port.
    #[serde(default)]
    pub output_port: Option<PortSelector>,
}

impl MidiConfig {
    fn default_client_name() -> String {
        "pianola".to_string()
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: Self::default_client_name(),
            input_port: None,
            output_port: None,
        }
    }
}
