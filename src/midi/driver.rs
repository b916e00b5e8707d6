//! Hardware ports through midir.

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use super::port::{select_port, InputHandler, InputPort, MidiBackend, MidiSink, PortError, PortSelector};

/// The system MIDI driver (ALSA, CoreMIDI, WinMM) via midir.
#[derive(Debug, Clone)]
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn output(&self) -> Result<MidiOutput, PortError> {
        MidiOutput::new(&self.client_name).map_err(|e| PortError::Init(e.to_string()))
    }

    fn input(&self) -> Result<MidiInput, PortError> {
        MidiInput::new(&self.client_name).map_err(|e| PortError::Init(e.to_string()))
    }
}

impl MidiBackend for MidirBackend {
    fn input_names(&self) -> Result<Vec<String>, PortError> {
        let midi_in = self.input()?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect())
    }

    fn output_names(&self) -> Result<Vec<String>, PortError> {
        let midi_out = self.output()?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    fn open_output(&self, selector: Option<&PortSelector>) -> Result<Box<dyn MidiSink>, PortError> {
        let midi_out = self.output()?;
        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "unknown".to_string()))
            .collect();
        let index = select_port("output", &names, selector)?;
        let connection = midi_out
            .connect(&ports[index], &format!("{}-output", self.client_name))
            .map_err(|e| PortError::Connect(e.to_string()))?;
        log::info!("MIDI output opened: {}", names[index]);
        Ok(Box::new(MidirSink {
            connection: Some(connection),
            name: names[index].clone(),
        }))
    }

    fn open_input(
        &self,
        selector: Option<&PortSelector>,
        mut handler: InputHandler,
    ) -> Result<Box<dyn InputPort>, PortError> {
        let midi_in = self.input()?;
        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "unknown".to_string()))
            .collect();
        let index = select_port("input", &names, selector)?;
        let connection = midi_in
            .connect(
                &ports[index],
                &format!("{}-input", self.client_name),
                move |_timestamp, message, _| handler(message),
                (),
            )
            .map_err(|e| PortError::Connect(e.to_string()))?;
        log::info!("MIDI input opened: {}", names[index]);
        Ok(Box::new(MidirInputPort {
            connection: Some(connection),
            name: names[index].clone(),
        }))
    }
}

struct MidirSink {
    connection: Option<MidiOutputConnection>,
    name: String,
}

impl MidiSink for MidirSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), PortError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| PortError::Send(format!("{} is closed", self.name)))?;
        connection.send(message).map_err(|e| PortError::Send(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!("MIDI output closed: {}", self.name);
        }
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        self.close();
    }
}

struct MidirInputPort {
    connection: Option<MidiInputConnection<()>>,
    name: String,
}

impl InputPort for MidirInputPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!("MIDI input closed: {}", self.name);
        }
    }
}

impl Drop for MidirInputPort {
    fn drop(&mut self) {
        self.close();
    }
}
