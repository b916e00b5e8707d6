//! In-process MIDI backend: records what is sent and lets the caller
//! inject input. Used for dry runs and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use super::port::{select_port, InputHandler, InputPort, MidiBackend, MidiSink, PortError, PortSelector};

#[derive(Default)]
struct State {
    inputs: Vec<String>,
    outputs: Vec<String>,
    sent: Vec<Vec<u8>>,
    handler: Option<InputHandler>,
    output_open: bool,
}

/// Loopback "device" with one input and one output port.
///
/// Clones share state, so a test can keep one handle while the session
/// owns another.
#[derive(Clone)]
pub struct LoopbackBackend {
    state: Arc<Mutex<State>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::with_ports(vec!["Loopback In".into()], vec!["Loopback Out".into()])
    }

    pub fn with_ports(inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                inputs,
                outputs,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every message sent to the output so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().sent)
    }

    pub fn output_open(&self) -> bool {
        self.lock().output_open
    }

    pub fn input_open(&self) -> bool {
        self.lock().handler.is_some()
    }

    /// Deliver `message` to the open input. Returns false when no input is
    /// open.
    pub fn inject(&self, message: &[u8]) -> bool {
        // The handler runs without the lock held.
        let Some(mut handler) = self.lock().handler.take() else {
            return false;
        };
        handler(message);
        let mut state = self.lock();
        if state.handler.is_none() {
            state.handler = Some(handler);
        }
        true
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiBackend for LoopbackBackend {
    fn input_names(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock().inputs.clone())
    }

    fn output_names(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock().outputs.clone())
    }

    fn open_output(&self, selector: Option<&PortSelector>) -> Result<Box<dyn MidiSink>, PortError> {
        let mut state = self.lock();
        let index = select_port("output", &state.outputs, selector)?;
        state.output_open = true;
        Ok(Box::new(LoopbackSink {
            backend: self.clone(),
            name: state.outputs[index].clone(),
            open: true,
        }))
    }

    fn open_input(
        &self,
        selector: Option<&PortSelector>,
        handler: InputHandler,
    ) -> Result<Box<dyn InputPort>, PortError> {
        let mut state = self.lock();
        let index = select_port("input", &state.inputs, selector)?;
        state.handler = Some(handler);
        Ok(Box::new(LoopbackInput {
            backend: self.clone(),
            name: state.inputs[index].clone(),
        }))
    }
}

struct LoopbackSink {
    backend: LoopbackBackend,
    name: String,
    open: bool,
}

impl MidiSink for LoopbackSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), PortError> {
        if !self.open {
            return Err(PortError::Send(format!("{} is closed", self.name)));
        }
        self.backend.lock().sent.push(message.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.backend.lock().output_open = false;
        }
    }
}

impl Drop for LoopbackSink {
    fn drop(&mut self) {
        self.close();
    }
}

struct LoopbackInput {
    backend: LoopbackBackend,
    name: String,
}

impl InputPort for LoopbackInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        self.backend.lock().handler = None;
    }
}
