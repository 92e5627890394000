//! Device communication engine
//!
//! Owns the serial link to the station controller on one dedicated worker
//! thread. External code starts and stops the engine, submits commands
//! through a thread-safe queue, and receives decoded packets as events.

pub mod events;
pub mod queue;
pub mod supervisor;
mod worker;

pub use events::EngineEvent;
pub use queue::{CommandQueue, DEFAULT_QUEUE_CAPACITY};
pub use supervisor::{ChannelOpener, ConnectionState, SerialOpener};

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use events::EventBus;
use supervisor::{ConnectionSupervisor, StopSignal};

use crate::protocol::{
    OutgoingCommand, ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, EEPROM_READ,
    EEPROM_WRITE,
};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds; bounds every blocking read
    pub timeout_ms: u64,
    /// Delay between failed port-open attempts, milliseconds
    pub backoff_ms: u64,
    /// Bound on the outgoing command queue
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            backoff_ms: 1000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Config for the given port with defaults for everything else
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }
}

/// Handle to the device communication engine.
///
/// All hardware I/O happens on the worker thread this handle spawns;
/// the handle itself only touches the queue, the event bus, the state
/// snapshot and the stop signal.
pub struct DeviceEngine {
    config: EngineConfig,
    opener: Arc<dyn ChannelOpener>,
    queue: Arc<CommandQueue>,
    events: Arc<EventBus>,
    state: Arc<Mutex<ConnectionState>>,
    stop: Arc<StopSignal>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceEngine {
    /// Create an engine that opens the configured physical serial port
    pub fn new(config: EngineConfig) -> Self {
        Self::with_opener(config, Arc::new(SerialOpener))
    }

    /// Create an engine with a custom channel source (simulator, tests)
    pub fn with_opener(config: EngineConfig, opener: Arc<dyn ChannelOpener>) -> Self {
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        Self {
            config,
            opener,
            queue,
            events: Arc::new(EventBus::new()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            stop: Arc::new(StopSignal::new()),
            worker: None,
        }
    }

    /// Spawn the worker thread and begin the connect cycle
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        if self.worker.is_some() {
            return Err(ProtocolError::AlreadyRunning);
        }
        if self.stop.is_raised() {
            return Err(ProtocolError::Stopped);
        }

        let supervisor = ConnectionSupervisor::new(
            self.config.clone(),
            Arc::clone(&self.opener),
            Arc::clone(&self.events),
            Arc::clone(&self.state),
            Arc::clone(&self.stop),
        );
        let queue = Arc::clone(&self.queue);
        let events = Arc::clone(&self.events);
        let stop = Arc::clone(&self.stop);

        let handle = thread::Builder::new()
            .name("udav-engine".into())
            .spawn(move || worker::run(supervisor, queue, events, stop))
            .map_err(ProtocolError::Io)?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Stop the engine and join the worker. Idempotent.
    ///
    /// In-flight blocking reads fail within one read timeout; commands
    /// submitted after this call are refused.
    pub fn stop(&mut self) {
        self.stop.raise();
        self.queue.close();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.worker.is_some() && !self.stop.is_raised()
    }

    /// Current connection state snapshot
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Subscribe to engine events; any number of subscribers is fine
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Commands queued but not yet flushed to the controller
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Queue an already-built command
    pub fn submit(&self, cmd: OutgoingCommand) -> Result<(), ProtocolError> {
        self.queue.submit(cmd)
    }

    /// Queue a simple command: `[0xAA][cmd_id][len][payload]`
    pub fn submit_command(&self, cmd_id: u8, payload: Vec<u8>) -> Result<(), ProtocolError> {
        if payload.len() > u8::MAX as usize {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        self.submit(OutgoingCommand::Simple { cmd_id, payload })
    }

    /// Queue an EEPROM operation (`cmd_id` 0x10 write or 0x11 read)
    pub fn submit_eeprom_command(
        &self,
        cmd_id: u8,
        address: u16,
        data: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        match cmd_id {
            EEPROM_WRITE | EEPROM_READ => self.submit(OutgoingCommand::Eeprom {
                cmd_id,
                address,
                data,
            }),
            other => Err(ProtocolError::UnknownEepromCommand(other)),
        }
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
