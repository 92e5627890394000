//! Connection lifecycle
//!
//! Drives the open -> handshake -> connected -> disconnected cycle. The
//! supervisor runs entirely on the worker thread; the rest of the process
//! only ever sees state snapshots and events.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::events::{EngineEvent, EventBus};
use super::EngineConfig;
use crate::protocol::channel::read_byte;
use crate::protocol::{
    clear_buffers, configure_port, open_port, CommunicationChannel, ProtocolError, SerialChannel,
    HANDSHAKE_BYTE,
};
use tracing::{debug, info, warn};

/// Connection state, observable as a snapshot via the engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected; the supervisor is retrying the port
    Disconnected,
    /// Port open, waiting for the liveness byte
    Handshaking,
    /// Link established, telemetry flowing
    Connected,
}

/// Provides channels to the supervisor.
///
/// The default implementation opens real serial hardware; the simulator and
/// tests inject their own.
pub trait ChannelOpener: Send + Sync {
    /// Open a fresh channel for one connection attempt
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn CommunicationChannel>, ProtocolError>;
}

/// Opens the configured physical serial port
pub struct SerialOpener;

impl ChannelOpener for SerialOpener {
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let mut port = open_port(
            &config.port_name,
            config.baud_rate,
            Duration::from_millis(config.timeout_ms),
        )?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;
        Ok(Box::new(SerialChannel::new(port)))
    }
}

/// Stop request shared between the engine handle and the worker.
///
/// Backoff waits park on the condvar, so `raise()` interrupts a sleeping
/// retry loop immediately instead of after the full interval.
pub(crate) struct StopSignal {
    raised: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn raise(&self) {
        *self.raised.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.lock().unwrap()
    }

    /// Wait up to `timeout`; returns true if the stop was raised
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let guard = self.raised.lock().unwrap();
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap();
        *guard
    }
}

/// State machine driving one connection cycle after another
pub(crate) struct ConnectionSupervisor {
    config: EngineConfig,
    opener: Arc<dyn ChannelOpener>,
    events: Arc<EventBus>,
    state: Arc<Mutex<ConnectionState>>,
    stop: Arc<StopSignal>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: EngineConfig,
        opener: Arc<dyn ChannelOpener>,
        events: Arc<EventBus>,
        state: Arc<Mutex<ConnectionState>>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            config,
            opener,
            events,
            state,
            stop,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        debug!(?state, "connection state");
    }

    /// Open and handshake until a link is up or the engine is stopped.
    ///
    /// Returns `None` only on stop. Open failures back off for the
    /// configured interval; handshake failures close the port and restart
    /// the cycle, paced by the handshake read timeout itself.
    pub fn acquire(&self) -> Option<Box<dyn CommunicationChannel>> {
        let backoff = Duration::from_millis(self.config.backoff_ms);

        loop {
            if self.stop.is_raised() {
                return None;
            }

            let mut channel = match self.opener.open(&self.config) {
                Ok(channel) => channel,
                Err(e) => {
                    self.events.fault("open", e.to_string());
                    if self.stop.wait_for(backoff) {
                        return None;
                    }
                    continue;
                }
            };

            self.set_state(ConnectionState::Handshaking);
            // Drop anything queued before we were listening
            let _ = channel.clear_input_buffer();
            let _ = channel.clear_output_buffer();
            match self.handshake(channel.as_mut()) {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    info!(port = %self.config.port_name, "controller link up");
                    self.events.emit(EngineEvent::ConnectionStatus(true));
                    return Some(channel);
                }
                Err(e) => {
                    warn!(port = %self.config.port_name, error = %e, "handshake failed");
                    self.events.fault("handshake", e.to_string());
                    self.set_state(ConnectionState::Disconnected);
                    // channel drops here, closing the port
                }
            }
        }
    }

    /// Single-byte liveness check performed right after the port opens
    fn handshake(&self, channel: &mut dyn CommunicationChannel) -> Result<(), ProtocolError> {
        match read_byte(channel)? {
            Some(HANDSHAKE_BYTE) => Ok(()),
            got => Err(ProtocolError::Handshake { got }),
        }
    }

    /// Tear down after a connection-fatal read error
    pub fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(EngineEvent::ConnectionStatus(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn stop_signal_interrupts_backoff_wait() {
        let stop = Arc::new(StopSignal::new());
        let waiter = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let raised = waiter.wait_for(Duration::from_secs(10));
            (raised, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        stop.raise();

        let (raised, elapsed) = handle.join().unwrap();
        assert!(raised);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn stop_signal_wait_times_out_when_not_raised() {
        let stop = StopSignal::new();
        assert!(!stop.wait_for(Duration::from_millis(5)));
        assert!(!stop.is_raised());
    }
}
