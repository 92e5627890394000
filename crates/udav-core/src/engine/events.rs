//! Engine event stream
//!
//! Everything the worker observes — decoded packets, connection changes,
//! diagnostics — leaves through a single event enum, fanned out to any
//! number of subscribers. Senders never block, so a slow subscriber cannot
//! stall protocol timing.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::protocol::{EepromReadResult, ErrorFrame, TelemetryFrame};

/// Unified event enum for all engine activity
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A telemetry exchange frame was decoded
    Telemetry(TelemetryFrame),

    /// The controller reported an error (0xBB packet)
    DeviceError(ErrorFrame),

    /// An EEPROM read completed
    EepromData(EepromReadResult),

    /// The link came up (after handshake) or went down
    ConnectionStatus(bool),

    /// A non-fatal problem: failed open, failed handshake, malformed
    /// frame, failed command write
    Fault {
        /// Where the fault happened ("open", "handshake", "decode", "write")
        context: &'static str,
        /// Human-readable description
        message: String,
    },
}

impl EngineEvent {
    /// Whether this event carries decoded controller data
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            EngineEvent::Telemetry(_) | EngineEvent::DeviceError(_) | EngineEvent::EepromData(_)
        )
    }
}

/// Fan-out point between the worker thread and subscribers
pub(crate) struct EventBus {
    senders: Mutex<Vec<Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, pruning dead ones
    pub fn emit(&self, event: EngineEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn fault(&self, context: &'static str, message: String) {
        self.emit(EngineEvent::Fault { context, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_every_subscriber() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(EngineEvent::ConnectionStatus(true));

        assert!(matches!(
            a.try_recv().unwrap(),
            EngineEvent::ConnectionStatus(true)
        ));
        assert!(matches!(
            b.try_recv().unwrap(),
            EngineEvent::ConnectionStatus(true)
        ));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(EngineEvent::ConnectionStatus(false));
        bus.emit(EngineEvent::ConnectionStatus(true));

        assert_eq!(a.iter().take(2).count(), 2);
        assert_eq!(bus.senders.lock().unwrap().len(), 1);
    }
}
