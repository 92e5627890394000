//! # Udav Core Library
//!
//! Core functionality for the Udav vacuum station control software.
//!
//! This library provides:
//! - Binary serial protocol for the station controller (telemetry, error
//!   and EEPROM packets)
//! - A device communication engine running on a dedicated worker thread,
//!   with automatic reconnect
//! - A thread-safe command queue and an event stream for UI layers
//! - A simulated controller for demo mode and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use udav_core::prelude::*;
//!
//! let mut engine = DeviceEngine::new(EngineConfig::for_port("/dev/ttyUSB0"));
//! let events = engine.subscribe();
//! engine.start()?;
//!
//! engine.submit(OutgoingCommand::valve_toggle(ValveId::V1))?;
//! for event in events {
//!     if let EngineEvent::Telemetry(frame) = event {
//!         println!("MIDA: {:?}", frame.mida);
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod protocol;
pub mod sim;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::engine::{
        ChannelOpener, ConnectionState, DeviceEngine, EngineConfig, EngineEvent,
    };
    pub use crate::protocol::{
        EepromReadResult, ErrorFrame, OutgoingCommand, ProtocolError, TelemetryFrame, ValveId,
    };
    pub use crate::sim::{SimOpener, SimSession, VacuumSimulator};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
