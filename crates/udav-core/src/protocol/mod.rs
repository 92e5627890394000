//! Serial protocol for the vacuum station controller
//!
//! The controller streams three kinds of binary packets, each introduced by
//! a fixed sync byte, and accepts framed commands on the same line. All
//! multi-byte values are little-endian.

pub mod channel;
pub mod command;
mod error;
pub mod frame;
pub mod serial;

pub use channel::{CommunicationChannel, SerialChannel};
pub use command::{OutgoingCommand, ValveId};
pub use error::ProtocolError;
pub use frame::{EepromReadResult, ErrorFrame, TelemetryFrame};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};

/// Sync byte introducing a telemetry exchange packet
pub const SYNC_EXCHANGE: u8 = 0xAA;

/// Sync byte introducing an error packet
pub const SYNC_ERROR: u8 = 0xBB;

/// Sync byte introducing an EEPROM response packet
pub const SYNC_EEPROM: u8 = 0xCC;

/// EEPROM write opcode (host -> controller)
pub const EEPROM_WRITE: u8 = 0x10;

/// EEPROM read opcode (host -> controller)
pub const EEPROM_READ: u8 = 0x11;

/// EEPROM read-response opcode (controller -> host)
pub const EEPROM_READ_RESPONSE: u8 = 0x12;

/// Simple command id toggling a valve; payload is the valve number
pub const CMD_VALVE_TOGGLE: u8 = 0x01;

// Revision-2 firmware contract. Revision 1 used a 29-byte exchange payload
// and a 0x01 handshake byte; both constants change together when targeting
// that firmware.

/// Total exchange payload length: `len1 + 4 * len4` must equal this
pub const EXCHANGE_PAYLOAD_LEN: usize = 34;

/// Byte expected from the controller immediately after opening the port
pub const HANDSHAKE_BYTE: u8 = 0xAA;

/// Default baud rate for controller communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
