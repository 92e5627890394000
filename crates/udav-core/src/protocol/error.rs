//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the station controller
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Failed to open port: {0}")]
    PortOpen(String),

    #[error("Handshake failed: expected 0xAA, got {got:?}")]
    Handshake { got: Option<u8> },

    #[error("Exchange frame length mismatch: len1={len1}, len4={len4}")]
    FrameLengthMismatch { len1: u8, len4: u8 },

    #[error("Declared {expected} data bytes, received {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Command payload of {0} bytes does not fit in one length byte")]
    PayloadTooLarge(usize),

    #[error("Unknown EEPROM command id {0:#04x}")]
    UnknownEepromCommand(u8),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Command queue is full")]
    QueueFull,

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Engine has been stopped")]
    Stopped,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error must tear down the current connection.
    ///
    /// Frame-local decode errors leave the link usable; the outer scan
    /// resynchronizes on the next sync byte. Channel-level I/O failures
    /// (device unplugged, port gone) do not.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::SerialError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_local_errors_are_not_fatal() {
        assert!(!ProtocolError::FrameLengthMismatch { len1: 6, len4: 6 }.is_connection_fatal());
        assert!(!ProtocolError::LengthMismatch {
            expected: 8,
            actual: 3
        }
        .is_connection_fatal());
        assert!(!ProtocolError::Handshake { got: None }.is_connection_fatal());
    }

    #[test]
    fn channel_errors_are_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(ProtocolError::Io(io).is_connection_fatal());
        assert!(ProtocolError::SerialError("unplugged".into()).is_connection_fatal());
    }
}
