//! Communication channel abstraction
//!
//! The engine's worker thread owns exactly one channel at a time. Serial
//! hardware sits behind [`SerialChannel`]; the simulator provides its own
//! implementation for demo mode and tests.

use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::ProtocolError;

/// A byte stream to the controller with bounded-timeout reads.
///
/// The read timeout is fixed when the channel is opened; every read
/// returns within it.
pub trait CommunicationChannel: Read + Write + Send {
    /// Discard any bytes buffered on the receive side
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Discard any bytes not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;
}

/// Read a single byte, treating a timeout as "nothing arrived".
///
/// Never blocks past the channel's configured timeout. Only real channel
/// failures surface as errors.
pub fn read_byte(channel: &mut dyn CommunicationChannel) -> Result<Option<u8>, ProtocolError> {
    let mut buf = [0u8; 1];
    loop {
        match channel.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                return Ok(None)
            }
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
}

/// Serial port wrapper implementing [`CommunicationChannel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already-opened serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Output)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedChannel {
        bytes: Vec<u8>,
        idx: usize,
    }

    impl Read for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.idx >= self.bytes.len() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            buf[0] = self.bytes[self.idx];
            self.idx += 1;
            Ok(1)
        }
    }

    impl Write for ScriptedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CommunicationChannel for ScriptedChannel {
        fn clear_input_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn clear_output_buffer(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_byte_returns_data_then_none_on_timeout() {
        let mut ch = ScriptedChannel {
            bytes: vec![0xAA],
            idx: 0,
        };
        assert_eq!(read_byte(&mut ch).unwrap(), Some(0xAA));
        assert_eq!(read_byte(&mut ch).unwrap(), None);
    }
}
