//! Outgoing command encoding
//!
//! Commands travel to the controller in two framings: simple commands under
//! the 0xAA sync byte, and EEPROM operations under 0xCC with their own
//! read/write opcodes.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{ProtocolError, CMD_VALVE_TOGGLE, EEPROM_READ, EEPROM_WRITE, SYNC_EEPROM, SYNC_EXCHANGE};

/// Valves addressable by the toggle command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ValveId {
    V1,
    V2,
    V3,
    V4,
    V5,
    V8,
}

impl ValveId {
    /// Wire number the controller expects in the toggle payload
    pub fn wire_id(self) -> u8 {
        match self {
            ValveId::V1 => 1,
            ValveId::V2 => 2,
            ValveId::V3 => 3,
            ValveId::V4 => 4,
            ValveId::V5 => 5,
            ValveId::V8 => 8,
        }
    }
}

/// A command waiting in the queue, consumed exactly once by the encoder
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingCommand {
    /// Generic command under the 0xAA framing
    Simple { cmd_id: u8, payload: Vec<u8> },
    /// EEPROM read or write under the 0xCC framing
    Eeprom {
        cmd_id: u8,
        address: u16,
        data: Vec<u8>,
    },
}

impl OutgoingCommand {
    /// Toggle a valve (command 0x01, payload = valve number)
    pub fn valve_toggle(valve: ValveId) -> Self {
        OutgoingCommand::Simple {
            cmd_id: CMD_VALVE_TOGGLE,
            payload: vec![valve.wire_id()],
        }
    }

    /// Read `count` cells starting at `address`
    pub fn eeprom_read(address: u16, count: u8) -> Self {
        OutgoingCommand::Eeprom {
            cmd_id: EEPROM_READ,
            address,
            data: vec![count],
        }
    }

    /// Read the inclusive cell range `start..=end`
    pub fn eeprom_read_range(start: u16, end: u16) -> Self {
        let count = end.saturating_sub(start).min(254) + 1;
        Self::eeprom_read(start, count as u8)
    }

    /// Write `data` starting at `address`
    pub fn eeprom_write(address: u16, data: Vec<u8>) -> Self {
        OutgoingCommand::Eeprom {
            cmd_id: EEPROM_WRITE,
            address,
            data,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            OutgoingCommand::Simple { cmd_id, payload } => encode_simple(*cmd_id, payload),
            OutgoingCommand::Eeprom {
                cmd_id,
                address,
                data,
            } => encode_eeprom(*cmd_id, *address, data),
        }
    }
}

/// Encode a simple command: `[0xAA][cmd_id][len][payload]`.
///
/// The payload must fit in the single length byte.
pub fn encode_simple(cmd_id: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > u8::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    let mut bytes = Vec::with_capacity(3 + payload.len());
    bytes.push(SYNC_EXCHANGE);
    bytes.push(cmd_id);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Encode an EEPROM operation.
///
/// Write: `[0xCC][0x10][2 + len(data)][address LE][data]`.
/// Read: `[0xCC][0x11][address LE][count]` where `count` is the first data
/// byte, defaulting to a single cell when none is supplied.
pub fn encode_eeprom(cmd_id: u8, address: u16, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut addr = [0u8; 2];
    LittleEndian::write_u16(&mut addr, address);

    match cmd_id {
        EEPROM_WRITE => {
            if data.len() > u8::MAX as usize - 2 {
                return Err(ProtocolError::PayloadTooLarge(data.len()));
            }
            let mut bytes = Vec::with_capacity(5 + data.len());
            bytes.push(SYNC_EEPROM);
            bytes.push(EEPROM_WRITE);
            bytes.push(2 + data.len() as u8);
            bytes.extend_from_slice(&addr);
            bytes.extend_from_slice(data);
            Ok(bytes)
        }
        EEPROM_READ => {
            let count = data.first().copied().unwrap_or(1);
            Ok(vec![SYNC_EEPROM, EEPROM_READ, addr[0], addr[1], count])
        }
        other => Err(ProtocolError::UnknownEepromCommand(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_command_layout() {
        let wire = encode_simple(0x01, &[5]).unwrap();
        assert_eq!(wire, vec![0xAA, 0x01, 0x01, 0x05]);
    }

    #[test]
    fn simple_command_with_empty_payload() {
        let wire = encode_simple(0x07, &[]).unwrap();
        assert_eq!(wire, vec![0xAA, 0x07, 0x00]);
    }

    #[test]
    fn simple_command_rejects_oversized_payload() {
        let payload = vec![0u8; 256];
        assert!(matches!(
            encode_simple(0x01, &payload),
            Err(ProtocolError::PayloadTooLarge(256))
        ));
    }

    #[test]
    fn eeprom_read_layout() {
        let wire = encode_eeprom(0x11, 0x0010, &[3]).unwrap();
        assert_eq!(wire, vec![0xCC, 0x11, 0x10, 0x00, 0x03]);
    }

    #[test]
    fn eeprom_read_defaults_to_one_cell() {
        let wire = encode_eeprom(0x11, 0x0204, &[]).unwrap();
        assert_eq!(wire, vec![0xCC, 0x11, 0x04, 0x02, 0x01]);
    }

    #[test]
    fn eeprom_write_layout() {
        let wire = encode_eeprom(0x10, 0x0010, &[1, 2]).unwrap();
        assert_eq!(wire, vec![0xCC, 0x10, 0x04, 0x10, 0x00, 1, 2]);
    }

    #[test]
    fn eeprom_rejects_unknown_opcode() {
        assert!(matches!(
            encode_eeprom(0x12, 0, &[]),
            Err(ProtocolError::UnknownEepromCommand(0x12))
        ));
    }

    #[test]
    fn valve_toggle_builds_simple_command() {
        let cmd = OutgoingCommand::valve_toggle(ValveId::V8);
        assert_eq!(cmd.encode().unwrap(), vec![0xAA, 0x01, 0x01, 0x08]);
    }

    #[test]
    fn eeprom_read_range_is_inclusive() {
        let cmd = OutgoingCommand::eeprom_read_range(10, 14);
        assert_eq!(cmd.encode().unwrap(), vec![0xCC, 0x11, 0x0A, 0x00, 0x05]);
    }
}
