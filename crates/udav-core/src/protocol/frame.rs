//! Inbound packet decoding
//!
//! Decoders for the three packet kinds the controller emits. Each decoder
//! is handed the stream positioned just past the sync byte; the engine's
//! scan loop has already consumed it. The matching encoders produce full
//! packets (sync byte included) and exist for the simulator and for
//! round-trip tests.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

use super::{
    ProtocolError, EEPROM_READ_RESPONSE, EXCHANGE_PAYLOAD_LEN, SYNC_EEPROM, SYNC_ERROR,
    SYNC_EXCHANGE,
};

/// One periodic status frame from the controller.
///
/// Fields are `Option` because protocol variants may carry fewer single-byte
/// or 4-byte fields than the canonical layout; fields beyond what the frame
/// declares stay unset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Fore-vacuum (backing) pump state
    pub fore_vacuum_state: Option<u8>,
    /// Turbomolecular pump state
    pub tmn_state: Option<u8>,
    /// DN16 gauge valve state
    pub du16: Option<u8>,
    /// DN63 gauge valve state
    pub du63: Option<u8>,
    /// Electro valve state bitmask
    pub electro_valve_state: Option<u8>,
    /// Operating mode selector
    pub mode: Option<u8>,
    /// Turbomolecular pump speed, rpm
    pub tmn_rpm: Option<u32>,
    /// MIDA transducer pressure reading
    pub mida: Option<f32>,
    /// Magnetic discharge gauge reading
    pub mag_discharge: Option<f32>,
    /// Thermocouple gauge indicator
    pub thermal_indicator: Option<f32>,
    /// Pump body temperature, degrees C
    pub temp1: Option<f32>,
    /// Electronics temperature, degrees C
    pub temp2: Option<f32>,
    /// Analog output channel level
    pub analog_out: Option<f32>,
}

/// Error report from the controller (0xBB packet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Command the error refers to
    pub cmd_id: u8,
    /// Controller-defined error code
    pub error_code: u8,
    /// Free-form diagnostic bytes, usually ASCII
    pub info: Vec<u8>,
}

impl ErrorFrame {
    /// Diagnostic info as text, lossily decoded
    pub fn info_text(&self) -> String {
        String::from_utf8_lossy(&self.info).into_owned()
    }
}

/// Result of an EEPROM read (0xCC response packet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EepromReadResult {
    /// Cell values in address order
    pub data: Vec<u8>,
}

fn is_short_read(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::UnexpectedEof
    )
}

/// Fill `buf` from the reader, tolerating partial delivery.
///
/// Returns the number of bytes actually read. A timeout or EOF ends the
/// read early; any other I/O failure propagates as connection-fatal.
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_short_read(&e) => break,
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(filled)
}

fn read_exact_checked<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    let got = read_up_to(reader, buf)?;
    if got != buf.len() {
        return Err(ProtocolError::LengthMismatch {
            expected: buf.len(),
            actual: got,
        });
    }
    Ok(())
}

/// Decode a telemetry exchange packet.
///
/// The first two bytes declare the field counts: `len1` single-byte fields
/// followed by `len4` little-endian 4-byte groups. `len1 + 4*len4` must
/// equal [`EXCHANGE_PAYLOAD_LEN`]; on mismatch only the two length bytes
/// have been consumed and the caller resynchronizes on the next sync byte.
pub fn decode_exchange<R: Read + ?Sized>(reader: &mut R) -> Result<TelemetryFrame, ProtocolError> {
    let mut lens = [0u8; 2];
    read_exact_checked(reader, &mut lens)?;
    let (len1, len4) = (lens[0], lens[1]);

    if len1 as usize + 4 * len4 as usize != EXCHANGE_PAYLOAD_LEN {
        return Err(ProtocolError::FrameLengthMismatch { len1, len4 });
    }

    let mut frame = TelemetryFrame::default();

    let mut singles = vec![0u8; len1 as usize];
    read_exact_checked(reader, &mut singles)?;
    for (idx, &value) in singles.iter().enumerate() {
        match idx {
            0 => frame.fore_vacuum_state = Some(value),
            1 => frame.tmn_state = Some(value),
            2 => frame.du16 = Some(value),
            3 => frame.du63 = Some(value),
            4 => frame.electro_valve_state = Some(value),
            5 => frame.mode = Some(value),
            // forward-compatibility slot
            _ => {}
        }
    }

    let mut group = [0u8; 4];
    for idx in 0..len4 as usize {
        read_exact_checked(reader, &mut group)?;
        match idx {
            0 => frame.tmn_rpm = Some(LittleEndian::read_u32(&group)),
            1 => frame.mida = Some(LittleEndian::read_f32(&group)),
            2 => frame.mag_discharge = Some(LittleEndian::read_f32(&group)),
            3 => frame.thermal_indicator = Some(LittleEndian::read_f32(&group)),
            4 => frame.temp1 = Some(LittleEndian::read_f32(&group)),
            5 => frame.temp2 = Some(LittleEndian::read_f32(&group)),
            6 => frame.analog_out = Some(LittleEndian::read_f32(&group)),
            _ => {}
        }
    }

    Ok(frame)
}

/// Decode an error packet. The declared info length is authoritative.
pub fn decode_error<R: Read + ?Sized>(reader: &mut R) -> Result<ErrorFrame, ProtocolError> {
    let mut header = [0u8; 3];
    read_exact_checked(reader, &mut header)?;

    let mut info = vec![0u8; header[2] as usize];
    read_exact_checked(reader, &mut info)?;

    Ok(ErrorFrame {
        cmd_id: header[0],
        error_code: header[1],
        info,
    })
}

/// Decode an EEPROM response packet.
///
/// Returns `Ok(None)` when the embedded command id is not the read-response
/// opcode; such frames are an unrecognized sub-type, dropped without fuss.
/// A short read against the declared length is a [`ProtocolError::LengthMismatch`].
pub fn decode_eeprom_response<R: Read + ?Sized>(
    reader: &mut R,
) -> Result<Option<EepromReadResult>, ProtocolError> {
    let mut cmd = [0u8; 1];
    read_exact_checked(reader, &mut cmd)?;
    if cmd[0] != EEPROM_READ_RESPONSE {
        return Ok(None);
    }

    let mut len = [0u8; 1];
    read_exact_checked(reader, &mut len)?;

    let mut data = vec![0u8; len[0] as usize];
    read_exact_checked(reader, &mut data)?;

    Ok(Some(EepromReadResult { data }))
}

/// Encode a telemetry frame in the canonical 6 + 7 layout, sync byte included.
///
/// Unset fields encode as zero. Used by the simulator and round-trip tests.
pub fn encode_exchange(frame: &TelemetryFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3 + EXCHANGE_PAYLOAD_LEN);
    bytes.push(SYNC_EXCHANGE);
    bytes.push(6);
    bytes.push(7);

    bytes.push(frame.fore_vacuum_state.unwrap_or(0));
    bytes.push(frame.tmn_state.unwrap_or(0));
    bytes.push(frame.du16.unwrap_or(0));
    bytes.push(frame.du63.unwrap_or(0));
    bytes.push(frame.electro_valve_state.unwrap_or(0));
    bytes.push(frame.mode.unwrap_or(0));

    let mut group = [0u8; 4];
    LittleEndian::write_u32(&mut group, frame.tmn_rpm.unwrap_or(0));
    bytes.extend_from_slice(&group);
    for value in [
        frame.mida,
        frame.mag_discharge,
        frame.thermal_indicator,
        frame.temp1,
        frame.temp2,
        frame.analog_out,
    ] {
        LittleEndian::write_f32(&mut group, value.unwrap_or(0.0));
        bytes.extend_from_slice(&group);
    }

    bytes
}

/// Encode an error packet, sync byte included
pub fn encode_error(frame: &ErrorFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + frame.info.len());
    bytes.push(SYNC_ERROR);
    bytes.push(frame.cmd_id);
    bytes.push(frame.error_code);
    bytes.push(frame.info.len() as u8);
    bytes.extend_from_slice(&frame.info);
    bytes
}

/// Encode an EEPROM read response, sync byte included
pub fn encode_eeprom_response(result: &EepromReadResult) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3 + result.data.len());
    bytes.push(SYNC_EEPROM);
    bytes.push(EEPROM_READ_RESPONSE);
    bytes.push(result.data.len() as u8);
    bytes.extend_from_slice(&result.data);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn sample_frame() -> TelemetryFrame {
        TelemetryFrame {
            fore_vacuum_state: Some(1),
            tmn_state: Some(2),
            du16: Some(0),
            du63: Some(1),
            electro_valve_state: Some(0b0001_0110),
            mode: Some(0),
            tmn_rpm: Some(42_000),
            mida: Some(7.5e-3),
            mag_discharge: Some(1.2e-6),
            thermal_indicator: Some(0.81),
            temp1: Some(23.4),
            temp2: Some(41.0),
            analog_out: Some(2.5),
        }
    }

    #[test]
    fn exchange_roundtrip_is_bit_exact() {
        let frame = sample_frame();
        let wire = encode_exchange(&frame);
        assert_eq!(wire[0], SYNC_EXCHANGE);
        assert_eq!(wire.len(), 3 + EXCHANGE_PAYLOAD_LEN);

        let decoded = decode_exchange(&mut Cursor::new(&wire[1..])).unwrap();
        assert_eq!(decoded, frame);
        // Floats must survive untouched, not merely approximately
        assert_eq!(
            decoded.mida.unwrap().to_bits(),
            frame.mida.unwrap().to_bits()
        );
    }

    #[test]
    fn exchange_length_mismatch_consumes_only_length_bytes() {
        // 5 + 4*6 = 29, the revision-1 total, rejected under this contract
        let mut wire = vec![5u8, 6u8];
        wire.extend_from_slice(&[0u8; 29]);
        let mut cursor = Cursor::new(wire);

        let err = decode_exchange(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FrameLengthMismatch { len1: 5, len4: 6 }
        ));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn exchange_with_fewer_named_fields_truncates_gracefully() {
        // 2 + 4*8 = 34: only the first two single-byte fields are carried,
        // and the eighth 4-byte group has no name yet.
        let mut wire = vec![2u8, 8u8, 9, 7];
        let mut group = [0u8; 4];
        LittleEndian::write_u32(&mut group, 1500);
        wire.extend_from_slice(&group);
        for value in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 99.0] {
            LittleEndian::write_f32(&mut group, value);
            wire.extend_from_slice(&group);
        }

        let frame = decode_exchange(&mut Cursor::new(wire)).unwrap();
        assert_eq!(frame.fore_vacuum_state, Some(9));
        assert_eq!(frame.tmn_state, Some(7));
        assert_eq!(frame.du16, None);
        assert_eq!(frame.mode, None);
        assert_eq!(frame.tmn_rpm, Some(1500));
        assert_eq!(frame.analog_out, Some(6.0));
    }

    #[test]
    fn exchange_short_read_is_frame_local() {
        // Valid lengths but the stream dries up mid-payload
        let wire = vec![6u8, 7u8, 1, 2, 3];
        let err = decode_exchange(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, ProtocolError::LengthMismatch { .. }));
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn error_frame_roundtrip() {
        let frame = ErrorFrame {
            cmd_id: 0x01,
            error_code: 0x05,
            info: b"valve stuck".to_vec(),
        };
        let wire = encode_error(&frame);
        assert_eq!(wire[0], SYNC_ERROR);

        let decoded = decode_error(&mut Cursor::new(&wire[1..])).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.info_text(), "valve stuck");
    }

    #[test]
    fn error_frame_with_empty_info() {
        let decoded = decode_error(&mut Cursor::new([0x02u8, 0x01, 0x00])).unwrap();
        assert_eq!(decoded.info, Vec::<u8>::new());
    }

    #[test]
    fn eeprom_response_roundtrip() {
        let result = EepromReadResult {
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let wire = encode_eeprom_response(&result);
        assert_eq!(wire[0], SYNC_EEPROM);

        let decoded = decode_eeprom_response(&mut Cursor::new(&wire[1..]))
            .unwrap()
            .unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn eeprom_response_with_wrong_opcode_is_dropped() {
        // 0x11 is the request opcode; a response must carry 0x12
        let wire = [0x11u8, 0x02, 0xAB, 0xCD];
        let decoded = decode_eeprom_response(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn eeprom_response_short_read_is_length_mismatch() {
        let wire = [EEPROM_READ_RESPONSE, 0x08, 0x01, 0x02];
        let err = decode_eeprom_response(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::LengthMismatch {
                expected: 8,
                actual: 2
            }
        ));
    }

    #[test]
    fn telemetry_frame_serializes() {
        let frame = sample_frame();
        let json = serde_json::to_string(&frame).unwrap();
        let back: TelemetryFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
