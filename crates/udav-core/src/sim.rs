//! Demo Mode - Simulated station controller for testing
//!
//! Generates a plausible pump-down sequence (roughing pump evacuates the
//! chamber, turbomolecular pump spins up, high-vacuum gauges come alive)
//! without real hardware, and provides a scriptable channel so the full
//! engine loop can be exercised in tests: handshake refusal, mid-stream
//! unplug, garbage bytes, EEPROM traffic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{ChannelOpener, EngineConfig};
use crate::protocol::frame::{
    encode_eeprom_response, encode_error, encode_exchange, EepromReadResult, ErrorFrame,
    TelemetryFrame,
};
use crate::protocol::{
    CommunicationChannel, ProtocolError, EEPROM_READ, EEPROM_WRITE, HANDSHAKE_BYTE, SYNC_EEPROM,
};

/// Atmospheric pressure, Pa
const ATMOSPHERE_PA: f32 = 1.0e5;

/// Nominal turbomolecular pump speed, rpm
const TMN_NOMINAL_RPM: u32 = 42_000;

/// Simulated controller generating pump-down telemetry
pub struct VacuumSimulator {
    /// Simulation time, seconds
    elapsed_s: f32,
    /// Step applied by each `next_frame` call, seconds
    step_s: f32,
    rng: StdRng,
}

impl Default for VacuumSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl VacuumSimulator {
    /// Create a simulator with entropy-seeded wobble
    pub fn new() -> Self {
        Self {
            elapsed_s: 0.0,
            step_s: 0.5,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic simulator for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            elapsed_s: 0.0,
            step_s: 0.5,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn wobble(&mut self, spread: f32) -> f32 {
        1.0 + self.rng.gen_range(-spread..spread)
    }

    /// Advance the pump-down and produce the next telemetry frame
    pub fn next_frame(&mut self) -> TelemetryFrame {
        self.elapsed_s += self.step_s;
        let t = self.elapsed_s;

        // Roughing line: exponential decay from atmosphere toward ~2 Pa
        let fore_pressure = (ATMOSPHERE_PA * (-t / 30.0).exp()).max(2.0) * self.wobble(0.02);

        // TMN spins up once the backing line is good enough
        let tmn_rpm = if fore_pressure < 50.0 {
            let ramp_s = t - 30.0 * (ATMOSPHERE_PA / 50.0).ln();
            ((ramp_s.max(0.0) * 1500.0) as u32).min(TMN_NOMINAL_RPM)
        } else {
            0
        };
        let tmn_nominal = tmn_rpm >= TMN_NOMINAL_RPM;

        // High-vacuum gauge only reads meaningfully once the TMN carries load
        let mida = if tmn_rpm > TMN_NOMINAL_RPM / 2 {
            (5.0 * (-(t / 60.0)).exp()).max(1.0e-4) * self.wobble(0.05)
        } else {
            fore_pressure
        };

        // Magnetic discharge gauge tracks the same pressure, noisier
        let mag_discharge = mida * self.wobble(0.1);

        // Pump body warms toward 55 C, electronics toward 40 C
        let temp1 = 20.0 + 35.0 * (1.0 - (-t / 600.0).exp()) * self.wobble(0.01);
        let temp2 = 20.0 + 20.0 * (1.0 - (-t / 400.0).exp()) * self.wobble(0.01);

        TelemetryFrame {
            fore_vacuum_state: Some(1),
            tmn_state: Some(if tmn_nominal {
                2
            } else if tmn_rpm > 0 {
                1
            } else {
                0
            }),
            du16: Some(1),
            du63: Some(u8::from(tmn_rpm > 0)),
            electro_valve_state: Some(0b0000_0011),
            mode: Some(0),
            tmn_rpm: Some(tmn_rpm),
            mida: Some(mida),
            mag_discharge: Some(mag_discharge),
            thermal_indicator: Some(temp1 / 100.0),
            temp1: Some(temp1),
            temp2: Some(temp2),
            analog_out: Some(mida.log10()),
        }
    }
}

/// What the simulated line does once its script runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// Quiet line: reads keep timing out
    Idle,
    /// Dead line: reads fail like an unplugged device
    Unplug,
}

enum SimSource {
    Script(LinkEnd),
    Live {
        sim: VacuumSimulator,
        period: Duration,
    },
}

/// One scripted connection, handed to the engine by a [`SimOpener`]
pub struct SimSession {
    bytes: Vec<u8>,
    source: SimSource,
    eeprom: Vec<u8>,
    fail_writes: bool,
    written: Arc<Mutex<Vec<u8>>>,
}

impl Default for SimSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSession {
    /// A session that handshakes and then follows its script
    pub fn new() -> Self {
        Self {
            bytes: vec![HANDSHAKE_BYTE],
            source: SimSource::Script(LinkEnd::Idle),
            eeprom: (0..=255).collect(),
            fail_writes: false,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A session whose first byte is not the handshake sentinel
    pub fn refusing_handshake() -> Self {
        Self {
            bytes: vec![0x00],
            ..Self::new()
        }
    }

    /// A session that never sends anything (handshake times out)
    pub fn silent() -> Self {
        Self {
            bytes: Vec::new(),
            ..Self::new()
        }
    }

    /// A session streaming generated telemetry at the given cadence
    pub fn live(sim: VacuumSimulator, period: Duration) -> Self {
        Self {
            source: SimSource::Live { sim, period },
            ..Self::new()
        }
    }

    /// Append one telemetry frame to the script
    pub fn frame(mut self, frame: &TelemetryFrame) -> Self {
        self.bytes.extend(encode_exchange(frame));
        self
    }

    /// Append one error packet to the script
    pub fn error_frame(mut self, frame: &ErrorFrame) -> Self {
        self.bytes.extend(encode_error(frame));
        self
    }

    /// Append one EEPROM response to the script
    pub fn eeprom_response(mut self, result: &EepromReadResult) -> Self {
        self.bytes.extend(encode_eeprom_response(result));
        self
    }

    /// Append raw bytes (garbage, partial frames)
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Die like an unplugged device once the script is exhausted
    pub fn then_unplug(mut self) -> Self {
        self.source = SimSource::Script(LinkEnd::Unplug);
        self
    }

    /// Seed the simulated EEPROM cells
    pub fn with_eeprom(mut self, cells: Vec<u8>) -> Self {
        self.eeprom = cells;
        self
    }

    /// Make every command write fail without killing the read side
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Handle on everything the engine writes to this session
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    fn into_channel(self) -> SimChannel {
        SimChannel {
            buffer: self.bytes.into(),
            source: self.source,
            eeprom: self.eeprom,
            fail_writes: self.fail_writes,
            written: self.written,
        }
    }
}

/// In-memory [`CommunicationChannel`] backing one [`SimSession`]
pub struct SimChannel {
    buffer: VecDeque<u8>,
    source: SimSource,
    eeprom: Vec<u8>,
    fail_writes: bool,
    written: Arc<Mutex<Vec<u8>>>,
}

impl SimChannel {
    /// Serve EEPROM traffic like the real controller: reads get a response
    /// queued on the line, writes mutate the cells.
    fn handle_command(&mut self, bytes: &[u8]) {
        if bytes.len() < 2 || bytes[0] != SYNC_EEPROM {
            return;
        }
        match bytes[1] {
            EEPROM_READ if bytes.len() >= 5 => {
                let address = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
                let count = bytes[4] as usize;
                let end = (address + count).min(self.eeprom.len());
                let data = self.eeprom.get(address..end).unwrap_or(&[]).to_vec();
                self.buffer
                    .extend(encode_eeprom_response(&EepromReadResult { data }));
            }
            EEPROM_WRITE if bytes.len() >= 5 => {
                let address = u16::from_le_bytes([bytes[3], bytes[4]]) as usize;
                for (offset, &value) in bytes[5..].iter().enumerate() {
                    if let Some(cell) = self.eeprom.get_mut(address + offset) {
                        *cell = value;
                    }
                }
            }
            _ => {}
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        match &mut self.source {
            SimSource::Script(LinkEnd::Idle) => {
                // Pace the engine's scan loop like a quiet serial line would
                std::thread::sleep(Duration::from_millis(1));
                Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
            }
            SimSource::Script(LinkEnd::Unplug) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            )),
            SimSource::Live { sim, period } => {
                std::thread::sleep(*period);
                let frame = sim.next_frame();
                self.buffer.extend(encode_exchange(&frame));
                Ok(())
            }
        }
    }
}

impl Read for SimChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            self.refill()?;
        }
        let n = buf.len().min(self.buffer.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.buffer.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for SimChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        self.handle_command(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for SimChannel {
    // The buffer models in-flight controller output, not stale host-side
    // bytes, so clearing is a no-op.
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Channel opener handing out scripted sessions in order.
///
/// Once the sessions run out, every open fails like a missing device —
/// which is also the whole behavior of `SimOpener::no_device()`.
pub struct SimOpener {
    sessions: Mutex<VecDeque<SimSession>>,
    attempts: AtomicUsize,
}

impl SimOpener {
    /// Opener serving the given sessions, one per connection attempt
    pub fn new(sessions: Vec<SimSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// An opener with no device behind it: every open fails
    pub fn no_device() -> Self {
        Self::new(Vec::new())
    }

    /// How many times the engine tried to open a channel
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ChannelOpener for SimOpener {
    fn open(&self, _config: &EngineConfig) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.sessions.lock().unwrap().pop_front() {
            Some(session) => Ok(Box::new(session.into_channel())),
            None => Err(ProtocolError::PortOpen("no such device".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::decode_exchange;
    use std::io::Cursor;

    #[test]
    fn simulated_frames_decode() {
        let mut sim = VacuumSimulator::with_seed(7);
        for _ in 0..50 {
            let frame = sim.next_frame();
            let wire = encode_exchange(&frame);
            let decoded = decode_exchange(&mut Cursor::new(&wire[1..])).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn pumpdown_reduces_pressure_and_spins_up_tmn() {
        let mut sim = VacuumSimulator::with_seed(7);
        let first = sim.next_frame();

        let mut last = first;
        for _ in 0..1200 {
            last = sim.next_frame();
        }

        assert!(last.mida.unwrap() < first.mida.unwrap() / 1000.0);
        assert_eq!(last.tmn_rpm, Some(TMN_NOMINAL_RPM));
        assert_eq!(last.tmn_state, Some(2));
    }

    #[test]
    fn sim_channel_answers_eeprom_reads() {
        let session = SimSession::new().with_eeprom(vec![10, 20, 30, 40]);
        let mut channel = session.into_channel();

        // consume the handshake byte
        let mut byte = [0u8; 1];
        channel.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], HANDSHAKE_BYTE);

        channel.write_all(&[0xCC, 0x11, 0x01, 0x00, 0x02]).unwrap();

        let mut response = [0u8; 5];
        channel.read_exact(&mut response).unwrap();
        assert_eq!(response, [0xCC, 0x12, 0x02, 20, 30]);
    }

    #[test]
    fn sim_channel_applies_eeprom_writes() {
        let session = SimSession::new().with_eeprom(vec![0; 8]);
        let mut channel = session.into_channel();

        channel
            .write_all(&[0xCC, 0x10, 0x04, 0x02, 0x00, 0xAB, 0xCD])
            .unwrap();
        assert_eq!(&channel.eeprom[2..4], &[0xAB, 0xCD]);
    }

    #[test]
    fn unplugged_channel_fails_reads() {
        let session = SimSession::new().then_unplug();
        let mut channel = session.into_channel();

        let mut byte = [0u8; 1];
        channel.read_exact(&mut byte).unwrap();
        let err = channel.read_exact(&mut byte).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
