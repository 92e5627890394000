//! Engine run loop
//!
//! The single worker thread: acquires a link through the supervisor, then
//! alternates between flushing the command queue and scanning the inbound
//! stream for sync bytes. Runs until the stop signal is raised.

use std::io::Write;
use std::sync::Arc;

use super::events::{EngineEvent, EventBus};
use super::queue::CommandQueue;
use super::supervisor::{ConnectionSupervisor, StopSignal};
use crate::protocol::channel::read_byte;
use crate::protocol::{
    frame, CommunicationChannel, ProtocolError, SYNC_EEPROM, SYNC_ERROR, SYNC_EXCHANGE,
};
use tracing::{debug, trace, warn};

enum ServeOutcome {
    Stopped,
    ConnectionLost,
}

pub(crate) fn run(
    supervisor: ConnectionSupervisor,
    queue: Arc<CommandQueue>,
    events: Arc<EventBus>,
    stop: Arc<StopSignal>,
) {
    debug!("engine worker started");
    while !stop.is_raised() {
        let Some(mut channel) = supervisor.acquire() else {
            break;
        };

        match serve(channel.as_mut(), &queue, &events, &stop) {
            ServeOutcome::Stopped => break,
            ServeOutcome::ConnectionLost => supervisor.mark_disconnected(),
        }
        // channel drops here, releasing the port before the next cycle
    }
    debug!("engine worker exiting");
}

/// Service one established connection until it dies or the engine stops
fn serve(
    channel: &mut dyn CommunicationChannel,
    queue: &CommandQueue,
    events: &EventBus,
    stop: &StopSignal,
) -> ServeOutcome {
    loop {
        if stop.is_raised() {
            return ServeOutcome::Stopped;
        }

        if let Some(outcome) = flush_commands(channel, queue, events, stop) {
            return outcome;
        }

        match read_byte(channel) {
            Ok(None) => continue,
            Ok(Some(SYNC_EXCHANGE)) => match frame::decode_exchange(channel) {
                Ok(telemetry) => {
                    trace!(?telemetry, "exchange frame");
                    events.emit(EngineEvent::Telemetry(telemetry));
                }
                Err(e) => {
                    if let Some(outcome) = report_decode_error(e, events) {
                        return outcome;
                    }
                }
            },
            Ok(Some(SYNC_ERROR)) => match frame::decode_error(channel) {
                Ok(error_frame) => {
                    warn!(
                        cmd_id = error_frame.cmd_id,
                        code = error_frame.error_code,
                        "controller error"
                    );
                    events.emit(EngineEvent::DeviceError(error_frame));
                }
                Err(e) => {
                    if let Some(outcome) = report_decode_error(e, events) {
                        return outcome;
                    }
                }
            },
            Ok(Some(SYNC_EEPROM)) => match frame::decode_eeprom_response(channel) {
                Ok(Some(result)) => events.emit(EngineEvent::EepromData(result)),
                // unrecognized sub-type, dropped
                Ok(None) => {}
                Err(e) => {
                    if let Some(outcome) = report_decode_error(e, events) {
                        return outcome;
                    }
                }
            },
            // not a sync byte: consumed and forgotten
            Ok(Some(_)) => {}
            Err(e) => {
                warn!(error = %e, "read failed, dropping connection");
                events.fault("read", e.to_string());
                return ServeOutcome::ConnectionLost;
            }
        }
    }
}

/// Flush every queued command in FIFO order.
///
/// A failed write is reported and the remainder of the queue still goes
/// out; write errors never tear down the connection.
fn flush_commands(
    channel: &mut dyn CommunicationChannel,
    queue: &CommandQueue,
    events: &EventBus,
    stop: &StopSignal,
) -> Option<ServeOutcome> {
    for cmd in queue.drain_all() {
        if stop.is_raised() {
            return Some(ServeOutcome::Stopped);
        }
        match cmd.encode() {
            Ok(bytes) => {
                trace!(len = bytes.len(), "sending command");
                if let Err(e) = channel.write_all(&bytes) {
                    events.fault("write", ProtocolError::Write(e.to_string()).to_string());
                }
            }
            Err(e) => events.fault("write", e.to_string()),
        }
    }
    None
}

/// Classify a decode failure: frame-local problems are diagnostics, channel
/// failures end the connection.
fn report_decode_error(error: ProtocolError, events: &EventBus) -> Option<ServeOutcome> {
    if error.is_connection_fatal() {
        warn!(error = %error, "read failed mid-frame, dropping connection");
        events.fault("read", error.to_string());
        Some(ServeOutcome::ConnectionLost)
    } else {
        debug!(error = %error, "frame dropped");
        events.fault("decode", error.to_string());
        None
    }
}
