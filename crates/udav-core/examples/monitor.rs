//! Station Controller Monitor
//!
//! A standalone tool to watch the telemetry stream from a vacuum station
//! controller, or from the built-in simulator when no hardware is around.
//!
//! Usage:
//!   cargo run --example monitor -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyUSB0)
//!   --baud RATE       Baud rate (default: 115200)
//!   --timeout MS      Read timeout in ms (default: 1000)
//!   --demo            Stream from the simulated controller instead
//!   --list            List available serial ports and exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use udav_core::engine::DeviceEngine;
use udav_core::prelude::*;
use udav_core::protocol::list_ports;
use udav_core::sim::SimOpener;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name = "/dev/ttyUSB0".to_string();
    let mut baud_rate = 115200u32;
    let mut timeout_ms = 1000u64;
    let mut demo = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    port_name = args[i].clone();
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    baud_rate = args[i].parse().unwrap_or(115200);
                }
            }
            "--timeout" | "-t" => {
                i += 1;
                if i < args.len() {
                    timeout_ms = args[i].parse().unwrap_or(1000);
                }
            }
            "--demo" => {
                demo = true;
            }
            "--list" => {
                for port in list_ports() {
                    println!("{}  {:?}", port.name, port.product);
                }
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let config = EngineConfig {
        port_name: port_name.clone(),
        baud_rate,
        timeout_ms,
        ..EngineConfig::default()
    };

    let mut engine = if demo {
        println!("Streaming from the simulated controller");
        let session = SimSession::live(VacuumSimulator::new(), Duration::from_millis(500));
        DeviceEngine::with_opener(config, Arc::new(SimOpener::new(vec![session])))
    } else {
        println!("Connecting to {} at {} baud", port_name, baud_rate);
        DeviceEngine::new(config)
    };

    let events = engine.subscribe();
    engine.start()?;

    for event in events {
        match event {
            EngineEvent::Telemetry(frame) => {
                println!(
                    "MIDA {:>12.3e} Pa | TMN {:>6} rpm | T1 {:>5.1} C | T2 {:>5.1} C",
                    frame.mida.unwrap_or(0.0),
                    frame.tmn_rpm.unwrap_or(0),
                    frame.temp1.unwrap_or(0.0),
                    frame.temp2.unwrap_or(0.0),
                );
            }
            EngineEvent::DeviceError(err) => {
                println!(
                    "controller error: cmd {:#04x} code {:#04x} {}",
                    err.cmd_id,
                    err.error_code,
                    err.info_text()
                );
            }
            EngineEvent::EepromData(result) => {
                println!("EEPROM: {:02x?}", result.data);
            }
            EngineEvent::ConnectionStatus(up) => {
                println!("link {}", if up { "up" } else { "down" });
            }
            EngineEvent::Fault { context, message } => {
                println!("fault [{}]: {}", context, message);
            }
        }
    }

    engine.stop();
    Ok(())
}

fn print_help() {
    println!("Usage: monitor [--port PORT] [--baud RATE] [--timeout MS] [--demo] [--list]");
}
