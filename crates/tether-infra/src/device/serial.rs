// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serial transport backed by the `serialport` crate.

use std::io::Read;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use tether_core::device::{DeviceConnector, DeviceError, Transport, TransportError};

use super::{DeviceMatch, PortListing};

/// Lists the serial ports the OS knows about.
pub fn list_ports() -> Result<Vec<PortListing>, DeviceError> {
    let ports = serialport::available_ports().map_err(|e| DeviceError::NotFound {
        criteria: format!("any serial port ({e})"),
    })?;
    Ok(ports
        .into_iter()
        .map(|p| PortListing {
            usb_ids: match p.port_type {
                SerialPortType::UsbPort(info) => Some((info.vid, info.pid)),
                _ => None,
            },
            name: p.port_name,
        })
        .collect())
}

/// Finds the port of the first attached device matching `criteria`.
pub fn discover_port(criteria: &DeviceMatch) -> Result<String, DeviceError> {
    let listings = list_ports()?;
    log::debug!("Found {} serial port(s)", listings.len());
    criteria.select(&listings)
}

/// An open serial port.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialTransport {
    /// Opens `path` at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, DeviceError> {
        let timeout = Duration::from_millis(1);
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| DeviceError::Open {
                port: path.to_string(),
                message: e.to_string(),
            })?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(Self {
            port: Some(port),
            name: path.to_string(),
            timeout,
        })
    }
}

fn serial_error(e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::Disconnected,
        serialport::ErrorKind::Io(kind) => TransportError::Io {
            kind,
            message: e.to_string(),
        },
        _ => TransportError::Io {
            kind: std::io::ErrorKind::Other,
            message: e.to_string(),
        },
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        if timeout != self.timeout {
            port.set_timeout(timeout).map_err(serial_error)?;
            self.timeout = timeout;
        }
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(TransportError::Disconnected)
            }
            Err(e) => Err(TransportError::io(&e)),
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.clear(ClearBuffer::Input).map_err(serial_error)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Closed serial port {}", self.name);
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Discovers the device by USB ids and opens it over serial.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    criteria: DeviceMatch,
    baud_rate: u32,
}

impl SerialConnector {
    /// Creates a connector.
    pub fn new(criteria: DeviceMatch, baud_rate: u32) -> Self {
        Self {
            criteria,
            baud_rate,
        }
    }
}

impl DeviceConnector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, DeviceError> {
        let path = discover_port(&self.criteria)?;
        log::info!("Device matching {} found at {}", self.criteria, path);
        Ok(Box::new(SerialTransport::open(&path, self.baud_rate)?))
    }
}
