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

//! In-memory transport for tests.
//!
//! Each injected report is returned by exactly one `read`. An empty queue
//! reads as a timeout without blocking.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tether_core::device::{DeviceConnector, DeviceError, Transport, TransportError};
use tether_core::input::SampleDecoder;

#[derive(Debug)]
enum Report {
    Bytes(Vec<u8>),
    Fault(TransportError),
}

#[derive(Debug, Default)]
struct MockTransportInner {
    reports: VecDeque<Report>,
    reads: u64,
    clears: u64,
    closes: u64,
    closed: bool,
}

/// Scriptable transport. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues raw bytes to be returned by one read.
    pub fn inject_bytes(&self, data: &[u8]) {
        self.lock().reports.push_back(Report::Bytes(data.to_vec()));
    }

    /// Queues one well-formed 4-channel frame.
    pub fn inject_frame(&self, channels: [u16; 4]) {
        self.inject_bytes(&SampleDecoder::<4>::encode(&channels));
    }

    /// Queues the same frame `count` times.
    pub fn inject_frames(&self, channels: [u16; 4], count: usize) {
        for _ in 0..count {
            self.inject_frame(channels);
        }
    }

    /// Queues a read that fails with `error`.
    pub fn inject_fault(&self, error: TransportError) {
        self.lock().reports.push_back(Report::Fault(error));
    }

    /// Reports not yet read.
    pub fn pending(&self) -> usize {
        self.lock().reports.len()
    }

    /// Reads performed, timeouts included.
    pub fn read_count(&self) -> u64 {
        self.lock().reads
    }

    /// Times `clear_input` was called.
    pub fn clear_count(&self) -> u64 {
        self.lock().clears
    }

    /// Times `close` actually closed the transport.
    pub fn close_count(&self) -> u64 {
        self.lock().closes
    }

    /// Whether the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        inner.reads += 1;
        match inner.reports.pop_front() {
            Some(Report::Bytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Report::Fault(e)) => Err(e),
            None => Ok(0),
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.lock().clears += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            inner.closes += 1;
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Hands out clones of one [`MockTransport`], or fails discovery.
#[derive(Debug, Clone)]
pub struct MockConnector {
    transport: Option<MockTransport>,
}

impl MockConnector {
    /// A connector that finds `transport`.
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// A connector that finds nothing.
    pub fn absent() -> Self {
        Self { transport: None }
    }
}

impl DeviceConnector for MockConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, DeviceError> {
        match &self.transport {
            Some(t) => Ok(Box::new(t.clone())),
            None => Err(DeviceError::NotFound {
                criteria: "mock device".to_string(),
            }),
        }
    }
}
