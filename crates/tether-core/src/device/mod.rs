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

//! Scoped acquisition of the measurement device.
//!
//! A [`DeviceConnector`] discovers and opens a [`Transport`]. A
//! [`DeviceSession`] owns that transport exclusively for the lifetime of the
//! loop, turns raw reads into [`Sample`]s and closes the transport on every
//! exit path, either through [`DeviceSession::release`] or on drop.

use std::fmt;
use std::time::Duration;

use crate::input::{Sample, SampleDecoder, DEFAULT_CHANNELS, READ_BUFFER_SIZE};
use crate::utils::timer::TimeSource;

/// Longest settle delay [`DeviceSession::acquire`] will honour.
pub const MAX_SETTLE: Duration = Duration::from_secs(1);

/// An I/O fault on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying read or write failed.
    Io {
        /// The kind of I/O failure.
        kind: std::io::ErrorKind,
        /// Human-readable detail from the driver.
        message: String,
    },
    /// The device went away.
    Disconnected,
    /// The transport was used after it was closed.
    Closed,
}

impl TransportError {
    /// Wraps an [`std::io::Error`].
    pub fn io(err: &std::io::Error) -> Self {
        TransportError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io { kind, message } => write!(f, "I/O error ({kind:?}): {message}"),
            TransportError::Disconnected => write!(f, "Device disconnected"),
            TransportError::Closed => write!(f, "Transport already closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors surfaced by device discovery and the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No attached device matched the discovery criteria.
    NotFound {
        /// Description of what was searched for.
        criteria: String,
    },
    /// A matching device was found but could not be opened.
    Open {
        /// The port that failed to open.
        port: String,
        /// Driver detail.
        message: String,
    },
    /// An I/O fault after acquisition. Fatal for the loop.
    Transport(TransportError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound { criteria } => write!(f, "No device matching {criteria}"),
            DeviceError::Open { port, message } => write!(f, "Failed to open {port}: {message}"),
            DeviceError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for DeviceError {
    fn from(e: TransportError) -> Self {
        DeviceError::Transport(e)
    }
}

/// A byte channel to the device.
pub trait Transport: Send {
    /// Blocks up to `timeout` and reads into `buf`. Returns `Ok(0)` on timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Drops any bytes buffered by the driver.
    fn clear_input(&mut self) -> Result<(), TransportError>;

    /// Closes the channel. Calling it more than once is a no-op.
    fn close(&mut self);

    /// A short description for logs (usually the port path).
    fn describe(&self) -> String;
}

/// Discovers and opens a [`Transport`].
pub trait DeviceConnector {
    /// Finds the device and opens it.
    fn connect(&mut self) -> Result<Box<dyn Transport>, DeviceError>;
}

/// Counters for the reads a session has performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames decoded into samples.
    pub frames_decoded: u64,
    /// Reads that returned bytes but not a whole frame.
    pub discarded_frames: u64,
    /// Reads that returned nothing before the timeout.
    pub timeouts: u64,
}

/// Exclusive, scoped ownership of an open device transport.
pub struct DeviceSession<const N: usize = DEFAULT_CHANNELS> {
    transport: Option<Box<dyn Transport>>,
    clock: Box<dyn TimeSource>,
    buffer: [u8; READ_BUFFER_SIZE],
    stats: SessionStats,
    description: String,
}

impl<const N: usize> DeviceSession<N> {
    /// Connects, waits `settle` (at most [`MAX_SETTLE`]) and discards stale input.
    ///
    /// If clearing the input fails the transport is closed before the error is
    /// returned.
    pub fn acquire(
        connector: &mut dyn DeviceConnector,
        settle: Duration,
        clock: impl TimeSource + 'static,
    ) -> Result<Self, DeviceError> {
        let transport = connector.connect()?;
        let description = transport.describe();

        let settle = if settle > MAX_SETTLE {
            log::warn!(
                "Settle delay of {:?} exceeds {:?}, clamping",
                settle,
                MAX_SETTLE
            );
            MAX_SETTLE
        } else {
            settle
        };

        // From here on `Drop` closes the transport on any early return.
        let mut session = Self {
            transport: Some(transport),
            clock: Box::new(clock),
            buffer: [0u8; READ_BUFFER_SIZE],
            stats: SessionStats::default(),
            description,
        };

        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        session.transport_mut()?.clear_input()?;

        log::info!(
            "Device session acquired on {} (settle {:?})",
            session.description,
            settle
        );
        Ok(session)
    }

    /// Reads at most one report and decodes its first frame.
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout` or when the
    /// bytes did not form a whole frame.
    pub fn read(&mut self, timeout: Duration) -> Result<Option<Sample<N>>, DeviceError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(DeviceError::Transport(TransportError::Closed))?;
        let count = transport.read(&mut self.buffer, timeout)?;
        let timestamp = self.clock.now();

        if count == 0 {
            self.stats.timeouts += 1;
            return Ok(None);
        }

        match SampleDecoder::<N>::decode(&self.buffer[..count], timestamp) {
            Ok(sample) => {
                self.stats.frames_decoded += 1;
                Ok(Some(sample))
            }
            Err(e) => {
                self.stats.discarded_frames += 1;
                log::debug!("Discarding read from {}: {}", self.description, e);
                Ok(None)
            }
        }
    }

    /// Closes the transport. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            log::info!(
                "Device session on {} released ({} decoded, {} discarded, {} timeouts)",
                self.description,
                self.stats.frames_decoded,
                self.stats.discarded_frames,
                self.stats.timeouts
            );
        }
    }

    /// Whether the transport is still open.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Read counters so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The transport description captured at acquisition.
    pub fn description(&self) -> &str {
        &self.description
    }

    fn transport_mut(&mut self) -> Result<&mut Box<dyn Transport>, DeviceError> {
        self.transport
            .as_mut()
            .ok_or(DeviceError::Transport(TransportError::Closed))
    }
}

impl<const N: usize> Drop for DeviceSession<N> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<const N: usize> fmt::Debug for DeviceSession<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("description", &self.description)
            .field("open", &self.is_open())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedClock(f64);

    impl TimeSource for FixedClock {
        fn now(&self) -> f64 {
            self.0
        }
    }

    enum Step {
        Bytes(Vec<u8>),
        Timeout,
        Fault,
    }

    struct ScriptedTransport {
        script: VecDeque<Step>,
        closes: Arc<AtomicUsize>,
        clears: Arc<AtomicUsize>,
        closed: bool,
    }

    impl Transport for ScriptedTransport {
        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
            match self.script.pop_front() {
                Some(Step::Bytes(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Step::Timeout) | None => Ok(0),
                Some(Step::Fault) => Err(TransportError::Disconnected),
            }
        }

        fn clear_input(&mut self) -> Result<(), TransportError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct ScriptedConnector {
        script: Option<Vec<Step>>,
        closes: Arc<AtomicUsize>,
        clears: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Some(script),
                closes: Arc::new(AtomicUsize::new(0)),
                clears: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl DeviceConnector for ScriptedConnector {
        fn connect(&mut self) -> Result<Box<dyn Transport>, DeviceError> {
            let script = self.script.take().ok_or(DeviceError::NotFound {
                criteria: "scripted".into(),
            })?;
            Ok(Box::new(ScriptedTransport {
                script: script.into(),
                closes: self.closes.clone(),
                clears: self.clears.clone(),
                closed: false,
            }))
        }
    }

    fn frame(channels: [u16; 4]) -> Vec<u8> {
        SampleDecoder::<4>::encode(&channels)
    }

    #[test]
    fn acquire_clears_stale_input() {
        let mut connector = ScriptedConnector::new(vec![]);
        let session =
            DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0)).unwrap();
        assert_eq!(connector.clears.load(Ordering::SeqCst), 1);
        assert!(session.is_open());
        assert_eq!(session.description(), "scripted");
    }

    #[test]
    fn not_found_propagates() {
        let mut connector = ScriptedConnector::new(vec![]);
        connector.script = None;
        let err = DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0))
            .unwrap_err();
        assert!(matches!(err, DeviceError::NotFound { .. }));
    }

    #[test]
    fn read_decodes_and_timestamps() {
        let mut connector = ScriptedConnector::new(vec![Step::Bytes(frame([1, 2, 3, 4]))]);
        let mut session =
            DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(2.25)).unwrap();
        let sample = session.read(Duration::from_millis(1)).unwrap().unwrap();
        assert_eq!(sample.channels(), &[1, 2, 3, 4]);
        assert_eq!(sample.timestamp(), 2.25);
        assert_eq!(session.stats().frames_decoded, 1);
    }

    #[test]
    fn timeout_and_short_frames_are_absorbed() {
        let mut connector = ScriptedConnector::new(vec![
            Step::Timeout,
            Step::Bytes(vec![1, 2, 3]),
            Step::Bytes(frame([9, 9, 9, 9])),
        ]);
        let mut session =
            DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0)).unwrap();
        assert_eq!(session.read(Duration::ZERO).unwrap(), None);
        assert_eq!(session.read(Duration::ZERO).unwrap(), None);
        assert!(session.read(Duration::ZERO).unwrap().is_some());

        let stats = session.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.discarded_frames, 1);
        assert_eq!(stats.frames_decoded, 1);
    }

    #[test]
    fn transport_fault_is_fatal_and_drop_closes() {
        let mut connector = ScriptedConnector::new(vec![Step::Fault]);
        let closes = connector.closes.clone();
        {
            let mut session =
                DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0))
                    .unwrap();
            let err = session.read(Duration::ZERO).unwrap_err();
            assert_eq!(err, DeviceError::Transport(TransportError::Disconnected));
            assert_eq!(closes.load(Ordering::SeqCst), 0);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut connector = ScriptedConnector::new(vec![]);
        let closes = connector.closes.clone();
        let mut session =
            DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0)).unwrap();
        session.release();
        session.release();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_after_release_fails() {
        let mut connector = ScriptedConnector::new(vec![]);
        let mut session =
            DeviceSession::<4>::acquire(&mut connector, Duration::ZERO, FixedClock(0.0)).unwrap();
        session.release();
        assert_eq!(
            session.read(Duration::ZERO).unwrap_err(),
            DeviceError::Transport(TransportError::Closed)
        );
    }
}
