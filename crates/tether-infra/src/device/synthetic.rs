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

//! A transport that fabricates device frames, for running without hardware.
//!
//! Reports are produced at a fixed rate. Drive and turn channels follow slow
//! sinusoids around mid-scale so the controlled body wanders in loops.

use std::f64::consts::TAU;
use std::time::Duration;

use tether_core::device::{DeviceConnector, DeviceError, Transport, TransportError};
use tether_core::input::SampleDecoder;
use tether_core::utils::timer::{MonotonicClock, TimeSource};

const MID_SCALE: f64 = 2048.0;

/// Channel values of the synthetic waveform at `t` seconds.
pub fn waveform(t: f64, amplitude: f64) -> [u16; 4] {
    let drive = amplitude * (TAU * 0.1 * t).sin();
    let turn = amplitude * (TAU * 0.05 * t).cos();
    let clamp = |v: f64| v.round().clamp(0.0, u16::MAX as f64) as u16;
    [
        clamp(MID_SCALE + drive),
        clamp(MID_SCALE - drive),
        clamp(MID_SCALE + turn * 0.25),
        clamp(MID_SCALE - turn * 0.25),
    ]
}

/// Emits a waveform frame every `1 / rate_hz` seconds.
pub struct SyntheticTransport {
    clock: MonotonicClock,
    period: f64,
    amplitude: f64,
    next_due: f64,
    closed: bool,
}

impl SyntheticTransport {
    /// Creates a transport emitting `rate_hz` reports per second.
    pub fn new(rate_hz: f64, amplitude: f64) -> Self {
        let clock = MonotonicClock::new();
        Self {
            next_due: clock.now(),
            clock,
            period: 1.0 / rate_hz.max(1.0),
            amplitude,
            closed: false,
        }
    }
}

impl Transport for SyntheticTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let now = self.clock.now();
        let wait = self.next_due - now;
        if wait > 0.0 {
            if wait > timeout.as_secs_f64() {
                std::thread::sleep(timeout);
                return Ok(0);
            }
            std::thread::sleep(Duration::from_secs_f64(wait));
        }

        let t = self.clock.now();
        self.next_due = self.next_due.max(t - self.period) + self.period;
        let bytes = SampleDecoder::<4>::encode(&waveform(t, self.amplitude));
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.next_due = self.clock.now() + self.period;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn describe(&self) -> String {
        format!("synthetic@{:.0}Hz", 1.0 / self.period)
    }
}

/// Connects to a fresh [`SyntheticTransport`].
#[derive(Debug, Clone, Copy)]
pub struct SyntheticConnector {
    /// Reports per second.
    pub rate_hz: f64,
    /// Peak deviation from mid-scale.
    pub amplitude: f64,
}

impl Default for SyntheticConnector {
    fn default() -> Self {
        Self {
            rate_hz: 1000.0,
            amplitude: 1024.0,
        }
    }
}

impl DeviceConnector for SyntheticConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>, DeviceError> {
        Ok(Box::new(SyntheticTransport::new(
            self.rate_hz,
            self.amplitude,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_starts_centered() {
        let c = waveform(0.0, 1024.0);
        assert_eq!(c[0], 2048);
        assert_eq!(c[1], 2048);
        assert_eq!(c[2], 2304);
        assert_eq!(c[3], 1792);
    }

    #[test]
    fn waveform_clamps_at_zero() {
        // A quarter period of the drive sinusoid: full forward deflection.
        let c = waveform(2.5, 60_000.0);
        assert_eq!(c[0], 62_048);
        assert_eq!(c[1], 0);
    }

    #[test]
    fn emits_decodable_frames() {
        let mut t = SyntheticTransport::new(1000.0, 512.0);
        let mut buf = [0u8; 64];
        let mut frames = 0;
        for _ in 0..20 {
            let n = t.read(&mut buf, Duration::from_millis(5)).unwrap();
            if n > 0 {
                assert!(SampleDecoder::<4>::decode(&buf[..n], 0.0).is_ok());
                frames += 1;
            }
        }
        assert!(frames > 0);
        t.close();
        assert!(t.read(&mut buf, Duration::ZERO).is_err());
    }
}
