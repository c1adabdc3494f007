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

//! Typed device observations and the binary frame decoder.
//!
//! The device pushes frames of `N` little-endian `u16` channel readings with no
//! prefix, checksum or escaping. A read may return more than one frame's worth
//! of bytes; only the first frame is meaningful.

use std::fmt;

/// Arity of the reference device (two drive channels, two turn channels).
pub const DEFAULT_CHANNELS: usize = 4;

/// Number of bytes the device firmware pushes per report.
pub const READ_BUFFER_SIZE: usize = 64;

/// Full-scale reading of a 12-bit channel.
pub const DEFAULT_FULL_SCALE: f32 = 4095.0;

/// What a sample's channels measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    /// Absolute positions of the device's actuators.
    Position,
}

/// One decoded frame of channel readings plus its acquisition timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<const N: usize = DEFAULT_CHANNELS> {
    kind: ObservationKind,
    channels: [u16; N],
    timestamp: f64,
}

impl<const N: usize> Sample<N> {
    /// Creates a sample from raw channel readings.
    pub fn new(kind: ObservationKind, channels: [u16; N], timestamp: f64) -> Self {
        Self {
            kind,
            channels,
            timestamp,
        }
    }

    /// The observation kind.
    pub fn kind(&self) -> ObservationKind {
        self.kind
    }

    /// The raw channel readings.
    pub fn channels(&self) -> &[u16; N] {
        &self.channels
    }

    /// Acquisition time, in seconds on the session's monotonic clock.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Divides every channel by `full_scale`, clamping to `[0, 1]`.
    pub fn normalize(&self, full_scale: f32) -> NormalizedSample<N> {
        let mut values = [0.0f32; N];
        for (out, raw) in values.iter_mut().zip(self.channels.iter()) {
            *out = *raw as f32 / full_scale;
        }
        NormalizedSample::new(values)
    }
}

/// Channel values scaled into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedSample<const N: usize = DEFAULT_CHANNELS> {
    values: [f32; N],
}

impl<const N: usize> NormalizedSample<N> {
    /// Creates a normalized sample. Values are clamped to `[0, 1]`; NaN becomes 0.
    pub fn new(mut values: [f32; N]) -> Self {
        for v in values.iter_mut() {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }
        Self { values }
    }

    /// All channel values.
    pub fn values(&self) -> &[f32; N] {
        &self.values
    }

    /// A single channel, or `None` past the arity.
    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// The sample's arity.
    pub const fn arity(&self) -> usize {
        N
    }
}

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer held fewer bytes than one frame.
    ShortFrame {
        /// Bytes required for one frame.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::ShortFrame { expected, actual } => {
                write!(f, "Short frame: expected {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes `N`-channel little-endian frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDecoder<const N: usize = DEFAULT_CHANNELS>;

impl<const N: usize> SampleDecoder<N> {
    /// Bytes per frame.
    pub const FRAME_SIZE: usize = 2 * N;

    /// Parses the first frame of `bytes`. Trailing bytes are ignored.
    pub fn decode(bytes: &[u8], timestamp: f64) -> Result<Sample<N>, DecodeError> {
        if bytes.len() < Self::FRAME_SIZE {
            return Err(DecodeError::ShortFrame {
                expected: Self::FRAME_SIZE,
                actual: bytes.len(),
            });
        }

        let mut channels = [0u16; N];
        for (channel, pair) in channels.iter_mut().zip(bytes.chunks_exact(2)) {
            *channel = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(Sample::new(ObservationKind::Position, channels, timestamp))
    }

    /// Encodes channel readings the way the device firmware frames them.
    pub fn encode(channels: &[u16; N]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::FRAME_SIZE);
        for channel in channels {
            bytes.extend_from_slice(&channel.to_le_bytes());
        }
        bytes
    }
}
