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

//! Presentation frame clock with refresh-rate self-calibration.
//!
//! The clock is fed one timestamp per presentation event. After discarding a
//! short warm-up it averages a window of inter-frame gaps, snaps the observed
//! frequency to the nearest supported refresh rate and locks that period for
//! the rest of the session.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Relative distance (fraction of the candidate rate) within which an observed
/// frequency snaps to a candidate.
pub const RATE_TOLERANCE: f64 = 0.10;

/// Parameters of the calibration state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSettings {
    /// Presentation events discarded before measuring.
    pub warmup_frames: u32,
    /// Inter-frame gaps averaged to estimate the refresh rate.
    pub window_frames: u32,
    /// Supported refresh rates, in Hz.
    pub candidate_rates: Vec<f64>,
    /// Multiple of the nominal period above which a frame counts as late.
    pub latency_threshold: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            warmup_frames: 5,
            window_frames: 15,
            candidate_rates: vec![60.0, 144.0, 240.0],
            latency_threshold: 1.33,
        }
    }
}

/// Where the clock is in its calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationState {
    /// Discarding startup jitter.
    Warming {
        /// Events seen so far.
        seen: u32,
    },
    /// Collecting inter-frame gaps.
    Calibrating {
        /// Gaps collected so far.
        collected: u32,
    },
    /// Period fixed for the rest of the session.
    Locked {
        /// The calibrated period in seconds.
        period: f64,
    },
}

/// Errors from querying the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockError {
    /// The period was requested before calibration finished.
    NotCalibrated {
        /// The state at the time of the query.
        state: CalibrationState,
    },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::NotCalibrated { state } => {
                write!(f, "Frame period not calibrated yet (state: {state:?})")
            }
        }
    }
}

impl std::error::Error for ClockError {}

/// Read-only, shareable view of the calibrated frame period.
///
/// Empty until the owning [`FrameClock`] locks; set exactly once afterwards.
#[derive(Debug, Clone, Default)]
pub struct FramePeriodHandle {
    cell: Arc<OnceLock<f64>>,
}

impl FramePeriodHandle {
    /// The calibrated period in seconds, if known.
    pub fn get(&self) -> Option<f64> {
        self.cell.get().copied()
    }

    /// The calibrated refresh rate in Hz, if known.
    pub fn rate_hz(&self) -> Option<f64> {
        self.get().map(|p| 1.0 / p)
    }

    /// Whether calibration has finished.
    pub fn is_calibrated(&self) -> bool {
        self.cell.get().is_some()
    }

    fn publish(&self, period: f64) -> bool {
        self.cell.set(period).is_ok()
    }
}

/// Marks presentation events and calibrates the nominal frame period.
#[derive(Debug)]
pub struct FrameClock {
    settings: CalibrationSettings,
    state: CalibrationState,
    previous: Option<f64>,
    last_delta: f64,
    gap_sum: f64,
    handle: FramePeriodHandle,
}

impl FrameClock {
    /// Creates a clock in the warming state.
    pub fn new(settings: CalibrationSettings) -> Self {
        let state = if settings.warmup_frames == 0 {
            CalibrationState::Calibrating { collected: 0 }
        } else {
            CalibrationState::Warming { seen: 0 }
        };
        Self {
            settings,
            state,
            previous: None,
            last_delta: 0.0,
            gap_sum: 0.0,
            handle: FramePeriodHandle::default(),
        }
    }

    /// Records a presentation event at `now` (seconds) and returns the delta
    /// since the previous event, or `0.0` for the first one.
    pub fn mark(&mut self, now: f64) -> f64 {
        let delta = self.previous.map(|prev| now - prev);
        self.previous = Some(now);
        self.last_delta = delta.unwrap_or(0.0);

        match self.state {
            CalibrationState::Warming { seen } => {
                let seen = seen + 1;
                self.state = if seen >= self.settings.warmup_frames {
                    CalibrationState::Calibrating { collected: 0 }
                } else {
                    CalibrationState::Warming { seen }
                };
            }
            CalibrationState::Calibrating { collected } => {
                if let Some(delta) = delta {
                    self.gap_sum += delta;
                    let collected = collected + 1;
                    if collected >= self.settings.window_frames {
                        let mean = self.gap_sum / collected as f64;
                        self.lock(mean);
                    } else {
                        self.state = CalibrationState::Calibrating { collected };
                    }
                }
            }
            CalibrationState::Locked { .. } => {}
        }

        self.last_delta
    }

    fn lock(&mut self, mean_gap: f64) {
        let observed_hz = if mean_gap > 0.0 { 1.0 / mean_gap } else { 0.0 };
        let rate = select_rate(observed_hz, &self.settings.candidate_rates);
        let period = 1.0 / rate;

        self.state = CalibrationState::Locked { period };
        if !self.handle.publish(period) {
            log::warn!("Frame period was already published; keeping the first value");
        }
        log::info!(
            "Frame clock locked at {:.0} Hz (observed {:.2} Hz, period {:.3} ms)",
            rate,
            observed_hz,
            period * 1000.0
        );
    }

    /// The calibrated period in seconds.
    pub fn period(&self) -> Result<f64, ClockError> {
        match self.state {
            CalibrationState::Locked { period } => Ok(period),
            state => Err(ClockError::NotCalibrated { state }),
        }
    }

    /// The calibrated period, or the fallback period while calibrating.
    pub fn nominal_period(&self) -> f64 {
        self.period().unwrap_or_else(|_| self.fallback_period())
    }

    /// Period of the lowest supported rate.
    pub fn fallback_period(&self) -> f64 {
        1.0 / lowest_rate(&self.settings.candidate_rates)
    }

    /// Whether `delta` exceeds the latency threshold relative to the nominal period.
    pub fn is_late(&self, delta: f64) -> bool {
        delta > self.settings.latency_threshold * self.nominal_period()
    }

    /// Current calibration state.
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Whether calibration has finished.
    pub fn is_locked(&self) -> bool {
        matches!(self.state, CalibrationState::Locked { .. })
    }

    /// Delta returned by the most recent [`FrameClock::mark`].
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// A shareable read-only handle to the calibrated period.
    pub fn period_handle(&self) -> FramePeriodHandle {
        self.handle.clone()
    }

    /// The settings this clock was built with.
    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(CalibrationSettings::default())
    }
}

fn lowest_rate(candidates: &[f64]) -> f64 {
    candidates
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.min(r))))
        .unwrap_or(60.0)
}

/// Picks the candidate nearest to `observed_hz`, falling back to the lowest
/// candidate when the nearest is outside [`RATE_TOLERANCE`].
pub fn select_rate(observed_hz: f64, candidates: &[f64]) -> f64 {
    let nearest = candidates
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .min_by(|a, b| (a - observed_hz).abs().total_cmp(&(b - observed_hz).abs()));

    match nearest {
        Some(rate) if (rate - observed_hz).abs() <= rate * RATE_TOLERANCE => rate,
        _ => {
            let fallback = lowest_rate(candidates);
            log::warn!(
                "Observed refresh rate {:.2} Hz matches no supported rate, falling back to {:.0} Hz",
                observed_hz,
                fallback
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn feed(clock: &mut FrameClock, rate: f64, frames: usize, start: f64) -> f64 {
        let mut t = start;
        for _ in 0..frames {
            clock.mark(t);
            t += 1.0 / rate;
        }
        t
    }

    #[test]
    fn first_mark_returns_zero() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.mark(10.0), 0.0);
        assert_relative_eq!(clock.mark(10.5), 0.5);
        assert_relative_eq!(clock.last_delta(), 0.5);
    }

    #[test]
    fn calibrates_to_144_hz() {
        let mut clock = FrameClock::default();
        let handle = clock.period_handle();

        // Jittery startup that must be ignored.
        for t in [0.0, 0.1, 0.13, 0.5, 0.51] {
            clock.mark(t);
        }
        assert!(matches!(clock.state(), CalibrationState::Calibrating { .. }));
        assert!(matches!(
            clock.period(),
            Err(ClockError::NotCalibrated { .. })
        ));
        assert!(handle.get().is_none());

        let mut t = 0.51;
        for i in 0..15 {
            // Slight alternating jitter around 1/144 s.
            let jitter = if i % 2 == 0 { 0.0002 } else { -0.0002 };
            t += 1.0 / 144.0 + jitter;
            clock.mark(t);
        }

        assert!(clock.is_locked());
        assert_relative_eq!(clock.period().unwrap(), 1.0 / 144.0, epsilon = 1e-12);
        assert_relative_eq!(handle.get().unwrap(), 1.0 / 144.0, epsilon = 1e-12);
        assert_relative_eq!(handle.rate_hz().unwrap(), 144.0, epsilon = 1e-9);
    }

    #[test]
    fn period_never_changes_once_locked() {
        let mut clock = FrameClock::default();
        let t = feed(&mut clock, 60.0, 21, 0.0);
        let locked = clock.period().unwrap();
        assert_relative_eq!(locked, 1.0 / 60.0, epsilon = 1e-12);

        feed(&mut clock, 240.0, 100, t);
        assert_eq!(clock.period().unwrap(), locked);
        assert_eq!(clock.period_handle().get(), Some(locked));
    }

    #[test]
    fn unsupported_rate_falls_back_to_lowest() {
        let mut clock = FrameClock::default();
        feed(&mut clock, 100.0, 21, 0.0);
        assert_relative_eq!(clock.period().unwrap(), 1.0 / 60.0, epsilon = 1e-12);
    }

    #[test]
    fn select_rate_snaps_to_nearest() {
        let rates = [60.0, 144.0, 240.0];
        assert_eq!(select_rate(59.94, &rates), 60.0);
        assert_eq!(select_rate(143.2, &rates), 144.0);
        assert_eq!(select_rate(238.0, &rates), 240.0);
        assert_eq!(select_rate(0.0, &rates), 60.0);
        assert_eq!(select_rate(120.0, &[]), 60.0);
    }

    #[test]
    fn late_frames_use_fallback_before_lock() {
        let mut clock = FrameClock::default();
        assert!(!clock.is_late(1.0 / 60.0));
        assert!(clock.is_late(0.03));

        feed(&mut clock, 240.0, 21, 0.0);
        assert!(clock.is_late(0.0075));
        assert!(!clock.is_late(1.0 / 240.0));
    }

    #[test]
    fn zero_warmup_starts_calibrating() {
        let settings = CalibrationSettings {
            warmup_frames: 0,
            window_frames: 3,
            ..Default::default()
        };
        let mut clock = FrameClock::new(settings);
        feed(&mut clock, 144.0, 4, 0.0);
        assert!(clock.is_locked());
    }
}
