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

//! Wall-clock helpers: a restartable stopwatch and the monotonic time source
//! used to timestamp samples and presentation events.

use std::time::{Duration, Instant};

/// A source of monotonic time readings, in seconds since an arbitrary origin.
///
/// Every component that timestamps events in one session should read from
/// clones of the same source so that their readings are comparable.
pub trait TimeSource: Send {
    /// Returns the current reading in seconds.
    fn now(&self) -> f64;
}

/// A [`TimeSource`] backed by [`Instant`].
///
/// Clones share the same origin.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the instant this clock measures from.
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    #[inline]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Measures elapsed wall time from the moment it is started.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    start_time: Option<Instant>,
}

impl Stopwatch {
    /// Creates a new, running stopwatch.
    #[inline]
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
        }
    }

    /// Creates a stopwatch that has not been started.
    #[inline]
    pub fn stopped() -> Self {
        Self { start_time: None }
    }

    /// Restarts the measurement from now.
    #[inline]
    pub fn restart(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Returns the elapsed time, or `None` if the stopwatch was never started.
    #[inline]
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|start| start.elapsed())
    }

    /// Returns the elapsed time in microseconds.
    #[inline]
    pub fn elapsed_us(&self) -> Option<u64> {
        self.elapsed().map(|d| d.as_micros() as u64)
    }

    /// Returns the elapsed time in seconds as f64.
    #[inline]
    pub fn elapsed_secs_f64(&self) -> Option<f64> {
        self.elapsed().map(|d| d.as_secs_f64())
    }

    /// Returns the elapsed time in milliseconds as f64.
    #[inline]
    pub fn elapsed_ms_f64(&self) -> Option<f64> {
        self.elapsed_secs_f64().map(|s| s * 1000.0)
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn stopwatch_measures_sleep() {
        let sw = Stopwatch::new();
        thread::sleep(Duration::from_millis(20));
        let elapsed = sw.elapsed_ms_f64().unwrap();
        assert!(elapsed >= 20.0, "elapsed was {elapsed}");
    }

    #[test]
    fn stopped_stopwatch_reports_nothing() {
        let mut sw = Stopwatch::stopped();
        assert!(sw.elapsed().is_none());
        sw.restart();
        assert!(sw.elapsed().is_some());
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let copy = clock;
        let a = clock.now();
        let b = copy.now();
        let c = clock.now();
        assert!(a <= b && b <= c);
    }
}
