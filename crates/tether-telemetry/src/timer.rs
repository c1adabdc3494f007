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

//! RAII timers that record a scope's duration when dropped.

use tether_core::utils::timer::Stopwatch;

use crate::registry::{GaugeHandle, HistogramHandle};

enum Target<'a> {
    Histogram(&'a HistogramHandle),
    Gauge(&'a GaugeHandle),
}

/// Times the enclosing scope and records the elapsed milliseconds on drop,
/// including on early return.
pub struct ScopedMetricTimer<'a> {
    stopwatch: Stopwatch,
    target: Target<'a>,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts a timer that records into a histogram.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            stopwatch: Stopwatch::new(),
            target: Target::Histogram(histogram),
        }
    }

    /// Starts a timer that overwrites a gauge.
    pub fn gauge(gauge: &'a GaugeHandle) -> Self {
        Self {
            stopwatch: Stopwatch::new(),
            target: Target::Gauge(gauge),
        }
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        let Some(elapsed_ms) = self.stopwatch.elapsed_ms_f64() else {
            return;
        };
        let result = match self.target {
            Target::Histogram(h) => h.observe(elapsed_ms),
            Target::Gauge(g) => g.set(elapsed_ms),
        };
        if let Err(e) = result {
            log::warn!("[ScopedMetricTimer] Failed to record metric: {}", e);
        }
    }
}
