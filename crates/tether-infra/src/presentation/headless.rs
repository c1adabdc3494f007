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

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use tether_core::config::DisplayConfig;
use tether_core::presentation::{Pose, PresentationSink, RenderSlot};
use tether_core::utils::timer::{MonotonicClock, TimeSource};

/// Latest pose per slot, plus the frame counter every sink keeps.
#[derive(Debug, Default, Clone)]
struct Canvas {
    poses: BTreeMap<RenderSlot, Pose>,
    frames: u64,
}

/// Paces flips to a fixed refresh rate on the monotonic clock.
///
/// Vsync boundaries are `origin + k * period`. A flip that arrives after its
/// boundary returns immediately and the schedule restarts from that moment.
#[derive(Debug)]
pub struct HeadlessDisplay {
    width: u32,
    height: u32,
    period: f64,
    clock: MonotonicClock,
    next_vsync: Option<f64>,
    canvas: Canvas,
}

impl HeadlessDisplay {
    /// Creates a display of `width` x `height` refreshing at `refresh_hz`.
    pub fn new(width: u32, height: u32, refresh_hz: f64, clock: MonotonicClock) -> Self {
        Self {
            width,
            height,
            period: 1.0 / refresh_hz.max(1.0),
            clock,
            next_vsync: None,
            canvas: Canvas::default(),
        }
    }

    /// Creates a display from configuration.
    pub fn from_config(config: &DisplayConfig, clock: MonotonicClock) -> Self {
        Self::new(config.width, config.height, config.refresh_hz, clock)
    }

    /// Seconds between vsync boundaries.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// The pose last set for `slot`.
    pub fn pose(&self, slot: RenderSlot) -> Option<Pose> {
        self.canvas.poses.get(&slot).copied()
    }

    /// Number of completed flips.
    pub fn frame_count(&self) -> u64 {
        self.canvas.frames
    }
}

impl PresentationSink for HeadlessDisplay {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_pose(&mut self, slot: RenderSlot, pose: Pose) {
        self.canvas.poses.insert(slot, pose);
    }

    fn flip(&mut self) -> f64 {
        let now = self.clock.now();
        let deadline = self.next_vsync.unwrap_or(now + self.period);
        if deadline > now {
            std::thread::sleep(Duration::from_secs_f64(deadline - now));
        }
        let presented = self.clock.now();
        self.next_vsync = Some(if presented - deadline > self.period {
            presented + self.period
        } else {
            deadline + self.period
        });
        self.canvas.frames += 1;
        presented
    }
}

/// Flips a [`VirtualDisplay`] remembers by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// A display with a simulated clock: every flip advances time by one period
/// without blocking. Individual frames can be delayed to simulate misses.
///
/// The poses of the most recent flips are kept, up to a fixed limit, so long
/// runs stay bounded in memory.
#[derive(Debug, Clone)]
pub struct VirtualDisplay {
    width: u32,
    height: u32,
    period: f64,
    now: f64,
    delays: BTreeMap<u64, f64>,
    canvas: Canvas,
    history: VecDeque<BTreeMap<RenderSlot, Pose>>,
    history_limit: usize,
}

impl VirtualDisplay {
    /// Creates a virtual display refreshing at `refresh_hz`, starting at t = 0.
    pub fn new(width: u32, height: u32, refresh_hz: f64) -> Self {
        Self {
            width,
            height,
            period: 1.0 / refresh_hz,
            now: 0.0,
            delays: BTreeMap::new(),
            canvas: Canvas::default(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Keeps at most `limit` flips of history; 0 records none.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self.history.truncate(limit);
        self
    }

    /// Makes flip number `frame` (zero-based) arrive `extra` seconds late.
    pub fn delay_frame(&mut self, frame: u64, extra: f64) {
        self.delays.insert(frame, extra);
    }

    /// Number of completed flips.
    pub fn frame_count(&self) -> u64 {
        self.canvas.frames
    }

    /// The pose last set for `slot`.
    pub fn pose(&self, slot: RenderSlot) -> Option<Pose> {
        self.canvas.poses.get(&slot).copied()
    }

    /// Poses as they were at each of the most recent flips, oldest first.
    pub fn history(&self) -> &VecDeque<BTreeMap<RenderSlot, Pose>> {
        &self.history
    }
}

impl PresentationSink for VirtualDisplay {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_pose(&mut self, slot: RenderSlot, pose: Pose) {
        self.canvas.poses.insert(slot, pose);
    }

    fn flip(&mut self) -> f64 {
        let extra = self.delays.remove(&self.canvas.frames).unwrap_or(0.0);
        self.now += self.period + extra;
        if self.history_limit > 0 {
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(self.canvas.poses.clone());
        }
        self.canvas.frames += 1;
        self.now
    }
}
