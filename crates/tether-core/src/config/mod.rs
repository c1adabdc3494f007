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

//! Configuration surface of the control loop.
//!
//! Every field has a default so a partial file (or none at all) is valid.
//! Parsing from TOML or JSON happens at the binary edge; this module only
//! defines the shape and [`ControlConfig::validate`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::CalibrationSettings;
use crate::control::{ChannelMap, CommandMapper};
use crate::input::DEFAULT_FULL_SCALE;
use crate::math::Vec2;

/// USB product id of the reference input device.
pub const DEFAULT_PRODUCT_ID: u16 = 1155;

/// Errors found while validating a configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field holds a value the loop cannot run with.
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid configuration for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// How to find and open the input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// USB product id to match.
    pub product_id: u16,
    /// USB vendor id to match, if any.
    pub vendor_id: Option<u16>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Delay between opening the port and the first read, in milliseconds.
    pub settle_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            product_id: DEFAULT_PRODUCT_ID,
            vendor_id: None,
            baud_rate: 9600,
            settle_ms: 500,
        }
    }
}

/// Headless display parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Refresh rate the display paces itself to.
    pub refresh_hz: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            refresh_hz: 60.0,
        }
    }
}

/// The actuated "tank": a kinematic control body dragging a dynamic box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankConfig {
    /// Starting position.
    pub position: Vec2,
    /// Mass of the dynamic body.
    pub mass: f32,
    /// Width and height of the box.
    pub size: Vec2,
    /// Force ceiling of the pivot (linear friction).
    pub pivot_max_force: f32,
    /// Force ceiling of the gear (angular friction).
    pub gear_max_force: f32,
    /// Angular correction rate ceiling of the gear.
    pub gear_max_bias: f32,
    /// Restitution of the hull's collider.
    pub elasticity: f32,
    /// Friction of the hull's collider.
    pub friction: f32,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            position: Vec2::new(0.1, 0.0),
            mass: 10.0,
            size: Vec2::new(0.15, 0.1),
            pivot_max_force: 10_000.0,
            gear_max_force: 50_000.0,
            gear_max_bias: 1.2,
            elasticity: 0.0,
            friction: 0.7,
        }
    }
}

/// A free body held back by a weak pivot to the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuckConfig {
    /// Starting position.
    pub position: Vec2,
    /// Mass.
    pub mass: f32,
    /// Width and height.
    pub size: Vec2,
    /// Force ceiling of the anchoring pivot.
    pub max_force: f32,
    /// Restitution of the puck's collider.
    pub elasticity: f32,
    /// Friction of the puck's collider.
    pub friction: f32,
}

impl Default for PuckConfig {
    fn default() -> Self {
        Self {
            position: Vec2::new(0.2, 0.2),
            mass: 40.0,
            size: Vec2::new(0.05, 0.08),
            max_force: 11.0,
            elasticity: 0.9,
            friction: 0.1,
        }
    }
}

/// A static boundary segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallConfig {
    /// First endpoint.
    pub start: Vec2,
    /// Second endpoint.
    pub end: Vec2,
    /// Thickness around the segment.
    #[serde(default = "WallConfig::default_radius")]
    pub radius: f32,
    /// Restitution.
    #[serde(default = "WallConfig::default_elasticity")]
    pub elasticity: f32,
    /// Friction.
    #[serde(default)]
    pub friction: f32,
}

impl WallConfig {
    /// An elastic wall from `start` to `end`.
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self {
            start,
            end,
            radius: Self::default_radius(),
            elasticity: Self::default_elasticity(),
            friction: 0.0,
        }
    }

    fn default_radius() -> f32 {
        0.05
    }

    fn default_elasticity() -> f32 {
        0.9
    }
}

/// The four walls of the default arena, spanning ±0.8 by ±0.5.
pub fn default_walls() -> Vec<WallConfig> {
    let (x, y) = (0.8, 0.5);
    vec![
        WallConfig::new(Vec2::new(-x, -y), Vec2::new(-x, y)),
        WallConfig::new(Vec2::new(x, y), Vec2::new(x, -y)),
        WallConfig::new(Vec2::new(-x, -y), Vec2::new(x, -y)),
        WallConfig::new(Vec2::new(-x, y), Vec2::new(x, y)),
    ]
}

/// Bodies placed in the world at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// The actuated body.
    pub tank: TankConfig,
    /// Passive bodies.
    pub pucks: Vec<PuckConfig>,
    /// Static boundaries.
    pub walls: Vec<WallConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            tank: TankConfig::default(),
            pucks: vec![PuckConfig::default()],
            walls: default_walls(),
        }
    }
}

fn is_coefficient(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

impl SceneConfig {
    /// Rejects materials and walls the physics world cannot build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let materials = std::iter::once((self.tank.elasticity, self.tank.friction))
            .chain(self.pucks.iter().map(|p| (p.elasticity, p.friction)))
            .chain(self.walls.iter().map(|w| (w.elasticity, w.friction)));
        for (elasticity, friction) in materials {
            if !is_coefficient(elasticity) || !is_coefficient(friction) {
                return Err(ConfigError::invalid(
                    "scene",
                    format!("elasticity {elasticity} and friction {friction} must be non-negative"),
                ));
            }
        }
        if let Some(wall) = self
            .walls
            .iter()
            .find(|w| !w.start.is_finite() || !w.end.is_finite() || !is_coefficient(w.radius))
        {
            return Err(ConfigError::invalid(
                "scene.walls",
                format!("{:?} to {:?} is not a usable wall", wall.start, wall.end),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration of the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Multiplier from turn-channel difference to angular velocity.
    pub angular_gain: f32,
    /// Multiplier from drive-channel difference to linear speed.
    pub linear_gain: f32,
    /// Physics sub-steps per presented frame.
    pub substeps_per_frame: u32,
    /// Upper bound on one device read, in milliseconds.
    pub device_read_timeout_ms: u64,
    /// Presentation events ignored before calibrating.
    pub calibration_warmup_frames: u32,
    /// Inter-frame gaps averaged during calibration.
    pub calibration_window_frames: u32,
    /// Candidate refresh rates, in Hz.
    pub supported_frame_rates: Vec<f64>,
    /// Raw reading that normalizes to 1.0.
    pub full_scale: f32,
    /// Multiple of the frame period above which a frame is reported late.
    pub latency_threshold: f64,
    /// Channel roles.
    pub channel_map: ChannelMap,
    /// Device discovery.
    pub device: DeviceConfig,
    /// Headless display.
    pub display: DisplayConfig,
    /// Bodies in the world.
    pub scene: SceneConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            angular_gain: 16.0,
            linear_gain: 2.0,
            substeps_per_frame: 4,
            device_read_timeout_ms: 1,
            calibration_warmup_frames: 5,
            calibration_window_frames: 15,
            supported_frame_rates: vec![60.0, 144.0, 240.0],
            full_scale: DEFAULT_FULL_SCALE,
            latency_threshold: 1.33,
            channel_map: ChannelMap::default(),
            device: DeviceConfig::default(),
            display: DisplayConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl ControlConfig {
    /// Rejects configurations the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.substeps_per_frame == 0 {
            return Err(ConfigError::invalid("substeps_per_frame", "must be at least 1"));
        }
        if self.supported_frame_rates.is_empty() {
            return Err(ConfigError::invalid(
                "supported_frame_rates",
                "needs at least one rate",
            ));
        }
        if let Some(bad) = self
            .supported_frame_rates
            .iter()
            .find(|r| !r.is_finite() || **r <= 0.0)
        {
            return Err(ConfigError::invalid(
                "supported_frame_rates",
                format!("{bad} is not a positive rate"),
            ));
        }
        if self.calibration_window_frames == 0 {
            return Err(ConfigError::invalid(
                "calibration_window_frames",
                "must be at least 1",
            ));
        }
        if !self.full_scale.is_finite() || self.full_scale <= 0.0 {
            return Err(ConfigError::invalid("full_scale", "must be positive"));
        }
        if !self.latency_threshold.is_finite() || self.latency_threshold <= 0.0 {
            return Err(ConfigError::invalid("latency_threshold", "must be positive"));
        }
        if !self.angular_gain.is_finite() || !self.linear_gain.is_finite() {
            return Err(ConfigError::invalid("gains", "must be finite"));
        }
        if !self.display.refresh_hz.is_finite() || self.display.refresh_hz <= 0.0 {
            return Err(ConfigError::invalid("display.refresh_hz", "must be positive"));
        }
        self.scene.validate()
    }

    /// Settings for the frame clock.
    pub fn calibration(&self) -> CalibrationSettings {
        CalibrationSettings {
            warmup_frames: self.calibration_warmup_frames,
            window_frames: self.calibration_window_frames,
            candidate_rates: self.supported_frame_rates.clone(),
            latency_threshold: self.latency_threshold,
        }
    }

    /// The command mapper described by the gains and channel map.
    pub fn mapper(&self) -> CommandMapper {
        CommandMapper::new(self.channel_map, self.angular_gain, self.linear_gain)
    }

    /// Bound on one device read.
    pub fn device_read_timeout(&self) -> Duration {
        Duration::from_millis(self.device_read_timeout_ms)
    }

    /// Settle delay after opening the device.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.device.settle_ms)
    }

    /// Frame period used until calibration locks: that of the lowest supported rate.
    pub fn nominal_period(&self) -> f64 {
        let lowest = self
            .supported_frame_rates
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        if lowest.is_finite() && lowest > 0.0 {
            1.0 / lowest
        } else {
            1.0 / 60.0
        }
    }
}
