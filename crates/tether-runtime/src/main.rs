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

//! `tether`: runs the control loop against a headless paced display.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tether_core::{DeviceSession, MonotonicClock};
use tether_infra::{HeadlessDisplay, RapierPhysicsWorld};
use tether_runtime::{connector, init_logging, load_config};
use tether_sdk::prelude::MetricsRegistry;
use tether_sdk::{build_rig, ControlLoop};

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Drive a simulated body from a streaming input device")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic input device instead of serial hardware
    #[arg(long)]
    synthetic: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let mut connector = connector(&config, cli.synthetic);
    let session: DeviceSession =
        DeviceSession::acquire(connector.as_mut(), config.settle(), MonotonicClock::new())
            .context("could not acquire the input device")?;

    let mut world = RapierPhysicsWorld::new();
    let rig = build_rig(&mut world, &config.scene)?;
    let display = HeadlessDisplay::from_config(&config.display, MonotonicClock::new());
    let registry = MetricsRegistry::new();

    let mut control_loop =
        ControlLoop::with_registry(&config, session, world, display, rig, registry.clone())?;
    if let Some(frames) = cli.frames {
        control_loop = control_loop.with_max_iterations(frames);
    }
    control_loop
        .cancellation_token()
        .cancel_on_ctrl_c()
        .context("could not install the Ctrl-C handler")?;

    let report = control_loop.run()?;
    registry.log_summary();
    match report.frame_period {
        Some(period) => log::info!(
            "Ran {} frames at {:.0} Hz ({} samples applied, {} late)",
            report.iterations,
            1.0 / period,
            report.samples_applied,
            report.late_frames
        ),
        None => log::info!(
            "Ran {} frames before the frame clock calibrated ({} samples applied)",
            report.iterations,
            report.samples_applied
        ),
    }
    Ok(())
}
