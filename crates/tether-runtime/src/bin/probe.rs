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

//! `tether-probe`: prints raw and normalized device samples.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tether_core::{DeviceSession, MonotonicClock, Stopwatch};
use tether_runtime::{connector, init_logging, load_config, read_duration};

#[derive(Parser, Debug)]
#[command(name = "tether-probe", version, about = "Print samples from the input device")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic input device instead of serial hardware
    #[arg(long)]
    synthetic: bool,

    /// How long to read for
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// List serial ports and exit
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.list {
        for port in tether_infra::device::serial::list_ports()? {
            match port.usb_ids {
                Some((vid, pid)) => println!("{}  usb {:04x}:{:04x}", port.name, vid, pid),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let limit = read_duration(cli.seconds)?;
    let config = load_config(cli.config.as_deref())?;
    let mut connector = connector(&config, cli.synthetic);
    let mut session: DeviceSession =
        DeviceSession::acquire(connector.as_mut(), config.settle(), MonotonicClock::new())
            .context("could not acquire the input device")?;

    let stopwatch = Stopwatch::new();
    let timeout = Duration::from_millis(100);
    while stopwatch.elapsed().is_some_and(|e| e < limit) {
        if let Some(sample) = session.read(timeout)? {
            let normalized = sample.normalize(config.full_scale);
            println!(
                "{:>10.4}  {:?}  {:.3?}",
                sample.timestamp(),
                sample.channels(),
                normalized.values()
            );
        }
    }

    let stats = session.stats();
    session.release();
    println!(
        "{} samples, {} discarded, {} timeouts",
        stats.frames_decoded, stats.discarded_frames, stats.timeouts
    );
    Ok(())
}
