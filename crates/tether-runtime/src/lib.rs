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

//! Shared plumbing for the `tether` and `tether-probe` binaries.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tether_core::{ControlConfig, DeviceConnector};
use tether_infra::{DeviceMatch, SerialConnector, SyntheticConnector};

/// Initializes `env_logger`, defaulting to `info` when `RUST_LOG` is unset.
pub fn init_logging() {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Parses a configuration, choosing the format from the file extension.
pub fn parse_config(text: &str, path: &Path) -> Result<ControlConfig> {
    let config: ControlConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(text).context("invalid TOML configuration")?,
        Some("json") => serde_json::from_str(text).context("invalid JSON configuration")?,
        other => bail!(
            "unsupported configuration format {:?} (expected .toml or .json)",
            other.unwrap_or("")
        ),
    };
    config.validate()?;
    Ok(config)
}

/// Loads the configuration at `path`, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ControlConfig> {
    let Some(path) = path else {
        log::info!("No configuration file given, using defaults");
        return Ok(ControlConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config = parse_config(&text, path)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Converts a `--seconds` style argument, rejecting negative, NaN and
/// out-of-range values.
pub fn read_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid duration of {seconds} seconds"))
}

/// The synthetic generator, or the serial device described by `config`.
pub fn connector(config: &ControlConfig, synthetic: bool) -> Box<dyn DeviceConnector> {
    if synthetic {
        log::info!("Using the synthetic input device");
        Box::new(SyntheticConnector::default())
    } else {
        Box::new(SerialConnector::new(
            DeviceMatch::from(&config.device),
            config.device.baud_rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_overrides_defaults() {
        let text = r#"
            substeps_per_frame = 8
            supported_frame_rates = [60.0, 120.0]

            [device]
            product_id = 22336
            vendor_id = 1155
        "#;
        let config = parse_config(text, Path::new("rig.toml")).unwrap();
        assert_eq!(config.substeps_per_frame, 8);
        assert_eq!(config.supported_frame_rates, vec![60.0, 120.0]);
        assert_eq!(config.device.product_id, 22336);
        assert_eq!(config.device.vendor_id, Some(1155));
        assert_eq!(config.angular_gain, 16.0);
    }

    #[test]
    fn json_is_accepted() {
        let config = parse_config(r#"{"linear_gain": 3.5}"#, Path::new("rig.json")).unwrap();
        assert_eq!(config.linear_gain, 3.5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("substeps_per_frame = 0", Path::new("rig.toml")).unwrap_err();
        assert!(err.to_string().contains("substeps_per_frame"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(parse_config("", Path::new("rig.yaml")).is_err());
    }

    #[test]
    fn read_durations_are_checked() {
        assert_eq!(read_duration(2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(read_duration(0.0).unwrap(), Duration::ZERO);
        for bad in [f64::INFINITY, f64::NAN, -1.0, 1e30] {
            let err = read_duration(bad).unwrap_err();
            assert!(err.to_string().contains("invalid duration"), "{err}");
        }
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "angular_gain = 4.0").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.angular_gain, 4.0);
        assert_eq!(load_config(None).unwrap(), ControlConfig::default());
    }
}
