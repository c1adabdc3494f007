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

//! Input device transports and discovery.

use std::fmt;

use tether_core::config::{DeviceConfig, DEFAULT_PRODUCT_ID};
use tether_core::device::DeviceError;

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;
pub mod synthetic;

/// USB identifiers a port must carry to be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatch {
    /// Required USB product id.
    pub product_id: u16,
    /// Required USB vendor id, if any.
    pub vendor_id: Option<u16>,
}

impl DeviceMatch {
    /// Matches on product id alone.
    pub fn product(product_id: u16) -> Self {
        Self {
            product_id,
            vendor_id: None,
        }
    }

    /// Whether a port with these USB ids matches.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        product_id == self.product_id && self.vendor_id.map_or(true, |v| v == vendor_id)
    }

    /// The first listing that matches, by port name.
    pub fn select(&self, listings: &[PortListing]) -> Result<String, DeviceError> {
        listings
            .iter()
            .find(|l| l.usb_ids.is_some_and(|(vid, pid)| self.matches(vid, pid)))
            .map(|l| l.name.clone())
            .ok_or_else(|| DeviceError::NotFound {
                criteria: self.to_string(),
            })
    }
}

impl Default for DeviceMatch {
    fn default() -> Self {
        Self::product(DEFAULT_PRODUCT_ID)
    }
}

impl From<&DeviceConfig> for DeviceMatch {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            product_id: config.product_id,
            vendor_id: config.vendor_id,
        }
    }
}

impl fmt::Display for DeviceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(vid) => write!(f, "USB {:04x}:{:04x}", vid, self.product_id),
            None => write!(f, "USB pid {}", self.product_id),
        }
    }
}

/// An enumerated port and, for USB ports, its (vendor, product) ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortListing {
    /// OS path of the port.
    pub name: String,
    /// `(vendor_id, product_id)` for USB ports.
    pub usb_ids: Option<(u16, u16)>,
}
