//! Supported adapters and device selection.

use crate::error::BuildError;
use serde::Deserialize;
use std::fmt;

/// One buildable adapter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    /// PCI device id in decimal, e.g. "4099".
    pub id: String,
    /// Build target name, e.g. "ConnectX3" (built as `bin/ConnectX3.mrom`).
    pub name: String,
    /// Member of the flash configuration family (`-DFLASH_CONFIGURATION`).
    #[serde(default)]
    pub flash_configuration: bool,
}

impl Device {
    pub fn new(id: &str, name: &str, flash_configuration: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            flash_configuration,
        }
    }

    /// Numeric PCI device id as embedded in the ROM header.
    pub fn pci_id(&self) -> Result<u16, BuildError> {
        self.id
            .parse()
            .map_err(|_| BuildError::InvalidOptions(format!("device id '{}' is not a 16-bit number", self.id)))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID: {} - Device: {}", self.id, self.name)
    }
}

/// Ordered, immutable table of known devices.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::new(vec![
            Device::new("4099", "ConnectX3", true),
            Device::new("4103", "ConnectX3-Pro", true),
            Device::new("4113", "ConnectIB", false),
            Device::new("4115", "ConnectX4", false),
        ])
    }
}

impl DeviceCatalog {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn find(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Human-readable list used when the user asks for an unknown device.
    pub fn listing(&self) -> String {
        let mut out = String::from("Valid devices:\n");
        for dev in &self.devices {
            out.push_str(&dev.to_string());
            out.push('\n');
        }
        out
    }

    /// Every device id must be a 16-bit number; duplicate ids are rejected.
    pub fn validate(&self) -> Result<(), BuildError> {
        for (i, dev) in self.devices.iter().enumerate() {
            dev.pci_id()?;
            if self.devices[..i].iter().any(|d| d.id == dev.id) {
                return Err(BuildError::InvalidOptions(format!(
                    "device id {} listed twice in the catalog",
                    dev.id
                )));
            }
        }
        Ok(())
    }
}

/// What `--device` asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelection {
    All,
    One(String),
}

impl DeviceSelection {
    pub fn parse(arg: &str) -> Self {
        if arg == "ALL" {
            Self::All
        } else {
            Self::One(arg.to_string())
        }
    }

    /// Resolve against the catalog, in catalog order.
    pub fn resolve(&self, catalog: &DeviceCatalog) -> Result<Vec<Device>, BuildError> {
        match self {
            Self::All => Ok(catalog.iter().cloned().collect()),
            Self::One(id) => catalog.find(id).cloned().map(|d| vec![d]).ok_or_else(|| {
                BuildError::InvalidOptions(format!(
                    "device {id} not found. Please enter a valid device ID or \"ALL\"\n{}",
                    catalog.listing()
                ))
            }),
        }
    }
}
