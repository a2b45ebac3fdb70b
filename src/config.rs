// Configuration for Exliar VFIO
//
// The resource mapping (name -> vendor -> device ids) and the binding
// options are read from a JSON file:
//
//   {
//     "native_driver": "devdrv_device_driver",
//     "register_new_id": false,
//     "resources": [ { "name": "npu", "vendor": "19e5", "device": ["d802"] } ]
//   }
//
// A bare array of resources is accepted as well.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::vfio::DEFAULT_NATIVE_DRIVER;
use crate::error::{Result, VfioError};

/// One configured resource rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfioConfig {
    pub name: String,
    pub vendor: String,
    pub device: Vec<String>,
}

impl VfioConfig {
    /// Vendor id as a number, for new_id registration
    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.vendor)
    }

    /// Device ids as numbers, for new_id registration
    pub fn device_ids(&self) -> Result<Vec<u16>> {
        self.device.iter().map(|id| parse_hex_id(id)).collect()
    }
}

fn default_native_driver() -> Option<String> {
    Some(DEFAULT_NATIVE_DRIVER.to_string())
}

/// Full passthrough configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughConfig {
    /// Driver devices are unbound from; `null` means use the device's current driver
    #[serde(default = "default_native_driver")]
    pub native_driver: Option<String>,

    /// Also register every vendor/device pair with vfio-pci's new_id
    #[serde(default)]
    pub register_new_id: bool,

    pub resources: Vec<VfioConfig>,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self { native_driver: default_native_driver(), register_new_id: false, resources: Vec::new() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Full(PassthroughConfig),
    Resources(Vec<VfioConfig>),
}

impl PassthroughConfig {
    /// Parses and validates a JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        let config = match serde_json::from_str(content)? {
            ConfigFile::Full(config) => config,
            ConfigFile::Resources(resources) => Self { resources, ..Self::default() },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|source| VfioError::ConfigRead { path: path.to_path_buf(), source })?;
        let config = Self::from_json(&content)?;
        log::info!("Loaded {} resource(s) from {}", config.resources.len(), path.display());
        Ok(config)
    }

    /// Checks names and hex ids
    pub fn validate(&self) -> Result<()> {
        if let Some(driver) = &self.native_driver {
            if driver.is_empty() || driver.contains('/') {
                return invalid(format!("native_driver {:?} is not a driver name", driver));
            }
        }

        let mut names = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                return invalid("resource name must not be empty".to_string());
            }
            if !names.insert(resource.name.as_str()) {
                return invalid(format!("duplicate resource name {:?}", resource.name));
            }
            if !is_hex_id(&resource.vendor) {
                return invalid(format!("resource {:?}: vendor {:?} is not a hex id", resource.name, resource.vendor));
            }
            if resource.device.is_empty() {
                return invalid(format!("resource {:?}: no device ids", resource.name));
            }
            if let Some(bad) = resource.device.iter().find(|id| !is_hex_id(id)) {
                return invalid(format!("resource {:?}: device {:?} is not a hex id", resource.name, bad));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> Result<()> {
    Err(VfioError::InvalidConfig { reason })
}

/// 1 to 4 hex digits, no 0x prefix
fn is_hex_id(id: &str) -> bool {
    (1..=4).contains(&id.len()) && id.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_hex_id(id: &str) -> Result<u16> {
    u16::from_str_radix(id, 16)
        .map_err(|e| VfioError::InvalidConfig { reason: format!("{:?} is not a hex id: {}", id, e) })
}
