// PCI device model for Exliar VFIO
//
// Discovery (before binding), post-bind scanning and grouping of vfio-pci
// devices into named resources.

pub mod detection;
pub mod group;
pub mod scan;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// sysfs directory with one entry per PCI device
pub const PCI_DEVICES_PATH: &str = "/sys/bus/pci/devices";

/// domain:bus:device.function, lowercase hex as the kernel prints it
static PCI_ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{4}:[0-9a-f]{2}:[0-9a-f]{2}\.[0-9]$").expect("valid PCI address regex")
});

/// Checks a BDF address such as "0000:c0:00.0"
pub fn is_valid_pci_address(address: &str) -> bool {
    PCI_ADDRESS_REGEX.is_match(address)
}

/// Turns the content of a sysfs `vendor`/`device` file ("0x19e5\n") into "19e5"
pub fn parse_sysfs_id(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let id = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Snapshot of one vfio-pci bound device, taken at scan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfioDevice {
    pub pci_name: String,   // BDF address (e.g., "0000:c0:00.0")
    pub vendor_id: String,  // Vendor ID without 0x (e.g., "19e5")
    pub device_id: String,  // Device ID without 0x (e.g., "d802")
    pub iommu_group: u32,   // IOMMU group, also the /dev/vfio/<group> node
}

impl fmt::Display for VfioDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}:{}] iommu group {}",
            self.pci_name, self.vendor_id, self.device_id, self.iommu_group
        )
    }
}

/// Devices matching one configured resource, in scan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfioGroup {
    pub resource_name: String,
    pub iommu_groups: Vec<u32>,
    pub pci_addresses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pci_address_validation() {
        assert!(is_valid_pci_address("0000:01:00.0"));
        assert!(is_valid_pci_address("0000:c0:1f.7"));

        assert!(!is_valid_pci_address("01:00.0"));
        assert!(!is_valid_pci_address("0000:01:00"));
        assert!(!is_valid_pci_address("0000:C0:00.0"));
        assert!(!is_valid_pci_address("0000:01:00x0"));
        assert!(!is_valid_pci_address("new_id"));
    }

    #[test]
    fn test_parse_sysfs_id() {
        assert_eq!(parse_sysfs_id("0x19e5\n").as_deref(), Some("19e5"));
        assert_eq!(parse_sysfs_id("  0xD802 ").as_deref(), Some("D802"));
        assert_eq!(parse_sysfs_id("10de").as_deref(), Some("10de"));
        assert_eq!(parse_sysfs_id("0x"), None);
        assert_eq!(parse_sysfs_id("\n"), None);
    }
}
