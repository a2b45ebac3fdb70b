// PCI device discovery for Exliar VFIO
//
// Walks the host PCI inventory in sysfs and finds devices by their
// vendor/device identifier pair.

use std::path::Path;

use log::{debug, info};

use crate::core::host::HostInterface;
use crate::error::{Result, VfioError};
use crate::pci::{parse_sysfs_id, PCI_DEVICES_PATH};

/// Identity of one entry in the PCI inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDevice {
    pub address: String,
    pub vendor_id: String,
    pub device_id: String,
}

/// Lists every PCI device on the host with its identity.
///
/// Only a failure to list the inventory itself is an error; entries whose
/// identity files cannot be read are skipped.
pub fn list_pci_devices(host: &dyn HostInterface) -> Result<Vec<PciDevice>> {
    let inventory = Path::new(PCI_DEVICES_PATH);
    let mut entries = host
        .list_dir(inventory)
        .map_err(|source| VfioError::Enumeration { path: inventory.to_path_buf(), source })?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let devices = entries
        .into_iter()
        .filter_map(|entry| {
            let device_path = inventory.join(&entry.name);
            let vendor_id = read_id(host, &device_path.join("vendor"))?;
            let device_id = read_id(host, &device_path.join("device"))?;
            Some(PciDevice { address: entry.name, vendor_id, device_id })
        })
        .collect();

    Ok(devices)
}

fn read_id(host: &dyn HostInterface, path: &Path) -> Option<String> {
    match host.read_to_string(path) {
        Ok(content) => parse_sysfs_id(&content),
        Err(e) => {
            debug!("Skipping {}: {}", path.display(), e);
            None
        }
    }
}

/// Finds all devices with the given vendor id and device id.
///
/// E.g. on a node with Ascend 910B NPUs, vendor "19e5" and device "d802" give
/// ["0000:01:00.0", "0000:c0:00.0", ...]. Identifiers compare exactly, so
/// they must be lowercase like the kernel prints them.
pub fn find_devices(host: &dyn HostInterface, vendor_id: &str, device_id: &str) -> Result<Vec<String>> {
    Ok(select_devices(&list_pci_devices(host)?, vendor_id, device_id))
}

/// Addresses of the inventory entries with exactly this vendor/device pair
pub fn select_devices(inventory: &[PciDevice], vendor_id: &str, device_id: &str) -> Vec<String> {
    inventory
        .iter()
        .filter(|dev| dev.vendor_id == vendor_id && dev.device_id == device_id)
        .map(|dev| {
            info!("{} {} has device {}", vendor_id, device_id, dev.address);
            dev.address.clone()
        })
        .collect()
}
