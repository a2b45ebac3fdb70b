// Post-bind scanning for Exliar VFIO
//
// Re-derives the set of vfio-pci devices from sysfs instead of trusting
// what the binder reported. A device counts only if its symlink, identity
// files, IOMMU group link and /dev/vfio node are all present.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{info, warn};
use regex::Regex;
use thiserror::Error;

use crate::core::host::HostInterface;
use crate::error::{Result, VfioError};
use crate::pci::{is_valid_pci_address, parse_sysfs_id, VfioDevice};

/// Directory of the vfio-pci driver, one symlink per bound device
pub const VFIO_PCI_DRIVER_PATH: &str = "/sys/bus/pci/drivers/vfio-pci";

/// Directory holding the VFIO group character devices
pub const VFIO_DEV_PATH: &str = "/dev/vfio";

static IOMMU_GROUP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)$").expect("valid IOMMU group regex"));

/// Why a single candidate was left out of the scan
#[derive(Error, Debug)]
enum CandidateError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path:?} does not hold a hex id")]
    MalformedId { path: PathBuf },

    #[error("failed to get IOMMU group from {target:?}")]
    NoIommuGroup { target: PathBuf },

    #[error("{path:?} does not exist")]
    MissingVfioNode { path: PathBuf },
}

/// Scans every device currently bound to vfio-pci.
///
/// Entries that fail any check are logged and skipped. Failing to list the
/// driver directory is fatal since no device could be discovered.
pub fn scan_devices(host: &dyn HostInterface) -> Result<Vec<VfioDevice>> {
    let driver_dir = Path::new(VFIO_PCI_DRIVER_PATH);
    let mut entries = host
        .list_dir(driver_dir)
        .map_err(|source| VfioError::Scan { path: driver_dir.to_path_buf(), source })?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let devices = entries
        .into_iter()
        .filter(|entry| entry.is_symlink && is_valid_pci_address(&entry.name))
        .filter_map(|entry| match scan_device(host, &driver_dir.join(&entry.name), &entry.name) {
            Ok(device) => {
                info!("Found PCI device {}", device.pci_name);
                info!("Vendor {}", device.vendor_id);
                info!("Device {}", device.device_id);
                info!("IOMMU Group {}", device.iommu_group);
                Some(device)
            }
            Err(e) => {
                warn!("Skipping {}: {}", entry.name, e);
                None
            }
        })
        .collect();

    Ok(devices)
}

fn scan_device(
    host: &dyn HostInterface,
    device_path: &Path,
    name: &str,
) -> std::result::Result<VfioDevice, CandidateError> {
    let vendor_id = read_id(host, &device_path.join("vendor"))?;
    let device_id = read_id(host, &device_path.join("device"))?;

    let link = device_path.join("iommu_group");
    let target = host
        .read_link(&link)
        .map_err(|source| CandidateError::Read { path: link, source })?;
    let iommu_group = parse_iommu_group(&target)
        .ok_or_else(|| CandidateError::NoIommuGroup { target: target.clone() })?;

    let node = Path::new(VFIO_DEV_PATH).join(iommu_group.to_string());
    if !host.exists(&node) {
        return Err(CandidateError::MissingVfioNode { path: node });
    }

    Ok(VfioDevice { pci_name: name.to_string(), vendor_id, device_id, iommu_group })
}

fn read_id(host: &dyn HostInterface, path: &Path) -> std::result::Result<String, CandidateError> {
    let content = host
        .read_to_string(path)
        .map_err(|source| CandidateError::Read { path: path.to_path_buf(), source })?;
    parse_sysfs_id(&content).ok_or_else(|| CandidateError::MalformedId { path: path.to_path_buf() })
}

/// Extracts the group number from an iommu_group link target,
/// e.g. "../../../../kernel/iommu_groups/7" -> 7
pub fn parse_iommu_group(target: &Path) -> Option<u32> {
    let target = target.to_string_lossy();
    IOMMU_GROUP_REGEX
        .captures(&target)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
