// Host readiness checks for Exliar VFIO
//
// Determines whether the vfio_pci kernel module is loaded and loads it on
// demand. Subprocess failures here are logged and swallowed; only
// `ensure_driver_ready` turns a persistent failure into an error.

use std::path::Path;

use log::{debug, info, warn};

use crate::core::host::HostInterface;
use crate::error::{Result, VfioError};

/// Kernel module name as listed by lsmod and accepted by modprobe
pub const VFIO_PCI_MODULE: &str = "vfio_pci";

/// sysfs directory holding one entry per IOMMU group
pub const IOMMU_GROUPS_PATH: &str = "/sys/kernel/iommu_groups";

/// Checks whether the system has loaded the vfio_pci driver
pub fn is_driver_ready(host: &dyn HostInterface) -> bool {
    let output = match host.run_command("lsmod", &[]) {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to execute lsmod: {}", e);
            return false;
        }
    };

    if !output.success {
        warn!("lsmod failed: {}", output.stderr);
    }

    output.stdout.lines().any(|line| line.starts_with(VFIO_PCI_MODULE))
}

/// Runs modprobe to load the vfio_pci driver. The caller must re-check readiness.
pub fn load_driver(host: &dyn HostInterface) {
    info!("Loading {} kernel module", VFIO_PCI_MODULE);
    match host.run_command("modprobe", &[VFIO_PCI_MODULE]) {
        Ok(output) if output.success => debug!("modprobe {} succeeded", VFIO_PCI_MODULE),
        Ok(output) => warn!("modprobe {} failed: {}", VFIO_PCI_MODULE, output.stderr),
        Err(e) => warn!("Failed to execute modprobe: {}", e),
    }
}

/// Check, load if missing, check again.
///
/// On a dry-run host the module load is only logged, so a missing module is
/// reported with a warning and the caller goes on to show its writes.
pub fn ensure_driver_ready(host: &dyn HostInterface) -> Result<()> {
    if is_driver_ready(host) {
        debug!("{} already loaded", VFIO_PCI_MODULE);
        return Ok(());
    }

    load_driver(host);

    if is_driver_ready(host) {
        info!("{} loaded", VFIO_PCI_MODULE);
        Ok(())
    } else if host.is_dry_run() {
        // modprobe was never run, so lsmod cannot show the module yet
        warn!("[DRY RUN] {} is not loaded; continuing as if modprobe had loaded it", VFIO_PCI_MODULE);
        Ok(())
    } else {
        Err(VfioError::DriverUnavailable)
    }
}

/// Presence check for IOMMU support: at least one IOMMU group exists
pub fn iommu_groups_present(host: &dyn HostInterface) -> bool {
    host.list_dir(Path::new(IOMMU_GROUPS_PATH))
        .map(|groups| !groups.is_empty())
        .unwrap_or(false)
}
