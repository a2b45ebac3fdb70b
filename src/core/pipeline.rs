// End-to-end passthrough pipeline for Exliar VFIO
//
//   find devices -> bind each to vfio-pci -> rescan sysfs -> group by config
//
// Binding and discovery are independent: `discover` never looks
// at what `bind_configured_devices` reported and re-reads sysfs instead.

use std::collections::HashSet;

use log::{error, info, warn};
use serde::Serialize;

use crate::config::{PassthroughConfig, VfioConfig};
use crate::core::host::HostInterface;
use crate::core::state::BindJournal;
use crate::core::system::{ensure_driver_ready, iommu_groups_present};
use crate::core::vfio::VfioManager;
use crate::error::Result;
use crate::pci::detection::{list_pci_devices, select_devices};
use crate::pci::group::group_devices;
use crate::pci::scan::scan_devices;
use crate::pci::VfioGroup;

/// What happened to one device during binding
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindStatus {
    Bound { journal: BindJournal },
    AlreadyBound,
    Failed { error: String, journal: Option<BindJournal> },
}

#[derive(Debug, Clone, Serialize)]
pub struct BindOutcome {
    pub resource: String,
    pub address: String,
    #[serde(flatten)]
    pub status: BindStatus,
}

/// Result of a bind pass over all configured resources
#[derive(Debug, Clone, Default, Serialize)]
pub struct BindReport {
    pub outcomes: Vec<BindOutcome>,
    /// "vendor device" pairs written to new_id
    pub registered_ids: Vec<String>,
}

impl BindReport {
    pub fn failures(&self) -> impl Iterator<Item = &BindOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.status, BindStatus::Failed { .. }))
    }

    pub fn bound_count(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o.status, BindStatus::Bound { .. })).count()
    }
}

/// Binds every device matching a configured resource to vfio-pci.
///
/// Readiness of the driver is a precondition and its absence is an error.
/// A failing device is recorded and the pass moves on to the next one;
/// only a failure to read the PCI inventory aborts the pass. The inventory
/// is read once per pass, and configured ids are lowercased to match it.
pub fn bind_configured_devices(host: &dyn HostInterface, config: &PassthroughConfig) -> Result<BindReport> {
    ensure_driver_ready(host)?;

    if !iommu_groups_present(host) {
        warn!("No IOMMU groups found; binding is likely to fail. Is intel_iommu=on or amd_iommu=on set?");
    }

    let inventory = list_pci_devices(host)?;
    let manager = VfioManager::new(host, config.native_driver.clone());
    let mut report = BindReport::default();
    let mut seen = HashSet::new();

    for resource in &config.resources {
        if config.register_new_id {
            register_ids(&manager, resource, &mut report);
        }

        let vendor_id = resource.vendor.to_ascii_lowercase();
        for device_id in &resource.device {
            for address in select_devices(&inventory, &vendor_id, &device_id.to_ascii_lowercase()) {
                if !seen.insert(address.clone()) {
                    continue;
                }
                let status = bind_one(&manager, &address);
                report.outcomes.push(BindOutcome { resource: resource.name.clone(), address, status });
            }
        }
    }

    info!(
        "Bind pass finished: {} bound, {} failed, {} total",
        report.bound_count(),
        report.failures().count(),
        report.outcomes.len()
    );
    Ok(report)
}

fn bind_one(manager: &VfioManager, address: &str) -> BindStatus {
    if manager.is_vfio_bound(address) {
        info!("Device {} already bound to vfio-pci", address);
        return BindStatus::AlreadyBound;
    }

    match manager.bind_device(address) {
        Ok(journal) => BindStatus::Bound { journal },
        Err(e) => {
            error!("Failed to bind {}: {}", address, e);
            let journal = e.journal().cloned();
            if let Some(journal) = journal.as_ref().filter(|j| j.left_unbound()) {
                error!("{} is left without a driver ({})", address, journal.summary());
            }
            BindStatus::Failed { error: e.to_string(), journal }
        }
    }
}

fn register_ids(manager: &VfioManager, resource: &VfioConfig, report: &mut BindReport) {
    let ids = resource
        .vendor_id()
        .and_then(|vendor| resource.device_ids().map(|devices| (vendor, devices)));
    let (vendor, devices) = match ids {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Not registering ids for {}: {}", resource.name, e);
            return;
        }
    };

    for device in devices {
        match manager.add_device_id(vendor, device) {
            Ok(()) => report.registered_ids.push(format!("{:x} {:x}", vendor, device)),
            Err(e) => warn!("{}", e),
        }
    }
}

/// Scans the devices bound to vfio-pci and groups them by resource
pub fn discover(host: &dyn HostInterface, resources: &[VfioConfig]) -> Result<Vec<VfioGroup>> {
    let devices = scan_devices(host)?;
    info!("Found {} device(s) bound to vfio-pci", devices.len());
    Ok(group_devices(&devices, resources))
}
