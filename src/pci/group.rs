// Resource grouping for Exliar VFIO
//
// Joins scanned vfio-pci devices against the configured resources. Hex ids
// from sysfs and from the config may differ in letter case, so matching
// ignores case. Rules run in config order and a device may match several.

use log::info;

use crate::config::VfioConfig;
use crate::pci::{VfioDevice, VfioGroup};

/// True if the device falls under the rule's vendor and device-id set
pub fn matches_rule(device: &VfioDevice, rule: &VfioConfig) -> bool {
    device.vendor_id.eq_ignore_ascii_case(&rule.vendor)
        && rule.device.iter().any(|id| id.eq_ignore_ascii_case(&device.device_id))
}

/// Builds one group per rule that matched at least one device.
/// Rules without matches produce nothing.
pub fn group_devices(devices: &[VfioDevice], configs: &[VfioConfig]) -> Vec<VfioGroup> {
    configs
        .iter()
        .filter_map(|rule| {
            let (iommu_groups, pci_addresses): (Vec<u32>, Vec<String>) = devices
                .iter()
                .filter(|device| matches_rule(device, rule))
                .map(|device| (device.iommu_group, device.pci_name.clone()))
                .unzip();

            if pci_addresses.is_empty() {
                return None;
            }

            let groups: Vec<String> = iommu_groups.iter().map(u32::to_string).collect();
            info!("Creating Resource {}", rule.name);
            info!("IOMMU Groups {}", groups.join(" "));

            Some(VfioGroup { resource_name: rule.name.clone(), iommu_groups, pci_addresses })
        })
        .collect()
}
