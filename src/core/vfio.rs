// VFIO device binding for Exliar VFIO
//
// Moves a PCI device from its native driver to vfio-pci through the
// kernel's sysfs control files:
//
//   existence check -> iommu check -> unbind -> driver_override -> drivers_probe
//
// Each step is a single write; the first failure aborts the sequence and
// nothing is rolled back. A failure after the unbind step leaves the device
// attached to no driver at all until an operator re-probes it. The returned
// error carries the journal of completed steps so that state is visible.

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::core::host::HostInterface;
use crate::core::state::{BindJournal, BindStep};
use crate::error::{Result, VfioError};
use crate::pci::{is_valid_pci_address, PCI_DEVICES_PATH};

/// Name of the target driver as it appears under /sys/bus/pci/drivers
pub const VFIO_PCI_DRIVER: &str = "vfio-pci";

/// Driver the devices are taken from unless configured otherwise
pub const DEFAULT_NATIVE_DRIVER: &str = "devdrv_device_driver";

pub const PCI_DRIVERS_PATH: &str = "/sys/bus/pci/drivers";
pub const DRIVERS_PROBE_PATH: &str = "/sys/bus/pci/drivers_probe";
pub const VFIO_NEW_ID_PATH: &str = "/sys/bus/pci/drivers/vfio-pci/new_id";

/// Executes the rebind sequence against a host
pub struct VfioManager<'a> {
    host: &'a dyn HostInterface,
    native_driver: Option<String>,
}

impl<'a> VfioManager<'a> {
    /// Creates a manager that unbinds from `native_driver`, or from whatever
    /// driver the device currently uses when `None`
    pub fn new(host: &'a dyn HostInterface, native_driver: Option<String>) -> Self {
        Self { host, native_driver }
    }

    fn device_path(address: &str) -> PathBuf {
        PathBuf::from(PCI_DEVICES_PATH).join(address)
    }

    /// Driver the device is currently attached to, from its `driver` symlink
    pub fn current_driver(&self, address: &str) -> Option<String> {
        self.host
            .read_link(&Self::device_path(address).join("driver"))
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().to_string()))
    }

    /// True if the device is already attached to vfio-pci
    pub fn is_vfio_bound(&self, address: &str) -> bool {
        self.current_driver(address).is_some_and(|d| d == VFIO_PCI_DRIVER)
    }

    /// Binds the device to the vfio-pci driver.
    ///
    /// Steps, strictly in order, first failure wins:
    ///  1. check that the device exists
    ///  2. check that the system supports iommu for it
    ///  3. unbind the device from its native driver
    ///  4. override the driver to vfio-pci
    ///  5. trigger a driver probe
    pub fn bind_device(&self, address: &str) -> Result<BindJournal> {
        if !is_valid_pci_address(address) {
            return Err(VfioError::InvalidAddress(address.to_string()));
        }

        info!("Binding device {} to {}...", address, VFIO_PCI_DRIVER);
        let mut journal = BindJournal::new(address);

        let device_path = Self::device_path(address);
        if !self.host.exists(&device_path) {
            return Err(VfioError::DeviceNotFound { address: address.to_string(), path: device_path });
        }
        journal.record(BindStep::ExistenceCheck, device_path.display().to_string());

        let iommu_path = device_path.join("iommu");
        if !self.host.exists(&iommu_path) {
            return Err(VfioError::IommuUnavailable { address: address.to_string() });
        }
        journal.record(BindStep::IommuCheck, iommu_path.display().to_string());

        let driver = match &self.native_driver {
            Some(driver) => driver.clone(),
            None => self
                .current_driver(address)
                .ok_or_else(|| VfioError::NoDriver { address: address.to_string() })?,
        };

        let unbind_path = PathBuf::from(PCI_DRIVERS_PATH).join(&driver).join("unbind");
        self.write_step(&mut journal, BindStep::Unbind, unbind_path, address, &driver)?;

        let override_path = device_path.join("driver_override");
        self.write_step(&mut journal, BindStep::Override, override_path, VFIO_PCI_DRIVER, VFIO_PCI_DRIVER)?;

        self.write_step(&mut journal, BindStep::Probe, PathBuf::from(DRIVERS_PROBE_PATH), address, "")?;

        info!("Device {} bound to {}", address, VFIO_PCI_DRIVER);
        Ok(journal)
    }

    fn write_step(
        &self,
        journal: &mut BindJournal,
        step: BindStep,
        path: PathBuf,
        value: &str,
        detail: &str,
    ) -> Result<()> {
        debug!("  {}: writing {:?} to {}", step, value, path.display());
        match self.host.write_file(&path, value) {
            Ok(()) => {
                journal.record(step, detail);
                Ok(())
            }
            Err(source) => {
                if journal.left_unbound() {
                    warn!(
                        "Device {} was unbound but {} failed; it is now attached to no driver",
                        journal.address, step
                    );
                }
                Err(VfioError::BindStep {
                    step,
                    address: journal.address.clone(),
                    path,
                    source,
                    journal: journal.clone(),
                })
            }
        }
    }

    /// Registers a vendor/device id pair with vfio-pci's dynamic id table, so
    /// every device with that pair binds to vfio-pci from now on
    pub fn add_device_id(&self, vendor_id: u16, device_id: u16) -> Result<()> {
        let id = format!("{:x} {:x}", vendor_id, device_id);
        let path = PathBuf::from(VFIO_NEW_ID_PATH);
        debug!("Registering id {:?} with {}", id, VFIO_PCI_DRIVER);
        self.host
            .write_file(&path, &id)
            .map_err(|source| VfioError::NewId { id, path, source })
    }
}
