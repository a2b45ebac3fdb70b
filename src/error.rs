// Error types for the VFIO rebind and grouping pipeline
//
// Every low-level failure is wrapped with the pipeline stage it came from
// before it reaches the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::state::{BindJournal, BindStep};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, VfioError>;

/// Errors raised while preparing, binding, scanning or grouping devices
#[derive(Error, Debug)]
pub enum VfioError {
    // Host capability errors
    #[error("Device is not exist: {address} ({path:?} not found)")]
    DeviceNotFound { address: String, path: PathBuf },

    #[error(
        "IOMMU is not available for device {address}. Check your hardware or linux cmdline \
         parameters. Use intel_iommu=on or iommu=pt iommu=1"
    )]
    IommuUnavailable { address: String },

    #[error(
        "vfio_pci kernel module is not loaded and could not be loaded. \
         Install the vfio modules for your kernel and run: modprobe vfio_pci"
    )]
    DriverUnavailable,

    #[error("Device {address} is not bound to any driver, nothing to unbind")]
    NoDriver { address: String },

    // Bind sequence errors
    #[error("{step} error for device {address} writing {path:?}: {source}")]
    BindStep {
        step: BindStep,
        address: String,
        path: PathBuf,
        #[source]
        source: io::Error,
        journal: BindJournal,
    },

    #[error("Failed to register id {id:?} with vfio-pci at {path:?}: {source}")]
    NewId {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Discovery errors
    #[error("Failed to read PCI device inventory at {path:?}: {source}")]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to list vfio-pci bound devices at {path:?}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid PCI address: {0} (expected: 0000:01:00.0)")]
    InvalidAddress(String),

    // Configuration errors
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to encode report: {0}")]
    Encode(#[source] serde_json::Error),
}

impl VfioError {
    /// Completed bind steps when the failure happened mid-sequence
    pub fn journal(&self) -> Option<&BindJournal> {
        match self {
            VfioError::BindStep { journal, .. } => Some(journal),
            _ => None,
        }
    }

    /// True for errors that need operator action on the host before a retry
    pub fn is_host_capability(&self) -> bool {
        matches!(
            self,
            VfioError::IommuUnavailable { .. } | VfioError::DriverUnavailable
        )
    }
}
