// Exliar VFIO resource grouping
//
// Rebinds PCI devices from their native driver to vfio-pci, re-scans sysfs
// for the devices vfio-pci now owns, and groups them into named resources.

// Host access, driver readiness and the bind sequence
pub mod core;

// PCI discovery, post-bind scanning and grouping
pub mod pci;

// Resource configuration
pub mod config;

// Error types
pub mod error;

// Terminal reports
pub mod ui;

// Utility functions
pub mod utils;

pub use config::{PassthroughConfig, VfioConfig};
pub use crate::core::host::{DryRunHost, HostInterface, SysfsHost};
pub use error::{Result, VfioError};
pub use pci::{VfioDevice, VfioGroup};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
