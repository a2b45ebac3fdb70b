// Core module definitions for Exliar VFIO

pub mod host;
pub mod pipeline;
pub mod state;
pub mod system;
pub mod vfio;
