//! `vmcron-core`: domain types, configuration and collaborator traits shared
//! by the scheduler engine, the Proxmox client and the daemon.

pub mod config;
pub mod control;
pub mod error;
pub mod types;

pub use control::{ControlError, ControlPlane, TaskStatus};
pub use error::{Result, VmcronError};
