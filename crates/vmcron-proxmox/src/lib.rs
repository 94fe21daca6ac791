//! `vmcron-proxmox`: Proxmox VE REST client implementing
//! [`vmcron_core::ControlPlane`] plus the inventory listing used by sync.

pub mod client;
pub mod types;

pub use client::ProxmoxClient;
pub use types::GuestInfo;
