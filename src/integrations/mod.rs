//! Operating system integrations

pub mod folder;
pub mod network;
pub mod system;
