//! Scriptable host probe for deterministic tests

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

use crate::error::ProbeError;
use crate::integrations::network::NetworkInterface;
use crate::integrations::system::{ByteCounters, HostProbe, VmStatistics, VolumeCapacity};

#[derive(Default)]
pub struct FakeProbe {
    pub total_memory: u64,
    pub vm: Option<VmStatistics>,
    pub interfaces: Vec<NetworkInterface>,
    pub counters: Mutex<HashMap<String, ByteCounters>>,
    pub volume: Option<VolumeCapacity>,
}

impl FakeProbe {
    pub fn set_counters(&self, selector: &str, rx_bytes: u64, tx_bytes: u64) {
        self.counters
            .lock()
            .insert(selector.to_string(), ByteCounters { rx_bytes, tx_bytes });
    }
}

impl HostProbe for FakeProbe {
    fn total_memory(&self) -> u64 {
        self.total_memory
    }

    fn vm_statistics(&self) -> Result<VmStatistics, ProbeError> {
        self.vm.ok_or(ProbeError::Unsupported("vm statistics"))
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, ProbeError> {
        Ok(self.interfaces.clone())
    }

    fn interface_byte_counters(&self, selector: &str) -> Result<ByteCounters, ProbeError> {
        self.counters
            .lock()
            .get(selector)
            .copied()
            .ok_or_else(|| ProbeError::InterfaceNotFound(selector.to_string()))
    }

    fn volume_capacity(&self, path: &Path) -> Result<VolumeCapacity, ProbeError> {
        self.volume
            .ok_or_else(|| ProbeError::VolumeNotFound(path.display().to_string()))
    }
}
