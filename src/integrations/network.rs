//! Network interface enumeration

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use std::collections::BTreeMap;

use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
}

/// List every interface once, merging the per-address entries `getifaddrs`
/// reports. The address list is released before returning.
pub fn enumerate() -> Result<Vec<NetworkInterface>, ProbeError> {
    let mut flags: BTreeMap<String, InterfaceFlags> = BTreeMap::new();
    for addr in getifaddrs()? {
        *flags
            .entry(addr.interface_name)
            .or_insert_with(InterfaceFlags::empty) |= addr.flags;
    }

    Ok(flags
        .into_iter()
        .map(|(name, flags)| NetworkInterface {
            name,
            is_up: flags.contains(InterfaceFlags::IFF_UP),
            is_loopback: flags.contains(InterfaceFlags::IFF_LOOPBACK),
        })
        .collect())
}

/// Loopback check using enumerated flags, falling back to the conventional
/// `lo` / `lo0` names for interfaces enumeration did not report.
pub fn is_loopback(name: &str, known: &[NetworkInterface]) -> bool {
    if let Some(iface) = known.iter().find(|i| i.name == name) {
        return iface.is_loopback;
    }
    name.strip_prefix("lo")
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, is_loopback: bool) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            is_up: true,
            is_loopback,
        }
    }

    #[test]
    fn test_loopback_by_flags_then_name() {
        let known = vec![iface("en0", false), iface("lo0", true), iface("lo_custom", true)];

        assert!(!is_loopback("en0", &known));
        assert!(is_loopback("lo0", &known));
        assert!(is_loopback("lo_custom", &known));
        assert!(is_loopback("lo", &[]));
        assert!(is_loopback("lo1", &[]));
        assert!(!is_loopback("low0", &[]));
        assert!(!is_loopback("utun3", &[]));
    }

    #[test]
    fn test_enumeration_reports_each_interface_once() {
        if let Ok(interfaces) = enumerate() {
            let mut names: Vec<_> = interfaces.iter().map(|i| i.name.clone()).collect();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len());
        }
    }
}
