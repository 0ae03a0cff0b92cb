//! mDNS/DNS-SD announcement of the sync service

use anyhow::{anyhow, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::SyncConfig;

pub const SERVICE_TYPE: &str = "_nexusclip._udp.local.";

/// A registered `_nexusclip._udp` service; unregistered by [`MdnsAnnouncer::shutdown`]
pub struct MdnsAnnouncer {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsAnnouncer {
    /// Announce this device on the sync port
    pub fn register(config: &SyncConfig) -> Result<Self> {
        let addresses = local_addresses()?;
        let address = addresses
            .first()
            .copied()
            .ok_or_else(|| anyhow!("No local IP addresses found"))?;

        let daemon = ServiceDaemon::new()?;
        let hostname = format!("{}.local.", hostname_label(&config.device_name));
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name(&config.device_name),
            &hostname,
            address,
            config.port,
            Some(service_properties(config)),
        )?;

        let fullname = info.get_fullname().to_string();
        daemon.register(info)?;
        tracing::info!("Announced {} via mDNS on {}", fullname, address);

        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Unregister the service and stop the mDNS daemon
    pub fn shutdown(self) -> Result<()> {
        self.daemon.unregister(&self.fullname)?;
        self.daemon.shutdown()?;
        tracing::debug!("Withdrew mDNS announcement {}", self.fullname);
        Ok(())
    }
}

/// Service instance name for a device
pub fn instance_name(device_name: &str) -> String {
    format!("NexusClip-{}", device_name)
}

/// TXT record published with the service
pub fn service_properties(config: &SyncConfig) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    properties.insert("platform".to_string(), config.platform.clone());
    properties.insert("version".to_string(), crate::VERSION.to_string());
    properties
}

/// DNS-safe host label derived from a free-form device name
fn hostname_label(device_name: &str) -> String {
    let label: String = device_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "nexusclip".to_string()
    } else {
        label.to_string()
    }
}

/// Get local IP addresses (excluding loopback)
fn local_addresses() -> Result<Vec<IpAddr>> {
    let addresses = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .collect();
    Ok(addresses)
}
