use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info};

/// A PowerView hub announced on the local network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredHub {
    pub identifier: String,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub server: String,
    pub properties: HashMap<String, String>,
}

impl DiscoveredHub {
    /// Build from a resolved mDNS service; hubs without an IPv4 address are skipped
    pub fn from_resolved(
        fullname: &str,
        service_type: &str,
        addresses: impl IntoIterator<Item = IpAddr>,
        port: u16,
        server: &str,
        properties: HashMap<String, String>,
    ) -> Option<Self> {
        let address = addresses.into_iter().find(IpAddr::is_ipv4)?;
        let name = fullname
            .strip_suffix(service_type)
            .map(|n| n.trim_end_matches('.'))
            .unwrap_or(fullname)
            .to_string();

        Some(Self {
            identifier: name.clone(),
            name,
            address,
            port,
            server: server.to_string(),
            properties,
        })
    }
}

/// Collapse hubs announced on several service types
pub fn dedup_by_address(hubs: Vec<DiscoveredHub>) -> Vec<DiscoveredHub> {
    let mut unique: Vec<DiscoveredHub> = Vec::with_capacity(hubs.len());
    for hub in hubs {
        if unique.iter().all(|h| h.address != hub.address) {
            unique.push(hub);
        }
    }
    unique
}

#[async_trait]
pub trait HubDiscovery: Send + Sync {
    async fn discover(&self) -> Vec<DiscoveredHub>;
}

/// Discovery disabled, setup falls back to manual entry
pub struct NoDiscovery;

#[async_trait]
impl HubDiscovery for NoDiscovery {
    async fn discover(&self) -> Vec<DiscoveredHub> {
        info!("mDNS discovery not enabled (requires 'discovery' feature)");
        Vec::new()
    }
}

/// Fixed result set, used when the caller already knows the hubs
pub struct StaticDiscovery(pub Vec<DiscoveredHub>);

#[async_trait]
impl HubDiscovery for StaticDiscovery {
    async fn discover(&self) -> Vec<DiscoveredHub> {
        debug!(count = self.0.len(), "returning static hub list");
        self.0.clone()
    }
}

#[cfg(feature = "discovery")]
pub mod mdns {
    use super::*;
    use anyhow::{anyhow, Result};
    use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
    use std::time::Duration;
    use tokio::time::{timeout_at, Instant};
    use tracing::warn;

    pub const INTEGRATION_SERVICE: &str = "_uc-integration._tcp.local.";

    /// Browses PowerView service types for a fixed time window
    pub struct MdnsHubDiscovery {
        service_types: Vec<String>,
        timeout: Duration,
    }

    impl MdnsHubDiscovery {
        pub fn new(service_types: Vec<String>, timeout: Duration) -> Self {
            Self {
                service_types,
                timeout,
            }
        }

        async fn browse(
            &self,
            daemon: &ServiceDaemon,
            service_type: &str,
        ) -> Result<Vec<DiscoveredHub>> {
            let receiver = daemon
                .browse(service_type)
                .map_err(|e| anyhow!("Failed to browse {}: {}", service_type, e))?;
            let deadline = Instant::now() + self.timeout;
            let mut found = Vec::new();

            while let Ok(Ok(event)) = timeout_at(deadline, receiver.recv_async()).await {
                if let ServiceEvent::ServiceResolved(info) = event {
                    debug!(service = info.get_fullname(), "mDNS service resolved");
                    let properties: HashMap<String, String> = info
                        .get_properties()
                        .iter()
                        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
                        .collect();
                    let hub = DiscoveredHub::from_resolved(
                        info.get_fullname(),
                        service_type,
                        info.get_addresses().iter().map(|addr| IpAddr::from(*addr)),
                        info.get_port(),
                        info.get_hostname(),
                        properties,
                    );
                    match hub {
                        Some(hub) => found.push(hub),
                        None => debug!(
                            service = info.get_fullname(),
                            "skipping hub without IPv4 address"
                        ),
                    }
                }
            }

            if let Err(e) = daemon.stop_browse(service_type) {
                debug!(service_type, error = %e, "stop_browse failed");
            }
            Ok(found)
        }
    }

    #[async_trait]
    impl HubDiscovery for MdnsHubDiscovery {
        async fn discover(&self) -> Vec<DiscoveredHub> {
            let daemon = match ServiceDaemon::new() {
                Ok(daemon) => daemon,
                Err(e) => {
                    warn!(error = %e, "Failed to create mDNS daemon");
                    return Vec::new();
                }
            };

            let mut hubs = Vec::new();
            for service_type in &self.service_types {
                match self.browse(&daemon, service_type).await {
                    Ok(found) => hubs.extend(found),
                    Err(e) => warn!(error = %e, "mDNS browse failed"),
                }
            }
            let _ = daemon.shutdown();

            let hubs = dedup_by_address(hubs);
            info!(count = hubs.len(), "PowerView hub discovery finished");
            hubs
        }
    }

    /// Publishes the driver so the remote can find it
    pub struct DriverAdvertiser {
        daemon: ServiceDaemon,
        fullname: String,
    }

    impl DriverAdvertiser {
        /// Publish on `ip`, or on all interface addresses when `ip` is unspecified
        pub fn register(
            driver_id: &str,
            name: &str,
            version: &str,
            developer: &str,
            ip: IpAddr,
            port: u16,
        ) -> Result<Self> {
            let daemon = ServiceDaemon::new()
                .map_err(|e| anyhow!("Failed to create mDNS daemon: {}", e))?;
            let host = format!("{driver_id}.local.");
            let properties = [("name", name), ("ver", version), ("developer", developer)];
            let addr = if ip.is_unspecified() {
                String::new()
            } else {
                ip.to_string()
            };
            let mut service = ServiceInfo::new(
                INTEGRATION_SERVICE,
                driver_id,
                &host,
                addr.as_str(),
                port,
                &properties[..],
            )
            .map_err(|e| anyhow!("Invalid mDNS service info: {}", e))?;
            if ip.is_unspecified() {
                service = service.enable_addr_auto();
            }
            let fullname = service.get_fullname().to_string();
            daemon
                .register(service)
                .map_err(|e| anyhow!("Failed to publish {}: {}", fullname, e))?;
            info!(service = %fullname, port, "published driver via mDNS");
            Ok(Self { daemon, fullname })
        }
    }

    impl Drop for DriverAdvertiser {
        fn drop(&mut self) {
            let _ = self.daemon.unregister(&self.fullname);
            let _ = self.daemon.shutdown();
        }
    }
}
