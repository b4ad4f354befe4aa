use std::collections::BTreeSet;

use kproxy_api::Protocol;
use tracing::debug;

use crate::service_port::NamespacedName;
use crate::tracker::{PortMap, ServiceChangeTracker};

/// Side effects of applying pending changes to the snapshot.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Healthcheck node port per service, for every applied port carrying a
    /// non-zero value.
    pub hc_service_node_ports: ahash::HashMap<NamespacedName, u16>,
    /// Cluster IPs that were forwarded as UDP before this apply and no
    /// longer are. Callers flush connection tracking state for these.
    pub udp_stale_cluster_ips: BTreeSet<String>,
}

/// The applied forwarding state: one port map per service. Mutated only by
/// [`ServicesSnapshot::apply`], which must be serialized with tracker writes
/// by the caller (canonically: apply runs only inside the sync loop, and the
/// producer shares the same lock).
#[derive(Default)]
pub struct ServicesSnapshot {
    services: ahash::HashMap<NamespacedName, PortMap>,
}

impl ServicesSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the tracker's pending changes into the snapshot and reports
    /// side effects.
    pub fn apply(&mut self, tracker: &mut ServiceChangeTracker) -> ApplyResult {
        let mut result = ApplyResult::default();
        for (name, change) in tracker.take_items() {
            self.merge(name, change, &mut result.udp_stale_cluster_ips);
        }

        for (name, ports) in &self.services {
            let mut hc_port = 0u16;
            for port in ports.values() {
                // several ports declaring one is malformed input; the largest
                // wins to keep the pick deterministic
                hc_port = hc_port.max(port.healthcheck_node_port());
            }
            if hc_port != 0 {
                result.hc_service_node_ports.insert(name.clone(), hc_port);
            }
        }
        result
    }

    pub fn get(&self, name: &NamespacedName) -> Option<&PortMap> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NamespacedName, &PortMap)> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn merge(
        &mut self,
        name: NamespacedName,
        change: Option<PortMap>,
        udp_stale_cluster_ips: &mut BTreeSet<String>,
    ) {
        let change = match change {
            // an empty port map carries the same meaning as the sentinel
            Some(ports) if ports.is_empty() => None,
            other => other,
        };
        match change {
            None => {
                let Some(old) = self.services.remove(&name) else {
                    return;
                };
                for port in old.values() {
                    if port.protocol() == Protocol::Udp
                        && let Some(ip) = port.cluster_ip()
                    {
                        debug!("stale UDP cluster IP {} for removed service {}", ip, name);
                        udp_stale_cluster_ips.insert(ip.to_string());
                    }
                }
            }
            Some(ports) => {
                if let Some(old) = self.services.get(&name) {
                    let kept: BTreeSet<String> = ports
                        .values()
                        .filter(|p| p.protocol() == Protocol::Udp)
                        .filter_map(|p| p.cluster_ip())
                        .map(|ip| ip.to_string())
                        .collect();
                    for port in old.values() {
                        if port.protocol() == Protocol::Udp
                            && let Some(ip) = port.cluster_ip()
                            && !kept.contains(&ip.to_string())
                        {
                            debug!("stale UDP cluster IP {} for replaced service {}", ip, name);
                            udp_stale_cluster_ips.insert(ip.to_string());
                        }
                    }
                }
                self.services.insert(name, ports);
            }
        }
    }
}
