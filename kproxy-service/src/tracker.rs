use std::sync::Arc;

use kproxy_api::{
    InternalTrafficPolicy, IpFamily, PortMapping, Service, TOPOLOGY_AWARE_HINTS_ANNOTATION,
};
use tracing::debug;

use crate::family;
use crate::metrics::TrackerMetrics;
use crate::recorder::EventRecorder;
use crate::service_port::{BaseServicePort, NamespacedName, ServicePort, ServicePortName};

/// The intended port set for one service after an event. Keyed by the full
/// port identity; replaced wholesale on every update.
pub type PortMap = ahash::HashMap<ServicePortName, Arc<dyn ServicePort>>;

/// Adapter wrapping each base port into a backend-decorated form.
pub type MakeServicePortFn =
    Box<dyn Fn(&PortMapping, &Service, BaseServicePort) -> Arc<dyn ServicePort> + Send + Sync>;

/// Carries state about uncommitted changes to an arbitrary number of
/// services, keyed by namespace and name. Each entry is the post-image of
/// the service's whole port set; `None` marks a deletion. Diffing against
/// the applied state happens in [`crate::ServicesSnapshot::apply`].
pub struct ServiceChangeTracker {
    items: ahash::HashMap<NamespacedName, Option<PortMap>>,
    family: IpFamily,
    make_service_port: Option<MakeServicePortFn>,
    recorder: Option<Box<dyn EventRecorder>>,
    metrics: TrackerMetrics,
}

impl ServiceChangeTracker {
    pub fn new(
        family: IpFamily,
        make_service_port: Option<MakeServicePortFn>,
        recorder: Option<Box<dyn EventRecorder>>,
    ) -> Self {
        Self {
            items: ahash::HashMap::default(),
            family,
            make_service_port,
            recorder,
            metrics: TrackerMetrics::default(),
        }
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Shared handles to this tracker's metrics, for registration.
    pub fn metrics(&self) -> TrackerMetrics {
        self.metrics.clone()
    }

    /// Stages the post-image of `service`'s port set, overwriting any pending
    /// entry for it. Skippable services stage a deletion. Returns whether the
    /// pending set is non-empty.
    pub fn update(&mut self, service: &Service) -> bool {
        self.metrics.changes.inc();
        let namespaced_name = NamespacedName::new(service.namespace.as_str(), service.name.as_str());
        let change = self.service_to_port_map(service);
        match &change {
            Some(ports) => debug!("service {} updated: {} ports", namespaced_name, ports.len()),
            None => debug!("service {} updated for delete", namespaced_name),
        }
        self.items.insert(namespaced_name, change);
        self.metrics.pending.set(self.items.len() as i64);
        !self.items.is_empty()
    }

    /// Stages a deletion for the named service. Returns whether the pending
    /// set is non-empty.
    pub fn delete(&mut self, namespace: &str, name: &str) -> bool {
        self.metrics.changes.inc();
        let namespaced_name = NamespacedName::new(namespace, name);
        debug!("service {} updated for delete", namespaced_name);
        self.items.insert(namespaced_name, None);
        self.metrics.pending.set(self.items.len() as i64);
        !self.items.is_empty()
    }

    /// Number of services with uncommitted changes.
    pub fn pending(&self) -> usize {
        self.items.len()
    }

    /// Drains the pending set, resetting the pending gauge.
    pub(crate) fn take_items(&mut self) -> ahash::HashMap<NamespacedName, Option<PortMap>> {
        self.metrics.pending.set(0);
        std::mem::take(&mut self.items)
    }

    /// Translates one service into its port map. `None` means the service
    /// has nothing to forward for this tracker's family.
    fn service_to_port_map(&self, service: &Service) -> Option<PortMap> {
        if service.should_skip() {
            return None;
        }
        let Some(cluster_ip) = family::cluster_ip_by_family(self.family, &service.ips.cluster_ips)
        else {
            if !service.ips.cluster_ips.by_family(self.family).is_empty() {
                self.record(service, "InvalidClusterIp", "cluster IP could not be parsed");
            }
            return None;
        };

        let mut ports = PortMap::default();
        for mapping in &service.ports {
            let Some(base) = self.new_base_service_port(mapping, cluster_ip, service) else {
                continue;
            };
            let port_name = ServicePortName {
                name: NamespacedName::new(service.namespace.as_str(), service.name.as_str()),
                port: mapping.name.clone(),
                protocol: mapping.protocol,
            };
            let port: Arc<dyn ServicePort> = match &self.make_service_port {
                Some(make) => make(mapping, service, base),
                None => Arc::new(base),
            };
            ports.insert(port_name, port);
        }
        Some(ports)
    }

    fn new_base_service_port(
        &self,
        mapping: &PortMapping,
        cluster_ip: std::net::IpAddr,
        service: &Service,
    ) -> Option<BaseServicePort> {
        let port = match u16::try_from(mapping.port) {
            Ok(p) if p != 0 => p,
            _ => {
                self.record(
                    service,
                    "InvalidPort",
                    &format!("port {} of {} is out of range", mapping.port, mapping.name),
                );
                return None;
            }
        };
        let target_port = u16::try_from(mapping.target_port).unwrap_or_else(|_| {
            debug!(
                "dropping out of range target port {} on {}/{}",
                mapping.target_port, service.namespace, service.name
            );
            0
        });
        let node_port = u16::try_from(mapping.node_port).unwrap_or_else(|_| {
            debug!(
                "dropping out of range node port {} on {}/{}",
                mapping.node_port, service.namespace, service.name
            );
            0
        });

        let service_label = format!("{}/{}", service.namespace, service.name);
        Some(BaseServicePort {
            cluster_ip: Some(cluster_ip),
            port,
            target_port,
            target_port_name: mapping.target_port_name.clone(),
            port_name: mapping.name.clone(),
            protocol: mapping.protocol,
            node_port,
            external_ips: family::filter_by_family(
                self.family,
                &service.ips.external_ips,
                "external IPs",
                &service_label,
            ),
            loadbalancer_ips: family::filter_by_family(
                self.family,
                &service.ips.loadbalancer_ips,
                "load balancer IPs",
                &service_label,
            ),
            loadbalancer_source_ranges: service
                .ip_filters
                .iter()
                .flat_map(|f| f.source_ranges.iter().cloned())
                .collect(),
            session_affinity: service.session_affinity,
            healthcheck_node_port: 0,
            node_local_external: service.external_traffic_to_local,
            node_local_internal: matches!(
                service.internal_traffic_policy,
                Some(InternalTrafficPolicy::Local)
            ),
            internal_traffic_policy: service.internal_traffic_policy,
            hints_annotation: service
                .annotations
                .get(TOPOLOGY_AWARE_HINTS_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn record(&self, service: &Service, reason: &str, message: &str) {
        match &self.recorder {
            Some(recorder) => recorder.event(service, reason, message),
            None => debug!(
                "service {}/{}: {}: {}",
                service.namespace, service.name, reason, message
            ),
        }
    }
}
