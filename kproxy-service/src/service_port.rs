use std::fmt;
use std::net::IpAddr;

use kproxy_api::{InternalTrafficPolicy, Protocol, SessionAffinity};

/// Namespace/name pair identifying one service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Primary key of one forwarding intent: (namespace, name, port name,
/// protocol). Port names are unique within a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServicePortName {
    pub name: NamespacedName,
    pub port: String,
    pub protocol: Protocol,
}

impl fmt::Display for ServicePortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Read-only view of one per-port forwarding descriptor. Backends that need
/// to attach their own precomputed state embed a [`BaseServicePort`] and
/// implement this on the wrapper.
pub trait ServicePort: fmt::Debug + Send + Sync {
    fn cluster_ip(&self) -> Option<IpAddr>;
    fn port(&self) -> u16;
    fn target_port(&self) -> u16;
    fn target_port_name(&self) -> &str;
    fn port_name(&self) -> &str;
    fn protocol(&self) -> Protocol;
    fn node_port(&self) -> u16;
    fn external_ips(&self) -> &[String];
    fn loadbalancer_ips(&self) -> &[String];
    fn loadbalancer_source_ranges(&self) -> &[String];
    fn session_affinity(&self) -> SessionAffinity;
    fn healthcheck_node_port(&self) -> u16;
    fn node_local_external(&self) -> bool;
    fn node_local_internal(&self) -> bool;
    fn internal_traffic_policy(&self) -> Option<InternalTrafficPolicy>;
    fn hints_annotation(&self) -> &str;

    /// Logging form, `<cluster_ip>:<port>/<protocol>`.
    fn describe(&self) -> String {
        match self.cluster_ip() {
            Some(ip) => format!("{}:{}/{}", ip, self.port(), self.protocol()),
            None => format!("<none>:{}/{}", self.port(), self.protocol()),
        }
    }
}

/// Base information defining one service port, derived from a single input
/// service for one family. Immutable once constructed; any attribute change
/// produces a replacement value.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseServicePort {
    pub(crate) cluster_ip: Option<IpAddr>,
    pub(crate) port: u16,
    pub(crate) target_port: u16,
    pub(crate) target_port_name: String,
    pub(crate) port_name: String,
    pub(crate) protocol: Protocol,
    pub(crate) node_port: u16,
    pub(crate) external_ips: Vec<String>,
    pub(crate) loadbalancer_ips: Vec<String>,
    pub(crate) loadbalancer_source_ranges: Vec<String>,
    pub(crate) session_affinity: SessionAffinity,
    pub(crate) healthcheck_node_port: u16,
    pub(crate) node_local_external: bool,
    pub(crate) node_local_internal: bool,
    pub(crate) internal_traffic_policy: Option<InternalTrafficPolicy>,
    pub(crate) hints_annotation: String,
}

impl BaseServicePort {
    /// Copy with the healthcheck node port filled in. Construction never
    /// derives one from the input; producers whose feed carries it attach it
    /// through the tracker's decorate adapter.
    pub fn with_healthcheck_node_port(mut self, port: u16) -> Self {
        self.healthcheck_node_port = port;
        self
    }
}

impl ServicePort for BaseServicePort {
    fn cluster_ip(&self) -> Option<IpAddr> {
        self.cluster_ip
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn target_port(&self) -> u16 {
        self.target_port
    }

    fn target_port_name(&self) -> &str {
        &self.target_port_name
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn node_port(&self) -> u16 {
        self.node_port
    }

    fn external_ips(&self) -> &[String] {
        &self.external_ips
    }

    fn loadbalancer_ips(&self) -> &[String] {
        &self.loadbalancer_ips
    }

    fn loadbalancer_source_ranges(&self) -> &[String] {
        &self.loadbalancer_source_ranges
    }

    fn session_affinity(&self) -> SessionAffinity {
        self.session_affinity
    }

    fn healthcheck_node_port(&self) -> u16 {
        self.healthcheck_node_port
    }

    fn node_local_external(&self) -> bool {
        self.node_local_external
    }

    fn node_local_internal(&self) -> bool {
        self.node_local_internal
    }

    fn internal_traffic_policy(&self) -> Option<InternalTrafficPolicy> {
        self.internal_traffic_policy
    }

    fn hints_annotation(&self) -> &str {
        &self.hints_annotation
    }
}

impl fmt::Display for BaseServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
