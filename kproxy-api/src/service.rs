use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Topology hint annotation carried through to backends untouched.
pub const TOPOLOGY_AWARE_HINTS_ANNOTATION: &str = "service.kubernetes.io/topology-aware-hints";

/// Services of this type never get forwarding rules, even with cluster IPs set.
pub const SERVICE_TYPE_EXTERNAL_NAME: &str = "ExternalName";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn other(self) -> IpFamily {
        match self {
            IpFamily::V4 => IpFamily::V6,
            IpFamily::V6 => IpFamily::V4,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Sctp => write!(f, "SCTP"),
        }
    }
}

/// A set of IP address strings keyed by family, as delivered by the watch
/// stream. Entries are not validated at this layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpSet {
    #[serde(default)]
    pub v4: Vec<String>,
    #[serde(default)]
    pub v6: Vec<String>,
}

impl IpSet {
    pub fn by_family(&self, family: IpFamily) -> &[String] {
        match family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIps {
    #[serde(default)]
    pub cluster_ips: IpSet,
    #[serde(default)]
    pub external_ips: IpSet,
    #[serde(default)]
    pub loadbalancer_ips: IpSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpFilter {
    #[serde(default)]
    pub source_ranges: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub target_port: i32,
    #[serde(default)]
    pub target_port_name: String,
    #[serde(default)]
    pub node_port: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAffinity {
    #[default]
    None,
    ClientIp {
        timeout_seconds: i32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalTrafficPolicy {
    Cluster,
    Local,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub ips: ServiceIps,
    #[serde(default)]
    pub ip_filters: Vec<IpFilter>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub session_affinity: SessionAffinity,
    #[serde(default)]
    pub external_traffic_to_local: bool,
    #[serde(default)]
    pub internal_traffic_policy: Option<InternalTrafficPolicy>,
}

impl Service {
    /// True when the service carries at least one cluster IP of either family.
    pub fn is_ip_set(&self) -> bool {
        !self.ips.cluster_ips.is_empty()
    }

    /// Whether this service should skip proxying entirely.
    pub fn should_skip(&self) -> bool {
        if !self.is_ip_set() {
            debug!(
                "skipping service {}/{} due to empty cluster IPs",
                self.namespace, self.name
            );
            return true;
        }
        if self.type_ == SERVICE_TYPE_EXTERNAL_NAME {
            debug!(
                "skipping service {}/{} due to type ExternalName",
                self.namespace, self.name
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_service_field_names() {
        let svc: Service = serde_json::from_str(
            r#"{
                "namespace": "default",
                "name": "web",
                "type": "ClusterIP",
                "ips": {"cluster_ips": {"v4": ["10.96.0.10"]}},
                "ip_filters": [{"source_ranges": ["10.0.0.0/8"]}],
                "ports": [{"name": "http", "protocol": "TCP", "port": 80, "target_port": 8080}],
                "session_affinity": {"client_ip": {"timeout_seconds": 10800}}
            }"#,
        )
        .unwrap();

        assert_eq!(svc.type_, "ClusterIP");
        assert_eq!(svc.ips.cluster_ips.v4, vec!["10.96.0.10".to_string()]);
        assert_eq!(svc.ip_filters[0].source_ranges, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(svc.ports[0].protocol, Protocol::Tcp);
        assert_eq!(
            svc.session_affinity,
            SessionAffinity::ClientIp {
                timeout_seconds: 10800
            }
        );
    }

    #[test]
    fn test_should_skip() {
        let mut svc = Service {
            namespace: "default".into(),
            name: "web".into(),
            ..Default::default()
        };
        assert!(svc.should_skip());

        svc.ips.cluster_ips.v4.push("10.96.0.10".into());
        assert!(!svc.should_skip());

        svc.type_ = SERVICE_TYPE_EXTERNAL_NAME.into();
        assert!(svc.should_skip());
    }

    #[test]
    fn test_ip_set_by_family() {
        let ips = IpSet {
            v4: vec!["10.0.0.1".into()],
            v6: vec!["fd00::1".into()],
        };
        assert_eq!(ips.by_family(IpFamily::V4), ["10.0.0.1".to_string()]);
        assert_eq!(ips.by_family(IpFamily::V6), ["fd00::1".to_string()]);
        assert_eq!(IpFamily::V4.other(), IpFamily::V6);
    }
}
