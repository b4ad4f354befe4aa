use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::service::{IpSet, Service};

/// One endpoint of a service: the set of addresses backing it, keyed by
/// family. Port resolution happens against the owning service's port list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub ips: IpSet,
}

impl Endpoint {
    /// Builds a map of port name to all `ip:target_port` join strings for
    /// that port, across both families. Backends expand these into per-port
    /// forwarding rules.
    pub fn ports_to_endpoints(&self, service: &Service) -> BTreeMap<String, Vec<String>> {
        let mut ports_to_endpoints: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ip in self.ips.v4.iter().chain(self.ips.v6.iter()) {
            for port in &service.ports {
                if !is_valid_endpoint(ip, port.port) {
                    continue;
                }
                ports_to_endpoints
                    .entry(port.name.clone())
                    .or_default()
                    .push(join_host_port(ip, port.target_port));
            }
        }
        ports_to_endpoints
    }
}

/// Checks that the given host / port pair is a usable endpoint.
pub fn is_valid_endpoint(host: &str, port: i32) -> bool {
    !host.is_empty() && port > 0
}

/// Returns the host address in CIDR form, `<ip>/32` for IPv4 and `<ip>/128`
/// for IPv6.
pub fn to_cidr(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}/32"),
        IpAddr::V6(v6) => format!("{v6}/128"),
    }
}

fn join_host_port(host: &str, port: i32) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod test {
    use crate::service::PortMapping;

    use super::*;

    #[test]
    fn test_to_cidr() {
        assert_eq!(to_cidr("10.0.0.1".parse().unwrap()), "10.0.0.1/32");
        assert_eq!(to_cidr("fd00::1".parse().unwrap()), "fd00::1/128");
    }

    #[test]
    fn test_ports_to_endpoints() {
        let service = Service {
            namespace: "default".into(),
            name: "web".into(),
            ports: vec![
                PortMapping {
                    name: "http".into(),
                    port: 80,
                    target_port: 8080,
                    ..Default::default()
                },
                PortMapping {
                    name: "metrics".into(),
                    port: 0, // invalid, dropped
                    target_port: 9090,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let endpoint = Endpoint {
            ips: crate::service::IpSet {
                v4: vec!["10.244.0.10".into(), "10.244.1.11".into()],
                v6: vec!["fd00::a".into()],
            },
        };

        let map = endpoint.ports_to_endpoints(&service);
        assert_eq!(
            map.get("http").unwrap(),
            &vec![
                "10.244.0.10:8080".to_string(),
                "10.244.1.11:8080".to_string(),
                "[fd00::a]:8080".to_string(),
            ]
        );
        assert!(!map.contains_key("metrics"));
    }
}
