mod endpoint;
mod service;

pub use endpoint::{Endpoint, is_valid_endpoint, to_cidr};
pub use service::{
    InternalTrafficPolicy, IpFamily, IpFilter, IpSet, PortMapping, Protocol, SERVICE_TYPE_EXTERNAL_NAME,
    Service, ServiceIps, SessionAffinity, TOPOLOGY_AWARE_HINTS_ANNOTATION,
};
