use std::net::IpAddr;

use kproxy_api::{IpFamily, IpSet};
use tracing::debug;

pub(crate) fn family_of(ip: IpAddr) -> IpFamily {
    match ip {
        IpAddr::V4(_) => IpFamily::V4,
        IpAddr::V6(_) => IpFamily::V6,
    }
}

/// Resolves the service's cluster IP for one family. The family-keyed entry
/// is authoritative, but entries are still parsed so a misfiled or garbled
/// address degrades to "no cluster IP" instead of propagating.
pub(crate) fn cluster_ip_by_family(family: IpFamily, ips: &IpSet) -> Option<IpAddr> {
    let raw = ips.by_family(family).first()?;
    match raw.parse::<IpAddr>() {
        Ok(ip) if family_of(ip) == family => Some(ip),
        Ok(ip) => {
            debug!("cluster IP {ip} filed under {family} has the wrong family");
            None
        }
        Err(err) => {
            debug!(%err, "failed to parse cluster IP {raw}");
            None
        }
    }
}

/// Splits every address in the set by its actual parsed family, regardless
/// of which list it arrived in. Unparseable entries are dropped.
pub(crate) fn map_ips_by_family(ips: &IpSet) -> (Vec<String>, Vec<String>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for raw in ips.v4.iter().chain(ips.v6.iter()) {
        match raw.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => v4.push(raw.clone()),
            Ok(IpAddr::V6(_)) => v6.push(raw.clone()),
            Err(err) => debug!(%err, "dropping unparseable IP {raw}"),
        }
    }
    (v4, v6)
}

/// Returns the addresses of `family`, logging the ones of the other family
/// that get dropped.
pub(crate) fn filter_by_family(family: IpFamily, ips: &IpSet, what: &str, service: &str) -> Vec<String> {
    let (v4, v6) = map_ips_by_family(ips);
    let (kept, dropped) = match family {
        IpFamily::V4 => (v4, v6),
        IpFamily::V6 => (v6, v4),
    };
    if !dropped.is_empty() {
        debug!(
            "ignored {} {}({}) for service {} as they don't match {}",
            what,
            dropped.len(),
            dropped.join(","),
            service,
            family
        );
    }
    kept
}
