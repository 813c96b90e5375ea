//! Hostname resolution for JWKS clusters.

use crate::Error;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, ToSocketAddrs},
};

/// Looks up the addresses of a hostname.
pub trait Resolve {
    fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolves hostnames with the operating system's resolver. Blocks the calling thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = (host, 0).to_socket_addrs()?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

impl<R: Resolve + ?Sized> Resolve for &R {
    fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        (**self).lookup_ip(host)
    }
}

/// Returns the IPv4 addresses of `host`, in resolution order.
///
/// When the lookup fails, `host` is accepted if it is an IPv4 literal. IPv6-only hosts are
/// unsupported.
pub fn resolve_ipv4(resolver: &impl Resolve, host: &str) -> Result<Vec<Ipv4Addr>, Error> {
    let ips = match resolver.lookup_ip(host) {
        Ok(ips) => ips,
        Err(source) => {
            return match host.parse::<Ipv4Addr>() {
                Ok(ip) => Ok(vec![ip]),
                Err(_) => Err(Error::Resolve {
                    host: host.to_string(),
                    source,
                }),
            };
        }
    };

    let mut v4 = Vec::with_capacity(ips.len());
    for ip in ips {
        let ip = match ip {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(ip) => ip,
                None => continue,
            },
        };
        if !v4.contains(&ip) {
            v4.push(ip);
        }
    }

    if v4.is_empty() {
        return Err(Error::NoIpv4Address(host.to_string()));
    }
    tracing::trace!(%host, addrs = ?v4, "Resolved");
    Ok(v4)
}
