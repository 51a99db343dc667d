//! Guards for fetching model-supplied URLs.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A URL that passed [`validate_and_resolve`], with the addresses its host
/// resolved to at check time. Fetch through a client pinned to `addrs` so a
/// second DNS answer can't point somewhere else.
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    pub url: url::Url,
    pub host: String,
    pub addrs: Vec<SocketAddr>,
}

/// Parse `url_str` and refuse anything that would reach this machine or its
/// network:
/// - schemes other than http(s)
/// - loopback, private, link-local and unspecified addresses
/// - multicast, broadcast and documentation ranges
/// - IPv6 unique-local, 6to4, and IPv4-mapped forms of the above
///
/// Every address a hostname resolves to must pass. A name that does not
/// resolve is an error.
pub async fn validate_and_resolve(url_str: &str) -> Result<ResolvedUrl, String> {
    let url = url::Url::parse(url_str).map_err(|e| format!("Invalid URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Only http/https allowed, got '{}'", url.scheme()));
    }
    let port = url
        .port_or_known_default()
        .ok_or_else(|| "URL has no port".to_string())?;

    let (host, addrs) = match url.host() {
        Some(url::Host::Ipv4(v4)) => (v4.to_string(), vec![SocketAddr::new(v4.into(), port)]),
        Some(url::Host::Ipv6(v6)) => (v6.to_string(), vec![SocketAddr::new(v6.into(), port)]),
        Some(url::Host::Domain(domain)) => {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| format!("Failed to resolve {}: {}", domain, e))?
                .collect();
            if addrs.is_empty() {
                return Err(format!("Failed to resolve {}: no addresses", domain));
            }
            (domain.to_string(), addrs)
        }
        None => return Err("URL has no host".to_string()),
    };

    for addr in &addrs {
        check_ip_allowed(addr.ip())?;
    }
    Ok(ResolvedUrl { url, host, addrs })
}

fn check_ip_allowed(ip: IpAddr) -> Result<(), String> {
    let blocked = match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_blocked_v4(v4),
            None => is_blocked_v6(v6),
        },
    };
    if blocked {
        return Err(format!("Blocked: requests to {} are not allowed", ip));
    }
    Ok(())
}

fn is_blocked_v4(v4: Ipv4Addr) -> bool {
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_unspecified()
        || v4.is_multicast()
        || v4.is_documentation()
        // 0.0.0.0/8
        || v4.octets()[0] == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (v4.octets()[0] == 100 && v4.octets()[1] & 0xc0 == 64)
}

fn is_blocked_v6(v6: Ipv6Addr) -> bool {
    let first = v6.segments()[0];
    v6.is_loopback()
        || v6.is_unspecified()
        || v6.is_multicast()
        // fe80::/10 link-local
        || first & 0xffc0 == 0xfe80
        // fc00::/7 unique local
        || first & 0xfe00 == 0xfc00
        // 2001:db8::/32 documentation
        || (first == 0x2001 && v6.segments()[1] == 0x0db8)
        // 2002::/16 6to4 can wrap any IPv4 address
        || first == 0x2002
}
