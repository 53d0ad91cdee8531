//! IP/CIDR parsing helpers shared by the ACL builder and the decision
//! subroute. Kept free of any Caddy-document concerns so it's independently
//! testable.

use ipnet::IpNet;
use std::net::IpAddr;

/// Parses a single whitelist/blacklist entry, which may be a bare IP or a
/// CIDR. Bare IPs are widened to a host-only network (`/32` or `/128`).
pub fn parse_cidr_or_ip(raw: &str) -> Option<IpNet> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(net) = trimmed.parse::<IpNet>() {
        return Some(net);
    }
    trimmed.parse::<IpAddr>().ok().map(|ip| IpNet::from(ip).trunc())
}

/// Splits a comma-separated list of CIDRs/IPs, trims whitespace, drops empty
/// segments, and parses each remaining entry. Returns `Err` with the first
/// invalid entry's raw text if any entry fails to parse.
pub fn parse_admin_whitelist(raw: &str) -> Result<Vec<IpNet>, String> {
    let mut out = Vec::new();
    for segment in raw.split(',') {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_cidr_or_ip(trimmed) {
            Some(net) => out.push(net),
            None => return Err(trimmed.to_string()),
        }
    }
    Ok(out)
}

/// The RFC1918 private ranges plus loopback, used for `local_network_only`
/// whitelists.
#[must_use]
pub fn local_network_ranges() -> Vec<IpNet> {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "::1/128",
        "fc00::/7",
    ]
    .iter()
    .map(|s| s.parse().expect("static range is valid"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_ip_as_host_network() {
        let net = parse_cidr_or_ip("10.0.0.1").unwrap();
        assert_eq!(net.to_string(), "10.0.0.1/32");
    }

    #[test]
    fn parses_cidr() {
        let net = parse_cidr_or_ip("10.0.0.0/8").unwrap();
        assert_eq!(net.prefix_len(), 8);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_cidr_or_ip("not-an-ip").is_none());
    }

    #[test]
    fn admin_whitelist_skips_empty_segments() {
        let nets = parse_admin_whitelist(" 10.0.0.1/32 ,, 192.168.1.0/24").unwrap();
        assert_eq!(nets.len(), 2);
    }

    #[test]
    fn admin_whitelist_errors_on_first_invalid_entry() {
        let err = parse_admin_whitelist("10.0.0.1/32, garbage").unwrap_err();
        assert_eq!(err, "garbage");
    }
}
