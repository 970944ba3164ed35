//! Address range expansion
//!
//! Accepts CIDR blocks (`10.0.0.0/24`), inclusive dash ranges
//! (`10.0.0.5-10.0.0.40`), single addresses, and comma-separated mixes of
//! those. CIDR blocks expand to their usable hosts: network and broadcast
//! addresses are skipped except for `/31` and `/32`.

use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Largest expansion accepted, a `/8`
pub const MAX_ADDRESSES: u64 = 1 << 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid address range '{input}': {reason}")]
pub struct RangeError {
    pub input: String,
    pub reason: String,
}

impl RangeError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Expand a range expression into ascending, de-duplicated addresses.
pub fn expand(expr: &str) -> Result<Vec<Ipv4Addr>, RangeError> {
    let mut addresses = BTreeSet::new();

    let parts: Vec<&str> = expr
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(RangeError::new(expr, "empty range"));
    }

    for part in parts {
        let (first, last) = bounds(part)?;
        let span = u64::from(last) - u64::from(first) + 1;
        if span + addresses.len() as u64 > MAX_ADDRESSES {
            return Err(RangeError::new(expr, "range larger than a /8"));
        }
        addresses.extend((first..=last).map(Ipv4Addr::from));
    }

    Ok(addresses.into_iter().collect())
}

/// Inclusive numeric bounds of one comma-separated part
fn bounds(part: &str) -> Result<(u32, u32), RangeError> {
    if part.contains('/') {
        let net: Ipv4Net = part
            .parse()
            .map_err(|_| RangeError::new(part, "not a valid IPv4 CIDR block"))?;
        let network = u32::from(net.network());
        let broadcast = u32::from(net.broadcast());
        if net.prefix_len() >= 31 {
            return Ok((network, broadcast));
        }
        return Ok((network + 1, broadcast - 1));
    }

    if let Some((start, end)) = part.split_once('-') {
        let start = parse_addr(start.trim(), part)?;
        let end = parse_addr(end.trim(), part)?;
        if start > end {
            return Err(RangeError::new(part, "range start is after range end"));
        }
        return Ok((u32::from(start), u32::from(end)));
    }

    let addr = parse_addr(part, part)?;
    Ok((u32::from(addr), u32::from(addr)))
}

fn parse_addr(text: &str, part: &str) -> Result<Ipv4Addr, RangeError> {
    text.parse()
        .map_err(|_| RangeError::new(part, format!("'{text}' is not an IPv4 address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(list: &[&str]) -> Vec<Ipv4Addr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_single_host_block() {
        assert_eq!(expand("127.0.0.1/32").unwrap(), ips(&["127.0.0.1"]));
    }

    #[test]
    fn test_cidr_skips_network_and_broadcast() {
        let addrs = expand("10.0.0.0/29").unwrap();
        assert_eq!(addrs.len(), 6);
        assert_eq!(addrs.first(), Some(&"10.0.0.1".parse().unwrap()));
        assert_eq!(addrs.last(), Some(&"10.0.0.6".parse().unwrap()));

        assert_eq!(expand("10.0.0.0/31").unwrap(), ips(&["10.0.0.0", "10.0.0.1"]));
    }

    #[test]
    fn test_dash_range_and_mixed_list_are_sorted_and_deduplicated() {
        let addrs = expand("10.0.0.9, 10.0.0.3-10.0.0.5,10.0.0.4").unwrap();
        assert_eq!(addrs, ips(&["10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.9"]));
    }

    #[test]
    fn test_dash_range_across_octets() {
        let addrs = expand("10.0.0.254-10.0.1.1").unwrap();
        assert_eq!(addrs, ips(&["10.0.0.254", "10.0.0.255", "10.0.1.0", "10.0.1.1"]));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(expand("").is_err());
        assert!(expand("10.0.0.0/33").is_err());
        assert!(expand("10.0.0.9-10.0.0.1").is_err());
        assert!(expand("fileserver").is_err());
        assert!(expand("::1/128").is_err());

        let err = expand("10.0.0.1,bogus").unwrap_err();
        assert_eq!(err.input, "bogus");
    }

    #[test]
    fn test_rejects_oversized_range() {
        assert!(expand("10.0.0.0/7").is_err());
        assert!(expand("0.0.0.0-255.255.255.255").is_err());
    }
}
