//! Dotted-quad IPv4 address validation

use std::net::Ipv4Addr;
use wardmon_core::{Error, Result};

/// True iff `addr` is four dot-separated decimal integers in `[0, 255]`
///
/// Stricter than it looks: whitespace, empty octets, signs, and anything
/// non-decimal are rejected.
pub fn check(addr: &str) -> bool {
    let octets: Vec<&str> = addr.split('.').collect();
    octets.len() == 4 && octets.iter().all(|octet| parse_octet(octet).is_some())
}

/// Parse a validated dotted-quad into an [`Ipv4Addr`]
///
/// Fails with [`Error::InvalidAddress`]; used at probe construction where
/// a malformed address is fatal for that probe.
pub fn parse(addr: &str) -> Result<Ipv4Addr> {
    let octets: Vec<&str> = addr.split('.').collect();
    if octets.len() != 4 {
        return Err(Error::InvalidAddress(addr.to_string()));
    }
    let mut parsed = [0u8; 4];
    for (slot, octet) in parsed.iter_mut().zip(&octets) {
        *slot = parse_octet(octet).ok_or_else(|| Error::InvalidAddress(addr.to_string()))?;
    }
    Ok(Ipv4Addr::new(parsed[0], parsed[1], parsed[2], parsed[3]))
}

fn parse_octet(octet: &str) -> Option<u8> {
    if octet.is_empty() || !octet.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    octet.parse::<u8>().ok()
}
