//! IPv4 and ICMP datagram construction and parsing
//!
//! Requests go out over raw sockets with `IP_HDRINCL`, so the full IPv4
//! header is packed here, checksum included. Replies come back the same
//! way: a complete IPv4 datagram whose header is decoded field by field
//! before the ICMP payload is interpreted.
//!
//! Echo and Timestamp probes differ only in payload layout and expected
//! reply type, captured by the [`ProbeKind`] variant plus the pure
//! [`build_request`] / [`parse_icmp`] pair.

use crate::checksum::{internet_checksum, ByteOrder};
use crate::icmp_type;
use chrono::Timelike;
use rand::Rng;
use serde::Serialize;
use std::net::Ipv4Addr;
use wardmon_core::{Error, Result};

/// Length of an IPv4 header without options
pub const IPV4_HEADER_LEN: usize = 20;
/// Length of the fixed ICMP header (type, code, checksum, identifier, sequence)
pub const ICMP_HEADER_LEN: usize = 8;
/// Length of the random payload carried by Echo requests
pub const ECHO_DATA_LEN: usize = 10;

pub const ECHO_REPLY: u8 = 0;
pub const ECHO_REQUEST: u8 = 8;
pub const TIMESTAMP_REQUEST: u8 = 13;
pub const TIMESTAMP_REPLY: u8 = 14;

const DEFAULT_TTL: u8 = 64;
const PROTOCOL_ICMP: u8 = 1;

const ASCII_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Probe flavor: payload layout and the reply type it expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// ICMP Echo; `data` is fixed at probe construction and echoed back
    Echo { data: [u8; ECHO_DATA_LEN] },
    /// ICMP Timestamp; originate is stamped at build time
    Timestamp,
}

impl ProbeKind {
    /// An Echo probe with a fresh random ASCII-letter payload
    pub fn echo() -> Self {
        let mut rng = rand::thread_rng();
        let mut data = [0u8; ECHO_DATA_LEN];
        for byte in &mut data {
            *byte = ASCII_LETTERS[rng.gen_range(0..ASCII_LETTERS.len())];
        }
        ProbeKind::Echo { data }
    }

    pub fn request_type(&self) -> u8 {
        match self {
            ProbeKind::Echo { .. } => ECHO_REQUEST,
            ProbeKind::Timestamp => TIMESTAMP_REQUEST,
        }
    }

    /// The ICMP type a well-behaved peer answers with
    pub fn reply_type(&self) -> u8 {
        match self {
            ProbeKind::Echo { .. } => ECHO_REPLY,
            ProbeKind::Timestamp => TIMESTAMP_REPLY,
        }
    }
}

/// Milliseconds since UTC midnight, the originate timestamp of RFC 792
pub fn millis_since_midnight() -> u32 {
    let now = chrono::Utc::now();
    now.num_seconds_from_midnight() * 1000 + now.nanosecond() / 1_000_000
}

/// Build a complete IPv4+ICMP request datagram
pub fn build_request(
    kind: &ProbeKind,
    source: Ipv4Addr,
    destination: Ipv4Addr,
    identifier: u16,
    sequence: u16,
) -> Vec<u8> {
    let icmp = build_icmp(kind, identifier, sequence);
    let mut datagram = build_ipv4_header(icmp.len(), source, destination).to_vec();
    datagram.extend_from_slice(&icmp);
    datagram
}

fn build_icmp(kind: &ProbeKind, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ICMP_HEADER_LEN + ECHO_DATA_LEN + 2);
    packet.push(kind.request_type());
    packet.push(0); // code
    packet.extend_from_slice(&[0, 0]); // checksum placeholder
    packet.extend_from_slice(&identifier.to_be_bytes());
    packet.extend_from_slice(&sequence.to_be_bytes());
    match kind {
        ProbeKind::Echo { data } => packet.extend_from_slice(data),
        ProbeKind::Timestamp => {
            packet.extend_from_slice(&millis_since_midnight().to_be_bytes());
            packet.extend_from_slice(&[0u8; 8]); // receive and transmit
        }
    }

    let checksum = internet_checksum(&packet, ByteOrder::Big);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

fn build_ipv4_header(payload_len: usize, source: Ipv4Addr, destination: Ipv4Addr) -> [u8; IPV4_HEADER_LEN] {
    let total_length = (IPV4_HEADER_LEN + payload_len) as u16;

    let mut header = [0u8; IPV4_HEADER_LEN];
    header[0] = (4 << 4) | 5; // version and IHL
    header[1] = 0; // DSCP and ECN
    header[2..4].copy_from_slice(&total_length.to_be_bytes());
    // identification, flags, and fragment offset stay zero
    header[8] = DEFAULT_TTL;
    header[9] = PROTOCOL_ICMP;
    header[12..16].copy_from_slice(&source.octets());
    header[16..20].copy_from_slice(&destination.octets());

    let checksum = internet_checksum(&header, ByteOrder::Big);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    header
}

/// Decoded IPv4 header fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// Decode the leading 20 bytes of a datagram
pub fn parse_ipv4_header(bytes: &[u8]) -> Result<Ipv4Header> {
    if bytes.len() < IPV4_HEADER_LEN {
        return Err(Error::Framing(format!(
            "IPv4 header needs {} bytes, have {}",
            IPV4_HEADER_LEN,
            bytes.len()
        )));
    }

    let flags_and_offset = u16::from_be_bytes([bytes[6], bytes[7]]);
    Ok(Ipv4Header {
        version: bytes[0] >> 4,
        ihl: bytes[0] & 0x0f,
        dscp: bytes[1] >> 2,
        ecn: bytes[1] & 0x03,
        total_length: u16::from_be_bytes([bytes[2], bytes[3]]),
        identification: u16::from_be_bytes([bytes[4], bytes[5]]),
        flags: (flags_and_offset >> 13) as u8,
        fragment_offset: flags_and_offset & 0x1fff,
        ttl: bytes[8],
        protocol: bytes[9],
        checksum: u16::from_be_bytes([bytes[10], bytes[11]]),
        source: Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]),
        destination: Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]),
    })
}

/// Decoded ICMP payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedIcmp {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub message: IcmpMessage,
}

/// Payload interpretation
///
/// Typed variants carry the full decode of the reply the probe asked
/// for; anything else gets the generic registry description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IcmpMessage {
    Echo {
        identifier: u16,
        sequence: u16,
        data: String,
    },
    Timestamp {
        identifier: u16,
        sequence: u16,
        originate: u32,
        receive: u32,
        transmit: u32,
    },
    Other {
        name: String,
        code_description: String,
    },
}

/// Decode an ICMP payload, fully when it is the expected reply type
pub fn parse_icmp(bytes: &[u8], expected_reply: u8) -> Result<ParsedIcmp> {
    if bytes.len() < 4 {
        return Err(Error::Framing(format!(
            "ICMP payload needs at least 4 bytes, have {}",
            bytes.len()
        )));
    }

    let icmp_type = bytes[0];
    let code = bytes[1];
    let checksum = u16::from_be_bytes([bytes[2], bytes[3]]);

    let message = if icmp_type == expected_reply && icmp_type == ECHO_REPLY {
        if bytes.len() < ICMP_HEADER_LEN {
            return Err(Error::Framing(format!(
                "Echo reply needs {} bytes, have {}",
                ICMP_HEADER_LEN,
                bytes.len()
            )));
        }
        IcmpMessage::Echo {
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            data: String::from_utf8_lossy(&bytes[ICMP_HEADER_LEN..]).into_owned(),
        }
    } else if icmp_type == expected_reply && icmp_type == TIMESTAMP_REPLY {
        if bytes.len() < ICMP_HEADER_LEN + 12 {
            return Err(Error::Framing(format!(
                "Timestamp reply needs {} bytes, have {}",
                ICMP_HEADER_LEN + 12,
                bytes.len()
            )));
        }
        IcmpMessage::Timestamp {
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            originate: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            receive: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            transmit: u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        }
    } else {
        let (name, code_description) = icmp_type::describe(icmp_type, code);
        IcmpMessage::Other {
            name,
            code_description,
        }
    };

    Ok(ParsedIcmp {
        icmp_type,
        code,
        checksum,
        message,
    })
}
