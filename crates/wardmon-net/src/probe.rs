//! ICMP probe engine
//!
//! One [`IcmpProbe`] is a per-target state machine over its own raw
//! socket: it builds request datagrams, feeds them to the kernel in as
//! many chunks as the socket accepts, accumulates the reply until the
//! IPv4 `Total Length` is satisfied, and parses the result. At any
//! instant an engine is idle, sending, receiving, completed, or aborted;
//! [`do_lap`](IcmpProbe::do_lap) advances whichever of those applies and
//! enforces the hard per-probe timeout.
//!
//! Replies are not matched against the engine's identifier, sequence, or
//! the target address. With several engines live at once, or unrelated
//! ICMP traffic on the host, an engine can consume a datagram meant for
//! another; the wrong-type decode then reports the probe as failed.

use crate::addr;
use crate::packet::{self, ParsedIcmp, ProbeKind, IPV4_HEADER_LEN};
use crate::socket::RawIcmpSocket;
use serde::Serialize;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use tracing::{debug, trace, warn};
use wardmon_core::{Error, Result, Timer};

/// Hard wall-clock bound on one request/response exchange, in seconds
pub const HARD_TIMEOUT_SECS: f64 = 5.0;

/// Bytes drained from the socket per receive step
const RECV_CHUNK: usize = 256;

// Identifiers travel in a 16-bit field, so the allocator wraps modulo
// 2^16; two engines constructed concurrently still get distinct values.
static NEXT_IDENTIFIER: AtomicU16 = AtomicU16::new(0);

fn allocate_identifier() -> u16 {
    NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed)
}

/// Fully parsed reply plus the measured round trip
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResponse {
    pub ip: packet::Ipv4Header,
    pub icmp: ParsedIcmp,
    /// Seconds from first byte offered to last byte received
    pub time: f64,
}

/// Per-target ICMP prober: raw socket, buffers, and exchange state
#[derive(Debug)]
pub struct IcmpProbe {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    kind: ProbeKind,
    identifier: u16,
    sequence: u16,
    socket: RawIcmpSocket,
    outbound: Vec<u8>,
    offered: bool,
    inbound: Vec<u8>,
    expected_length: usize,
    response: Option<ProbeResponse>,
    timer: Timer,
}

impl IcmpProbe {
    /// Construct an engine for one destination
    ///
    /// Fails with [`Error::InvalidAddress`] when either address is not a
    /// valid dotted quad, and with an I/O error when the raw socket
    /// cannot be created (typically missing privileges).
    pub fn new(destination: &str, source: &str, kind: ProbeKind) -> Result<Self> {
        let destination = addr::parse(destination)?;
        let source = addr::parse(source)?;
        let socket = RawIcmpSocket::new()?;
        let identifier = allocate_identifier();
        debug!(
            "ICMP engine for {} (identifier {}, request type {}, reply type {})",
            destination,
            identifier,
            kind.request_type(),
            kind.reply_type()
        );

        Ok(Self {
            source,
            destination,
            kind,
            identifier,
            sequence: 0,
            socket,
            outbound: Vec::new(),
            offered: false,
            inbound: Vec::new(),
            expected_length: 0,
            response: None,
            timer: Timer::new(),
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// The underlying raw socket, for readiness integration
    pub fn socket(&self) -> &RawIcmpSocket {
        &self.socket
    }

    /// Transmit the next chunk of the current request
    ///
    /// With nothing in flight this builds a fresh datagram first,
    /// clearing any previous response and bumping the sequence number.
    /// Idempotent once the datagram is fully sent; transport errors are
    /// logged and retried on the next call.
    pub fn send(&mut self) -> Result<()> {
        if self.outbound.is_empty() {
            if self.offered && self.response.is_none() {
                // Fully sent; nothing to do until the reply arrives.
                return Ok(());
            }
            // Idle, completed, or aborted: build the next datagram.
            self.prepare_request();
        }
        if !self.offered {
            // The measurement starts with the first byte offered to the
            // kernel.
            self.timer.start();
            self.offered = true;
        }
        match self.socket.try_send_to(&self.outbound, self.destination) {
            Ok(sent) => {
                trace!("sent {} of {} bytes to {}", sent, self.outbound.len(), self.destination);
                self.outbound.drain(..sent);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("send to {} failed: {}, will retry", self.destination, e),
        }
        Ok(())
    }

    fn prepare_request(&mut self) {
        self.clear_response_state();
        self.outbound = packet::build_request(
            &self.kind,
            self.source,
            self.destination,
            self.identifier,
            self.sequence,
        );
        self.sequence = self.sequence.wrapping_add(1);
        self.offered = false;
    }

    /// Drain reply bytes and parse once the full datagram has arrived
    ///
    /// Ignored while idle or once a response is ready. The expected
    /// datagram length is fixed from the IPv4 `Total Length` field as
    /// soon as four bytes have been buffered; a length that cannot hold
    /// an IPv4 header, or fewer bytes than already received, aborts the
    /// exchange with a framing error.
    pub fn receive(&mut self) -> Result<()> {
        if self.response.is_some() || !self.offered || !self.outbound.is_empty() {
            return Ok(());
        }
        let mut buf = [0u8; RECV_CHUNK];
        match self.socket.try_recv_from(&mut buf) {
            Ok((received, peer)) => {
                trace!("received {} bytes from {}", received, peer);
                self.inbound.extend_from_slice(&buf[..received]);
                self.decode_inbound()?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("receive from {} failed: {}, will retry", self.destination, e),
        }
        Ok(())
    }

    fn decode_inbound(&mut self) -> Result<()> {
        if self.expected_length == 0 && self.inbound.len() >= 4 {
            let total = usize::from(u16::from_be_bytes([self.inbound[2], self.inbound[3]]));
            if total < IPV4_HEADER_LEN {
                self.abort();
                return Err(Error::Framing(format!(
                    "total length {} cannot hold an IPv4 header",
                    total
                )));
            }
            self.expected_length = total;
        }
        if self.expected_length != 0 {
            if self.inbound.len() > self.expected_length {
                let got = self.inbound.len();
                let expected = self.expected_length;
                self.abort();
                return Err(Error::Framing(format!(
                    "received {} bytes for a {}-byte datagram",
                    got, expected
                )));
            }
            if self.inbound.len() == self.expected_length {
                if let Err(e) = self.parse_response() {
                    self.abort();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn parse_response(&mut self) -> Result<()> {
        let ip = packet::parse_ipv4_header(&self.inbound)?;
        let icmp = packet::parse_icmp(&self.inbound[IPV4_HEADER_LEN..], self.kind.reply_type())?;
        self.timer.stop();
        self.response = Some(ProbeResponse {
            ip,
            icmp,
            time: self.timer.time(),
        });
        Ok(())
    }

    /// True once a full reply has been parsed
    pub fn is_response_ready(&self) -> bool {
        self.response.is_some()
    }

    /// True iff the parsed reply carries the expected ICMP type
    pub fn reply_good(&self) -> bool {
        self.response
            .as_ref()
            .map(|r| r.icmp.icmp_type == self.kind.reply_type())
            .unwrap_or(false)
    }

    pub fn response(&self) -> Option<&ProbeResponse> {
        self.response.as_ref()
    }

    /// Current elapsed interval of the exchange, in seconds
    pub fn elapsed(&self) -> f64 {
        self.timer.time()
    }

    pub fn is_timed_out(&self, bound_secs: f64) -> bool {
        self.elapsed() > bound_secs
    }

    /// Advance the exchange one step
    ///
    /// Aborts with [`Error::Timeout`] past the hard bound; otherwise
    /// sends while request bytes remain and receives after that.
    pub fn do_lap(&mut self) -> Result<()> {
        if self.timer.is_running() && self.is_timed_out(HARD_TIMEOUT_SECS) {
            debug!("probe to {} exceeded {}s, aborting", self.destination, HARD_TIMEOUT_SECS);
            self.abort();
            return Err(Error::Timeout);
        }
        if !self.outbound.is_empty() {
            self.send()
        } else {
            self.receive()
        }
    }

    /// Reset the exchange, keeping identifier and sequence
    ///
    /// Drains whatever the kernel still has queued on the socket so a
    /// stale reply cannot bleed into the next request.
    pub fn abort(&mut self) {
        let mut scratch = [0u8; RECV_CHUNK];
        loop {
            match self.socket.try_recv_from(&mut scratch) {
                Ok((0, _)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.outbound.clear();
        self.offered = false;
        self.clear_response_state();
        self.timer.stop();
    }

    fn clear_response_state(&mut self) {
        self.inbound.clear();
        self.expected_length = 0;
        self.response = None;
    }

    /// Drive one full request/response exchange to completion
    ///
    /// Readiness-driven wrapper around the state machine for use inside
    /// the runtime; resolves once a response is ready or an exchange
    /// error surfaces. The caller checks [`reply_good`](Self::reply_good)
    /// afterwards.
    pub async fn exchange(&mut self) -> Result<()> {
        self.send()?;
        while !self.is_response_ready() {
            if !self.outbound.is_empty() {
                self.socket.writable().await?;
            } else {
                self.socket.readable().await?;
            }
            self.do_lap()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identifiers_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(allocate_identifier()));
        }
    }

    #[test]
    fn test_invalid_address_rejected_before_socket_creation() {
        // Address validation runs first, so this fails the same way with
        // or without raw-socket privileges.
        let err = IcmpProbe::new("300.1.1.1", "0.0.0.0", ProbeKind::echo()).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));

        let err = IcmpProbe::new("127.0.0.1", "not-an-address", ProbeKind::Timestamp).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    // Exercises the full exchange against loopback; needs CAP_NET_RAW,
    // so it only runs when ignored tests are requested.
    #[tokio::test]
    #[ignore]
    async fn test_echo_exchange_against_loopback() {
        let mut probe = IcmpProbe::new("127.0.0.1", "127.0.0.1", ProbeKind::echo()).unwrap();
        probe.exchange().await.unwrap();

        assert!(probe.is_response_ready());
        assert!(probe.reply_good());
        let response = probe.response().unwrap();
        assert!(response.time >= 0.0);
        assert_eq!(response.icmp.icmp_type, packet::ECHO_REPLY);

        probe.abort();
        assert!(!probe.is_response_ready());
    }
}
