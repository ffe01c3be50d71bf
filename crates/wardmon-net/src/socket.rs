//! Raw ICMP socket registered with the tokio reactor
//!
//! Each probe owns one `AF_INET/SOCK_RAW/IPPROTO_ICMP` socket with
//! `IP_HDRINCL` set, created through `socket2` and handed to tokio as a
//! non-blocking UDP socket so readiness integrates with the runtime.
//! Requires elevated privileges (CAP_NET_RAW or root on Unix).

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
#[cfg(unix)]
use std::os::fd::{FromRawFd, IntoRawFd};
#[cfg(windows)]
use std::os::windows::io::{FromRawSocket, IntoRawSocket};
use tokio::net::UdpSocket;

#[derive(Debug)]
pub struct RawIcmpSocket {
    inner: UdpSocket,
}

impl RawIcmpSocket {
    /// Create a non-blocking raw IPv4 socket carrying its own IP headers
    pub fn new() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.set_header_included(true)?;
        socket.set_nonblocking(true)?;

        #[cfg(unix)]
        let std_socket = unsafe { std::net::UdpSocket::from_raw_fd(socket.into_raw_fd()) };
        #[cfg(windows)]
        let std_socket =
            unsafe { std::net::UdpSocket::from_raw_socket(socket.into_raw_socket()) };

        Ok(Self {
            inner: UdpSocket::from_std(std_socket)?,
        })
    }

    /// Offer bytes to the kernel without blocking
    ///
    /// Returns how many were accepted; the raw layer may take fewer than
    /// offered, and the caller re-offers the remainder.
    pub fn try_send_to(&self, buf: &[u8], destination: Ipv4Addr) -> io::Result<usize> {
        self.inner
            .try_send_to(buf, SocketAddr::V4(SocketAddrV4::new(destination, 0)))
    }

    /// Drain available bytes without blocking
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.try_recv_from(buf)
    }

    /// Wait until the socket is ready for writing
    pub async fn writable(&self) -> io::Result<()> {
        self.inner.writable().await
    }

    /// Wait until the socket has bytes to read
    pub async fn readable(&self) -> io::Result<()> {
        self.inner.readable().await
    }
}
