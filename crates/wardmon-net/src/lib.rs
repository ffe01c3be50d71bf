//! Wardmon Network Layer
//!
//! Everything that touches the wire on the probing side: dotted-quad
//! validation, the Internet checksum, the ICMP type registry, IPv4+ICMP
//! datagram construction and parsing, and the per-target probe engine
//! over its own raw socket.
//!
//! # Example
//!
//! ```no_run
//! use wardmon_net::{IcmpProbe, ProbeKind};
//!
//! # async fn example() -> wardmon_core::Result<()> {
//! let mut probe = IcmpProbe::new("192.168.1.1", "0.0.0.0", ProbeKind::echo())?;
//! probe.exchange().await?;
//! if probe.reply_good() {
//!     println!("round trip: {:.6}s", probe.response().unwrap().time);
//! }
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod checksum;
pub mod icmp_type;
pub mod packet;
pub mod probe;
pub mod socket;

pub use checksum::{internet_checksum, ByteOrder};
pub use icmp_type::{describe, lookup, IcmpTypeInfo};
pub use packet::{IcmpMessage, Ipv4Header, ParsedIcmp, ProbeKind};
pub use probe::{IcmpProbe, ProbeResponse, HARD_TIMEOUT_SECS};
pub use socket::RawIcmpSocket;
