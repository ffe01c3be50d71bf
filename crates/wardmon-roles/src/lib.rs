//! Wardmon Roles
//!
//! The two runtime roles of the reachability monitor and the wire
//! protocol between them. A monitor accepts any number of testers over
//! the newline-framed control channel; each tester fetches its probe
//! configuration from the monitor, then runs ICMP and HTTP probe cycles
//! and ships a statistics snapshot per cycle.

pub mod codec;
pub mod http;
pub mod monitor;
pub mod tester;

pub use codec::{Command, LineCodec};
pub use http::{HttpProber, HttpTarget, HTTP_REQUEST_TIMEOUT, HTTP_WORKERS};
pub use monitor::{Monitor, PeerState, Registry};
pub use tester::{build_probe_set, IcmpTarget, CYCLE_INTERVAL, ICMP_PHASE_BUDGET};
