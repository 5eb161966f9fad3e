//! Core NAT traversal protocol powering `holepunch`: a forged-ICMP
//! discovery handshake, an NTP-synchronised simultaneous TCP open, and the
//! concurrency harness that ties discovery, telegraphing, connect retries
//! and single-session admission together.
//!
//! The command-line front end, hostname resolution, and the stdio byte
//! pipe live in the `holepunch` binary crate; this crate is deliberately
//! silent on all three.

pub mod accepting_set;
pub mod clock_sync;
pub mod driver;
pub mod echo_codec;
pub mod error;
pub mod peer;
pub mod picket;
pub mod port_deriver;

pub use accepting_set::AcceptingSet;
pub use driver::SessionDriver;
pub use error::{Error, Result};
pub use peer::Peer;
pub use picket::Picket;
