//! Error taxonomy for the NAT traversal core.
//!
//! A received ICMP message that fails the PSK-derived authentication check is
//! *not* represented here: it is not an error in this protocol's control flow,
//! it is silently dropped at the point of parsing (see [`crate::picket`]).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient I/O failure on an ICMP or TCP socket. The caller's ticker
    /// retries on its next tick; this is never fatal to the process.
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// The NTP round trip did not complete. Fatal to the current SyncOpen
    /// attempt, not to the process.
    #[error("ntp query failed: {0}")]
    Ntp(String),

    /// SyncOpen exceeded its deadline without a successful connect.
    #[error("sync_open deadline exceeded")]
    Timeout,

    /// Unable to open a raw ICMP socket at all — typically missing
    /// `CAP_NET_RAW`. Surfaced to the caller for process termination.
    #[error("fatal: could not open raw socket: {0}")]
    Fatal(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
