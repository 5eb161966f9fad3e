//! CLI definitions for `holepunch`.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "holepunch",
    version,
    about = "Punch a direct TCP tunnel between two NATted hosts with no rendezvous server, then bridge it to stdio.",
    long_about = None
)]
pub struct Cli {
    /// Server address to petition as a client (DNS name or IPv4 literal).
    /// Omit to accept the first authenticated peer that responds. [default: none]
    #[clap(short = 'c', long = "connect")]
    pub connect: Option<String>,

    /// Pre-shared key used to identify valid peers. Don't make this
    /// anything sensitive — it isn't encrypted or obfuscated in any way.
    /// [default: go]
    #[clap(long = "psk")]
    pub psk: Option<String>,

    /// NTP host queried for rendezvous timing. [default: time.google.com]
    #[clap(long = "ntp")]
    pub ntp: Option<String>,

    /// Fake off-path pilot host used to bait a Time-Exceeded reply.
    /// [default: 3.3.3.3]
    #[clap(long = "pilot-host")]
    pub pilot_host: Option<String>,

    /// SharedPort BIAS constant; both peers must agree. [default: 1000]
    #[clap(long = "bias")]
    pub bias: Option<u16>,

    /// SyncOpen deadline / AcceptingSet admission window, in seconds. [default: 60]
    #[clap(long = "admission-window")]
    pub admission_window: Option<u64>,

    /// Optional TOML file providing defaults for any of the flags above;
    /// flags passed on the command line always win.
    #[clap(long = "config")]
    pub config: Option<PathBuf>,
}
