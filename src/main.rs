//! holepunch — NAT-to-NAT TCP tunnel with no rendezvous server.
//!
//! Abuses ICMP error semantics and an NTP-synchronised simultaneous TCP
//! open to punch a bidirectional hole through two independent NATs, then
//! bridges the resulting stream to the process's stdin/stdout. Run
//! `holepunch --help` for usage.

use anyhow::{Context, Result};
use clap::Parser;
use holepunch_core::{Picket, SessionDriver};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod bridge;
mod cli;
mod config;

use cli::Cli;
use config::{Config, FileConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = Config::resolve(&cli, &file_config)?;

    let remote = config.connect.as_deref().map(resolve_peer).transpose()?;

    match remote {
        Some(ip) => tracing::info!(peer = %ip, "acting as client, telegraphing configured peer"),
        None => tracing::info!("listening for the first authenticated peer"),
    }

    let picket = Picket::new(config.psk, config.ntp, config.pilot_host, config.bias);
    let driver =
        Arc::new(SessionDriver::new(picket, remote).with_admission_window(config.admission_window));

    driver.run(|stream, peer| {
        tracing::info!(%peer, "bridging stdio to peer");
        if let Err(e) = bridge::run(stream) {
            tracing::warn!(%peer, error = %e, "stdio bridge ended with an error");
        }
    })?;

    Ok(())
}

/// Resolves a DNS name or IPv4 literal to the address this protocol
/// speaks. Hostname resolution is an external collaborator of the core —
/// `holepunch-core` never looks up a name itself.
fn resolve_peer(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    (host, 0u16)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve hostname: {host}"))?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .with_context(|| format!("hostname did not resolve to an IPv4 address: {host}"))
}
