//! Ambient configuration layering for `holepunch`: an optional TOML file
//! supplies defaults, CLI flags override the file, and compiled-in
//! defaults apply when neither is given. The wire protocol and discovery
//! semantics in `holepunch-core` never depend on this file; it is a
//! convenience layer only.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::cli::Cli;

const DEFAULT_PSK: &str = "go";
const DEFAULT_NTP: &str = "time.google.com";
const DEFAULT_PILOT_HOST: Ipv4Addr = Ipv4Addr::new(3, 3, 3, 3);
const DEFAULT_BIAS: u16 = 1000;
const DEFAULT_ADMISSION_WINDOW_SECS: u64 = 60;

/// Every field optional: a file that sets none of them is valid, and is
/// indistinguishable from no file at all.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub connect: Option<String>,
    pub psk: Option<String>,
    pub ntp: Option<String>,
    pub pilot_host: Option<String>,
    pub bias: Option<u16>,
    pub admission_window: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }
}

/// Fully resolved configuration for a single `holepunch` run.
pub struct Config {
    pub connect: Option<String>,
    pub psk: String,
    pub ntp: String,
    pub pilot_host: Ipv4Addr,
    pub bias: u16,
    pub admission_window: Duration,
}

impl Config {
    /// Merges `cli` over `file` over compiled-in defaults, in that order
    /// of precedence.
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Result<Self> {
        let pilot_host = match cli.pilot_host.clone().or_else(|| file.pilot_host.clone()) {
            Some(s) => s.parse().context("--pilot-host is not a valid IPv4 address")?,
            None => DEFAULT_PILOT_HOST,
        };

        Ok(Self {
            connect: cli.connect.clone().or_else(|| file.connect.clone()),
            psk: cli.psk.clone().or_else(|| file.psk.clone()).unwrap_or_else(|| DEFAULT_PSK.into()),
            ntp: cli.ntp.clone().or_else(|| file.ntp.clone()).unwrap_or_else(|| DEFAULT_NTP.into()),
            pilot_host,
            bias: cli.bias.or(file.bias).unwrap_or(DEFAULT_BIAS),
            admission_window: Duration::from_secs(
                cli.admission_window
                    .or(file.admission_window)
                    .unwrap_or(DEFAULT_ADMISSION_WINDOW_SECS),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["holepunch"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn cli_flag_wins_over_file_value(/* P7 */) {
        let cli = cli(&["--psk", "from-cli"]);
        let file = FileConfig { psk: Some("from-file".into()), ..Default::default() };
        let resolved = Config::resolve(&cli, &file).unwrap();
        assert_eq!(resolved.psk, "from-cli");
    }

    #[test]
    fn file_value_applies_when_cli_omits_it(/* P7 */) {
        let cli = cli(&[]);
        let file = FileConfig { ntp: Some("ntp.example.org".into()), ..Default::default() };
        let resolved = Config::resolve(&cli, &file).unwrap();
        assert_eq!(resolved.ntp, "ntp.example.org");
    }

    #[test]
    fn compiled_default_applies_when_neither_is_set() {
        let cli = cli(&[]);
        let file = FileConfig::default();
        let resolved = Config::resolve(&cli, &file).unwrap();
        assert_eq!(resolved.psk, DEFAULT_PSK);
        assert_eq!(resolved.bias, DEFAULT_BIAS);
        assert_eq!(resolved.pilot_host, DEFAULT_PILOT_HOST);
        assert_eq!(resolved.admission_window, Duration::from_secs(DEFAULT_ADMISSION_WINDOW_SECS));
    }
}
