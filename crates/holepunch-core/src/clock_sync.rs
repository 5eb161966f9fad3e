//! Queries an external NTP server and returns a rendezvous instant that
//! both peers converge on independently, with round-trip compensation.

use crate::error::{Error, Result};
use rsntp::SntpClient;
use std::time::SystemTime;

/// Queries `ntp_host` and returns `server_time + round_trip_time`, the
/// instant both peers use as R (§4.2). Each call re-queries the server;
/// there is no caching, since the whole point is to bound clock drift
/// freshly for every SyncOpen attempt.
pub fn query(ntp_host: &str) -> Result<SystemTime> {
    let client = SntpClient::new();
    let result = client
        .synchronize(ntp_host)
        .map_err(|e| Error::Ntp(e.to_string()))?;

    let server_time: SystemTime = result
        .datetime()
        .try_into()
        .map_err(|_| Error::Ntp("ntp server returned an out-of-range timestamp".into()))?;

    server_time
        .checked_add(result.round_trip_delay())
        .ok_or_else(|| Error::Ntp("ntp correction overflowed".into()))
}
