//! The process-level protocol harness: runs the Echo and Telegraph
//! tickers, deduplicates peers, admits at most one session at a time, and
//! hands the resulting TCP stream to an external session callback.

use crate::accepting_set::AcceptingSet;
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::picket::Picket;
use std::net::{Ipv4Addr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

const DEFAULT_TICK: Duration = Duration::from_millis(500);
const DEFAULT_RETRY: Duration = Duration::from_millis(50);
const DEFAULT_ADMISSION_WINDOW: Duration = Duration::from_secs(60);

pub struct SessionDriver {
    picket: Picket,
    /// Configured remote peer address; present only in the client role
    /// (`-c`). When absent, the driver accepts the first authenticated
    /// peer that responds to its Echo probes.
    remote: Option<Ipv4Addr>,
    accepting: AcceptingSet,
    accepted: Arc<AtomicBool>,
    admission_window: Duration,
    echo_interval: Duration,
    telegraph_interval: Duration,
    retry_interval: Duration,
}

impl SessionDriver {
    pub fn new(picket: Picket, remote: Option<Ipv4Addr>) -> Self {
        Self {
            picket,
            remote,
            accepting: AcceptingSet::new(),
            accepted: Arc::new(AtomicBool::new(false)),
            admission_window: DEFAULT_ADMISSION_WINDOW,
            echo_interval: DEFAULT_TICK,
            telegraph_interval: DEFAULT_TICK,
            retry_interval: DEFAULT_RETRY,
        }
    }

    pub fn with_admission_window(mut self, window: Duration) -> Self {
        self.admission_window = window;
        self
    }

    /// Runs the Echo ticker (and, in the client role, the Telegraph
    /// ticker) for the lifetime of the process. `on_session` is invoked
    /// on its own thread once per accepted connection with the
    /// established stream and the discovered peer; when it returns the
    /// `AcceptedFlag` clears and the driver is ready to admit a new
    /// session (S6 — post-session reuse).
    ///
    /// Returns only if a ticker hits [`Error::Fatal`] — a raw ICMP socket
    /// could not be opened at all, typically missing `CAP_NET_RAW` — so
    /// the caller can propagate it out to `main` and exit non-zero.
    /// Transient `Network` errors never reach here; they're logged and
    /// the ticker that hit them just retries on its next tick.
    pub fn run<F>(self: Arc<Self>, on_session: F) -> Result<()>
    where
        F: Fn(TcpStream, Peer) + Send + Sync + 'static,
    {
        let on_session = Arc::new(on_session);
        let (fatal_tx, fatal_rx) = mpsc::channel::<Error>();

        if let Some(remote) = self.remote {
            let driver = self.clone();
            let fatal_tx = fatal_tx.clone();
            std::thread::Builder::new()
                .name("telegraph-ticker".into())
                .spawn(move || loop {
                    match driver.picket.telegraph(remote) {
                        Ok(()) => {}
                        Err(Error::Fatal(e)) => {
                            tracing::error!(error = %e, "telegraph ticker could not open a raw socket");
                            let _ = fatal_tx.send(Error::Fatal(e));
                            return;
                        }
                        Err(e) => tracing::debug!(error = %e, "telegraph tick failed"),
                    }
                    std::thread::sleep(driver.telegraph_interval);
                })
                .expect("failed to spawn telegraph ticker");
        }

        let driver = self.clone();
        std::thread::Builder::new()
            .name("echo-ticker".into())
            .spawn(move || loop {
                let tick_driver = driver.clone();
                let tick_on_session = on_session.clone();
                let callback: Arc<dyn Fn(Peer) + Send + Sync> = Arc::new(move |peer| {
                    tick_driver.clone().on_peer_discovered(peer, tick_on_session.clone());
                });
                match driver.picket.echo(callback) {
                    Ok(()) => {}
                    Err(Error::Fatal(e)) => {
                        tracing::error!(error = %e, "echo ticker could not open a raw socket");
                        let _ = fatal_tx.send(Error::Fatal(e));
                        return;
                    }
                    Err(e) => tracing::debug!(error = %e, "echo tick failed"),
                }
                std::thread::sleep(driver.echo_interval);
            })
            .expect("failed to spawn echo ticker");

        // Neither ticker ever returns on a non-fatal path, so this blocks
        // for the process lifetime until one of them hits `Error::Fatal`.
        match fatal_rx.recv() {
            Ok(err) => Err(err),
            Err(_) => Ok(()),
        }
    }

    fn on_peer_discovered<F>(self: Arc<Self>, peer: Peer, on_session: Arc<F>)
    where
        F: Fn(TcpStream, Peer) + Send + Sync + 'static,
    {
        if self.accepted.load(Ordering::SeqCst) {
            return;
        }
        if !self.accepting.try_admit(peer, self.admission_window) {
            return;
        }
        tracing::info!(%peer, "peer discovered");

        let deadline = Instant::now() + self.admission_window;

        // Lets sync_open hand off to the bridge the moment it succeeds,
        // instead of blocking on the burst thread running out the rest of
        // the (up to 60s) admission window before `accepted` ever flips.
        let burst_cancel = Arc::new(AtomicBool::new(false));
        let burst_driver = self.clone();
        let burst_cancel_flag = burst_cancel.clone();
        let burst_handle = std::thread::Builder::new()
            .name("telegraph-burst".into())
            .spawn(move || {
                while Instant::now() < deadline && !burst_cancel_flag.load(Ordering::SeqCst) {
                    if let Err(e) = burst_driver.picket.telegraph(peer.addr) {
                        tracing::debug!(error = %e, %peer, "telegraph burst tick failed");
                    }
                    std::thread::sleep(burst_driver.telegraph_interval);
                }
            })
            .expect("failed to spawn telegraph burst");

        let result = self.picket.sync_open(peer, self.retry_interval, deadline);
        burst_cancel.store(true, Ordering::SeqCst);
        self.accepting.release(&peer);

        // `accepted` flips (or the session spawns) before the burst thread
        // is reaped: its own cancellation check bounds how long it still
        // runs, but that teardown must never gate admission on I1.
        match result {
            Ok(stream) => {
                self.accepted.store(true, Ordering::SeqCst);
                tracing::info!(%peer, "peer connected");
                let accepted_flag = self.accepted.clone();
                std::thread::Builder::new()
                    .name("session".into())
                    .spawn(move || {
                        on_session(stream, peer);
                        accepted_flag.store(false, Ordering::SeqCst);
                        tracing::info!(%peer, "session ended");
                    })
                    .expect("failed to spawn session thread");
            }
            Err(Error::Timeout) => {
                tracing::warn!(%peer, "sync_open deadline exceeded, resuming discovery");
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "sync_open failed, resuming discovery");
            }
        }

        let _ = burst_handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picket::Picket;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    fn test_driver() -> Arc<SessionDriver> {
        let picket = Picket::new("go", "time.google.com", Ipv4Addr::new(3, 3, 3, 3), 1000);
        Arc::new(SessionDriver::new(picket, None))
    }

    #[test]
    fn an_already_accepted_session_suppresses_further_admission(/* P5 */) {
        let driver = test_driver();
        driver.accepted.store(true, Ordering::SeqCst);
        let peer = Peer::new(Ipv4Addr::new(203, 0, 113, 9));

        let calls = Arc::new(AtomicUsize::new(0));
        let on_session = {
            let calls = calls.clone();
            Arc::new(move |_stream: TcpStream, _peer: Peer| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        // The accepted-flag check is the first thing on_peer_discovered does,
        // so this returns before ever touching the AcceptingSet or opening a
        // socket via Picket — safe to run without raw-socket privileges.
        driver.clone().on_peer_discovered(peer, on_session);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Peer was never inserted into the AcceptingSet either, confirming
        // the early return happened before admission was attempted.
        assert!(driver.accepting.try_admit(peer, Duration::from_secs(60)));
    }
}
