//! The Picket: stateless-except-for-config ICMP discovery and
//! NTP-synchronised simultaneous-open primitives. Every ICMP operation
//! opens and closes a fresh raw socket; the Picket itself holds no
//! long-lived sockets.

use crate::echo_codec::{self, Incoming, ICMP_ECHO_REQUEST};
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::{clock_sync, port_deriver};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

const READ_TIMEOUT: Duration = Duration::from_secs(1);
const PROBE_PEER: (&str, u16) = ("1.1.1.1", 80);

#[derive(Debug, Clone)]
pub struct Picket {
    pub psk: String,
    pub ntp_host: String,
    pub pilot_host: Ipv4Addr,
    pub bias: u16,
}

impl Picket {
    pub fn new(psk: impl Into<String>, ntp_host: impl Into<String>, pilot_host: Ipv4Addr, bias: u16) -> Self {
        Self { psk: psk.into(), ntp_host: ntp_host.into(), pilot_host, bias }
    }

    /// Emits one forged ICMP Time-Exceeded at `target`, as if a pilot Echo
    /// it never sent had just expired in transit.
    pub fn telegraph(&self, target: Ipv4Addr) -> Result<()> {
        let socket = self.open_icmp_socket()?;
        let echo = echo_codec::make_echo(&self.psk);
        let echo_bytes = echo_codec::marshal_echo(ICMP_ECHO_REQUEST, &echo);
        let packet = echo_codec::marshal_time_exceeded(&echo_bytes);
        let dest: SockAddr = SocketAddr::new(IpAddr::V4(target), 0).into();
        socket.send_to(&packet, &dest).map_err(Error::Network)?;
        Ok(())
    }

    /// Sends one pilot Echo Request and waits up to 1s for a single
    /// authenticated reply, invoking `on_discovered` off this thread when
    /// one arrives. Returns `Ok(())` on a timeout, a mismatched PSK, or
    /// any other packet shape — none of those are errors in this
    /// protocol's control flow.
    pub fn echo(&self, on_discovered: Arc<dyn Fn(Peer) + Send + Sync>) -> Result<()> {
        let socket = self.open_icmp_socket()?;
        socket.set_read_timeout(Some(READ_TIMEOUT)).map_err(Error::Network)?;

        let echo = echo_codec::make_echo(&self.psk);
        let sent_bytes = echo_codec::marshal_echo(ICMP_ECHO_REQUEST, &echo);
        let dest: SockAddr = SocketAddr::new(IpAddr::V4(self.pilot_host), 0).into();
        socket.send_to(&sent_bytes, &dest).map_err(Error::Network)?;

        let mut buf = [MaybeUninit::uninit(); 1024];
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(());
            }
            Err(e) => return Err(Error::Network(e)),
        };
        // SAFETY: MaybeUninit<u8> and u8 share layout; recv_from guarantees
        // the first `n` slots were written by the kernel.
        let data: Vec<u8> = buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();

        let peer_ip = match from.as_socket() {
            Some(SocketAddr::V4(addr)) => *addr.ip(),
            _ => return Ok(()),
        };

        let authentic = match echo_codec::parse_incoming(&data) {
            Incoming::TimeExceeded { inner } => inner == sent_bytes,
            Incoming::EchoReply { identifier, .. } => identifier == echo.identifier,
            Incoming::Other => false,
        };

        if authentic {
            let peer = Peer::new(peer_ip);
            // Dispatched off the I/O thread: the SessionDriver's admission
            // logic and telegraph burst must not block this ticker.
            std::thread::spawn(move || on_discovered(peer));
        }

        Ok(())
    }

    /// Aligns to the NTP-derived rendezvous instant and repeatedly
    /// attempts a simultaneously-opened TCP connection to `peer` on the
    /// shared derived port, until success or `deadline`.
    pub fn sync_open(&self, peer: Peer, retry_interval: Duration, deadline: Instant) -> Result<TcpStream> {
        let rendezvous = clock_sync::query(&self.ntp_host)?;
        let local_ip = Self::discover_local_ip()?;
        let port = port_deriver::port_for(rendezvous, self.bias);

        let local_addr = SocketAddr::new(IpAddr::V4(local_ip), port);
        let remote_addr = SocketAddr::new(IpAddr::V4(peer.addr), port);

        if let Ok(sleep_for) = rendezvous.duration_since(SystemTime::now()) {
            std::thread::sleep(sleep_for);
        }

        loop {
            let attempt_start = Instant::now();
            if let Ok(stream) = Self::dial(local_addr, remote_addr, retry_interval) {
                return Ok(stream);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            let elapsed = attempt_start.elapsed();
            if elapsed < retry_interval {
                std::thread::sleep(retry_interval - elapsed);
            }
        }
    }

    fn open_icmp_socket(&self) -> Result<Socket> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(Error::Fatal)?;
        let bind_addr: SockAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into();
        socket.bind(&bind_addr).map_err(Error::Fatal)?;
        Ok(socket)
    }

    /// A connection attempt refused or timed out is retried identically —
    /// both occur naturally while the peer has not yet bound its side.
    fn dial(local: SocketAddr, remote: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&local.into())?;
        socket.connect_timeout(&remote.into(), timeout)?;
        Ok(socket.into())
    }

    fn discover_local_ip() -> Result<Ipv4Addr> {
        let probe = TcpStream::connect(PROBE_PEER).map_err(Error::Network)?;
        match probe.local_addr().map_err(Error::Network)?.ip() {
            IpAddr::V4(ip) => Ok(ip),
            IpAddr::V6(_) => Err(Error::Network(io::Error::new(
                io::ErrorKind::Unsupported,
                "outbound probe returned an IPv6 local address",
            ))),
        }
    }
}
