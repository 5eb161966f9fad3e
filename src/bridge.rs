//! Bridges an established peer `TcpStream` to the process's own
//! stdin/stdout, turning `holepunch` into a transparent pipe once the
//! tunnel is up. This is an external collaborator of `holepunch-core`:
//! the core protocol never touches stdio itself.

use std::io;
use std::net::TcpStream;

/// Copies `stream -> stdout` on a background thread while the calling
/// thread copies `stdin -> stream`. Returns once both directions have
/// drained, i.e. the peer closed its write half and stdin hit EOF.
pub fn run(stream: TcpStream) -> io::Result<()> {
    let mut upstream = stream.try_clone()?;
    let downstream = std::thread::Builder::new()
        .name("bridge-downstream".into())
        .spawn(move || -> io::Result<()> {
            let mut stdout = io::stdout();
            io::copy(&mut upstream, &mut stdout)?;
            Ok(())
        })
        .expect("failed to spawn bridge downstream thread");

    let mut stream = stream;
    let mut stdin = io::stdin();
    let copy_result = io::copy(&mut stdin, &mut stream);
    let _ = stream.shutdown(std::net::Shutdown::Write);

    copy_result?;
    downstream.join().expect("bridge downstream thread panicked")
}
