//! Platform abstraction over a pseudo-terminal pair.
//!
//! The frontend writes guest input lines to [`PtyPair::master`]; the worker
//! thread reads guest bytes from [`PtyPair::slave`] by handing it to
//! [`crate::vm::Vm::set_input`]. On `cfg(unix)` this is a real PTY
//! (`posix_openpt`/`grantpt`/`unlockpt` via `nix::pty::openpty`). Non-Unix
//! targets have no PTY API to bind to, so the runner falls back to an
//! in-memory duplex byte channel with identical `Read`/`Write` behavior,
//! matching spec.md §9's "falls back to direct stdin multiplexing" note.

use std::io::{self, Read, Write};

/// One end of a bridged guest-input stream.
pub trait PtyWriter: Write + Send {}
impl<T: Write + Send> PtyWriter for T {}

/// A master/slave pair: writes to `master` become reads on `slave`.
pub struct PtyPair {
    pub master: Box<dyn PtyWriter>,
    pub slave: Box<dyn Read + Send>,
}

#[cfg(unix)]
pub fn open_pair() -> io::Result<PtyPair> {
    use nix::pty::openpty;
    use std::fs::File;

    let ends = openpty(None, None).map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
    let master = File::from(ends.master);
    let slave = File::from(ends.slave);

    Ok(PtyPair {
        master: Box::new(master),
        slave: Box::new(slave),
    })
}

#[cfg(not(unix))]
pub fn open_pair() -> io::Result<PtyPair> {
    let (tx, rx) = std::sync::mpsc::channel::<u8>();

    struct ChannelWriter(std::sync::mpsc::Sender<u8>);
    impl Write for ChannelWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            for &b in buf {
                self.0
                    .send(b)
                    .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ChannelReader(std::sync::mpsc::Receiver<u8>);
    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            match self.0.recv() {
                Ok(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                Err(_) => Ok(0), // sender dropped: behaves like EOF
            }
        }
    }

    Ok(PtyPair {
        master: Box::new(ChannelWriter(tx)),
        slave: Box::new(ChannelReader(rx)),
    })
}
