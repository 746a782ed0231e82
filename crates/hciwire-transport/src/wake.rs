//! Cancellable blocking reads for the serial reader thread.
//!
//! The reader parks in `poll(2)` on both the device and the read end of a
//! socket pair. `close()` writes one byte to the other end, which wakes the
//! reader without touching the device.

use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Outcome of waiting on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The device has bytes (or a hangup/error the next read will report).
    Readable,
    /// A cancellation was requested.
    Cancelled,
}

/// Sending side, kept by the transport.
#[derive(Debug)]
pub(crate) struct ReadCanceller {
    tx: UnixStream,
}

/// Receiving side, owned by the reader thread.
#[derive(Debug)]
pub(crate) struct CancelSignal {
    rx: UnixStream,
}

pub(crate) fn cancel_pair() -> io::Result<(ReadCanceller, CancelSignal)> {
    let (tx, rx) = UnixStream::pair()?;
    tx.set_nonblocking(true)?;
    Ok((ReadCanceller { tx }, CancelSignal { rx }))
}

impl ReadCanceller {
    /// Wake the reader. Idempotent.
    pub(crate) fn cancel(&self) {
        // A full buffer already holds a pending wake-up.
        let _ = (&self.tx).write(&[1]);
    }
}

impl CancelSignal {
    /// Block until `fd` is readable or a cancellation arrives.
    pub(crate) fn wait_readable(&self, fd: RawFd) -> io::Result<Readiness> {
        let mut fds = [
            libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.rx.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        // SAFETY: `fds` is a valid, writable array of `pollfd` whose length is
        // passed alongside it, and both descriptors stay open for the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        if fds[1].revents != 0 {
            return Ok(Readiness::Cancelled);
        }
        if fds[0].revents & libc::POLLNVAL != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "device descriptor is not open",
            ));
        }
        Ok(Readiness::Readable)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn readable_when_data_arrives() {
        let (mut left, right) = UnixStream::pair().unwrap();
        let (_canceller, signal) = cancel_pair().unwrap();

        left.write_all(b"x").unwrap();
        let readiness = signal.wait_readable(right.as_raw_fd()).unwrap();
        assert_eq!(readiness, Readiness::Readable);
    }

    #[test]
    fn cancel_wakes_blocked_wait() {
        let (_left, right) = UnixStream::pair().unwrap();
        let (canceller, signal) = cancel_pair().unwrap();

        let waiter = std::thread::spawn(move || signal.wait_readable(right.as_raw_fd()).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        canceller.cancel();
        canceller.cancel();

        assert_eq!(waiter.join().unwrap(), Readiness::Cancelled);
    }
}
