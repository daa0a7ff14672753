//! Bounded readiness waits over `poll(2)`.

use std::os::fd::BorrowedFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Pause after a readiness failure that is neither a timeout nor an interrupt.
pub(crate) const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Events that make a client connection worth servicing.
pub(crate) fn interest() -> PollFlags {
    PollFlags::POLLIN
}

/// Readiness bits that mean a client is gone or unusable.
pub(crate) fn failure_flags() -> PollFlags {
    PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL
}

/// Converts a wait bound into a `poll` timeout, saturating at the largest
/// representable value.
pub(crate) fn poll_timeout(bound: Duration) -> PollTimeout {
    let millis = u16::try_from(bound.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(millis)
}

/// Waits up to `bound` for `fd` to become readable.
///
/// Returns `Ok(false)` on timeout.
pub(crate) fn wait_readable(fd: BorrowedFd<'_>, bound: Duration) -> Result<bool, Errno> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ready = poll(&mut fds, poll_timeout(bound))?;
    if ready == 0 {
        return Ok(false);
    }
    Ok(fds
        .first()
        .and_then(|fd| fd.revents())
        .is_some_and(|flags| flags.contains(PollFlags::POLLIN)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsFd;

    use super::*;

    #[test]
    fn idle_socket_times_out() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let ready =
            wait_readable(listener.as_fd(), Duration::from_millis(10)).expect("poll listener");
        assert!(!ready);
    }

    #[test]
    fn pending_data_is_readable() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let mut client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        client.write_all(b"ping\n").expect("write");

        let ready = wait_readable(server.as_fd(), Duration::from_secs(2)).expect("poll stream");
        assert!(ready);
    }
}
