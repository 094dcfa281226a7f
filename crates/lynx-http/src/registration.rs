//! Read-readiness registration for one descriptor.
//!
//! Each socket owns a private [`mio::Poll`] with a single readable
//! interest. mio registers edge-triggered, so the interest is re-armed
//! after every successful read to keep buffered data from going unseen.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

const READ_TOKEN: Token = Token(0);

pub(crate) struct ReadRegistration {
    poll: Poll,
    events: Events,
    fd: RawFd,
    active: bool,
}

impl ReadRegistration {
    /// Register read interest for `fd`.
    pub(crate) fn register(fd: RawFd, capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut SourceFd(&fd), READ_TOKEN, Interest::READABLE)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(capacity),
            fd,
            active: true,
        })
    }

    /// Wait up to `timeout` and return how many readiness signals arrived.
    ///
    /// An interrupted wait reports zero signals.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        if !self.active {
            return Ok(0);
        }
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => Ok(self
                .events
                .iter()
                .filter(|event| event.token() == READ_TOKEN)
                .count()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn rearm(&self) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(&mut SourceFd(&self.fd), READ_TOKEN, Interest::READABLE)
    }

    /// Drop read interest. Returns `false` if already cancelled.
    ///
    /// Must run while the descriptor is still open.
    pub(crate) fn cancel(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&self.fd)) {
            tracing::debug!(fd = self.fd, error = %e, "deregister failed");
        }
        true
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }
}

impl std::fmt::Debug for ReadRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadRegistration")
            .field("fd", &self.fd)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
