//! Non-blocking TCP socket with a busy-poll connect and event-driven reads.
//!
//! A [`TcpSocket`] owns its descriptor, its read registration and a fixed
//! receive buffer. Connection teardown always runs in the same order:
//! read interest is cancelled, then the descriptor is closed, then the
//! close callback runs. Each step happens at most once.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::{ConnectPolicy, SocketConfig};
use crate::error::TcpError;
use crate::registration::ReadRegistration;

/// Size of the receive buffer. One read never delivers more than this.
pub const RECV_BUFFER_SIZE: usize = u16::MAX as usize;

/// Callback run once after the descriptor has been closed.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Lifecycle of a [`TcpSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Descriptor created, no connect attempted yet.
    Created,
    /// Connect retry loop in progress.
    Connecting,
    /// Handshake complete.
    Connected,
    /// Teardown in progress.
    Closing,
    /// Descriptor closed. Terminal.
    Closed,
}

/// How a single receive attempt ended.
enum Received {
    Data,
    Nothing,
    Shutdown,
}

/// A non-blocking TCP client socket.
pub struct TcpSocket {
    addr: SocketAddr,
    config: SocketConfig,
    descriptor: Option<Socket>,
    registration: Option<ReadRegistration>,
    buffer: Box<[u8]>,
    state: SocketState,
    on_close: Option<CloseCallback>,
}

impl TcpSocket {
    /// Resolve `host` and create a socket for the first address found.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Resolve`] if the lookup fails or yields nothing,
    /// or [`TcpError::Io`] if the descriptor cannot be created.
    pub fn new(host: &str, port: u16) -> Result<Self, TcpError> {
        Self::with_config(host, port, SocketConfig::default())
    }

    /// Like [`TcpSocket::new`] with an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`TcpSocket::new`].
    pub fn with_config(host: &str, port: u16, config: SocketConfig) -> Result<Self, TcpError> {
        let addr = resolve(host, port)?;
        Self::from_addr(addr, config)
    }

    /// Create a socket for an already resolved address.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Io`] if the descriptor cannot be created or
    /// configured.
    pub fn from_addr(addr: SocketAddr, config: SocketConfig) -> Result<Self, TcpError> {
        let descriptor = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        descriptor.set_nonblocking(true)?;
        if config.get_keepalive() {
            descriptor.set_keepalive(true)?;
        }
        tracing::trace!(%addr, fd = descriptor.as_raw_fd(), "socket created");

        Ok(Self {
            addr,
            config,
            descriptor: Some(descriptor),
            registration: None,
            buffer: vec![0; RECV_BUFFER_SIZE].into_boxed_slice(),
            state: SocketState::Created,
            on_close: None,
        })
    }

    /// The address this socket connects to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Whether the descriptor has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SocketState::Closed
    }

    /// The raw descriptor, or `None` once closed.
    #[must_use]
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.descriptor.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Whether read interest is currently registered.
    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(ReadRegistration::is_active)
    }

    /// The configuration this socket was built with.
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Local address of the descriptor.
    ///
    /// # Errors
    ///
    /// Fails if the socket is closed or the OS lookup fails.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        to_inet(self.open_descriptor()?.local_addr()?)
    }

    /// Address of the connected peer.
    ///
    /// # Errors
    ///
    /// Fails if the socket is closed or not connected.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        to_inet(self.open_descriptor()?.peer_addr()?)
    }

    /// Install the callback that runs after the descriptor is closed.
    ///
    /// Replaces any earlier callback. Has no effect once the socket is
    /// closed.
    pub fn set_on_close(&mut self, callback: CloseCallback) {
        if !self.is_closed() {
            self.on_close = Some(callback);
        }
    }

    /// Connect, retrying while the OS reports the handshake as pending.
    ///
    /// The calling thread spins (or sleeps per the configured backoff)
    /// until the handshake resolves. A connect that ends in `EISCONN`
    /// counts as success. Any other outcome, including an exhausted retry
    /// policy, closes the socket.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Closed`] if the socket was already closed and
    /// [`TcpError::UnableToConnect`] if the handshake failed.
    pub fn connect(&mut self) -> Result<(), TcpError> {
        match self.state {
            SocketState::Created => {}
            SocketState::Connected => return Ok(()),
            SocketState::Connecting | SocketState::Closing | SocketState::Closed => {
                return Err(TcpError::Closed);
            }
        }
        let descriptor = self.descriptor.as_ref().ok_or(TcpError::Closed)?;
        self.state = SocketState::Connecting;

        let target = SockAddr::from(self.addr);
        let (attempts, outcome) =
            retry_while_pending(self.config.get_connect_policy(), || descriptor.connect(&target));

        if let Err(source) = settle(outcome) {
            tracing::debug!(addr = %self.addr, attempts, error = %source, "connect failed");
            self.close();
            return Err(TcpError::UnableToConnect {
                addr: self.addr,
                source,
            });
        }

        self.state = SocketState::Connected;
        tracing::debug!(addr = %self.addr, attempts, "connected");
        Ok(())
    }

    /// Register read interest with the socket's own poller.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Closed`] if the socket is closed, or
    /// [`TcpError::Io`] if the registration fails.
    pub fn start_reading(&mut self) -> Result<(), TcpError> {
        if self.registration.is_some() {
            return Ok(());
        }
        let fd = self.raw_fd().ok_or(TcpError::Closed)?;
        self.registration = Some(ReadRegistration::register(
            fd,
            self.config.get_events_capacity(),
        )?);
        tracing::trace!(addr = %self.addr, fd, "read interest registered");
        Ok(())
    }

    /// Wait up to `timeout` for readiness and perform one receive per
    /// readiness signal, handing each non-empty read to `on_read`.
    ///
    /// Returns the number of chunks delivered. EOF or a receive error
    /// closes the socket; later turns deliver nothing and return `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` if reading was never started, or with
    /// the poller's error if waiting itself fails.
    pub fn turn(
        &mut self,
        timeout: Option<Duration>,
        on_read: &mut dyn FnMut(&[u8]),
    ) -> io::Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }
        let Some(registration) = self.registration.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is not registered for reading",
            ));
        };

        let signals = registration.wait(timeout)?;
        let mut delivered = 0;
        for _ in 0..signals {
            match self.receive(on_read) {
                Received::Data => delivered += 1,
                Received::Nothing => {}
                Received::Shutdown => break,
            }
        }
        Ok(delivered)
    }

    fn receive(&mut self, on_read: &mut dyn FnMut(&[u8])) -> Received {
        let Some(descriptor) = self.descriptor.as_ref() else {
            return Received::Shutdown;
        };
        let mut reader: &Socket = descriptor;
        match reader.read(&mut self.buffer) {
            Ok(0) => {
                tracing::debug!(addr = %self.addr, "peer closed the connection");
                self.close();
                Received::Shutdown
            }
            Ok(n) => {
                on_read(&self.buffer[..n]);
                let rearmed = self
                    .registration
                    .as_ref()
                    .map_or(Ok(()), ReadRegistration::rearm);
                if let Err(e) = rearmed {
                    tracing::debug!(addr = %self.addr, error = %e, "re-arming read interest failed");
                    self.close();
                }
                Received::Data
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Received::Nothing
            }
            Err(e) => {
                tracing::debug!(addr = %self.addr, error = %e, "receive failed");
                self.close();
                Received::Shutdown
            }
        }
    }

    /// Write all of `data`, yielding the thread while the send buffer is
    /// full.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` once closed, or with the OS error.
    pub fn send(&mut self, mut data: &[u8]) -> io::Result<()> {
        let descriptor = self.open_descriptor()?;
        let mut writer: &Socket = descriptor;
        while !data.is_empty() {
            match writer.write(data) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Close the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == SocketState::Closed {
            return;
        }
        self.state = SocketState::Closing;
        if let Some(mut registration) = self.registration.take() {
            registration.cancel();
        }
        self.on_cancelled();
    }

    /// Runs after read interest is gone. Only the first call has effect.
    fn on_cancelled(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            let fd = descriptor.as_raw_fd();
            drop(descriptor);
            tracing::debug!(addr = %self.addr, fd, "descriptor closed");
        }
        self.state = SocketState::Closed;
        if let Some(callback) = self.on_close.take() {
            callback();
        }
    }

    fn open_descriptor(&self) -> io::Result<&Socket> {
        self.descriptor
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is closed"))
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpSocket")
            .field("addr", &self.addr)
            .field("fd", &self.raw_fd())
            .field("state", &self.state)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, TcpError> {
    let mut addrs = (host, port).to_socket_addrs().map_err(|source| TcpError::Resolve {
        host: host.to_string(),
        source,
    })?;
    addrs.next().ok_or_else(|| TcpError::Resolve {
        host: host.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
    })
}

fn to_inet(addr: SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "not an internet socket address")
    })
}

fn is_pending(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EINPROGRESS | libc::EALREADY))
}

fn is_connected(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EISCONN)
}

/// Call `attempt` until it stops reporting a pending handshake or `policy`
/// runs out. Returns the number of calls made and the final result.
///
/// Running out of policy while still pending yields `TimedOut`.
fn retry_while_pending(
    policy: &ConnectPolicy,
    mut attempt: impl FnMut() -> io::Result<()>,
) -> (usize, io::Result<()>) {
    let started = Instant::now();
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match attempt() {
            Err(e) if is_pending(&e) => {
                if !policy.allows_retry(attempts, started.elapsed()) {
                    let exhausted = io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect still pending after {attempts} attempts"),
                    );
                    return (attempts, Err(exhausted));
                }
                match policy.get_backoff() {
                    Some(backoff) => thread::sleep(backoff),
                    None => std::hint::spin_loop(),
                }
            }
            outcome => return (attempts, outcome),
        }
    }
}

/// Map the last connect result to success or failure.
fn settle(outcome: io::Result<()>) -> io::Result<()> {
    match outcome {
        Err(e) if is_connected(&e) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn new_socket_is_created_and_open() {
        let (_listener, addr) = listener();
        let socket = TcpSocket::from_addr(addr, SocketConfig::default()).unwrap();
        assert_eq!(socket.state(), SocketState::Created);
        assert!(socket.raw_fd().is_some());
        assert!(!socket.is_reading());
        assert_eq!(socket.addr(), addr);
    }

    #[test]
    fn resolve_rejects_unknown_host() {
        let err = TcpSocket::new("host.invalid", 80).unwrap_err();
        assert!(matches!(err, TcpError::Resolve { ref host, .. } if host == "host.invalid"));
    }

    #[test]
    fn connect_reaches_listener() {
        let (_listener, addr) = listener();
        let mut socket = TcpSocket::new("127.0.0.1", addr.port()).unwrap();
        socket.connect().unwrap();
        assert_eq!(socket.state(), SocketState::Connected);
        assert_eq!(socket.peer_addr().unwrap(), addr);
        // A second connect is a no-op.
        socket.connect().unwrap();
    }

    #[test]
    fn close_before_connect_runs_callback_once() {
        let (_listener, addr) = listener();
        let mut socket = TcpSocket::from_addr(addr, SocketConfig::default()).unwrap();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        socket.set_on_close(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        socket.close();
        socket.close();
        drop(socket);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_socket_refuses_connect_and_io() {
        let (_listener, addr) = listener();
        let mut socket = TcpSocket::from_addr(addr, SocketConfig::default()).unwrap();
        socket.close();
        assert!(matches!(socket.connect(), Err(TcpError::Closed)));
        assert!(matches!(socket.start_reading(), Err(TcpError::Closed)));
        assert_eq!(
            socket.send(b"x").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(socket.turn(None, &mut |_: &[u8]| {}).unwrap(), 0);
    }

    #[test]
    fn turn_without_registration_is_not_connected() {
        let (_listener, addr) = listener();
        let mut socket = TcpSocket::from_addr(addr, SocketConfig::default()).unwrap();
        let err = socket.turn(Some(Duration::ZERO), &mut |_: &[u8]| {}).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn pending_classification() {
        let pending = io::Error::from_raw_os_error(libc::EALREADY);
        let in_progress = io::Error::from_raw_os_error(libc::EINPROGRESS);
        let connected = io::Error::from_raw_os_error(libc::EISCONN);
        let refused = io::Error::from_raw_os_error(libc::ECONNREFUSED);

        assert!(is_pending(&pending) && is_pending(&in_progress));
        assert!(!is_pending(&connected) && !is_pending(&refused));
        assert!(is_connected(&connected));
        assert!(!is_connected(&pending) && !is_connected(&in_progress) && !is_connected(&refused));
    }

    fn os_error(code: i32) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(code))
    }

    #[test]
    fn attempt_limit_turns_pending_into_timed_out() {
        let policy = ConnectPolicy::unbounded().max_attempts(3);
        let mut calls = 0;
        let (attempts, outcome) = retry_while_pending(&policy, || {
            calls += 1;
            os_error(libc::EALREADY)
        });

        assert_eq!((attempts, calls), (3, 3));
        let err = settle(outcome).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn elapsed_deadline_stops_after_first_attempt() {
        let policy = ConnectPolicy::unbounded().deadline(Duration::ZERO);
        let (attempts, outcome) = retry_while_pending(&policy, || os_error(libc::EINPROGRESS));

        assert_eq!(attempts, 1);
        assert_eq!(settle(outcome).unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn pending_then_already_connected_settles_as_success() {
        let mut script = vec![libc::EISCONN, libc::EALREADY, libc::EINPROGRESS];
        let (attempts, outcome) = retry_while_pending(&ConnectPolicy::unbounded(), || {
            os_error(script.pop().unwrap())
        });

        assert_eq!(attempts, 3);
        assert!(settle(outcome).is_ok());
    }

    #[test]
    fn hard_failure_ends_the_loop_immediately() {
        let (attempts, outcome) =
            retry_while_pending(&ConnectPolicy::unbounded(), || os_error(libc::ECONNREFUSED));

        assert_eq!(attempts, 1);
        let err = settle(outcome).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    }

    #[test]
    fn immediate_success_needs_one_attempt() {
        let (attempts, outcome) = retry_while_pending(&ConnectPolicy::unbounded(), || Ok(()));
        assert_eq!(attempts, 1);
        assert!(settle(outcome).is_ok());
    }
}
