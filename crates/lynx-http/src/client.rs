//! TCP client that feeds received bytes to a callback.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::SocketConfig;
use crate::error::TcpError;
use crate::socket::{SocketState, TcpSocket};

/// Callback receiving each chunk read from the connection.
pub type ReadCallback = Box<dyn FnMut(&[u8]) + Send>;

/// A connected-or-connecting TCP client.
///
/// The client drives its own poller: call [`TcpClient::turn`] or
/// [`TcpClient::run`] on the owning thread to deliver data. Chunks arrive in
/// receive order, at most [`RECV_BUFFER_SIZE`](crate::RECV_BUFFER_SIZE) bytes
/// each, and never after the connection has shut down.
pub struct TcpClient {
    socket: TcpSocket,
    on_read: ReadCallback,
}

impl TcpClient {
    /// Resolve `host` and build an unconnected client.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Resolve`] or [`TcpError::Io`].
    pub fn new<F>(host: &str, port: u16, on_read: F) -> Result<Self, TcpError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        Self::with_config(host, port, SocketConfig::default(), on_read)
    }

    /// Like [`TcpClient::new`] with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Resolve`] or [`TcpError::Io`].
    pub fn with_config<F>(
        host: &str,
        port: u16,
        config: SocketConfig,
        on_read: F,
    ) -> Result<Self, TcpError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        Ok(Self {
            socket: TcpSocket::with_config(host, port, config)?,
            on_read: Box::new(on_read),
        })
    }

    /// Build an unconnected client for a resolved address.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::Io`] if the descriptor cannot be created.
    pub fn from_addr<F>(addr: SocketAddr, config: SocketConfig, on_read: F) -> Result<Self, TcpError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        Ok(Self {
            socket: TcpSocket::from_addr(addr, config)?,
            on_read: Box::new(on_read),
        })
    }

    /// Resolve, connect and start reading in one step.
    ///
    /// # Errors
    ///
    /// Any error from construction or [`TcpClient::connect`].
    pub fn connect_to<F>(host: &str, port: u16, on_read: F) -> Result<Self, TcpError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let mut client = Self::new(host, port, on_read)?;
        client.connect()?;
        Ok(client)
    }

    /// Run `callback` once after the connection is torn down.
    #[must_use]
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.socket.set_on_close(Box::new(callback));
        self
    }

    /// Connect and register read interest.
    ///
    /// # Errors
    ///
    /// Returns [`TcpError::UnableToConnect`] if the handshake fails, or
    /// [`TcpError::Io`] if read interest cannot be registered. Either way
    /// the socket ends up closed.
    pub fn connect(&mut self) -> Result<(), TcpError> {
        self.socket.connect()?;
        if let Err(e) = self.socket.start_reading() {
            tracing::debug!(addr = %self.socket.addr(), error = %e, "read registration failed");
            self.socket.close();
            return Err(e);
        }
        Ok(())
    }

    /// Wait up to `timeout` and deliver any received data.
    ///
    /// Returns the number of chunks handed to the read callback.
    ///
    /// # Errors
    ///
    /// Fails if the client was never connected or the poller fails.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.socket.turn(timeout, &mut *self.on_read)
    }

    /// Deliver data until the connection shuts down.
    ///
    /// # Errors
    ///
    /// See [`TcpClient::turn`].
    pub fn run(&mut self) -> io::Result<()> {
        while !self.socket.is_closed() {
            self.turn(None)?;
        }
        Ok(())
    }

    /// Write all of `data` to the peer.
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed, or with the OS error.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.socket.send(data)
    }

    /// Tear the connection down. Idempotent.
    pub fn close(&mut self) {
        self.socket.close();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.socket.state()
    }

    /// Whether the connection has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.socket.is_closed()
    }

    /// The underlying socket.
    #[must_use]
    pub fn socket(&self) -> &TcpSocket {
        &self.socket
    }

    /// Local address of the connection.
    ///
    /// # Errors
    ///
    /// Fails once closed.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Address of the peer.
    ///
    /// # Errors
    ///
    /// Fails once closed or before the handshake completes.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

impl fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClient")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}
