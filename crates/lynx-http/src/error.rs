//! Socket errors.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors surfaced by the socket layer.
///
/// Faults on an established connection are not reported here; they shut
/// the connection down through the same path as an orderly EOF.
#[derive(Debug)]
pub enum TcpError {
    /// The host name did not resolve to any socket address.
    Resolve {
        /// The host that was looked up.
        host: String,
        /// Underlying resolver error.
        source: io::Error,
    },
    /// The non-blocking connect failed, or its retry policy ran out.
    UnableToConnect {
        /// The address being connected to.
        addr: SocketAddr,
        /// Underlying OS error.
        source: io::Error,
    },
    /// The socket has already been closed.
    Closed,
    /// Creating or configuring the descriptor or its registration failed.
    Io(io::Error),
}

impl fmt::Display for TcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve { host, source } => write!(f, "unable to resolve {host}: {source}"),
            Self::UnableToConnect { addr, source } => {
                write!(f, "unable to connect to {addr}: {source}")
            }
            Self::Closed => write!(f, "socket is closed"),
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
        }
    }
}

impl std::error::Error for TcpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve { source, .. } | Self::UnableToConnect { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Closed => None,
        }
    }
}

impl From<io::Error> for TcpError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
