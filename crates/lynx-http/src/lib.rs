//! Non-blocking TCP transport.
//!
//! A [`TcpSocket`] is created non-blocking, connects with a busy-poll retry
//! loop and reports read readiness through its own `mio` poller. A
//! [`TcpClient`] pairs a socket with a callback that receives every chunk
//! read from the connection.
//!
//! # Example
//!
//! ```ignore
//! use lynx_http::TcpClient;
//!
//! let mut client = TcpClient::connect_to("127.0.0.1", 8080, |chunk| {
//!     println!("received {} bytes", chunk.len());
//! })?;
//! client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
//! client.run()?;
//! ```

#![deny(unsafe_code)]

mod client;
mod config;
mod error;
pub mod multipart;
mod registration;
mod socket;

pub use client::{ReadCallback, TcpClient};
pub use config::{ConnectPolicy, DEFAULT_EVENTS_CAPACITY, SocketConfig};
pub use error::TcpError;
pub use socket::{CloseCallback, RECV_BUFFER_SIZE, SocketState, TcpSocket};
