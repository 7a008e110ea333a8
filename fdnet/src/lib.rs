#![allow(private_bounds)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # fdnet
//!
//! Safe ownership of kernel descriptors and a small socket layer on top.
//!
//! Everything starts at [`DescriptorHandle`]: a move-only, reference-counted
//! handle to one descriptor that closes it exactly once, tracks end-of-stream
//! and counts read and write events. Sockets are thin newtypes over a handle
//! with capability traits for what they can do:
//!
//! - [`net::SocketOps`] for every socket,
//! - [`net::DatagramOps`] for message-oriented sockets ([`net::UdpSocket`]),
//! - [`net::StreamOps`] for connection-oriented ones ([`net::TcpSocket`]).
//!
//! [`tun::TunTap`] attaches a handle to a Linux TUN/TAP interface.
//!
//! All calls are synchronous; a descriptor switched to non-blocking mode
//! reports "would block" instead of waiting, and readiness is the caller's
//! business.
//!
//! ## Example
//!
//! ```rust
//! use fdnet::{Address, net::{DatagramOps, SocketOps, UdpSocket}};
//!
//! let server = UdpSocket::bind_to(&Address::new("127.0.0.1", 0)?)?;
//! let client = UdpSocket::new()?;
//! client.send(b"ping", Some(&server.local_address()?))?;
//!
//! let mut payload = Vec::new();
//! let from = server.recv(&mut payload)?;
//! assert_eq!(payload, b"ping");
//! println!("datagram from {from}");
//! # Ok::<(), fdnet::Error>(())
//! ```
//!
//! ## Logging
//!
//! Descriptor lifecycle events are emitted through [`tracing`] at `trace`
//! level, and failures to close a descriptor on drop at `warn` level. Install
//! any subscriber to see them.
//!
//! ## Feature flags
//!
//! - `bytes`: implements [`buf::BufLike`] for `bytes::BytesMut`.

#[macro_use]
mod macros;

pub mod addr;
pub mod buf;
pub mod error;
pub mod handle;
pub mod net;
pub mod tun;

pub use addr::Address;
pub use buf::{BufLike, DEFAULT_READ_BUFFER_SIZE, ScatterGather};
pub use error::{Error, Result};
pub use handle::{AsHandle, DescriptorHandle, IntoHandle};
