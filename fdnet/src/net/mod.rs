//! Sockets over [`DescriptorHandle`](crate::DescriptorHandle).
//!
//! The socket layer is three capability traits over one handle:
//!
//! - [`SocketOps`]: what every socket can do (bind, connect, shutdown,
//!   addresses, options).
//! - [`DatagramOps`]: whole-message send/receive, optionally vectored.
//! - [`StreamOps`]: listen/accept. Connected streams use the handle's own
//!   read/write API.
//!
//! # Main Types
//!
//! - [`Socket`]: any domain/type/protocol, base operations only
//! - [`UdpSocket`], [`LocalDatagramSocket`]: datagram sockets
//! - [`TcpSocket`], [`LocalStreamSocket`]: stream sockets
//! - `PacketSocket`: raw link-layer frames (Linux only)
//!
//! Every socket type derefs to [`DescriptorHandle`](crate::DescriptorHandle),
//! so counters, blocking mode and the byte-stream I/O are all reachable
//! directly.
//!
//! # Adopting descriptors
//!
//! Descriptors obtained elsewhere (inherited, passed over a Unix socket,
//! created by another library) can be wrapped with `adopt`. The kernel is
//! asked what the descriptor really is and the call fails with
//! [`Error::KindMismatch`](crate::Error::KindMismatch) if it disagrees.
//! The handle is returned inside [`AdoptError`] either way, so nothing is
//! closed behind the caller's back.

mod datagram;
mod kinds;
pub mod option;
mod socket;
mod stream;

pub use datagram::DatagramOps;
#[cfg(linux)]
pub use kinds::PacketSocket;
pub use kinds::{LocalDatagramSocket, LocalStreamSocket, TcpSocket, UdpSocket};
pub use option::OptionValue;
pub use socket::{AdoptError, Socket, SocketOps};
pub use stream::{DEFAULT_BACKLOG, StreamOps};
