//! The concrete socket types.

use crate::{
  addr::Address,
  error::Result,
  handle::DescriptorHandle,
  net::{
    DatagramOps, SocketOps, StreamOps,
    socket::{self, AdoptError},
    stream::private::FromAccepted,
  },
};

macro_rules! socket_kind {
  (@caps $name:ident, datagram) => {
    impl DatagramOps for $name {}
  };
  (@caps $name:ident, stream) => {
    impl StreamOps for $name {}

    impl FromAccepted for $name {
      fn from_accepted(handle: DescriptorHandle) -> Self {
        $name(handle)
      }
    }
  };

  (
    $(#[$doc:meta])*
    $name:ident($domain:expr, $ty:expr, $protocol:expr) => $cap:ident
  ) => {
    $(#[$doc])*
    pub struct $name(DescriptorHandle);

    impl_native_conversions!($name);

    impl SocketOps for $name {}

    socket_kind!(@caps $name, $cap);

    impl $name {
      /// Address family checked on adoption.
      pub const DOMAIN: libc::c_int = $domain;
      /// Socket type checked on adoption.
      pub const TYPE: libc::c_int = $ty;
      /// Protocol checked on adoption (Linux only).
      pub const PROTOCOL: libc::c_int = $protocol;

      /// Creates a new socket of this kind.
      pub fn new() -> Result<Self> {
        socket::create(Self::DOMAIN, Self::TYPE, Self::PROTOCOL).map($name)
      }

      /// Wraps an existing descriptor after checking with the kernel that it
      /// really is a socket of this kind. On mismatch the handle is handed
      /// back inside the error.
      pub fn adopt(handle: DescriptorHandle) -> std::result::Result<Self, AdoptError> {
        socket::verify(handle, Self::DOMAIN, Self::TYPE, Self::PROTOCOL).map($name)
      }
    }

    impl std::fmt::Debug for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple(stringify!($name)).field(&self.0).finish()
      }
    }
  };
}

socket_kind! {
  /// A UDP socket over IPv4.
  UdpSocket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_UDP) => datagram
}

socket_kind! {
  /// A TCP socket over IPv4, either a listener or a connection.
  TcpSocket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP) => stream
}

socket_kind! {
  /// A Unix domain stream socket.
  LocalStreamSocket(libc::AF_UNIX, libc::SOCK_STREAM, 0) => stream
}

socket_kind! {
  /// A Unix domain datagram socket.
  LocalDatagramSocket(libc::AF_UNIX, libc::SOCK_DGRAM, 0) => datagram
}

impl UdpSocket {
  /// Creates a UDP socket bound to `address`.
  pub fn bind_to(address: &Address) -> Result<Self> {
    let socket = Self::new()?;
    socket.bind(address)?;
    Ok(socket)
  }
}

impl TcpSocket {
  /// Creates a listening socket bound to `address`, with `SO_REUSEADDR`.
  pub fn bind_listener(address: &Address, backlog: libc::c_int) -> Result<Self> {
    let socket = Self::new()?;
    socket.set_reuseaddr()?;
    socket.bind(address)?;
    socket.listen(backlog)?;
    Ok(socket)
  }

  /// Creates a socket connected to `address`.
  pub fn connect_to(address: &Address) -> Result<Self> {
    let socket = Self::new()?;
    socket.connect(address)?;
    Ok(socket)
  }
}

impl LocalStreamSocket {
  /// A connected pair of anonymous stream sockets (`socketpair(2)`).
  pub fn pair() -> Result<(Self, Self)> {
    let (a, b) = socket::create_pair(Self::DOMAIN, Self::TYPE, Self::PROTOCOL)?;
    Ok((LocalStreamSocket(a), LocalStreamSocket(b)))
  }
}

impl LocalDatagramSocket {
  /// A connected pair of anonymous datagram sockets (`socketpair(2)`).
  pub fn pair() -> Result<(Self, Self)> {
    let (a, b) = socket::create_pair(Self::DOMAIN, Self::TYPE, Self::PROTOCOL)?;
    Ok((LocalDatagramSocket(a), LocalDatagramSocket(b)))
  }
}

/// A raw link-layer socket (`AF_PACKET`), Linux only.
///
/// The type (`SOCK_RAW` or `SOCK_DGRAM`) and the protocol (an ethertype in
/// network byte order, e.g. `(libc::ETH_P_ALL as u16).to_be()`) are chosen
/// by the caller.
#[cfg(linux)]
pub struct PacketSocket(DescriptorHandle);

#[cfg(linux)]
impl_native_conversions!(PacketSocket);

#[cfg(linux)]
impl SocketOps for PacketSocket {}

#[cfg(linux)]
impl DatagramOps for PacketSocket {}

#[cfg(linux)]
impl PacketSocket {
  /// Creates a packet socket. Usually needs `CAP_NET_RAW`.
  pub fn new(ty: libc::c_int, protocol: libc::c_int) -> Result<Self> {
    socket::create(libc::AF_PACKET, ty, protocol).map(PacketSocket)
  }

  /// Wraps an existing packet socket after checking it with the kernel.
  pub fn adopt(
    handle: DescriptorHandle,
    ty: libc::c_int,
    protocol: libc::c_int,
  ) -> std::result::Result<Self, AdoptError> {
    socket::verify(handle, libc::AF_PACKET, ty, protocol).map(PacketSocket)
  }
}

#[cfg(linux)]
impl std::fmt::Debug for PacketSocket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("PacketSocket").field(&self.0).finish()
  }
}
