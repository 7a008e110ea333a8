use std::{net::Shutdown, os::fd::RawFd};

use crate::{
  addr::Address,
  error::{Error, Result, check},
  handle::{AsHandle, DescriptorHandle},
  net::option::{self, OptionValue},
};

/// The operations every socket supports.
///
/// This is the base capability of the socket layer; [`DatagramOps`] and
/// [`StreamOps`] build on it. All methods are provided in terms of
/// [`AsHandle`], so implementing the trait is a one-liner.
///
/// [`DatagramOps`]: crate::net::DatagramOps
/// [`StreamOps`]: crate::net::StreamOps
///
/// # Examples
///
/// ```rust
/// use fdnet::{Address, net::{SocketOps, UdpSocket}};
///
/// let socket = UdpSocket::new().unwrap();
/// socket.set_reuseaddr().unwrap();
/// socket.bind(&Address::new("127.0.0.1", 0).unwrap()).unwrap();
///
/// let local = socket.local_address().unwrap();
/// assert_ne!(local.port(), Some(0)); // the kernel picked a port
/// ```
pub trait SocketOps: AsHandle {
  /// The address the socket is bound to (`getsockname(2)`).
  fn local_address(&self) -> Result<Address> {
    get_address(self.as_handle(), "getsockname", libc::getsockname)
  }

  /// The address of the connected peer (`getpeername(2)`).
  fn peer_address(&self) -> Result<Address> {
    get_address(self.as_handle(), "getpeername", libc::getpeername)
  }

  /// Binds the socket to a local address.
  fn bind(&self, address: &Address) -> Result<()> {
    let fd = self.as_handle().live_fd()?;
    check("bind", syscall!(bind(fd, address.raw(), address.size())))?;
    Ok(())
  }

  /// Binds the socket to a named network interface (`SO_BINDTODEVICE`).
  fn bind_to_device(&self, device: &str) -> Result<()> {
    #[cfg(linux)]
    let result =
      self.setsockopt_raw(libc::SOL_SOCKET, libc::SO_BINDTODEVICE, device.as_bytes());
    #[cfg(not(linux))]
    let result = {
      let _ = device;
      Err(Error::Unsupported("SO_BINDTODEVICE"))
    };
    result
  }

  /// Connects the socket to a peer.
  ///
  /// On a non-blocking socket a connection that is still in progress is not
  /// an error; use [`poll_pending_error`](SocketOps::poll_pending_error)
  /// once the socket becomes writable.
  fn connect(&self, address: &Address) -> Result<()> {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;
    let res = syscall!(connect(fd, address.raw(), address.size()));
    handle.check_fd("connect", res.map(|r| r as isize))?;
    Ok(())
  }

  /// Shuts down one or both directions of the socket.
  ///
  /// Shutting down reads counts as a read event, writes as a write event,
  /// and both as one of each.
  fn shutdown(&self, how: Shutdown) -> Result<()> {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;
    check("shutdown", syscall!(shutdown(fd, shutdown_how(how))))?;
    match how {
      Shutdown::Read => handle.register_read(),
      Shutdown::Write => handle.register_write(),
      Shutdown::Both => {
        handle.register_read();
        handle.register_write();
      }
    }
    Ok(())
  }

  /// [`shutdown`](SocketOps::shutdown) with a raw `SHUT_*` value.
  ///
  /// Anything other than `SHUT_RD`, `SHUT_WR` or `SHUT_RDWR` is a contract
  /// violation and no syscall is made.
  fn shutdown_raw(&self, how: libc::c_int) -> Result<()> {
    let how = match how {
      libc::SHUT_RD => Shutdown::Read,
      libc::SHUT_WR => Shutdown::Write,
      libc::SHUT_RDWR => Shutdown::Both,
      _ => return Err(Error::Contract("shutdown called with invalid `how`")),
    };
    self.shutdown(how)
  }

  /// Reads a fixed-size socket option.
  fn getsockopt<T>(&self, level: libc::c_int, option: libc::c_int) -> Result<T>
  where
    T: OptionValue,
  {
    option::get(self.as_handle(), level, option)
  }

  /// Reads a variable-length socket option into `buf`, returning its length.
  fn getsockopt_raw(
    &self,
    level: libc::c_int,
    option: libc::c_int,
    buf: &mut [u8],
  ) -> Result<usize> {
    option::get_raw(self.as_handle(), level, option, buf)
  }

  /// Sets a fixed-size socket option.
  fn setsockopt<T>(&self, level: libc::c_int, option: libc::c_int, value: T) -> Result<()>
  where
    T: OptionValue,
  {
    option::set(self.as_handle(), level, option, value)
  }

  /// Sets a socket option whose size is only known at runtime.
  fn setsockopt_raw(
    &self,
    level: libc::c_int,
    option: libc::c_int,
    value: &[u8],
  ) -> Result<()> {
    option::set_raw(self.as_handle(), level, option, value)
  }

  /// Allows the local address to be reused sooner (`SO_REUSEADDR`).
  fn set_reuseaddr(&self) -> Result<()> {
    self.setsockopt(libc::SOL_SOCKET, libc::SO_REUSEADDR, 1 as libc::c_int)
  }

  /// Surfaces the socket's latched error (`SO_ERROR`), if any.
  ///
  /// Used to learn the outcome of a non-blocking connect.
  fn poll_pending_error(&self) -> Result<()> {
    let code: libc::c_int = self.getsockopt(libc::SOL_SOCKET, libc::SO_ERROR)?;
    if code != 0 {
      return Err(Error::os("socket error", std::io::Error::from_raw_os_error(code)));
    }
    Ok(())
  }
}

type AddressFn =
  unsafe extern "C" fn(RawFd, *mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int;

fn get_address(
  handle: &DescriptorHandle,
  op: &'static str,
  function: AddressFn,
) -> Result<Address> {
  let fd = handle.live_fd()?;
  let (mut storage, mut len) = Address::storage();
  // SAFETY: storage is a valid sockaddr_storage and len holds its size.
  let res = unsafe { function(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut len) };
  if res == -1 {
    return Err(Error::os(op, std::io::Error::last_os_error()));
  }
  Address::from_storage(op, storage, len)
}

fn shutdown_how(how: Shutdown) -> libc::c_int {
  match how {
    Shutdown::Read => libc::SHUT_RD,
    Shutdown::Write => libc::SHUT_WR,
    Shutdown::Both => libc::SHUT_RDWR,
  }
}

/// A failed [`adopt`](Socket::adopt): the reason plus the untouched handle.
#[derive(Debug, thiserror::Error)]
#[error("cannot adopt descriptor: {error}")]
pub struct AdoptError {
  #[source]
  pub error: Error,
  /// The handle that was offered, returned to the caller unchanged.
  pub handle: DescriptorHandle,
}

impl From<AdoptError> for Error {
  fn from(value: AdoptError) -> Self {
    value.error
  }
}

/// Creates a socket with close-on-exec set.
pub(crate) fn create(
  domain: libc::c_int,
  ty: libc::c_int,
  protocol: libc::c_int,
) -> Result<DescriptorHandle> {
  #[cfg(linux)]
  let fd = check("socket", syscall!(socket(domain, ty | libc::SOCK_CLOEXEC, protocol)))?;
  #[cfg(not(linux))]
  let fd = check("socket", syscall!(socket(domain, ty, protocol)))?;

  let handle = DescriptorHandle::from_new_fd(fd);
  #[cfg(not(linux))]
  crate::handle::set_cloexec(fd)?;

  tracing::trace!(fd, domain, ty, protocol, "created socket");
  Ok(handle)
}

/// Creates a connected pair of sockets with close-on-exec set.
pub(crate) fn create_pair(
  domain: libc::c_int,
  ty: libc::c_int,
  protocol: libc::c_int,
) -> Result<(DescriptorHandle, DescriptorHandle)> {
  let mut fds: [RawFd; 2] = [-1; 2];
  #[cfg(linux)]
  check(
    "socketpair",
    syscall!(socketpair(domain, ty | libc::SOCK_CLOEXEC, protocol, fds.as_mut_ptr())),
  )?;
  #[cfg(not(linux))]
  check("socketpair", syscall!(socketpair(domain, ty, protocol, fds.as_mut_ptr())))?;

  let pair = (DescriptorHandle::from_new_fd(fds[0]), DescriptorHandle::from_new_fd(fds[1]));
  #[cfg(not(linux))]
  {
    crate::handle::set_cloexec(fds[0])?;
    crate::handle::set_cloexec(fds[1])?;
  }
  Ok(pair)
}

/// Checks that `handle` really is a `(domain, ty, protocol)` socket.
///
/// Only the type can be queried outside Linux.
pub(crate) fn verify(
  handle: DescriptorHandle,
  domain: libc::c_int,
  ty: libc::c_int,
  protocol: libc::c_int,
) -> std::result::Result<DescriptorHandle, AdoptError> {
  let checks = || -> Result<()> {
    #[cfg(linux)]
    {
      expect(&handle, "domain", libc::SO_DOMAIN, domain)?;
      expect(&handle, "protocol", libc::SO_PROTOCOL, protocol)?;
    }
    #[cfg(not(linux))]
    let _ = (domain, protocol);

    expect(&handle, "type", libc::SO_TYPE, ty)
  };

  match checks() {
    Ok(()) => Ok(handle),
    Err(error) => Err(AdoptError { error, handle }),
  }
}

fn expect(
  handle: &DescriptorHandle,
  what: &'static str,
  option: libc::c_int,
  expected: libc::c_int,
) -> Result<()> {
  let actual: libc::c_int = option::get(handle, libc::SOL_SOCKET, option)?;
  if actual != expected {
    return Err(Error::KindMismatch { what, expected, actual });
  }
  Ok(())
}

/// A socket of any domain, type and protocol.
///
/// Only the base [`SocketOps`] are available; use one of the concrete types
/// in [`crate::net`] for datagram or stream operations.
pub struct Socket(DescriptorHandle);

impl_native_conversions!(Socket);

impl SocketOps for Socket {}

impl Socket {
  /// Creates a new socket (`socket(2)`).
  pub fn new(domain: libc::c_int, ty: libc::c_int, protocol: libc::c_int) -> Result<Self> {
    create(domain, ty, protocol).map(Socket)
  }

  /// Wraps an existing descriptor after checking that the kernel agrees it
  /// is a `(domain, ty, protocol)` socket.
  ///
  /// On mismatch the handle is handed back inside the error.
  pub fn adopt(
    handle: DescriptorHandle,
    domain: libc::c_int,
    ty: libc::c_int,
    protocol: libc::c_int,
  ) -> std::result::Result<Self, AdoptError> {
    verify(handle, domain, ty, protocol).map(Socket)
  }
}

impl std::fmt::Debug for Socket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Socket").field(&self.0).finish()
  }
}
