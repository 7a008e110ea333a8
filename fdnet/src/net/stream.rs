use std::ptr;

use crate::{
  error::{Result, check},
  handle::DescriptorHandle,
  net::SocketOps,
};

/// Backlog used by [`StreamOps::listen_default`].
pub const DEFAULT_BACKLOG: libc::c_int = 16;

pub(crate) mod private {
  use crate::handle::DescriptorHandle;

  pub trait FromAccepted {
    fn from_accepted(handle: DescriptorHandle) -> Self;
  }
}

/// Connection-oriented listen/accept.
///
/// Connected stream sockets do their I/O through the
/// [`DescriptorHandle`] read/write API, which every socket type derefs to.
///
/// # Examples
///
/// ```rust
/// use fdnet::{Address, net::{SocketOps, StreamOps, TcpSocket}};
///
/// let listener = TcpSocket::new().unwrap();
/// listener.set_reuseaddr().unwrap();
/// listener.bind(&Address::new("127.0.0.1", 0).unwrap()).unwrap();
/// listener.listen_default().unwrap();
///
/// let client = TcpSocket::new().unwrap();
/// client.connect(&listener.local_address().unwrap()).unwrap();
///
/// let server_side = listener.accept().unwrap();
/// client.write_all(b"hello").unwrap();
///
/// let mut buf = Vec::new();
/// server_side.read(&mut buf).unwrap();
/// assert_eq!(buf, b"hello");
/// ```
pub trait StreamOps: SocketOps + private::FromAccepted + Sized {
  /// Marks the socket as accepting connections, queueing up to `backlog`.
  fn listen(&self, backlog: libc::c_int) -> Result<()> {
    let fd = self.as_handle().live_fd()?;
    check("listen", syscall!(listen(fd, backlog)))?;
    Ok(())
  }

  /// [`listen`](StreamOps::listen) with [`DEFAULT_BACKLOG`].
  fn listen_default(&self) -> Result<()> {
    self.listen(DEFAULT_BACKLOG)
  }

  /// Blocks until a connection arrives and returns it as a new, independent
  /// socket. Each accepted connection counts as one read event on the
  /// listener.
  fn accept(&self) -> Result<Self> {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;

    #[cfg(linux)]
    let accepted = check(
      "accept",
      syscall!(accept4(fd, ptr::null_mut(), ptr::null_mut(), libc::SOCK_CLOEXEC)),
    )?;
    #[cfg(not(linux))]
    let accepted = check("accept", syscall!(accept(fd, ptr::null_mut(), ptr::null_mut())))?;

    let connection = DescriptorHandle::from_new_fd(accepted);
    #[cfg(not(linux))]
    crate::handle::set_cloexec(accepted)?;

    handle.register_read();
    tracing::trace!(listener = fd, fd = accepted, "accepted connection");
    Ok(Self::from_accepted(connection))
  }
}
