use std::{mem, ptr};

use crate::{
  addr::Address,
  buf::{self, BufLike, DEFAULT_READ_BUFFER_SIZE, ScatterGather},
  error::{Error, Result, check},
  net::SocketOps,
};

/// Connectionless message exchange.
///
/// Every call moves exactly one whole datagram. A datagram that does not
/// fit the supplied buffers is an error rather than a silently shortened
/// message, and a send that the kernel only partially accepts is an error
/// rather than a short count.
///
/// On a non-blocking socket "would block" is reported as an
/// [`Error::Os`] carrying `EAGAIN`; there is no partial datagram to return.
///
/// # Examples
///
/// ```rust
/// use fdnet::{Address, net::{DatagramOps, SocketOps, UdpSocket}};
///
/// let loopback = Address::new("127.0.0.1", 0).unwrap();
/// let a = UdpSocket::new().unwrap();
/// let b = UdpSocket::new().unwrap();
/// a.bind(&loopback).unwrap();
/// b.bind(&loopback).unwrap();
///
/// a.send(b"hi", Some(&b.local_address().unwrap())).unwrap();
///
/// let mut payload = Vec::new();
/// let source = b.recv(&mut payload).unwrap();
/// assert_eq!(payload, b"hi");
/// assert_eq!(source, a.local_address().unwrap());
/// ```
pub trait DatagramOps: SocketOps {
  /// Receives one datagram into `payload`, returning its source address.
  ///
  /// An empty `payload` is first grown to [`DEFAULT_READ_BUFFER_SIZE`]; on
  /// return it holds exactly the datagram. This is
  /// [`recv_vectored`](Self::recv_vectored) over a single buffer, so
  /// truncation is detected from the `MSG_TRUNC` flag `recvmsg(2)` returns.
  fn recv<B>(&self, payload: &mut B) -> Result<Address>
  where
    B: BufLike,
  {
    self.recv_vectored(std::slice::from_mut(payload))
  }

  /// Receives one datagram spread across `payloads`.
  ///
  /// An empty last buffer is first grown to [`DEFAULT_READ_BUFFER_SIZE`].
  /// The datagram fills the buffers in order; each keeps up to its own
  /// length and buffers past the end of the datagram are emptied.
  fn recv_vectored<B>(&self, payloads: &mut [B]) -> Result<Address>
  where
    B: BufLike,
  {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;
    let Some(last) = payloads.last_mut() else {
      return Err(Error::Contract("recv called with no payload buffers"));
    };
    last.prepare(DEFAULT_READ_BUFFER_SIZE);

    let (mut storage, namelen) = Address::storage();
    let (received, total, namelen, flags) = {
      let mut list = ScatterGather::from_bufs_mut(payloads)?;
      // SAFETY: msghdr is plain old data; zeroed is a valid empty header.
      let mut message: libc::msghdr = unsafe { mem::zeroed() };
      message.msg_name = (&mut storage as *mut libc::sockaddr_storage).cast();
      message.msg_namelen = namelen;
      message.msg_iovlen = list.iovcnt()? as _;
      message.msg_iov = list.as_mut_ptr();

      let received =
        check("recvmsg", syscall!(recvmsg(fd, &mut message, libc::MSG_TRUNC)))? as usize;
      (received, list.total_len(), message.msg_namelen, message.msg_flags)
    };
    handle.register_read();

    if received > total || flags & libc::MSG_TRUNC != 0 {
      return Err(Error::OversizedDatagram { op: "recvmsg", len: received });
    }
    let source = Address::from_storage("recvmsg", storage, namelen)?;
    buf::distribute(payloads, received);
    Ok(source)
  }

  /// Sends `payload` as one datagram, to `destination` or, when `None`, to
  /// the connected peer.
  fn send(&self, payload: impl AsRef<[u8]>, destination: Option<&Address>) -> Result<()> {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;
    let payload = payload.as_ref();
    let (name, namelen) = match destination {
      Some(address) => (address.raw(), address.size()),
      None => (ptr::null(), 0),
    };

    let sent = check(
      "sendto",
      syscall!(sendto(fd, payload.as_ptr().cast(), payload.len(), 0, name, namelen)),
    )? as usize;
    handle.register_write();

    if sent != payload.len() {
      return Err(Error::ShortSend { op: "sendto", sent, expected: payload.len() });
    }
    Ok(())
  }

  /// Sends the concatenation of `payloads` as one datagram.
  fn send_vectored<B>(&self, payloads: &[B], destination: Option<&Address>) -> Result<()>
  where
    B: AsRef<[u8]>,
  {
    let handle = self.as_handle();
    let fd = handle.live_fd()?;
    let list = ScatterGather::from_slices(payloads)?;

    // SAFETY: msghdr is plain old data; zeroed is a valid empty header.
    let mut message: libc::msghdr = unsafe { mem::zeroed() };
    if let Some(address) = destination {
      // sendmsg only reads through msg_name.
      message.msg_name = address.raw().cast_mut().cast();
      message.msg_namelen = address.size();
    }
    message.msg_iovlen = list.iovcnt()? as _;
    // sendmsg only reads through msg_iov.
    message.msg_iov = list.as_ptr().cast_mut();

    let sent = check("sendmsg", syscall!(sendmsg(fd, &message, 0)))? as usize;
    handle.register_write();

    if sent != list.total_len() {
      return Err(Error::ShortSend { op: "sendmsg", sent, expected: list.total_len() });
    }
    Ok(())
  }
}
