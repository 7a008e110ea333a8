//! Reference-counted ownership of kernel descriptors.
//!
//! A [`DescriptorHandle`] is a shared reference to one kernel descriptor.
//! Handles are move-only: the type does not implement [`Clone`], and the
//! only way to get a second handle to the same descriptor is
//! [`DescriptorHandle::duplicate`], which makes every aliasing site visible.
//!
//! ```rust
//! use fdnet::DescriptorHandle;
//!
//! let (rx, tx) = DescriptorHandle::pipe().unwrap();
//! let poller_copy = rx.duplicate(); // same descriptor, count is now 2
//! assert_eq!(rx.ref_count(), 2);
//!
//! tx.write_all(b"ping").unwrap();
//! let mut buf = Vec::new(); // empty: grown to the default read size
//! poller_copy.read(&mut buf).unwrap();
//! assert_eq!(buf, b"ping");
//! assert_eq!(rx.read_count(), 1); // counters are shared too
//! ```
//!
//! # Release
//!
//! The descriptor is closed exactly once: either by an explicit
//! [`close`](DescriptorHandle::close), which reports failures, or when the
//! last handle is dropped, in which case failures are logged through
//! `tracing` and discarded.
//!
//! # Threading
//!
//! Handles are `Send + Sync` and the reference count is atomic. The flags
//! and counters are kept in relaxed atomics, which keeps the type sound but
//! does not order I/O: two threads reading (or two threads writing) through
//! aliases of one descriptor still need a lock of their own.

use std::{
  ffi::CString,
  fmt, io,
  os::{
    fd::{AsRawFd, FromRawFd, RawFd},
    unix::ffi::OsStrExt,
  },
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
};

use crate::{
  buf::{self, BufLike, DEFAULT_READ_BUFFER_SIZE, ScatterGather},
  error::{self, Error, Result, check},
};

/// The kernel descriptor itself, plus the state shared by all of its
/// handles.
struct KernelHandle {
  fd: RawFd,
  eof: AtomicBool,
  closed: AtomicBool,
  non_blocking: AtomicBool,
  read_count: AtomicU64,
  write_count: AtomicU64,
}

impl KernelHandle {
  fn new(fd: RawFd) -> Self {
    Self {
      fd,
      eof: AtomicBool::new(false),
      closed: AtomicBool::new(false),
      non_blocking: AtomicBool::new(false),
      read_count: AtomicU64::new(0),
      write_count: AtomicU64::new(0),
    }
  }

  fn close(&self) -> Result<()> {
    if self.closed.swap(true, Ordering::AcqRel) {
      return Err(Error::Contract("close called on an already-closed descriptor"));
    }
    tracing::trace!(fd = self.fd, "closing descriptor");
    check("close", syscall!(close(self.fd))).map(drop)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Contract("operation on a closed descriptor"));
    }
    Ok(())
  }

  /// Translates a syscall result. `Ok(None)` means the call would have
  /// blocked on a non-blocking descriptor.
  fn check_fd(&self, op: &'static str, res: io::Result<isize>) -> Result<Option<usize>> {
    match res {
      Ok(n) => Ok(Some(n as usize)),
      Err(err)
        if self.non_blocking.load(Ordering::Relaxed) && error::is_would_block(&err) =>
      {
        Ok(None)
      }
      Err(err) => Err(Error::os(op, err)),
    }
  }
}

impl Drop for KernelHandle {
  fn drop(&mut self) {
    if *self.closed.get_mut() {
      return;
    }
    if let Err(err) = self.close() {
      tracing::warn!(fd = self.fd, error = %err, "failed to release descriptor");
    }
  }
}

/// A move-only, reference-counted handle to a kernel descriptor.
///
/// See the [module documentation](self) for ownership rules.
pub struct DescriptorHandle(Arc<KernelHandle>);

/// Types that wrap a [`DescriptorHandle`] and lend it out.
///
/// Implemented by [`DescriptorHandle`] itself and by every socket type;
/// the socket capability traits are built on top of it.
pub trait AsHandle {
  /// Borrows the underlying handle.
  fn as_handle(&self) -> &DescriptorHandle;
}

impl<R> AsHandle for &R
where
  R: AsHandle,
{
  fn as_handle(&self) -> &DescriptorHandle {
    (*self).as_handle()
  }
}

impl AsHandle for DescriptorHandle {
  fn as_handle(&self) -> &DescriptorHandle {
    self
  }
}

/// Types that can give up their [`DescriptorHandle`].
pub trait IntoHandle {
  /// Consumes `self`, returning the handle without closing it.
  fn into_handle(self) -> DescriptorHandle;
}

impl IntoHandle for DescriptorHandle {
  fn into_handle(self) -> DescriptorHandle {
    self
  }
}

impl FromRawFd for DescriptorHandle {
  /// Takes ownership of `fd`. No syscall is made.
  ///
  /// # Safety
  ///
  /// `fd` must be an open descriptor that nothing else will close.
  unsafe fn from_raw_fd(fd: RawFd) -> Self {
    DescriptorHandle(Arc::new(KernelHandle::new(fd)))
  }
}

impl AsRawFd for DescriptorHandle {
  fn as_raw_fd(&self) -> RawFd {
    self.0.fd
  }
}

impl DescriptorHandle {
  /// Wraps a descriptor this crate just received from the kernel.
  pub(crate) fn from_new_fd(fd: RawFd) -> Self {
    // SAFETY: callers pass descriptors fresh out of a successful syscall.
    unsafe { Self::from_raw_fd(fd) }
  }

  /// Opens `path` with `open(2)`. `O_CLOEXEC` is always added.
  pub fn open(path: impl AsRef<Path>, flags: libc::c_int) -> Result<Self> {
    let path = CString::new(path.as_ref().as_os_str().as_bytes())
      .map_err(|_| Error::Contract("path contains NUL"))?;
    let fd = check("open", syscall!(open(path.as_ptr(), flags | libc::O_CLOEXEC)))?;
    tracing::trace!(fd, path = ?path, "opened descriptor");
    Ok(Self::from_new_fd(fd))
  }

  /// Creates a pipe, returning `(read_end, write_end)`.
  pub fn pipe() -> Result<(Self, Self)> {
    let mut fds: [RawFd; 2] = [-1; 2];

    #[cfg(linux)]
    check("pipe2", syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC)))?;
    #[cfg(not(linux))]
    check("pipe", syscall!(pipe(fds.as_mut_ptr())))?;

    let ends = (Self::from_new_fd(fds[0]), Self::from_new_fd(fds[1]));
    #[cfg(not(linux))]
    {
      set_cloexec(fds[0])?;
      set_cloexec(fds[1])?;
    }
    Ok(ends)
  }

  /// Closes the descriptor now and reports the result.
  ///
  /// Calling this twice, through this handle or any duplicate, is a
  /// contract violation. Every later operation on any duplicate is one too.
  /// The descriptor counts as closed even when `close(2)` fails.
  ///
  /// Because a shared handle can be closed, handles do not implement
  /// [`AsFd`](std::os::fd::AsFd): a `BorrowedFd` could outlive the
  /// descriptor. [`AsRawFd`] still reports the number, which may be reused
  /// by the kernel once closed.
  ///
  /// ```rust,compile_fail
  /// use std::os::fd::AsFd;
  ///
  /// let (rx, _tx) = fdnet::DescriptorHandle::pipe().unwrap();
  /// let _borrowed = rx.as_fd();
  /// ```
  pub fn close(&self) -> Result<()> {
    self.0.close()
  }

  /// Returns another handle to the same descriptor.
  ///
  /// This is the only way to alias a descriptor; the descriptor is released
  /// once the last duplicate is gone.
  pub fn duplicate(&self) -> Self {
    DescriptorHandle(Arc::clone(&self.0))
  }

  /// Reads into `buffer`, returning the number of bytes read.
  ///
  /// The current length of `buffer` is the amount to read; an empty buffer
  /// is first grown to [`DEFAULT_READ_BUFFER_SIZE`]. Afterwards the buffer is
  /// truncated to what was read. A zero-byte read marks end-of-stream. On a
  /// non-blocking descriptor with nothing to read this returns `Ok(0)`
  /// without marking end-of-stream.
  pub fn read<B>(&self, buffer: &mut B) -> Result<usize>
  where
    B: BufLike,
  {
    self.0.ensure_open()?;
    buffer.prepare(DEFAULT_READ_BUFFER_SIZE);
    let read = self.read_raw(buffer.buf_mut())?;
    buffer.deinit(read.unwrap_or(0));
    Ok(read.unwrap_or(0))
  }

  fn read_raw(&self, slice: &mut [u8]) -> Result<Option<usize>> {
    self.0.ensure_open()?;
    let res = syscall!(read(self.0.fd, slice.as_mut_ptr().cast(), slice.len()));
    let read = self.0.check_fd("read", res)?;
    self.register_read();
    if read == Some(0) {
      self.set_eof();
    }
    Ok(read)
  }

  /// Reads into several buffers with one `readv(2)`.
  ///
  /// The buffers form one logical receive region. If the last buffer is
  /// empty it is first grown to [`DEFAULT_READ_BUFFER_SIZE`]. The bytes read
  /// fill the buffers in order: each keeps up to its own length, the one
  /// where the data ends is truncated, and any after it are emptied.
  pub fn read_vectored<B>(&self, buffers: &mut [B]) -> Result<usize>
  where
    B: BufLike,
  {
    self.0.ensure_open()?;
    let Some(last) = buffers.last_mut() else {
      return Err(Error::Contract("read called with no buffers"));
    };
    last.prepare(DEFAULT_READ_BUFFER_SIZE);

    let read = {
      let list = ScatterGather::from_bufs_mut(buffers)?;
      let res = syscall!(readv(self.0.fd, list.as_ptr(), list.iovcnt()?));
      self.0.check_fd("readv", res)?
    };
    self.register_read();

    if read == Some(0) {
      self.set_eof();
    }
    let read = read.unwrap_or(0);
    buf::distribute(buffers, read);
    Ok(read)
  }

  /// Writes the whole of `buffer`, issuing as many `write(2)` calls as it
  /// takes. The first failure aborts the operation.
  pub fn write_all(&self, buffer: impl AsRef<[u8]>) -> Result<()> {
    let buffer = buffer.as_ref();
    let mut written = 0;
    while written < buffer.len() {
      written += self.write(&buffer[written..])?;
    }
    Ok(())
  }

  /// Issues exactly one `write(2)` and returns how many bytes the kernel
  /// accepted, which may be fewer than requested (or zero, if a
  /// non-blocking descriptor would block).
  pub fn write(&self, buffer: impl AsRef<[u8]>) -> Result<usize> {
    Ok(self.write_raw(buffer.as_ref())?.unwrap_or(0))
  }

  fn write_raw(&self, slice: &[u8]) -> Result<Option<usize>> {
    self.0.ensure_open()?;
    let res = syscall!(write(self.0.fd, slice.as_ptr().cast(), slice.len()));
    let written = self.0.check_fd("write", res)?;
    self.register_write();
    Ok(written)
  }

  /// Issues exactly one `writev(2)` over `buffers`.
  pub fn write_vectored<B>(&self, buffers: &[B]) -> Result<usize>
  where
    B: AsRef<[u8]>,
  {
    self.0.ensure_open()?;
    let list = Self::to_scatter_gather(buffers)?;
    let res = syscall!(writev(self.0.fd, list.as_ptr(), list.iovcnt()?));
    let written = self.0.check_fd("writev", res)?;
    self.register_write();
    Ok(written.unwrap_or(0))
  }

  /// Validates `buffers` and converts them into a [`ScatterGather`] list
  /// whose [`total_len`](ScatterGather::total_len) is the aggregate size.
  pub fn to_scatter_gather<B>(buffers: &[B]) -> Result<ScatterGather<'_>>
  where
    B: AsRef<[u8]>,
  {
    ScatterGather::from_slices(buffers)
  }

  /// Switches the descriptor between blocking and non-blocking mode.
  pub fn set_blocking(&self, blocking: bool) -> Result<()> {
    self.0.ensure_open()?;
    let flags = check("fcntl", syscall!(fcntl(self.0.fd, libc::F_GETFL)))?;
    let flags =
      if blocking { flags & !libc::O_NONBLOCK } else { flags | libc::O_NONBLOCK };
    check("fcntl", syscall!(fcntl(self.0.fd, libc::F_SETFL, flags)))?;
    self.0.non_blocking.store(!blocking, Ordering::Relaxed);
    Ok(())
  }

  /// The descriptor number.
  pub fn fd_num(&self) -> RawFd {
    self.0.fd
  }

  /// Whether a read has returned zero bytes.
  pub fn eof(&self) -> bool {
    self.0.eof.load(Ordering::Relaxed)
  }

  /// Whether the descriptor has been closed.
  pub fn closed(&self) -> bool {
    self.0.closed.load(Ordering::Acquire)
  }

  /// Whether the descriptor is in blocking mode.
  pub fn blocking(&self) -> bool {
    !self.0.non_blocking.load(Ordering::Relaxed)
  }

  /// Number of read events (reads, receives, accepts, read shutdowns).
  pub fn read_count(&self) -> u64 {
    self.0.read_count.load(Ordering::Relaxed)
  }

  /// Number of write events (writes, sends, write shutdowns).
  pub fn write_count(&self) -> u64 {
    self.0.write_count.load(Ordering::Relaxed)
  }

  /// How many handles share this descriptor.
  pub fn ref_count(&self) -> usize {
    Arc::strong_count(&self.0)
  }

  /// The descriptor number, or a contract violation if it was closed.
  pub(crate) fn live_fd(&self) -> Result<RawFd> {
    self.0.ensure_open()?;
    Ok(self.0.fd)
  }

  pub(crate) fn check_fd(
    &self,
    op: &'static str,
    res: io::Result<isize>,
  ) -> Result<Option<usize>> {
    self.0.check_fd(op, res)
  }

  pub(crate) fn set_eof(&self) {
    self.0.eof.store(true, Ordering::Relaxed);
  }

  pub(crate) fn register_read(&self) {
    self.0.read_count.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn register_write(&self) {
    self.0.write_count.fetch_add(1, Ordering::Relaxed);
  }
}

impl fmt::Debug for DescriptorHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DescriptorHandle")
      .field("fd", &self.fd_num())
      .field("closed", &self.closed())
      .field("eof", &self.eof())
      .field("blocking", &self.blocking())
      .field("refs", &self.ref_count())
      .finish()
  }
}

/// Would-block surfaces as [`io::ErrorKind::WouldBlock`] here, as std
/// callers expect.
impl io::Read for &DescriptorHandle {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
      return Ok(0);
    }
    self.read_raw(buf)?.ok_or_else(|| io::ErrorKind::WouldBlock.into())
  }
}

impl io::Read for DescriptorHandle {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    io::Read::read(&mut &*self, buf)
  }
}

impl io::Write for &DescriptorHandle {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if buf.is_empty() {
      return Ok(0);
    }
    self.write_raw(buf)?.ok_or_else(|| io::ErrorKind::WouldBlock.into())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl io::Write for DescriptorHandle {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    io::Write::write(&mut &*self, buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Sets `FD_CLOEXEC` on platforms without atomic close-on-exec flags.
#[cfg(not(linux))]
pub(crate) fn set_cloexec(fd: RawFd) -> Result<()> {
  let flags = check("fcntl", syscall!(fcntl(fd, libc::F_GETFD)))?;
  check("fcntl", syscall!(fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC)))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{Read, Write};

  #[test]
  fn duplicate_shares_state() {
    let (rx, tx) = DescriptorHandle::pipe().unwrap();
    let dup = rx.duplicate();
    assert_eq!(dup.fd_num(), rx.fd_num());
    assert_eq!(rx.ref_count(), 2);

    tx.write_all(b"abc").unwrap();
    let mut buf = vec![0u8; 3];
    assert_eq!(dup.read(&mut buf).unwrap(), 3);
    assert_eq!(rx.read_count(), 1);
    assert_eq!(tx.write_count(), 1);

    drop(dup);
    assert_eq!(rx.ref_count(), 1);
    assert!(!rx.closed());
  }

  #[test]
  fn short_buffer_reads_only_its_length() {
    let (rx, tx) = DescriptorHandle::pipe().unwrap();
    tx.write_all(b"abcdef").unwrap();

    let mut buf = vec![0u8; 4];
    assert_eq!(rx.read(&mut buf).unwrap(), 4);
    assert_eq!(buf, b"abcd");

    let mut rest = Vec::new();
    assert_eq!(rx.read(&mut rest).unwrap(), 2);
    assert_eq!(rest, b"ef");
  }

  #[test]
  fn zero_read_sets_eof() {
    let (rx, tx) = DescriptorHandle::pipe().unwrap();
    drop(tx);
    let mut buf = Vec::new();
    assert_eq!(rx.read(&mut buf).unwrap(), 0);
    assert!(buf.is_empty());
    assert!(rx.eof());
    assert_eq!(rx.read_count(), 1);
  }

  #[test]
  fn explicit_close_then_contract_violations() {
    let (rx, tx) = DescriptorHandle::pipe().unwrap();
    let dup = tx.duplicate();
    tx.close().unwrap();
    assert!(dup.closed());
    assert!(dup.close().unwrap_err().is_contract());
    assert!(dup.write(b"x").unwrap_err().is_contract());
    assert!(dup.set_blocking(false).unwrap_err().is_contract());

    let mut buf = Vec::new();
    assert_eq!(rx.read(&mut buf).unwrap(), 0);
    assert!(rx.eof());
  }

  #[test]
  fn std_io_traits() {
    let (mut rx, mut tx) = DescriptorHandle::pipe().unwrap();
    Write::write_all(&mut tx, b"std").unwrap();
    let mut buf = [0u8; 3];
    rx.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"std");
  }

  #[test]
  fn std_read_reports_would_block() {
    let (rx, _tx) = DescriptorHandle::pipe().unwrap();
    rx.set_blocking(false).unwrap();
    let mut buf = [0u8; 8];
    let err = Read::read(&mut &rx, &mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
  }

  #[test]
  fn open_rejects_interior_nul() {
    let err = DescriptorHandle::open("/tmp/a\0b", libc::O_RDONLY).unwrap_err();
    assert!(err.is_contract());
  }

  #[test]
  fn open_missing_file_is_os_error() {
    let err =
      DescriptorHandle::open("/nonexistent/fdnet", libc::O_RDONLY).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
  }
}
