//! Buffer abstractions for scatter/gather I/O.
//!
//! Two capabilities meet at the syscall boundary:
//!
//! - **Source buffers** (writes and sends) are anything that is
//!   `AsRef<[u8]>`: `Vec<u8>`, `&[u8]`, `String`, `&str`, ...
//! - **Destination buffers** (reads and receives) implement [`BufLike`]. The
//!   current *length* of a destination buffer is the number of bytes the
//!   kernel may fill; after the call the buffer is truncated to what was
//!   actually received.
//!
//! A list of buffers is turned into a [`ScatterGather`] right before the
//! syscall. The list borrows the buffers for exactly the duration of that
//! call and enforces the list invariants: at least one buffer, no empty
//! buffer, and a nonzero total size.
//!
//! ```rust
//! use fdnet::buf::ScatterGather;
//!
//! let parts = [b"hello ".as_slice(), b"world".as_slice()];
//! let list = ScatterGather::from_slices(&parts).unwrap();
//! assert_eq!(list.total_len(), 11);
//!
//! let empty: [&[u8]; 0] = [];
//! assert!(ScatterGather::from_slices(&empty).is_err());
//! ```

use std::marker::PhantomData;

use crate::error::{Error, Result};

/// Size of the buffer allocated by reads and receives when the caller
/// passes an empty one.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16384;

mod private {
  pub trait Sealed {}
}

/// A destination buffer for reads and receives.
///
/// # Rules of implementation
/// - [`buf_len`](BufLike::buf_len) is the number of bytes the kernel may
///   write, starting at [`buf_mut`](BufLike::buf_mut).
/// - [`deinit`](BufLike::deinit) shrinks the buffer to the bytes actually
///   transferred and must never grow it.
pub trait BufLike: private::Sealed {
  /// Grows an empty buffer to `len` zeroed bytes. Non-empty buffers are
  /// left untouched.
  fn prepare(&mut self, len: usize);

  /// The writable region handed to the kernel.
  fn buf_mut(&mut self) -> &mut [u8];

  /// Current length of the writable region.
  fn buf_len(&self) -> usize;

  /// Called after I/O completes with the number of bytes received.
  fn deinit(&mut self, bytes: usize);
}

impl private::Sealed for Vec<u8> {}

impl BufLike for Vec<u8> {
  fn prepare(&mut self, len: usize) {
    if self.is_empty() {
      self.resize(len, 0);
    }
  }

  fn buf_mut(&mut self) -> &mut [u8] {
    self.as_mut_slice()
  }

  fn buf_len(&self) -> usize {
    self.len()
  }

  fn deinit(&mut self, bytes: usize) {
    self.truncate(bytes);
  }
}

#[cfg(feature = "bytes")]
impl private::Sealed for bytes::BytesMut {}

#[cfg(feature = "bytes")]
#[cfg_attr(docsrs, doc(cfg(feature = "bytes")))]
impl BufLike for bytes::BytesMut {
  fn prepare(&mut self, len: usize) {
    if self.is_empty() {
      self.resize(len, 0);
    }
  }

  fn buf_mut(&mut self) -> &mut [u8] {
    &mut self[..]
  }

  fn buf_len(&self) -> usize {
    self.len()
  }

  fn deinit(&mut self, bytes: usize) {
    self.truncate(bytes);
  }
}

/// An ephemeral, non-owning list of `iovec`s borrowing caller buffers.
///
/// Built by [`ScatterGather::from_slices`] (gather side) or internally from
/// mutable [`BufLike`] buffers (scatter side). Always non-empty, without
/// empty elements, with a nonzero [`total_len`](ScatterGather::total_len).
pub struct ScatterGather<'a> {
  iovecs: Vec<libc::iovec>,
  total: usize,
  _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> ScatterGather<'a> {
  /// Builds a gather list over read-only buffers.
  pub fn from_slices<B>(buffers: &'a [B]) -> Result<Self>
  where
    B: AsRef<[u8]>,
  {
    Self::build(buffers.iter().map(|buf| {
      let slice = buf.as_ref();
      // writev/sendmsg never write through iov_base.
      (slice.as_ptr().cast_mut(), slice.len())
    }))
  }

  /// Builds a scatter list over destination buffers.
  pub(crate) fn from_bufs_mut<B>(buffers: &'a mut [B]) -> Result<Self>
  where
    B: BufLike,
  {
    Self::build(buffers.iter_mut().map(|buf| {
      let slice = buf.buf_mut();
      (slice.as_mut_ptr(), slice.len())
    }))
  }

  fn build(parts: impl ExactSizeIterator<Item = (*mut u8, usize)>) -> Result<Self> {
    if parts.len() == 0 {
      return Err(Error::Contract("scatter/gather called with empty buffer list"));
    }

    let mut iovecs = Vec::with_capacity(parts.len());
    let mut total: usize = 0;
    for (ptr, len) in parts {
      if len == 0 {
        return Err(Error::Contract(
          "scatter/gather called with empty buffer in buffer list",
        ));
      }
      iovecs.push(libc::iovec { iov_base: ptr.cast(), iov_len: len });
      total += len;
    }

    if total == 0 {
      return Err(Error::Contract("scatter/gather called with zero-size buffer list"));
    }

    Ok(ScatterGather { iovecs, total, _borrow: PhantomData })
  }

  /// Sum of the lengths of every element.
  pub fn total_len(&self) -> usize {
    self.total
  }

  /// Number of elements.
  pub fn len(&self) -> usize {
    self.iovecs.len()
  }

  /// Never true for a constructed list; kept for API symmetry with [`len`](Self::len).
  pub fn is_empty(&self) -> bool {
    self.iovecs.is_empty()
  }

  /// Element lengths, in order.
  pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
    self.iovecs.iter().map(|iov| iov.iov_len)
  }

  pub(crate) fn as_ptr(&self) -> *const libc::iovec {
    self.iovecs.as_ptr()
  }

  pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::iovec {
    self.iovecs.as_mut_ptr()
  }

  pub(crate) fn iovcnt(&self) -> Result<libc::c_int> {
    libc::c_int::try_from(self.iovecs.len())
      .map_err(|_| Error::Contract("buffer list too long for one syscall"))
  }
}

impl std::fmt::Debug for ScatterGather<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ScatterGather")
      .field("lengths", &self.lengths().collect::<Vec<_>>())
      .field("total", &self.total)
      .finish()
  }
}

/// Distributes `received` bytes across `buffers` in order.
///
/// Each buffer keeps up to its own length from the remaining count; the
/// buffer where the data ends is truncated, every later buffer is emptied.
pub(crate) fn distribute<B>(buffers: &mut [B], received: usize)
where
  B: BufLike,
{
  let mut remaining = received;
  for buf in buffers {
    let len = buf.buf_len();
    if remaining >= len {
      remaining -= len;
    } else {
      buf.deinit(remaining);
      remaining = 0;
    }
  }
}
