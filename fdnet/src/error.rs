//! Error taxonomy and syscall-error translation.
//!
//! Every fallible operation in this crate returns [`Result`]. Failures fall
//! into three classes:
//!
//! - **OS call failure** ([`Error::Os`]): a libc call returned its failure
//!   sentinel. Carries the name of the call and the OS error code.
//! - **Contract violation** ([`Error::Contract`]): the caller broke a
//!   precondition, e.g. an empty buffer list or I/O on a closed handle.
//! - **Transport-invariant violation** ([`Error::OversizedDatagram`],
//!   [`Error::ShortSend`], [`Error::KindMismatch`], [`Error::Transport`]):
//!   the OS did something the medium promises never happens, or a descriptor
//!   is not what the caller declared it to be.
//!
//! `EINTR` is not retried anywhere in this crate; it surfaces as
//! [`Error::Os`] like any other failure.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for every operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A system call failed.
  #[error("{op}: {source}")]
  Os {
    /// Name of the failing call, e.g. `"connect"`.
    op: &'static str,
    #[source]
    source: io::Error,
  },

  /// The caller violated a precondition of the operation.
  #[error("contract violation: {0}")]
  Contract(&'static str),

  /// A datagram was larger than the supplied buffers and got truncated.
  #[error("{op} (oversized datagram of length {len})")]
  OversizedDatagram {
    /// Name of the receiving call.
    op: &'static str,
    /// Full datagram length as the kernel reported it.
    len: usize,
  },

  /// A message-oriented send accepted fewer bytes than the whole payload.
  #[error("{op} sent {sent} bytes of a {expected}-byte payload")]
  ShortSend {
    /// Name of the sending call.
    op: &'static str,
    /// Bytes the kernel accepted.
    sent: usize,
    /// Size of the whole payload.
    expected: usize,
  },

  /// An adopted descriptor is not the kind of socket the caller declared.
  #[error("socket {what} mismatch (expected {expected}, found {actual})")]
  KindMismatch {
    /// `"domain"`, `"type"` or `"protocol"`.
    what: &'static str,
    /// Value the caller declared.
    expected: libc::c_int,
    /// Value the kernel reported.
    actual: libc::c_int,
  },

  /// Any other violated transport invariant.
  #[error("{0}")]
  Transport(String),

  /// The facility does not exist on this platform.
  #[error("unsupported on this platform: {0}")]
  Unsupported(&'static str),
}

impl Error {
  pub(crate) fn os(op: &'static str, source: io::Error) -> Self {
    Error::Os { op, source }
  }

  /// The OS error code, if this is an [`Error::Os`].
  pub fn raw_os_error(&self) -> Option<i32> {
    match self {
      Error::Os { source, .. } => source.raw_os_error(),
      _ => None,
    }
  }

  /// Whether the caller broke a precondition.
  pub fn is_contract(&self) -> bool {
    matches!(self, Error::Contract(_))
  }
}

impl From<Error> for io::Error {
  fn from(value: Error) -> Self {
    match value {
      Error::Os { source, .. } => source,
      Error::Contract(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
      Error::Unsupported(_) => {
        io::Error::new(io::ErrorKind::Unsupported, value)
      }
      other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
  }
}

/// Attaches the call name to a raw syscall result.
pub(crate) fn check<T>(op: &'static str, res: io::Result<T>) -> Result<T> {
  res.map_err(|err| Error::os(op, err))
}

/// Whether `err` only says "try again later" on a non-blocking descriptor.
pub(crate) fn is_would_block(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
    || err.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn os_error_keeps_code_through_io_conversion() {
    let err = Error::os("connect", io::Error::from_raw_os_error(libc::ECONNREFUSED));
    assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    assert!(err.to_string().starts_with("connect: "));

    let io_err: io::Error = err.into();
    assert_eq!(io_err.raw_os_error(), Some(libc::ECONNREFUSED));
  }

  #[test]
  fn contract_maps_to_invalid_input() {
    let err = Error::Contract("empty buffer list");
    assert!(err.is_contract());
    assert_eq!(err.raw_os_error(), None);
    let io_err: io::Error = err.into();
    assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
  }

  #[test]
  fn would_block_detection() {
    assert!(is_would_block(&io::Error::from_raw_os_error(libc::EAGAIN)));
    assert!(is_would_block(&io::Error::from_raw_os_error(libc::EINPROGRESS)));
    assert!(!is_would_block(&io::Error::from_raw_os_error(libc::EBADF)));
  }
}
