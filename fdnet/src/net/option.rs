//! Typed socket option values.

use std::{mem, os::fd::RawFd};

use crate::{
  error::{Error, Result, check},
  handle::DescriptorHandle,
};

mod private {
  pub trait Sealed {}
}

/// A fixed-size value that can be passed to `getsockopt(2)`/`setsockopt(2)`.
///
/// Sealed: only plain C types whose every bit pattern is valid implement it.
pub trait OptionValue: private::Sealed + Copy {}

macro_rules! option_values {
  ($($ty:ty),* $(,)?) => {
    $(
      impl private::Sealed for $ty {}
      impl OptionValue for $ty {}
    )*
  };
}

option_values!(libc::c_int, libc::c_uint, libc::linger, libc::timeval);

/// Reads a fixed-size option, failing if the kernel reports a different
/// length than the size of `T`.
pub(crate) fn get<T>(
  handle: &DescriptorHandle,
  level: libc::c_int,
  option: libc::c_int,
) -> Result<T>
where
  T: OptionValue,
{
  let fd = handle.live_fd()?;
  // SAFETY: OptionValue is only implemented for plain C types.
  let mut value: T = unsafe { mem::zeroed() };
  let len = get_into(fd, level, option, (&mut value as *mut T).cast(), mem::size_of::<T>())?;
  if len != mem::size_of::<T>() {
    return Err(Error::Transport(format!(
      "unexpected length from getsockopt: {len}"
    )));
  }
  Ok(value)
}

/// Reads a variable-length option into `buf`, returning the reported length.
pub(crate) fn get_raw(
  handle: &DescriptorHandle,
  level: libc::c_int,
  option: libc::c_int,
  buf: &mut [u8],
) -> Result<usize> {
  let fd = handle.live_fd()?;
  get_into(fd, level, option, buf.as_mut_ptr().cast(), buf.len())
}

fn get_into(
  fd: RawFd,
  level: libc::c_int,
  option: libc::c_int,
  ptr: *mut libc::c_void,
  cap: usize,
) -> Result<usize> {
  let mut len = cap as libc::socklen_t;
  check("getsockopt", syscall!(getsockopt(fd, level, option, ptr, &mut len)))?;
  Ok(len as usize)
}

pub(crate) fn set<T>(
  handle: &DescriptorHandle,
  level: libc::c_int,
  option: libc::c_int,
  value: T,
) -> Result<()>
where
  T: OptionValue,
{
  let fd = handle.live_fd()?;
  check(
    "setsockopt",
    syscall!(setsockopt(
      fd,
      level,
      option,
      (&value as *const T).cast(),
      mem::size_of::<T>() as libc::socklen_t
    )),
  )?;
  Ok(())
}

pub(crate) fn set_raw(
  handle: &DescriptorHandle,
  level: libc::c_int,
  option: libc::c_int,
  value: &[u8],
) -> Result<()> {
  let fd = handle.live_fd()?;
  check(
    "setsockopt",
    syscall!(setsockopt(
      fd,
      level,
      option,
      value.as_ptr().cast(),
      value.len() as libc::socklen_t
    )),
  )?;
  Ok(())
}
