//! Attaching to Linux TUN/TAP virtual interfaces.
//!
//! A [`TunTap`] is a [`DescriptorHandle`] bound to one virtual interface.
//! Frames are exchanged with the handle's ordinary read/write API: each
//! read returns one frame and each write injects one. No packet-info header
//! is prepended (`IFF_NO_PI`).
//!
//! ```rust,no_run
//! use fdnet::tun::{Mode, TunTap};
//!
//! let tun = TunTap::open("tun144", Mode::Tun).unwrap();
//! let mut frame = Vec::new();
//! tun.read(&mut frame).unwrap();
//! println!("{} got a {}-byte IP datagram", tun.name(), frame.len());
//! ```

use crate::{error::Result, handle::DescriptorHandle};

/// Which kind of virtual interface to attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// Layer 3: frames are IP datagrams.
  Tun,
  /// Layer 2: frames are Ethernet frames.
  Tap,
}

/// A handle attached to a TUN or TAP interface.
pub struct TunTap {
  handle: DescriptorHandle,
  name: String,
  mode: Mode,
}

impl TunTap {
  /// Attaches to the interface `name`, creating it if the caller is allowed
  /// to. Names longer than `IFNAMSIZ - 1` bytes are truncated.
  ///
  /// Always fails with [`Error::Unsupported`](crate::Error::Unsupported)
  /// outside Linux.
  pub fn open(name: &str, mode: Mode) -> Result<Self> {
    sys::open(name, mode)
  }

  /// Attaches an already opened clone-device descriptor (`/dev/net/tun`) to
  /// the interface `name`. On failure the descriptor is released.
  pub fn attach(handle: DescriptorHandle, name: &str, mode: Mode) -> Result<Self> {
    sys::attach(handle, name, mode)
  }

  /// The interface name as the kernel reported it back.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The mode the interface was attached with.
  pub fn mode(&self) -> Mode {
    self.mode
  }
}

impl std::os::fd::AsRawFd for TunTap {
  fn as_raw_fd(&self) -> std::os::fd::RawFd {
    self.handle.fd_num()
  }
}

impl std::ops::Deref for TunTap {
  type Target = DescriptorHandle;

  fn deref(&self) -> &Self::Target {
    &self.handle
  }
}

impl crate::handle::AsHandle for TunTap {
  fn as_handle(&self) -> &DescriptorHandle {
    &self.handle
  }
}

impl crate::handle::IntoHandle for TunTap {
  fn into_handle(self) -> DescriptorHandle {
    self.handle
  }
}

impl std::fmt::Debug for TunTap {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TunTap")
      .field("name", &self.name)
      .field("mode", &self.mode)
      .field("handle", &self.handle)
      .finish()
  }
}

#[cfg(linux)]
mod sys {
  use std::mem;

  use super::{Mode, TunTap};
  use crate::{
    error::{Error, Result, check},
    handle::DescriptorHandle,
  };

  const CLONE_DEVICE: &str = "/dev/net/tun";

  pub(super) fn open(name: &str, mode: Mode) -> Result<TunTap> {
    let handle = DescriptorHandle::open(CLONE_DEVICE, libc::O_RDWR)?;
    attach(handle, name, mode)
  }

  pub(super) fn attach(handle: DescriptorHandle, name: &str, mode: Mode) -> Result<TunTap> {
    let name = name.as_bytes();
    if name.contains(&0) {
      return Err(Error::Contract("interface name contains NUL"));
    }

    // SAFETY: ifreq is plain old data; zeroed is an empty request.
    let mut request: libc::ifreq = unsafe { mem::zeroed() };
    let len = name.len().min(request.ifr_name.len() - 1);
    for (dst, src) in request.ifr_name.iter_mut().zip(&name[..len]) {
      *dst = *src as libc::c_char;
    }
    let kind = match mode {
      Mode::Tun => libc::IFF_TUN,
      Mode::Tap => libc::IFF_TAP,
    };
    request.ifr_ifru.ifru_flags = (kind | libc::IFF_NO_PI) as libc::c_short;

    let fd = handle.live_fd()?;
    check("ioctl", syscall!(ioctl(
      fd,
      libc::TUNSETIFF,
      &mut request as *mut libc::ifreq
    )))?;

    let assigned: Vec<u8> = request
      .ifr_name
      .iter()
      .take_while(|&&c| c != 0)
      .map(|&c| c as u8)
      .collect();
    let name = String::from_utf8_lossy(&assigned).into_owned();
    tracing::debug!(fd, interface = %name, ?mode, "attached to interface");
    Ok(TunTap { handle, name, mode })
  }
}

#[cfg(not(linux))]
mod sys {
  use super::{Mode, TunTap};
  use crate::{
    error::{Error, Result},
    handle::DescriptorHandle,
  };

  pub(super) fn open(name: &str, mode: Mode) -> Result<TunTap> {
    let _ = (name, mode);
    Err(Error::Unsupported("TUN/TAP interfaces"))
  }

  pub(super) fn attach(handle: DescriptorHandle, name: &str, mode: Mode) -> Result<TunTap> {
    drop(handle);
    open(name, mode)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(linux)]
  #[test]
  fn nul_in_name_is_contract_violation() {
    let (rx, _tx) = DescriptorHandle::pipe().unwrap();
    let err = TunTap::attach(rx, "tun\0x", Mode::Tun).unwrap_err();
    assert!(err.is_contract());
  }

  #[cfg(linux)]
  #[test]
  fn attach_rejects_non_tun_descriptor() {
    let (rx, _tx) = DescriptorHandle::pipe().unwrap();
    let err = TunTap::attach(rx, "tun0", Mode::Tun).unwrap_err();
    assert!(err.raw_os_error().is_some());
  }

  #[cfg(not(linux))]
  #[test]
  fn unsupported_off_linux() {
    let err = TunTap::open("tun0", Mode::Tap).unwrap_err();
    assert!(matches!(err, crate::Error::Unsupported(_)));
  }
}
