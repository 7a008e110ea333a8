//! Opaque socket addresses.
//!
//! [`Address`] is a fixed-size `sockaddr_storage` plus the length the kernel
//! (or the caller) declared for it. Beyond raw-bytes access it only knows how
//! to convert itself to and from [`std::net::SocketAddr`] and Unix socket
//! paths; everything else is left to higher layers.

use std::{
  ffi::OsStr,
  fmt, mem,
  net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
  os::unix::ffi::OsStrExt,
  path::Path,
  ptr,
};

use crate::error::{Error, Result};

const STORAGE_LEN: usize = mem::size_of::<libc::sockaddr_storage>();

/// An immutable raw socket address.
#[derive(Clone, Copy)]
pub struct Address {
  storage: libc::sockaddr_storage,
  len: libc::socklen_t,
}

impl Address {
  fn zeroed_storage() -> libc::sockaddr_storage {
    // SAFETY: sockaddr_storage is plain old data; all-zero is a valid value.
    unsafe { mem::zeroed() }
  }

  /// Copies a raw address out of `bytes`.
  ///
  /// Fails with a contract violation if `bytes` is empty or larger than a
  /// `sockaddr_storage`.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    if bytes.is_empty() || bytes.len() > STORAGE_LEN {
      return Err(Error::Contract("raw address has invalid length"));
    }
    let mut storage = Self::zeroed_storage();
    // SAFETY: length checked against the size of storage above, the regions
    // cannot overlap since storage lives on our stack.
    unsafe {
      ptr::copy_nonoverlapping(
        bytes.as_ptr(),
        (&mut storage as *mut libc::sockaddr_storage).cast::<u8>(),
        bytes.len(),
      );
    }
    Ok(Address { storage, len: bytes.len() as libc::socklen_t })
  }

  /// Wraps storage filled in by the kernel, validating the returned length.
  ///
  /// A zero length is accepted: it is how the kernel reports an unnamed
  /// peer, e.g. the other end of a `socketpair(2)`.
  pub(crate) fn from_storage(
    op: &'static str,
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
  ) -> Result<Self> {
    if len as usize > STORAGE_LEN {
      return Err(Error::Transport(format!("{op} gave invalid namelen {len}")));
    }
    Ok(Address { storage, len })
  }

  /// An empty storage and its capacity, ready for the kernel to fill.
  pub(crate) fn storage() -> (libc::sockaddr_storage, libc::socklen_t) {
    (Self::zeroed_storage(), STORAGE_LEN as libc::socklen_t)
  }

  /// Parses a numeric IPv4 or IPv6 address and pairs it with `port`.
  ///
  /// ```rust
  /// let addr = fdnet::Address::new("127.0.0.1", 8080).unwrap();
  /// assert_eq!(addr.port(), Some(8080));
  /// ```
  pub fn new(ip: &str, port: u16) -> Result<Self> {
    let ip: IpAddr =
      ip.parse().map_err(|_| Error::Contract("not a numeric IP address"))?;
    Ok(SocketAddr::new(ip, port).into())
  }

  /// An IPv4 address from its host-order numeric form.
  pub fn from_ipv4_numeric(ip: u32, port: u16) -> Self {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(ip), port)).into()
  }

  /// A Unix domain socket address for a filesystem path.
  pub fn unix(path: impl AsRef<Path>) -> Result<Self> {
    let bytes = path.as_ref().as_os_str().as_bytes();

    // SAFETY: sockaddr_un is plain old data.
    let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
    if bytes.is_empty() || bytes.len() >= sun.sun_path.len() {
      return Err(Error::Contract("unix socket path is empty or too long"));
    }
    if bytes.contains(&0) {
      return Err(Error::Contract("unix socket path contains NUL"));
    }

    sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in sun.sun_path.iter_mut().zip(bytes) {
      *dst = *src as libc::c_char;
    }
    let len = mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len() + 1;
    #[cfg(sockaddr_len)]
    {
      sun.sun_len = len as u8;
    }

    // SAFETY: sockaddr_un fits in sockaddr_storage by definition.
    let bytes = unsafe {
      std::slice::from_raw_parts((&sun as *const libc::sockaddr_un).cast::<u8>(), len)
    };
    Address::from_bytes(bytes)
  }

  /// Pointer suitable for passing to `bind(2)`, `connect(2)`, `sendto(2)`...
  pub fn raw(&self) -> *const libc::sockaddr {
    (&self.storage as *const libc::sockaddr_storage).cast()
  }

  /// Declared length of the address.
  pub fn size(&self) -> libc::socklen_t {
    self.len
  }

  /// The raw bytes of the address, `size()` long.
  pub fn as_bytes(&self) -> &[u8] {
    // SAFETY: len never exceeds the storage size (checked at construction).
    unsafe {
      std::slice::from_raw_parts(
        (&self.storage as *const libc::sockaddr_storage).cast::<u8>(),
        self.len as usize,
      )
    }
  }

  /// Whether the kernel reported no address at all.
  pub fn is_unnamed(&self) -> bool {
    self.len == 0
  }

  /// The address family (`AF_INET`, `AF_UNIX`, ...).
  pub fn family(&self) -> libc::c_int {
    self.storage.ss_family as libc::c_int
  }

  /// Converts an `AF_INET`/`AF_INET6` address to its std form.
  pub fn to_socket_addr(&self) -> Result<SocketAddr> {
    match self.family() {
      libc::AF_INET if self.len as usize >= mem::size_of::<libc::sockaddr_in>() => {
        // SAFETY: the family says this storage holds a sockaddr_in and the
        // length covers it; sockaddr_storage is suitably aligned.
        let sin = unsafe { *self.raw().cast::<libc::sockaddr_in>() };
        let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
      }
      libc::AF_INET6 if self.len as usize >= mem::size_of::<libc::sockaddr_in6>() => {
        // SAFETY: same as above for sockaddr_in6.
        let sin6 = unsafe { *self.raw().cast::<libc::sockaddr_in6>() };
        Ok(SocketAddr::V6(SocketAddrV6::new(
          Ipv6Addr::from(sin6.sin6_addr.s6_addr),
          u16::from_be(sin6.sin6_port),
          sin6.sin6_flowinfo,
          sin6.sin6_scope_id,
        )))
      }
      _ => Err(Error::os(
        "to_socket_addr",
        std::io::Error::from_raw_os_error(libc::EAFNOSUPPORT),
      )),
    }
  }

  /// The IP part, for internet addresses.
  pub fn ip(&self) -> Option<IpAddr> {
    self.to_socket_addr().ok().map(|addr| addr.ip())
  }

  /// The port, for internet addresses.
  pub fn port(&self) -> Option<u16> {
    self.to_socket_addr().ok().map(|addr| addr.port())
  }

  /// The IPv4 address in host-order numeric form.
  pub fn ipv4_numeric(&self) -> Option<u32> {
    match self.ip()? {
      IpAddr::V4(ip) => Some(u32::from(ip)),
      IpAddr::V6(_) => None,
    }
  }

  /// The filesystem path of a (non-abstract, non-unnamed) Unix address.
  pub fn unix_path(&self) -> Option<&Path> {
    if self.family() != libc::AF_UNIX {
      return None;
    }
    let offset = mem::offset_of!(libc::sockaddr_un, sun_path);
    let path = self.as_bytes().get(offset..)?;
    let end = path.iter().position(|b| *b == 0).unwrap_or(path.len());
    if end == 0 {
      return None;
    }
    Some(Path::new(OsStr::from_bytes(&path[..end])))
  }
}

impl From<SocketAddr> for Address {
  fn from(addr: SocketAddr) -> Self {
    let mut storage = Address::zeroed_storage();
    let len = match addr {
      // SAFETY: sockaddr_in fits in sockaddr_storage by design and the
      // source lives on our stack, so the copy is in bounds and disjoint.
      SocketAddr::V4(v4) => unsafe {
        let sin = into_addr(v4);
        ptr::copy_nonoverlapping(
          (&sin as *const libc::sockaddr_in).cast::<u8>(),
          (&mut storage as *mut libc::sockaddr_storage).cast::<u8>(),
          mem::size_of::<libc::sockaddr_in>(),
        );
        mem::size_of::<libc::sockaddr_in>()
      },
      // SAFETY: same for sockaddr_in6.
      SocketAddr::V6(v6) => unsafe {
        let sin6 = into_addr6(v6);
        ptr::copy_nonoverlapping(
          (&sin6 as *const libc::sockaddr_in6).cast::<u8>(),
          (&mut storage as *mut libc::sockaddr_storage).cast::<u8>(),
          mem::size_of::<libc::sockaddr_in6>(),
        );
        mem::size_of::<libc::sockaddr_in6>()
      },
    };
    Address { storage, len: len as libc::socklen_t }
  }
}

impl TryFrom<&Address> for SocketAddr {
  type Error = Error;

  fn try_from(value: &Address) -> Result<Self> {
    value.to_socket_addr()
  }
}

impl PartialEq for Address {
  fn eq(&self, other: &Self) -> bool {
    self.as_bytes() == other.as_bytes()
  }
}

impl Eq for Address {}

impl fmt::Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Address({self})")
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Ok(addr) = self.to_socket_addr() {
      return write!(f, "{addr}");
    }
    if let Some(path) = self.unix_path() {
      return write!(f, "unix:{}", path.display());
    }
    if self.is_unnamed() {
      return f.write_str("(unnamed)");
    }
    write!(f, "family {} ({} bytes)", self.family(), self.len)
  }
}

fn into_addr(addr: SocketAddrV4) -> libc::sockaddr_in {
  // SAFETY: sockaddr_in is a C struct with primitive integer fields.
  let mut _addr: libc::sockaddr_in = unsafe { mem::zeroed() };

  #[cfg(sockaddr_len)]
  {
    _addr.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
  }
  _addr.sin_family = libc::AF_INET as libc::sa_family_t;
  _addr.sin_port = addr.port().to_be();
  _addr.sin_addr = libc::in_addr { s_addr: u32::from(*addr.ip()).to_be() };

  _addr
}

fn into_addr6(addr: SocketAddrV6) -> libc::sockaddr_in6 {
  // SAFETY: sockaddr_in6 is a C struct with primitive integer/array fields.
  let mut _addr: libc::sockaddr_in6 = unsafe { mem::zeroed() };

  #[cfg(sockaddr_len)]
  {
    _addr.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
  }
  _addr.sin6_family = libc::AF_INET6 as libc::sa_family_t;
  _addr.sin6_port = addr.port().to_be();
  _addr.sin6_flowinfo = addr.flowinfo();
  _addr.sin6_scope_id = addr.scope_id();
  _addr.sin6_addr = libc::in6_addr { s6_addr: addr.ip().octets() };

  _addr
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ipv4_round_trip() {
    let std_addr: SocketAddr = "192.168.1.7:4242".parse().unwrap();
    let addr = Address::from(std_addr);
    assert_eq!(addr.family(), libc::AF_INET);
    assert_eq!(addr.size() as usize, mem::size_of::<libc::sockaddr_in>());
    assert_eq!(addr.to_socket_addr().unwrap(), std_addr);
    assert_eq!(addr.ipv4_numeric(), Some(0xc0a8_0107));
    assert_eq!(addr.to_string(), "192.168.1.7:4242");
  }

  #[test]
  fn ipv6_round_trip() {
    let std_addr: SocketAddr = "[fe80::1]:53".parse().unwrap();
    let addr = Address::from(std_addr);
    assert_eq!(addr.family(), libc::AF_INET6);
    assert_eq!(SocketAddr::try_from(&addr).unwrap(), std_addr);
    assert_eq!(addr.ipv4_numeric(), None);
  }

  #[test]
  fn numeric_constructor_matches_parse() {
    let a = Address::from_ipv4_numeric(0x7f00_0001, 80);
    let b = Address::new("127.0.0.1", 80).unwrap();
    assert_eq!(a, b);
    assert!(Address::new("localhost", 80).unwrap_err().is_contract());
  }

  #[test]
  fn raw_bytes_round_trip() {
    let addr = Address::new("10.0.0.1", 9).unwrap();
    let copy = Address::from_bytes(addr.as_bytes()).unwrap();
    assert_eq!(addr, copy);
    assert!(Address::from_bytes(&[]).unwrap_err().is_contract());
    assert!(Address::from_bytes(&[0u8; STORAGE_LEN + 1]).unwrap_err().is_contract());
  }

  #[test]
  fn unix_path_round_trip() {
    let addr = Address::unix("/tmp/fdnet.sock").unwrap();
    assert_eq!(addr.family(), libc::AF_UNIX);
    assert_eq!(addr.unix_path(), Some(Path::new("/tmp/fdnet.sock")));
    assert!(addr.to_socket_addr().is_err());
    assert_eq!(addr.to_string(), "unix:/tmp/fdnet.sock");
  }

  #[test]
  fn unix_path_rejects_bad_input() {
    assert!(Address::unix("").unwrap_err().is_contract());
    let long = "x".repeat(200);
    assert!(Address::unix(long).unwrap_err().is_contract());
  }

  #[test]
  fn kernel_length_is_validated() {
    let (storage, _) = Address::storage();
    assert!(matches!(
      Address::from_storage("recvfrom", storage, STORAGE_LEN as libc::socklen_t + 1),
      Err(Error::Transport(_))
    ));

    let unnamed = Address::from_storage("recvfrom", storage, 0).unwrap();
    assert!(unnamed.is_unnamed());
    assert_eq!(unnamed.to_string(), "(unnamed)");
  }
}
