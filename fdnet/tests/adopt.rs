use std::os::fd::{FromRawFd, IntoRawFd};

use fdnet::{
  DescriptorHandle, Error, IntoHandle,
  net::{DatagramOps, Socket, SocketOps, StreamOps, TcpSocket, UdpSocket},
};
use socket2::{Domain, Protocol, Type};

fn foreign(domain: Domain, ty: Type, protocol: Option<Protocol>) -> DescriptorHandle {
  let socket = socket2::Socket::new(domain, ty, protocol)
    .expect("Failed to create socket2 socket");
  unsafe { DescriptorHandle::from_raw_fd(socket.into_raw_fd()) }
}

#[test]
fn test_adopt_matching_socket() {
  let handle = foreign(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP));
  let fd = handle.fd_num();

  let udp = UdpSocket::adopt(handle).expect("Failed to adopt");
  assert_eq!(udp.fd_num(), fd);

  // Fully usable afterwards
  let peer = UdpSocket::bind_to(&fdnet::Address::new("127.0.0.1", 0).unwrap()).unwrap();
  udp.send(b"adopted", Some(&peer.local_address().unwrap())).unwrap();
  let mut payload = Vec::new();
  peer.recv(&mut payload).unwrap();
  assert_eq!(payload, b"adopted");
}

#[test]
fn test_adopt_mismatch_returns_handle() {
  let handle = foreign(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP));
  let fd = handle.fd_num();

  let rejected = TcpSocket::adopt(handle).unwrap_err();
  assert!(matches!(rejected.error, Error::KindMismatch { .. }));

  // The descriptor was neither closed nor consumed
  let handle = rejected.handle;
  assert_eq!(handle.fd_num(), fd);
  assert!(!handle.closed());
  let udp = UdpSocket::adopt(handle).expect("Failed to adopt as UDP");
  udp.bind(&fdnet::Address::new("127.0.0.1", 0).unwrap()).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_adopt_checks_domain_first() {
  let handle = foreign(Domain::UNIX, Type::STREAM, None);
  let err = TcpSocket::adopt(handle).unwrap_err().error;
  match err {
    Error::KindMismatch { what, expected, actual } => {
      assert_eq!(what, "domain");
      assert_eq!(expected, libc::AF_INET);
      assert_eq!(actual, libc::AF_UNIX);
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn test_adopt_non_socket_is_os_error() {
  let (rx, _tx) = DescriptorHandle::pipe().unwrap();
  let rejected = UdpSocket::adopt(rx).unwrap_err();
  assert_eq!(rejected.error.raw_os_error(), Some(libc::ENOTSOCK));

  // Converting into the crate error keeps the cause
  let err: Error = rejected.into();
  assert_eq!(err.raw_os_error(), Some(libc::ENOTSOCK));
}

#[test]
fn test_generic_socket_adopt_and_unwrap() {
  let handle = foreign(Domain::IPV4, Type::STREAM, Some(Protocol::TCP));
  let generic = Socket::adopt(handle, libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP)
    .expect("Failed to adopt");

  // Re-adopt the same descriptor as the specific type
  let tcp = TcpSocket::adopt(generic.into_handle()).unwrap();
  tcp.set_reuseaddr().unwrap();
  tcp.bind(&fdnet::Address::new("127.0.0.1", 0).unwrap()).unwrap();
  tcp.listen_default().unwrap();
}
