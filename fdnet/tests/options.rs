use fdnet::net::{SocketOps, TcpSocket, UdpSocket};

#[test]
fn test_reuseaddr_reads_back() {
  let socket = UdpSocket::new().unwrap();
  let before: libc::c_int = socket.getsockopt(libc::SOL_SOCKET, libc::SO_REUSEADDR).unwrap();
  assert_eq!(before, 0);

  socket.set_reuseaddr().expect("Failed to set SO_REUSEADDR");
  let after: libc::c_int = socket.getsockopt(libc::SOL_SOCKET, libc::SO_REUSEADDR).unwrap();
  assert_ne!(after, 0);
}

#[test]
fn test_linger_struct_option() {
  let socket = TcpSocket::new().unwrap();
  let linger = libc::linger { l_onoff: 1, l_linger: 3 };
  socket.setsockopt(libc::SOL_SOCKET, libc::SO_LINGER, linger).unwrap();

  let read: libc::linger = socket.getsockopt(libc::SOL_SOCKET, libc::SO_LINGER).unwrap();
  assert_ne!(read.l_onoff, 0);
  assert_eq!(read.l_linger, 3);
}

#[test]
fn test_timeval_option() {
  let socket = UdpSocket::new().unwrap();
  let timeout = libc::timeval { tv_sec: 2, tv_usec: 0 };
  socket.setsockopt(libc::SOL_SOCKET, libc::SO_RCVTIMEO, timeout).unwrap();

  let read: libc::timeval = socket.getsockopt(libc::SOL_SOCKET, libc::SO_RCVTIMEO).unwrap();
  assert_eq!(read.tv_sec, 2);
}

#[test]
fn test_raw_option_round_trip() {
  let socket = TcpSocket::new().unwrap();
  let one: libc::c_int = 1;
  socket
    .setsockopt_raw(libc::IPPROTO_TCP, libc::TCP_NODELAY, &one.to_ne_bytes())
    .unwrap();

  let mut buf = [0u8; 4];
  let len = socket.getsockopt_raw(libc::IPPROTO_TCP, libc::TCP_NODELAY, &mut buf).unwrap();
  assert_eq!(len, 4);
  assert_ne!(libc::c_int::from_ne_bytes(buf), 0);
}

#[test]
fn test_unknown_option_is_os_error() {
  let socket = UdpSocket::new().unwrap();
  let err = socket.getsockopt::<libc::c_int>(libc::SOL_SOCKET, 0x7fff).unwrap_err();
  assert!(err.raw_os_error().is_some());
}

#[test]
fn test_option_on_closed_socket_is_contract_violation() {
  let socket = UdpSocket::new().unwrap();
  socket.close().unwrap();
  assert!(socket.set_reuseaddr().unwrap_err().is_contract());
  assert!(socket.local_address().unwrap_err().is_contract());
}

#[cfg(not(target_os = "linux"))]
#[test]
fn test_bind_to_device_unsupported() {
  let socket = UdpSocket::new().unwrap();
  assert!(matches!(
    socket.bind_to_device("lo0").unwrap_err(),
    fdnet::Error::Unsupported(_)
  ));
}
