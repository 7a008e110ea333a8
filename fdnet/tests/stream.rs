use std::{net::Shutdown, thread};

use fdnet::{
  Address,
  net::{DEFAULT_BACKLOG, LocalStreamSocket, SocketOps, StreamOps, TcpSocket},
};

fn listener() -> (TcpSocket, Address) {
  let loopback = Address::new("127.0.0.1", 0).unwrap();
  let listener = TcpSocket::bind_listener(&loopback, DEFAULT_BACKLOG)
    .expect("Failed to create listener");
  let addr = listener.local_address().unwrap();
  (listener, addr)
}

#[test]
fn test_accept_yields_connected_peer() {
  let (listener, addr) = listener();
  assert_ne!(addr.port(), Some(0));

  let client = TcpSocket::connect_to(&addr).expect("Failed to connect");
  let server_side = listener.accept().expect("Failed to accept");

  assert_eq!(server_side.peer_address().unwrap(), client.local_address().unwrap());
  assert_eq!(client.peer_address().unwrap(), addr);
  assert_ne!(server_side.fd_num(), listener.fd_num());
  assert_eq!(server_side.read_count(), 0);
}

#[test]
fn test_each_accept_counts_one_read() {
  let (listener, addr) = listener();
  let clients: Vec<_> = (0..3).map(|_| TcpSocket::connect_to(&addr).unwrap()).collect();

  for expected in 1..=3 {
    let _conn = listener.accept().unwrap();
    assert_eq!(listener.read_count(), expected);
  }
  assert_eq!(listener.write_count(), 0);
  drop(clients);
}

#[test]
fn test_stream_echo_and_eof() {
  let (listener, addr) = listener();

  let server = thread::spawn(move || {
    let conn = listener.accept().expect("Failed to accept");
    let mut received = Vec::new();
    loop {
      let mut chunk = Vec::new();
      if conn.read(&mut chunk).unwrap() == 0 {
        break;
      }
      received.extend_from_slice(&chunk);
    }
    assert!(conn.eof());
    conn.write_all(&received).unwrap();
    received.len()
  });

  let client = TcpSocket::connect_to(&addr).unwrap();
  let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
  client.write_all(&payload).unwrap();
  client.shutdown(Shutdown::Write).expect("Failed to shutdown");

  let mut echoed = Vec::new();
  loop {
    let mut chunk = Vec::new();
    if client.read(&mut chunk).unwrap() == 0 {
      break;
    }
    echoed.extend_from_slice(&chunk);
  }

  assert_eq!(server.join().unwrap(), payload.len());
  assert_eq!(echoed, payload);
  assert!(client.eof());
}

#[test]
fn test_shutdown_counts_events() {
  let (listener, addr) = listener();

  let both = TcpSocket::connect_to(&addr).unwrap();
  let _conn = listener.accept().unwrap();
  both.shutdown(Shutdown::Both).expect("Failed to shutdown");
  assert_eq!((both.read_count(), both.write_count()), (1, 1));

  let halves = TcpSocket::connect_to(&addr).unwrap();
  let _conn = listener.accept().unwrap();
  halves.shutdown(Shutdown::Read).unwrap();
  assert_eq!((halves.read_count(), halves.write_count()), (1, 0));
  halves.shutdown_raw(libc::SHUT_WR).unwrap();
  assert_eq!((halves.read_count(), halves.write_count()), (1, 1));
}

#[test]
fn test_invalid_shutdown_is_contract_violation() {
  let (listener, addr) = listener();
  let client = TcpSocket::connect_to(&addr).unwrap();
  let _conn = listener.accept().unwrap();

  let err = client.shutdown_raw(42).unwrap_err();
  assert!(err.is_contract());
  assert_eq!((client.read_count(), client.write_count()), (0, 0));

  // The socket is still fully usable
  client.write_all(b"still open").unwrap();
}

#[test]
fn test_non_blocking_connect_reports_refusal() {
  // Grab a port nobody listens on
  let (listener, addr) = listener();
  drop(listener);

  let client = TcpSocket::new().unwrap();
  client.set_blocking(false).unwrap();

  match client.connect(&addr) {
    Ok(()) => {
      let mut pfd = libc::pollfd { fd: client.fd_num(), events: libc::POLLOUT, revents: 0 };
      let ready = unsafe { libc::poll(&mut pfd, 1, 5_000) };
      assert_eq!(ready, 1, "connect never completed");

      let err = client.poll_pending_error().unwrap_err();
      assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    }
    Err(err) => assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED)),
  }
}

#[test]
fn test_pending_error_is_clear_on_healthy_socket() {
  let (listener, addr) = listener();
  let client = TcpSocket::connect_to(&addr).unwrap();
  let _conn = listener.accept().unwrap();
  client.poll_pending_error().expect("no pending error");
}

#[test]
fn test_local_stream_pair() {
  let (left, right) = LocalStreamSocket::pair().expect("Failed to create pair");

  left.write_all(b"ping").unwrap();
  let mut buf = Vec::new();
  right.read(&mut buf).unwrap();
  assert_eq!(buf, b"ping");

  drop(left);
  let mut buf = Vec::new();
  assert_eq!(right.read(&mut buf).unwrap(), 0);
  assert!(right.eof());
}

#[test]
fn test_local_stream_listener() {
  let path = std::env::temp_dir().join(format!("fdnet-stream-{}", std::process::id()));
  let _ = std::fs::remove_file(&path);
  let addr = Address::unix(&path).unwrap();

  let listener = LocalStreamSocket::new().unwrap();
  listener.bind(&addr).unwrap();
  listener.listen_default().unwrap();

  let client = LocalStreamSocket::new().unwrap();
  client.connect(&addr).unwrap();
  let conn = listener.accept().unwrap();

  conn.write_all(b"over unix").unwrap();
  let mut buf = Vec::new();
  client.read(&mut buf).unwrap();
  assert_eq!(buf, b"over unix");

  std::fs::remove_file(&path).unwrap();
}
