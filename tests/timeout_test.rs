//! Deadline behavior: every operation returns within its bound and a fired
//! deadline poisons the session.

mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use warmline::base::Error;
use warmline::http::HttpSession;
use warmline::socket::{TcpSession, TransportStream, UdpSession};

#[test]
fn connect_zero_timeout_fails_fast() {
    let addr = common::spawn_tcp_echo();
    let endpoint = common::tcp_endpoint(addr);

    let start = Instant::now();
    let result = TcpSession::connect(&endpoint, Duration::ZERO, Duration::from_secs(1));
    match result {
        Err(err) => assert!(err.is_timeout(), "expected timeout, got {err:?}"),
        Ok(_) => panic!("zero-timeout connect must not succeed"),
    }
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn connect_timeout_when_backlog_is_full() {
    let (_listener, addr) = common::bind_backlog_one();
    let endpoint = common::tcp_endpoint(addr);
    let connect_timeout = Duration::from_millis(849);

    // The first two connects land in the kernel SYN queue even though the
    // server never accepts.
    let first = TcpSession::connect(&endpoint, connect_timeout, Duration::from_secs(1))
        .expect("first connect fills the backlog");
    assert!(first.is_open());
    let _second = TcpSession::connect(&endpoint, connect_timeout, Duration::from_secs(1))
        .expect("second connect rides the SYN queue");

    let start = Instant::now();
    let third = TcpSession::connect(&endpoint, connect_timeout, Duration::from_secs(1));
    let elapsed = start.elapsed();
    match third {
        Err(err) => assert!(err.is_timeout(), "expected timeout, got {err:?}"),
        Ok(_) => panic!("third connect should exhaust the backlog"),
    }
    assert!(elapsed >= connect_timeout);
    assert!(elapsed < Duration::from_secs(3));
}

#[test]
fn receive_times_out_when_peer_is_silent() {
    let addr = common::spawn_tcp_sink();
    let endpoint = common::tcp_endpoint(addr);
    let mut session = TcpSession::connect(&endpoint, Duration::from_secs(2), Duration::from_secs(1))
        .expect("connect to sink");

    let mut buf = [0u8; 10];
    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    let result = session.receive(&mut buf, timeout.into());
    let elapsed = start.elapsed();

    match result {
        Err(err) => assert!(err.is_timeout(), "expected timeout, got {err:?}"),
        Ok(n) => panic!("unexpected {n} bytes from a silent peer"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_millis(400));
    // A fired deadline closes the handle.
    assert!(!session.is_open());
}

#[test]
fn read_some_times_out_when_peer_is_silent() {
    use warmline::socket::StreamSocket;

    let addr = common::spawn_tcp_sink();
    let endpoint = common::tcp_endpoint(addr);
    let mut session = TcpSession::connect(&endpoint, Duration::from_secs(2), Duration::from_secs(1))
        .expect("connect to sink");

    let mut buf = [0u8; 10];
    let start = Instant::now();
    let result = session.read_some(&mut buf, Duration::from_millis(100).into());
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn udp_receive_times_out_when_peer_is_silent() {
    let addr = common::spawn_udp_echo();
    let endpoint = common::udp_endpoint(addr);
    let mut session = UdpSession::connect(&endpoint, Duration::from_secs(1), Duration::from_secs(1))
        .expect("udp connect");

    // Nothing was sent, so nothing comes back.
    let mut buf = [0u8; 16];
    let start = Instant::now();
    let result = session.receive(&mut buf, Duration::from_millis(100).into());
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[test]
fn http_perform_times_out_without_response() {
    let addr = common::spawn_tcp_sink();
    let endpoint = common::tcp_endpoint(addr);
    let stream = TcpSession::connect(&endpoint, Duration::from_secs(2), Duration::from_secs(1))
        .expect("connect to sink");
    let mut session = HttpSession::new(stream);

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri("/")
        .header("host", "localhost")
        .body(Bytes::from_static(b"test"))
        .unwrap();

    let timeout = Duration::from_millis(200);
    let start = Instant::now();
    let result = session.perform(&request, timeout);
    match result {
        Err(err) => assert!(err.is_timeout(), "expected timeout, got {err:?}"),
        Ok(response) => panic!("unexpected response {:?}", response.status()),
    }
    assert!(start.elapsed() >= timeout);
}
