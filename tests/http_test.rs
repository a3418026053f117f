//! HTTP/1.1 end-to-end behavior over loopback servers.

mod common;

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, Version};
use warmline::base::Error;
use warmline::connector::ConnectorConfig;
use warmline::http::HttpSession;
use warmline::pool::HttpPool;
use warmline::socket::TcpSession;

fn http_session(addr: std::net::SocketAddr) -> HttpSession<TcpSession> {
    let stream = TcpSession::connect(
        &common::tcp_endpoint(addr),
        Duration::from_secs(2),
        Duration::from_secs(2),
    )
    .expect("connect");
    HttpSession::new(stream)
}

fn echo_request(body: &'static [u8]) -> Request<Bytes> {
    Request::builder()
        .method(Method::POST)
        .uri("/")
        .version(Version::HTTP_11)
        .header("host", "localhost")
        .body(Bytes::from_static(body))
        .expect("build request")
}

#[test]
fn perform_roundtrips_echoed_body() {
    let addr = common::spawn_http_echo();
    let mut session = http_session(addr);

    let response = session
        .perform(&echo_request(b"test"), Duration::from_secs(2))
        .expect("perform");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.version(), Version::HTTP_11);
    assert_eq!(response.body().as_ref(), b"test");
}

#[test]
fn perform_reuses_the_session() {
    let addr = common::spawn_http_echo();
    let mut session = http_session(addr);

    for body in [&b"first"[..], b"second", b"third"] {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header("host", "localhost")
            .body(Bytes::copy_from_slice(body))
            .unwrap();
        let response = session
            .perform(&request, Duration::from_secs(2))
            .expect("perform");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), body);
    }
}

#[test]
fn chunked_response_is_assembled() {
    let addr = common::spawn_http_canned(
        b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    );
    let mut session = http_session(addr);

    let response = session
        .perform(&echo_request(b""), Duration::from_secs(2))
        .expect("perform");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"Wikipedia");
}

#[test]
fn close_delimited_body_ends_at_eof() {
    let addr = common::spawn_http_canned(b"HTTP/1.1 200 OK\r\n\r\nuntil the very end");
    let mut session = http_session(addr);

    let response = session
        .perform(&echo_request(b""), Duration::from_secs(2))
        .expect("perform");
    assert_eq!(response.body().as_ref(), b"until the very end");
}

#[test]
fn oversized_header_overflows() {
    let header_value = "x".repeat(512);
    let response: &'static [u8] = Box::leak(
        format!("HTTP/1.1 200 OK\r\nx-padding: {header_value}\r\ncontent-length: 0\r\n\r\n")
            .into_bytes()
            .into_boxed_slice(),
    );
    let addr = common::spawn_http_canned(response);

    let stream = TcpSession::connect(
        &common::tcp_endpoint(addr),
        Duration::from_secs(2),
        Duration::from_secs(2),
    )
    .expect("connect");
    let mut session = HttpSession::with_limits(stream, 128, 1024);

    let result = session.perform(&echo_request(b""), Duration::from_secs(2));
    assert!(matches!(result, Err(Error::BufferOverflow)));
}

#[test]
fn oversized_body_overflows() {
    let addr = common::spawn_http_canned(
        b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n\
          0123456789012345678901234567890123456789012345678901234567890123",
    );
    let stream = TcpSession::connect(
        &common::tcp_endpoint(addr),
        Duration::from_secs(2),
        Duration::from_secs(2),
    )
    .expect("connect");
    let mut session = HttpSession::with_limits(stream, 1024, 16);

    let result = session.perform(&echo_request(b""), Duration::from_secs(2));
    assert!(matches!(result, Err(Error::BufferOverflow)));
}

#[test]
fn missing_response_reports_end_of_stream() {
    // The canned server reads the request and closes without answering.
    let addr = common::spawn_http_canned(b"");
    let mut session = http_session(addr);

    let result = session.perform(&echo_request(b"ping"), Duration::from_secs(2));
    assert!(matches!(result, Err(Error::EndOfStream)));
}

#[test]
fn pooled_http_sessions_perform() {
    let addr = common::spawn_http_echo();
    let mut config = ConnectorConfig::new(addr.ip().to_string(), addr.port());
    config.connect_timeout = Duration::from_secs(2);
    config.operation_timeout = Duration::from_secs(2);
    let pool = HttpPool::new(2, config).expect("build pool");

    for _ in 0..4 {
        let mut session = pool.get_session(Duration::from_secs(5)).expect("borrow");
        let response = session
            .perform(&echo_request(b"pooled"), Duration::from_secs(2))
            .expect("perform");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"pooled");
        pool.return_session(session);
    }
}
