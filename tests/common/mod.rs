//! Loopback server fixtures shared by the integration suites.
//!
//! Each fixture binds an ephemeral port, spawns a serving thread and
//! returns the bound address. Threads exit when their listener errors out
//! at process teardown; tests never need to join them.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::thread;

use warmline::socket::{Endpoint, Transport};

pub fn tcp_endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::new(addr, Transport::Tcp)
}

pub fn udp_endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::new(addr, Transport::Udp)
}

/// TCP server echoing every byte back until the peer closes.
pub fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo listener");
    let addr = listener.local_addr().expect("echo listener addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// TCP server that accepts connections, holds them open, and never sends
/// a byte.
pub fn spawn_tcp_sink() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind sink listener");
    let addr = listener.local_addr().expect("sink listener addr");
    thread::spawn(move || {
        let mut held: Vec<TcpStream> = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    addr
}

/// UDP server echoing every datagram back to its sender.
pub fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp echo");
    let addr = socket.local_addr().expect("udp echo addr");
    thread::spawn(move || {
        let mut buf = [0u8; 65536];
        while let Ok((n, peer)) = socket.recv_from(&mut buf) {
            let _ = socket.send_to(&buf[..n], peer);
        }
    });
    addr
}

/// Listener with a backlog of one that never accepts, to exhaust the SYN
/// queue for connect-timeout tests. Keep the returned socket alive for the
/// duration of the test.
pub fn bind_backlog_one() -> (socket2::Socket, SocketAddr) {
    use socket2::{Domain, Socket, Type};
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).expect("raw socket");
    let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    socket.bind(&bind_addr.into()).expect("bind backlog socket");
    socket.listen(1).expect("listen backlog 1");
    let addr = socket
        .local_addr()
        .expect("backlog addr")
        .as_socket()
        .expect("ipv4 addr");
    (socket, addr)
}

/// HTTP/1.1 server echoing each request body back with status 200.
pub fn spawn_http_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http echo");
    let addr = listener.local_addr().expect("http echo addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                loop {
                    let Some(body) = read_http_request(&mut stream) else {
                        break;
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n",
                        body.len()
                    );
                    if stream.write_all(response.as_bytes()).is_err()
                        || stream.write_all(&body).is_err()
                    {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// HTTP/1.1 server answering every request with a fixed raw response and
/// closing the connection.
pub fn spawn_http_canned(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http canned");
    let addr = listener.local_addr().expect("http canned addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let _ = read_http_request(&mut stream);
                let _ = stream.write_all(response);
            });
        }
    });
    addr
}

/// Read one request (head plus content-length body). `None` on EOF or a
/// malformed head.
fn read_http_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);

    let mut body = raw[head_end..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => body.extend_from_slice(&buf[..n]),
        }
    }
    body.truncate(content_length);
    Some(body)
}
