//! Warm pool echo loop against a local echo server.
//!
//! Usage: `cargo run --example pool_roundtrip`

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use warmline::connector::ConnectorConfig;
use warmline::pool::TcpPool;
use warmline::socket::TransportStream;
use warmline::{set_logger, ConsoleLogger, LogLevel};

fn main() {
    set_logger(std::sync::Arc::new(ConsoleLogger::new(LogLevel::Debug)));

    // Local echo peer so the demo is self-contained.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo server");
    let addr = listener.local_addr().expect("echo addr");
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

    let mut config = ConnectorConfig::new(addr.ip().to_string(), addr.port());
    config.connect_timeout = Duration::from_secs(2);
    config.operation_timeout = Duration::from_secs(2);

    let pool = TcpPool::new(4, config).expect("build pool");
    pool.is_connected(Duration::from_secs(5))
        .expect("pool lock")
        .then_some(())
        .expect("pool never filled");

    for i in 0..8 {
        let mut session = pool.get_session(Duration::from_secs(2)).expect("borrow");
        let message = format!("ping #{i}");
        session
            .send(message.as_bytes(), Duration::from_secs(1).into())
            .expect("send");
        let mut buf = vec![0u8; message.len()];
        session
            .receive(&mut buf, Duration::from_secs(1).into())
            .expect("receive");
        println!("echoed: {}", String::from_utf8_lossy(&buf));
        pool.return_session(session);
    }
}
