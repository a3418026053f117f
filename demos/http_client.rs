//! One-shot HTTPS GET through a connector.
//!
//! Usage: `cargo run --example http_client -- <host> [path]`

use std::time::Duration;

use bytes::Bytes;
use warmline::connector::{ConnectorConfig, HttpsConnector};
use warmline::{set_logger, ConsoleLogger, LogLevel};

fn main() {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "example.com".to_string());
    let path = args.next().unwrap_or_else(|| "/".to_string());

    set_logger(std::sync::Arc::new(ConsoleLogger::new(LogLevel::Info)));

    let mut config = ConnectorConfig::new(host.clone(), 443);
    config.resolve_timeout = Duration::from_secs(5);
    config.connect_timeout = Duration::from_secs(10);
    config.operation_timeout = Duration::from_secs(10);

    let connector = HttpsConnector::new(config).expect("start connector");
    let mut session = connector.new_session_default().expect("establish session");

    let request = http::Request::builder()
        .uri(path.as_str())
        .header("host", host.as_str())
        .header("accept", "*/*")
        .body(Bytes::new())
        .expect("build request");

    let response = session
        .perform(&request, Duration::from_secs(10))
        .expect("perform request");

    println!("status: {}", response.status());
    for (name, value) in response.headers() {
        println!("{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    println!();
    println!("{}", String::from_utf8_lossy(response.body()));
}
