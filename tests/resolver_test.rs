//! Resolver behavior: literals, family filtering, failure classes.

use std::time::{Duration, Instant};

use warmline::base::Error;
use warmline::dns::{IpFamily, Resolver, ResolveFlags};
use warmline::socket::Transport;

fn resolver(host: &str, family: IpFamily) -> Resolver {
    Resolver::new(
        host,
        443,
        Duration::from_secs(2),
        Transport::Tcp,
        family,
        ResolveFlags::default(),
    )
    .expect("build resolver")
}

#[test]
fn literal_address_resolves_to_exactly_one_endpoint() {
    let mut resolver = resolver("192.0.2.7", IpFamily::Any);
    let endpoints = resolver.resolve(Duration::from_secs(1)).expect("resolve literal");
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].addr, "192.0.2.7:443".parse().unwrap());
    assert_eq!(endpoints[0].transport, Transport::Tcp);
}

#[test]
fn localhost_resolves_within_deadline() {
    let mut resolver = resolver("localhost", IpFamily::Any);
    let start = Instant::now();
    let endpoints = resolver.resolve(Duration::from_secs(5)).expect("resolve localhost");
    assert!(!endpoints.is_empty());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(endpoints.iter().all(|ep| ep.addr.ip().is_loopback()));
    assert!(endpoints.iter().all(|ep| ep.addr.port() == 443));
}

#[test]
fn v4_filter_keeps_only_v4() {
    let mut resolver = resolver("localhost", IpFamily::V4);
    if let Ok(endpoints) = resolver.resolve(Duration::from_secs(5)) {
        assert!(endpoints.iter().all(|ep| ep.is_ipv4()));
    }
}

#[test]
fn unknown_host_yields_resolution_class_error() {
    let mut resolver = resolver("host-that-does-not-exist.invalid", IpFamily::Any);
    match resolver.resolve(Duration::from_secs(5)) {
        Err(err) => assert!(
            err.is_resolve() || err.is_timeout(),
            "unexpected error class: {err:?}"
        ),
        Ok(endpoints) => panic!("bogus host resolved to {endpoints:?}"),
    }
}

#[test]
fn expired_deadline_times_out_without_resolving() {
    let mut resolver = resolver("localhost", IpFamily::Any);
    let result = resolver.resolve(Duration::ZERO);
    assert!(matches!(result, Err(Error::Timeout)));
}
