//! Two virtual hosts on one software segment.
//!
//! The server hosts a tiny http-like service, the client resolves it, pings it, connects and
//! sends a single request. Everything is logged through `tracing`.
//!
//! # Usage
//!
//!   > $ cargo run --example host_pair -- 10.0.0.1/24 02:00:00:00:00:01 10.0.0.2/24 \
//!   >     02:00:00:00:00:02 "GET / HTTP/1.0"
use std::net;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use structopt::StructOpt;

use simhost::{Context, Host, HostConfig};
use simhost::layer::FnHandler;
use simhost::layer::tcp::Transfer;
use simhost::nic::{Link, Port};
use simhost::wire::{EthernetAddress, Ipv4Cidr};

const HTTP_PORT: u16 = 80;

fn main() {
    let Config {
        client,
        clientmac,
        server,
        servermac,
        message,
        verbose,
    } = Config::from_args();

    let level = if verbose { tracing::Level::TRACE } else { tracing::Level::DEBUG };
    tracing_subscriber::fmt().with_max_level(level).init();

    let context = Context::new(0);
    let client = Arc::new(Host::new(HostConfig {
        hardware_addr: clientmac,
        ipv4: client,
        waittime: Duration::from_secs(1),
        ..HostConfig::default()
    }, context.for_host(1)));
    let server = Arc::new(Host::new(HostConfig {
        hardware_addr: servermac,
        ipv4: server,
        ..HostConfig::default()
    }, context.for_host(2)));

    server.register_service(HTTP_PORT, FnHandler(|_: u16, request: &[u8]| {
        let mut response = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n".to_vec();
        response.extend_from_slice(request);
        response
    })).expect("Failed to register the service");

    let mut link = Link::new();
    link.attach(Arc::clone(&client) as Arc<dyn Port>);
    link.attach(Arc::clone(&server) as Arc<dyn Port>);
    let stop = Arc::new(AtomicBool::new(false));
    let link = link.spawn(Arc::clone(&stop));

    let remote = server.config().ipv4.address();
    match client.ping(remote.into()) {
        Ok(ttl) => println!("Reply from {}: ttl={}", remote, ttl),
        Err(err) => println!("Ping to {} failed: {}", remote, err),
    }

    let mut connection = client.connect(remote.into(), HTTP_PORT)
        .expect("Failed to connect");
    match connection.transfer(message.as_bytes()) {
        Ok(Transfer::Answered(data)) => println!("{}", String::from_utf8_lossy(&data)),
        Ok(other) => println!("No answer: {:?}", other),
        Err(err) => println!("Transfer failed: {}", err),
    }
    connection.disconnect().expect("Failed to close the connection");
    drop(connection);

    for neighbor in client.neighbors() {
        let addr: net::IpAddr = match neighbor.protocol_addr() {
            simhost::wire::IpAddress::Ipv4(addr) => net::Ipv4Addr::from(addr).into(),
            simhost::wire::IpAddress::Ipv6(addr) => net::Ipv6Addr::from(addr).into(),
            simhost::wire::IpAddress::Unspecified => continue,
        };
        println!("{} is at {}", addr, neighbor.hardware_addr());
    }

    stop.store(true, Ordering::Release);
    link.join().expect("Link thread panicked");
}

#[derive(StructOpt)]
struct Config {
    client: Ipv4Cidr,
    clientmac: EthernetAddress,
    server: Ipv4Cidr,
    servermac: EthernetAddress,
    message: String,
    #[structopt(short = "v")]
    verbose: bool,
}
