use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use simhost::{Context, Host, HostConfig};
use simhost::layer::{Error, FnHandler};
use simhost::layer::tcp::Transfer;
use simhost::nic::{Link, Port};
use simhost::wire::{EthernetAddress, IpAddress, Ipv4Address, Ipv4Cidr, Ipv6Address, Ipv6Cidr};

const CLIENT_HW: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
const SERVER_HW: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);
const CLIENT_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const SERVER_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const HTTP_PORT: u16 = 80;

fn client_v6() -> Ipv6Address {
    Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)
}

fn server_v6() -> Ipv6Address {
    Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 2)
}

/// Two hosts on one segment, the link running until the pair is dropped.
struct Pair {
    client: Arc<Host>,
    server: Arc<Host>,
    stop: Arc<AtomicBool>,
    link: Option<JoinHandle<()>>,
}

impl Pair {
    fn new(waittime: Duration) -> Self {
        let context = Context::new(0);
        let client = Arc::new(Host::new(HostConfig {
            hardware_addr: CLIENT_HW,
            ipv4: Ipv4Cidr::new(CLIENT_IP, 24),
            ipv6: Some(Ipv6Cidr::new(client_v6(), 64)),
            waittime,
            ..HostConfig::default()
        }, context.for_host(1)));
        let server = Arc::new(Host::new(HostConfig {
            hardware_addr: SERVER_HW,
            ipv4: Ipv4Cidr::new(SERVER_IP, 24),
            ipv6: Some(Ipv6Cidr::new(server_v6(), 64)),
            ..HostConfig::default()
        }, context.for_host(2)));

        server.register_service(HTTP_PORT, FnHandler(|_: u16, request: &[u8]| {
            let mut response = b"HTTP/1.0 200 OK\r\n\r\n".to_vec();
            response.extend_from_slice(request);
            response
        })).unwrap();

        let mut link = Link::new();
        link.attach(Arc::clone(&client) as Arc<dyn Port>);
        link.attach(Arc::clone(&server) as Arc<dyn Port>);
        let stop = Arc::new(AtomicBool::new(false));
        let link = link.spawn(Arc::clone(&stop));

        Pair { client, server, stop, link: Some(link) }
    }

    /// Wait for the server to forget all sessions.
    fn server_idle(&self) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.server.sessions().is_empty() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(link) = self.link.take() {
            let _ = link.join();
        }
    }
}

#[test]
fn http_like_exchange() {
    let pair = Pair::new(Duration::from_millis(500));

    let mut connection = pair.client.connect(SERVER_IP.into(), HTTP_PORT).unwrap();
    assert_eq!(pair.server.sessions().len(), 1);

    let answer = connection.transfer(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    match answer {
        Transfer::Answered(data) => {
            assert!(data.starts_with(b"HTTP/1.0 200 OK"));
            assert!(data.ends_with(b"GET / HTTP/1.0\r\n\r\n"));
        },
        other => panic!("expected an answer, got {:?}", other),
    }

    connection.disconnect().unwrap();
    drop(connection);
    assert!(pair.server_idle());

    // Both learned each other.
    assert!(pair.client.neighbors().iter().any(|n| n.hardware_addr() == SERVER_HW));
    assert!(pair.server.neighbors().iter().any(|n| n.hardware_addr() == CLIENT_HW));
}

#[test]
fn ping_and_probe() {
    let pair = Pair::new(Duration::from_millis(500));
    assert_eq!(pair.client.ping(SERVER_IP.into()), Ok(64));
    assert_eq!(pair.client.probe(SERVER_IP.into(), 7), Ok(64));
}

#[test]
fn closed_port_times_out() {
    let pair = Pair::new(Duration::from_millis(50));

    let start = Instant::now();
    let result = pair.client.connect(SERVER_IP.into(), 8080).map(|_| ());
    assert_eq!(result, Err(Error::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert!(pair.server.sessions().is_empty());
}

#[test]
fn no_route_off_subnet() {
    let pair = Pair::new(Duration::from_millis(50));
    let result = pair.client.connect(IpAddress::v4(192, 168, 7, 1), HTTP_PORT).map(|_| ());
    assert_eq!(result, Err(Error::NoRoute));
}

#[test]
fn conversation_over_ipv6() {
    let pair = Pair::new(Duration::from_millis(500));
    pair.client.add_neighbor(server_v6().into(), SERVER_HW).unwrap();

    let mut connection = pair.client.connect(server_v6().into(), HTTP_PORT).unwrap();
    match connection.transfer(b"hello").unwrap() {
        Transfer::Answered(data) => assert!(data.ends_with(b"hello")),
        other => panic!("expected an answer, got {:?}", other),
    }
    connection.disconnect().unwrap();
    drop(connection);
    assert!(pair.server_idle());
}

#[test]
fn interrupted_connect() {
    let pair = Pair::new(Duration::from_secs(10));
    pair.server.unregister_service(HTTP_PORT);

    let client = Arc::clone(&pair.client);
    let interrupter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        client.interrupt();
    });

    let start = Instant::now();
    let result = pair.client.connect(SERVER_IP.into(), HTTP_PORT).map(|_| ());
    assert_eq!(result, Err(Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(5));
    interrupter.join().unwrap();
}
