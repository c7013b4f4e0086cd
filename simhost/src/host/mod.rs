//! The virtual host.
//!
//! A [`Host`] bundles the state of one simulated machine: its neighbor cache, the table of
//! inbound TCP sessions, the services it listens with and the single outbound session driven by
//! the application. Frames from the segment enter through [`receive`], see the [`Outcome`] for
//! what can happen to them.
//!
//! All methods take `&self`, so a host is usually shared in an `Arc` between the thread moving
//! frames (see [`Link`]) and the threads running blocking client operations.
//!
//! ```no_run
//! use std::sync::Arc;
//! use simhost::{Context, Host, HostConfig};
//! use simhost::layer::FnHandler;
//! use simhost::wire::IpAddress;
//!
//! let host = Arc::new(Host::new(HostConfig::default(), Context::new(0)));
//! host.register_service(80, FnHandler(|_: u16, request: &[u8]| request.to_vec())).unwrap();
//!
//! let mut connection = host.connect(IpAddress::v4(10, 0, 0, 2), 7).unwrap();
//! connection.transfer(b"hello").unwrap();
//! connection.disconnect().unwrap();
//! ```
//!
//! [`Host`]: struct.Host.html
//! [`receive`]: struct.Host.html#method.receive
//! [`Outcome`]: enum.Outcome.html
//! [`Link`]: ../nic/struct.Link.html
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU16, Ordering};

use crate::layer::{Error, Result};
use crate::layer::arp::{self, Neighbor, Neighbors};
use crate::layer::ip::Reassembly;
use crate::layer::tcp::{Channel, Connection, IsnGenerator, OwnSession, PayloadHandler};
use crate::layer::tcp::{Scb, Services, SessionTable, Settings};
use crate::nic::{Packet, PacketQueue, Port};
use crate::wire::{EthernetAddress, IpAddress, IpProtocol};

mod config;
mod context;
mod dispatch;


pub use self::config::HostConfig;
pub use self::context::Context;
pub use self::dispatch::Outcome;

/// The first port of outbound sessions.
pub const EPHEMERAL_PORT: u16 = 49152;

/// Filler bytes in an ICMP echo request.
const PING_LEN: usize = 56;
/// Filler bytes in a UDP probe, starting with the hardware address.
const PROBE_LEN: usize = 32;

/// One simulated machine.
pub struct Host {
    config: HostConfig,
    context: Context,
    inbound: PacketQueue,
    outbound: PacketQueue,
    neighbors: Neighbors,
    sessions: Mutex<SessionTable>,
    services: Mutex<Services>,
    reassembly: Mutex<Reassembly>,
    own: OwnSession,
    isn: IsnGenerator,
    ident: AtomicU16,
    ports: AtomicU16,
}

impl Host {
    /// Create a host with empty tables.
    pub fn new(config: HostConfig, context: Context) -> Self {
        Host {
            neighbors: Neighbors::new(config.ipv4, config.arp_freshness),
            sessions: Mutex::new(SessionTable::new(config.session_timeout)),
            services: Mutex::new(Services::new(config.response_cap)),
            reassembly: Mutex::new(Reassembly::new(config.session_timeout)),
            inbound: PacketQueue::new(),
            outbound: PacketQueue::new(),
            own: OwnSession::default(),
            isn: IsnGenerator::from_std_hash(),
            ident: AtomicU16::new(0),
            ports: AtomicU16::new(0),
            config,
            context,
        }
    }

    /// The configuration the host was created with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The ambient state of the host.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Frames surfaced to the application.
    pub fn inbound(&self) -> &PacketQueue {
        &self.inbound
    }

    /// Frames waiting to be put on the segment.
    pub fn outbound(&self) -> &PacketQueue {
        &self.outbound
    }

    /// Start listening for connections on `port`.
    ///
    /// At most four ports can be served, registering a port again replaces its handler.
    pub fn register_service<H>(&self, port: u16, handler: H) -> Result<()>
        where H: PayloadHandler + 'static,
    {
        self.lock_services().register(port, handler)
    }

    /// Stop accepting connections on `port`.
    ///
    /// Sessions that are already established keep being served.
    pub fn unregister_service(&self, port: u16) -> bool {
        self.lock_services().unregister(port)
    }

    /// Add a neighbor that is never asked for and never expires.
    pub fn add_neighbor(&self, protocol_addr: IpAddress, hardware_addr: EthernetAddress)
        -> Result<()>
    {
        self.neighbors.fill_static(protocol_addr, hardware_addr, self.context.ticks.now())
    }

    /// A copy of the neighbor cache.
    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.neighbors.entries(self.context.ticks.now())
    }

    /// A copy of the live inbound sessions.
    pub fn sessions(&self) -> Vec<Scb> {
        let now = self.context.ticks.now();
        self.lock_sessions().live(now).cloned().collect()
    }

    /// Find the link address for sending to `remote`.
    ///
    /// Addresses on the subnet are resolved directly, everything else through the gateway.
    /// IPv6 neighbors must have been added statically. Blocks while ARP requests are
    /// outstanding.
    pub fn resolve(&self, remote: IpAddress) -> Result<EthernetAddress> {
        let now = self.context.ticks.now();
        let addr = match remote {
            IpAddress::Ipv4(addr) => addr,
            IpAddress::Ipv6(_) => {
                return self.neighbors.lookup(&remote, now).ok_or(Error::NoRoute);
            },
            IpAddress::Unspecified => return Err(Error::Illegal),
        };

        // Broadcasts are answered from the cache directly.
        if let Some(hardware_addr) = self.neighbors.lookup(&remote, now) {
            return Ok(hardware_addr);
        }

        let subnet = self.config.ipv4;
        let next_hop = if subnet.contains(addr) {
            addr
        } else if self.config.gateway.is_unspecified() {
            net_debug!("host {}: no route to {}", self.context.host_id, addr);
            return Err(Error::NoRoute);
        } else {
            self.config.gateway
        };

        let hardware_addr = self.config.hardware_addr;
        self.neighbors.resolve(
            next_hop.into(),
            &self.context.ticks,
            &self.context.cancel,
            self.config.arp_wait,
            || {
                let request = arp::request(hardware_addr, subnet.address(), next_hop)?;
                self.outbound.push(request);
                Ok(())
            },
        )
    }

    /// Prepare the outbound session of the host.
    ///
    /// Resolves the next hop and claims the session, replacing any earlier one. Nothing is sent
    /// yet.
    pub fn open(&self, protocol: IpProtocol, remote: IpAddress, remote_port: u16)
        -> Result<Connection<'_>>
    {
        let local = match remote {
            IpAddress::Ipv4(_) => IpAddress::Ipv4(self.config.ipv4.address()),
            IpAddress::Ipv6(_) => match self.config.ipv6 {
                Some(cidr) => IpAddress::Ipv6(cidr.address()),
                None => return Err(Error::NoRoute),
            },
            IpAddress::Unspecified => return Err(Error::Illegal),
        };

        let payload_len = match protocol {
            IpProtocol::Icmp => PING_LEN,
            IpProtocol::Udp => PROBE_LEN,
            _ => 0,
        };

        let scb = Scb {
            local,
            remote,
            local_port: self.ephemeral_port(),
            remote_port,
            local_hw: self.config.hardware_addr,
            remote_hw: self.resolve(remote)?,
            window: self.config.window,
            mtu: self.config.mtu,
            ttl: self.config.ttl,
            ident: self.next_ident(),
            fragment: self.config.fragment,
            protocol,
            payload_len,
            ..Scb::default()
        };
        Ok(Connection::new(self.channel(), scb))
    }

    /// Open a TCP connection and perform the handshake.
    pub fn connect(&self, remote: IpAddress, remote_port: u16) -> Result<Connection<'_>> {
        let mut connection = self.open(IpProtocol::Tcp, remote, remote_port)?;
        connection.connect()?;
        Ok(connection)
    }

    /// Send an ICMP echo request, returning the time to live of the reply.
    pub fn ping(&self, remote: IpAddress) -> Result<u8> {
        self.open(IpProtocol::Icmp, remote, 0)?.echo()
    }

    /// Send a UDP probe to `remote_port`, returning the time to live of its echo.
    pub fn probe(&self, remote: IpAddress, remote_port: u16) -> Result<u8> {
        self.open(IpProtocol::Udp, remote, remote_port)?.echo()
    }

    /// Abort every blocking operation on this host.
    ///
    /// Operations started later fail immediately until `resume` is called. The flag is part of
    /// the context, hosts sharing it are interrupted as well but only the waits of this host are
    /// woken.
    pub fn interrupt(&self) {
        self.context.cancel.store(true, Ordering::Release);
        self.inbound.notify_all();
        self.neighbors.notify_all();
    }

    /// Allow blocking operations again.
    pub fn resume(&self) {
        self.context.cancel.store(false, Ordering::Release);
    }

    fn channel(&self) -> Channel<'_> {
        Channel {
            inbound: &self.inbound,
            outbound: &self.outbound,
            own: &self.own,
            isn: &self.isn,
            ticks: &self.context.ticks,
            cancel: &self.context.cancel,
            waittime: self.config.waittime,
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            hardware_addr: self.config.hardware_addr,
            hop_limit: self.config.ttl,
            mtu: self.config.mtu,
            fragment: self.config.fragment,
        }
    }

    fn next_ident(&self) -> u16 {
        self.ident.fetch_add(1, Ordering::Relaxed)
    }

    /// The ephemeral range is the upper quarter of all ports.
    fn ephemeral_port(&self) -> u16 {
        let range = u16::max_value() - EPHEMERAL_PORT + 1;
        EPHEMERAL_PORT + self.ports.fetch_add(1, Ordering::Relaxed) % range
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionTable> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_services(&self) -> MutexGuard<'_, Services> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reassembly(&self) -> MutexGuard<'_, Reassembly> {
        self.reassembly.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Port for Host {
    fn outbound(&self) -> &PacketQueue {
        &self.outbound
    }

    fn deliver(&self, packet: Packet) {
        self.receive(packet);
    }
}
