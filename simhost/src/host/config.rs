use std::time::Duration;

use crate::wire::{EthernetAddress, Ipv4Address, Ipv4Cidr, Ipv6Cidr};

/// The configuration of a virtual host.
///
/// All values are read once when the host is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    /// The link layer address of the host.
    pub hardware_addr: EthernetAddress,
    /// The IPv4 address and the subnet it is attached to.
    pub ipv4: Ipv4Cidr,
    /// The router for destinations outside the subnet, unspecified for none.
    pub gateway: Ipv4Address,
    /// The IPv6 address, if the host speaks IPv6 at all.
    pub ipv6: Option<Ipv6Cidr>,
    /// The largest datagram the host sends or accepts unfragmented.
    pub mtu: usize,
    /// Time to live of all originated datagrams.
    pub ttl: u8,
    /// Whether outbound datagrams may be fragmented on the path.
    pub fragment: bool,
    /// Ticks after which an idle session may be reused.
    pub session_timeout: u64,
    /// Ticks an ARP entry stays fresh.
    pub arp_freshness: u64,
    /// How long each ARP request waits for its answer.
    pub arp_wait: Duration,
    /// How long each initiator attempt waits for the peer.
    pub waittime: Duration,
    /// The receive window advertised by outbound connections.
    pub window: u16,
    /// The longest response a payload handler may return.
    pub response_cap: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            hardware_addr: EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ipv4: Ipv4Cidr::new(Ipv4Address::new(10, 0, 0, 1), 24),
            gateway: Ipv4Address::UNSPECIFIED,
            ipv6: None,
            mtu: 1500,
            ttl: 64,
            fragment: false,
            session_timeout: 120,
            arp_freshness: 120,
            arp_wait: Duration::from_millis(1000),
            waittime: Duration::from_millis(5000),
            window: 65535,
            response_cap: 8192,
        }
    }
}
