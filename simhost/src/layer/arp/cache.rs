// Heads up! Before working on this file you should read, at least,
// the parts of RFC 1122 that discuss ARP.
use crate::time::{Expiration, Tick};
use crate::wire::{EthernetAddress, IpAddress, Ipv4Address, Ipv4Cidr};

/// A cached neighbor.
///
/// A neighbor mapping translates from a protocol address (IPv4 and IPv6) to a hardware address,
/// and contains the tick past which the mapping should be discarded. A slot with an unspecified
/// protocol address is empty.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    protocol_addr: IpAddress,
    hardware_addr: EthernetAddress,
    expires_at:    Expiration,
}

/// The reason an entry could not be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// There is no space to add the entry.
    ///
    /// Every slot holds a fresh or a static entry for some other address.
    NoSpace,

    /// The address does not belong to the subnet of the host.
    OffLink,
}

/// A fixed pool of neighbor mappings with a freshness window.
///
/// Entries learned from ARP are only returned while they are at most `freshness` ticks old. A
/// stale entry is not removed, it simply becomes the first candidate for overwriting.
#[derive(Debug, Clone)]
pub struct Cache {
    storage:   Vec<Neighbor>,
    subnet:    Ipv4Cidr,
    freshness: u64,
}

impl Neighbor {
    /// The protocol address of the neighbor.
    pub fn protocol_addr(&self) -> IpAddress {
        self.protocol_addr
    }

    /// The hardware address it maps to.
    pub fn hardware_addr(&self) -> EthernetAddress {
        self.hardware_addr
    }

    fn is_empty(&self) -> bool {
        self.protocol_addr.is_unspecified()
    }

    fn is_live(&self, now: Tick) -> bool {
        !self.is_empty() && self.expires_at.is_live(now)
    }
}

impl Cache {
    /// The number of slots in the pool.
    pub const POOL_SIZE: usize = 32;

    /// Create an empty cache for a host in `subnet`.
    pub fn new(subnet: Ipv4Cidr, freshness: u64) -> Self {
        Cache {
            storage: vec![Neighbor::default(); Self::POOL_SIZE],
            subnet,
            freshness,
        }
    }

    /// The subnet whose addresses are accepted by `update`.
    pub fn subnet(&self) -> Ipv4Cidr {
        self.subnet
    }

    /// Find the hardware address of a neighbor.
    ///
    /// Only returns entries refreshed within the freshness window and with a non-zero hardware
    /// address. The broadcast addresses always map to the broadcast hardware address.
    pub fn lookup(&self, protocol_addr: &IpAddress, now: Tick) -> Option<EthernetAddress> {
        if let IpAddress::Ipv4(addr) = protocol_addr {
            if addr.is_broadcast() || self.subnet.broadcast() == Some(*addr) {
                return Some(EthernetAddress::BROADCAST);
            }
        }

        self.storage.iter()
            .filter(|neighbor| neighbor.is_live(now))
            .find(|neighbor| neighbor.protocol_addr == *protocol_addr)
            .map(|neighbor| neighbor.hardware_addr)
            .filter(|hardware_addr| !hardware_addr.is_unspecified())
    }

    /// Record a mapping learned from an ARP packet.
    ///
    /// A fresh entry for the same address is refreshed in place. Otherwise the first empty or
    /// stale slot is overwritten. Static entries are never replaced by learned ones.
    pub fn update(
        &mut self,
        protocol_addr: Ipv4Address,
        hardware_addr: EthernetAddress,
        now: Tick,
    ) -> Result<(), Error> {
        if !self.subnet.contains(protocol_addr) {
            return Err(Error::OffLink);
        }

        let entry = Neighbor {
            protocol_addr: protocol_addr.into(),
            hardware_addr,
            expires_at: Expiration::When(now + self.freshness),
        };

        let existing = self.storage.iter()
            .position(|neighbor| {
                neighbor.is_live(now) && neighbor.protocol_addr == entry.protocol_addr
            });
        if let Some(idx) = existing {
            if self.storage[idx].expires_at != Expiration::Never {
                self.storage[idx] = entry;
            }
            return Ok(());
        }

        self.overwrite(entry, now)
    }

    /// Add an entry that never expires.
    ///
    /// Used for neighbors that do not answer ARP, such as IPv6 peers or a fixed gateway.
    pub fn fill_static(
        &mut self,
        protocol_addr: IpAddress,
        hardware_addr: EthernetAddress,
        now: Tick,
    ) -> Result<(), Error> {
        let entry = Neighbor {
            protocol_addr,
            hardware_addr,
            expires_at: Expiration::Never,
        };

        let existing = self.storage.iter_mut()
            .find(|neighbor| neighbor.is_live(now) && neighbor.protocol_addr == protocol_addr);
        match existing {
            Some(slot) => {
                *slot = entry;
                Ok(())
            },
            None => self.overwrite(entry, now),
        }
    }

    /// The number of entries that a lookup could currently return.
    pub fn len(&self, now: Tick) -> usize {
        self.storage.iter().filter(|neighbor| neighbor.is_live(now)).count()
    }

    /// Whether no entry is live.
    pub fn is_empty(&self, now: Tick) -> bool {
        self.len(now) == 0
    }

    /// Iterate over all live entries.
    pub fn iter(&self, now: Tick) -> impl Iterator<Item=&Neighbor> + '_ {
        self.storage.iter().filter(move |neighbor| neighbor.is_live(now))
    }

    fn overwrite(&mut self, entry: Neighbor, now: Tick) -> Result<(), Error> {
        let free = self.storage.iter_mut()
            .find(|neighbor| !neighbor.is_live(now))
            .ok_or(Error::NoSpace)?;
        *free = entry;
        Ok(())
    }
}
