//! The address resolution layer.
//!
//! Maps protocol addresses of the local subnet to hardware addresses. The [`Cache`] is a fixed
//! pool with a freshness window, [`Neighbors`] shares it between the thread dispatching inbound
//! frames (which learns mappings) and a blocked [`resolve`] call waiting for them.
//!
//! [`Cache`]: struct.Cache.html
//! [`Neighbors`]: struct.Neighbors.html
//! [`resolve`]: struct.Neighbors.html#method.resolve
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::time::{Tick, Ticks};
use crate::wire::{EthernetAddress, IpAddress, Ipv4Address, Ipv4Cidr};
use super::{Error, Result};

mod cache;
mod packet;

pub use self::cache::{Cache, Error as CacheError, Neighbor};
pub use self::packet::{answer, request, Inbound};

/// A neighbor cache that can be waited on.
///
/// Every successful update wakes all threads blocked in `resolve`.
#[derive(Debug)]
pub struct Neighbors {
    cache: Mutex<Cache>,
    updated: Condvar,
}

impl Neighbors {
    /// The number of requests sent before resolution fails.
    pub const ATTEMPTS: usize = 3;

    /// Create an empty table for a host in `subnet`.
    pub fn new(subnet: Ipv4Cidr, freshness: u64) -> Self {
        Neighbors {
            cache: Mutex::new(Cache::new(subnet, freshness)),
            updated: Condvar::new(),
        }
    }

    /// Look up a fresh mapping.
    pub fn lookup(&self, protocol_addr: &IpAddress, now: Tick) -> Option<EthernetAddress> {
        self.lock().lookup(protocol_addr, now)
    }

    /// Learn a mapping from an overheard ARP packet.
    ///
    /// Returns whether the mapping was stored. Addresses outside the subnet are ignored.
    pub fn update(&self, protocol_addr: Ipv4Address, hardware_addr: EthernetAddress, now: Tick)
        -> bool
    {
        match self.lock().update(protocol_addr, hardware_addr, now) {
            Ok(()) => {
                self.updated.notify_all();
                true
            },
            Err(err) => {
                net_trace!("arp: not caching {} => {}: {:?}", protocol_addr, hardware_addr, err);
                false
            },
        }
    }

    /// Add a mapping that never expires.
    pub fn fill_static(&self, protocol_addr: IpAddress, hardware_addr: EthernetAddress, now: Tick)
        -> Result<()>
    {
        self.lock().fill_static(protocol_addr, hardware_addr, now)
            .map_err(|_| Error::Exhausted)?;
        self.updated.notify_all();
        Ok(())
    }

    /// A copy of all live entries.
    pub fn entries(&self, now: Tick) -> Vec<Neighbor> {
        self.lock().iter(now).cloned().collect()
    }

    /// Wake all waiting resolvers, for example after the cancellation flag was set.
    pub fn notify_all(&self) {
        let _guard = self.lock();
        self.updated.notify_all();
    }

    /// Find the hardware address of `protocol_addr`, asking the network if necessary.
    ///
    /// A fresh cache entry is returned immediately. Otherwise `request` is called to send a
    /// request and the calling thread waits up to `wait` for the answer to be learned. This is
    /// tried `ATTEMPTS` times. Failing to send a request aborts resolution with that error.
    pub fn resolve<F>(
        &self,
        protocol_addr: IpAddress,
        ticks: &Ticks,
        cancel: &AtomicBool,
        wait: Duration,
        mut request: F,
    ) -> Result<EthernetAddress>
        where F: FnMut() -> Result<()>
    {
        if let Some(hardware_addr) = self.lookup(&protocol_addr, ticks.now()) {
            return Ok(hardware_addr);
        }

        for attempt in 1..=Self::ATTEMPTS {
            request()?;

            let deadline = Instant::now() + wait;
            let mut cache = self.lock();
            loop {
                if cancel.load(Ordering::Acquire) {
                    return Err(Error::Cancelled);
                }

                if let Some(hardware_addr) = cache.lookup(&protocol_addr, ticks.now()) {
                    return Ok(hardware_addr);
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }

                cache = self.updated.wait_timeout(cache, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }

            net_debug!("arp: no answer for {} (attempt {})", protocol_addr, attempt);
        }

        Err(Error::Timeout)
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use super::*;

    const SUBNET: Ipv4Cidr = Ipv4Cidr::new(Ipv4Address::new(10, 0, 0, 1), 24);
    const PEER: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
    const HADDR: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);

    #[test]
    fn cached_needs_no_request() {
        let neighbors = Neighbors::new(SUBNET, 120);
        let ticks = Ticks::new();
        assert!(neighbors.update(PEER, HADDR, ticks.now()));

        let found = neighbors.resolve(PEER.into(), &ticks, &AtomicBool::new(false),
            Duration::from_millis(10), || panic!("no request expected"));
        assert_eq!(found, Ok(HADDR));
    }

    #[test]
    fn gives_up_after_three_requests() {
        let neighbors = Neighbors::new(SUBNET, 120);
        let ticks = Ticks::new();
        let mut sent = 0;

        let start = Instant::now();
        let result = neighbors.resolve(PEER.into(), &ticks, &AtomicBool::new(false),
            Duration::from_millis(20), || { sent += 1; Ok(()) });
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(sent, Neighbors::ATTEMPTS);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn request_failure_aborts() {
        let neighbors = Neighbors::new(SUBNET, 120);
        let mut sent = 0;
        let result = neighbors.resolve(PEER.into(), &Ticks::new(), &AtomicBool::new(false),
            Duration::from_millis(20), || { sent += 1; Err(Error::Exhausted) });
        assert_eq!(result, Err(Error::Exhausted));
        assert_eq!(sent, 1);
    }

    #[test]
    fn woken_by_update() {
        let neighbors = Arc::new(Neighbors::new(SUBNET, 120));
        let ticks = Ticks::new();

        let learner = {
            let neighbors = Arc::clone(&neighbors);
            let ticks = ticks.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                neighbors.update(PEER, HADDR, ticks.now());
            })
        };

        let start = Instant::now();
        let found = neighbors.resolve(PEER.into(), &ticks, &AtomicBool::new(false),
            Duration::from_secs(5), || Ok(()));
        learner.join().unwrap();
        assert_eq!(found, Ok(HADDR));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled() {
        let neighbors = Neighbors::new(SUBNET, 120);
        let result = neighbors.resolve(PEER.into(), &Ticks::new(), &AtomicBool::new(true),
            Duration::from_secs(5), || Ok(()));
        assert_eq!(result, Err(Error::Cancelled));
    }
}
