use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::{Packet, PacketQueue};

/// One attachment point of a [`Link`].
///
/// [`Link`]: struct.Link.html
pub trait Port: Send + Sync {
    /// The queue of frames this port wants to transmit.
    fn outbound(&self) -> &PacketQueue;

    /// Hand a frame from the segment to this port.
    fn deliver(&self, packet: Packet);
}

/// A shared Ethernet segment in software.
///
/// Every frame transmitted by one port is delivered to all other ports, filtering by destination
/// address is left to the receivers. This is a hub, not a switch.
#[derive(Default)]
pub struct Link {
    ports: Vec<Arc<dyn Port>>,
}

impl Link {
    /// Idle time of a running link between two empty sweeps.
    pub const IDLE: Duration = Duration::from_millis(1);

    /// Create a segment without any ports.
    pub fn new() -> Self {
        Link::default()
    }

    /// Connect a port to the segment, returning its index.
    pub fn attach(&mut self, port: Arc<dyn Port>) -> usize {
        self.ports.push(port);
        self.ports.len() - 1
    }

    /// Move every frame that is currently queued for transmission.
    ///
    /// Returns the number of frames taken from the outbound queues.
    pub fn step(&self) -> usize {
        let mut moved = 0;
        for (idx, port) in self.ports.iter().enumerate() {
            while let Some(packet) = port.outbound().try_pop() {
                net_trace!("link: port {} sent {} bytes", idx, packet.len());
                let others = self.ports.iter()
                    .enumerate()
                    .filter(|&(other, _)| other != idx);
                for (_, other) in others {
                    other.deliver(packet.clone());
                }
                moved += 1;
            }
        }
        moved
    }

    /// Pump frames on a background thread until `stop` is raised.
    pub fn spawn(self, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                if self.step() == 0 {
                    thread::sleep(Self::IDLE);
                }
            }
        })
    }
}
