use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::Packet;

/// A FIFO of packets shared between one producer and one consumer.
///
/// Consumers that want to block wait on the queue's condition variable instead of sleeping, so a
/// push or an interruption wakes them immediately.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: Mutex<VecDeque<Packet>>,
    ready: Condvar,
}

/// The result of a blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    /// A packet was dequeued.
    Packet(Packet),
    /// The deadline passed with the queue empty.
    TimedOut,
    /// The cancellation flag was raised.
    Cancelled,
}

impl PacketQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        PacketQueue::default()
    }

    /// Append a packet and wake a waiting consumer.
    pub fn push(&self, packet: Packet) {
        self.lock().push_back(packet);
        self.ready.notify_all();
    }

    /// Take the oldest packet, if any, without waiting.
    pub fn try_pop(&self) -> Option<Packet> {
        self.lock().pop_front()
    }

    /// Take the oldest packet, waiting for one until `deadline`.
    ///
    /// The `cancel` flag is checked before every attempt to dequeue. Raising it does not wake the
    /// waiter by itself, pair it with [`notify_all`].
    ///
    /// [`notify_all`]: #method.notify_all
    pub fn pop_until(&self, deadline: Instant, cancel: &AtomicBool) -> Poll {
        let mut packets = self.lock();
        loop {
            if cancel.load(Ordering::Acquire) {
                return Poll::Cancelled;
            }

            if let Some(packet) = packets.pop_front() {
                return Poll::Packet(packet);
            }

            let now = Instant::now();
            if now >= deadline {
                return Poll::TimedOut;
            }

            packets = match self.ready.wait_timeout(packets, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Remove all queued packets.
    pub fn drain(&self) -> Vec<Packet> {
        self.lock().drain(..).collect()
    }

    /// Wake every waiting consumer, e.g. after raising a cancellation flag.
    pub fn notify_all(&self) {
        // Taking the lock orders the wake-up after any waiter's flag check.
        drop(self.lock());
        self.ready.notify_all();
    }

    /// The number of queued packets.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue holds no packets.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<VecDeque<Packet>> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use super::*;

    fn packet(tag: u8) -> Packet {
        Packet::from_vec(vec![tag; 4])
    }

    #[test]
    fn fifo_order() {
        let queue = PacketQueue::new();
        queue.push(packet(1));
        queue.push(packet(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some(packet(1)));
        assert_eq!(queue.try_pop(), Some(packet(2)));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn times_out() {
        let queue = PacketQueue::new();
        let cancel = AtomicBool::new(false);
        let start = Instant::now();
        let deadline = start + Duration::from_millis(20);
        assert_eq!(queue.pop_until(deadline, &cancel), Poll::TimedOut);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn wakes_on_push() {
        let queue = Arc::new(PacketQueue::new());
        let cancel = AtomicBool::new(false);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push(packet(7));
            })
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(queue.pop_until(deadline, &cancel), Poll::Packet(packet(7)));
        producer.join().unwrap();
    }

    #[test]
    fn cancelled_wait() {
        let queue = Arc::new(PacketQueue::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let canceller = {
            let queue = Arc::clone(&queue);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                cancel.store(true, Ordering::Release);
                queue.notify_all();
            })
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(queue.pop_until(deadline, &cancel), Poll::Cancelled);
        canceller.join().unwrap();
    }
}
