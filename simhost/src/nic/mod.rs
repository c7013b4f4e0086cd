//! Owned packets, the queues between a host and its wire, and a software link.
//!
//! A host never touches a device. Everything it wants to transmit is pushed onto its outbound
//! [`PacketQueue`], frames surfaced to the application land on its inbound one. A [`Link`] moves
//! frames between the queues of several hosts, like a hub on a shared segment.
//!
//! [`PacketQueue`]: struct.PacketQueue.html
//! [`Link`]: struct.Link.html
mod link;
mod packet;
mod queue;

pub use self::link::{Link, Port};
pub use self::packet::{AllocError, Packet};
pub use self::queue::{PacketQueue, Poll};
