//! A software-only virtual host network stack.
//!
//! ## Table of contents
//!
//! 1. [Highlights](#highlights)
//! 2. [Design](#design-and-relevant-core-concepts)
//! 3. [The wire module](wire/index.html)
//!    1. [Views and representations](wire/index.html)
//!    1. [Checksums](wire/checksum/index.html)
//!    1. [Tcp segments](wire/struct.TcpRepr.html)
//! 4. [The layers](layer/index.html)
//!    1. [Arp cache and resolution](layer/arp/index.html)
//!    1. [Sessions and the Tcp engine](layer/tcp/index.html)
//! 5. [Packets and queues](nic/index.html)
//! 6. [The virtual host](host/index.html)
//!
//! ## Highlights
//!
//! A [`Host`] presents a simulated machine on an Ethernet segment without any kernel stack. It
//! answers ARP, replies to pings and UDP probes, accepts TCP connections for the services it is
//! told to host and drives one outbound TCP connection of its own.
//!
//! * Bounds-checked encoding and decoding of every header, read and edited in place
//! * A fixed table of sessions, scanned linearly, that never grows
//! * Blocking client operations with a fixed attempt count and per-attempt deadline
//!
//! [`Host`]: host/struct.Host.html
//!
//! ## Design and relevant core concepts
//!
//! Frames enter a host through [`Host::receive`]. The dispatcher classifies them and either
//! answers directly, hands them to the application through the host's inbound queue, or drops
//! them. Every answer lands on the outbound queue and it is the embedder's job to move frames
//! between the queues of different hosts (see [`nic::Link`]).
//!
//! There is no timer. Session expiry samples an external tick counter that the embedder advances,
//! all deadlines of client operations are wall-clock waits on the queue's condition variable.
//! Ambient state (the tick counter, the cancellation flag and the host identifier) is passed
//! explicitly in a [`host::Context`] instead of living in globals.
//!
//! [`Host::receive`]: host/struct.Host.html#method.receive
//! [`nic::Link`]: nic/struct.Link.html
//! [`host::Context`]: host/struct.Context.html
#![warn(missing_docs)]

#[macro_use] mod macros;
pub mod host;
pub mod layer;
pub mod nic;
pub mod time;
pub mod wire;

pub use host::{Context, Host, HostConfig};
