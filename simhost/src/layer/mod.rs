//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. The state a layer keeps (the neighbor cache, the session table,
//! the listening services) is open to modifications by the embedder while no packet is being
//! processed, similar to reconfiguration on the OS level with utilities such as `arp` or
//! `ifconfig`.
//!
//! ## Receiving
//!
//! Inbound frames are parsed once into a [`Datagram`] by the ip layer and then handed to the
//! protocol above it. Replies are built as fresh packets or, where only a few fields change, by
//! rewriting the inbound frame in place with incremental checksum updates.
//!
//! ## Sending
//!
//! Outbound traffic of a session is serialized by the tcp [`builder`] from the session's control
//! block. There is one outstanding segment at a time and no retransmission timer, the blocking
//! [`initiator`] simply retries a fixed number of times.
//!
//! [`Datagram`]: ip/struct.Datagram.html
//! [`builder`]: tcp/builder/index.html
//! [`initiator`]: tcp/initiator/index.html
use crate::nic::AllocError;

pub mod arp;
pub mod icmp;
pub mod ip;
pub mod tcp;
pub mod udp;

/// The result type of layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The failures a layer operation can report to its caller.
///
/// Protocol events that only lead to a dropped packet (unknown flag combinations, a full session
/// table) are not errors. They are logged and visible as the dispatch outcome instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// A packet buffer could not be allocated.
    #[error("packet allocation failed: {0}")]
    Allocation(#[from] AllocError),

    /// A packet could not be parsed or emitted.
    #[error("malformed packet: {0}")]
    Wire(#[from] crate::wire::Error),

    /// No matching response arrived within the deadline of any attempt.
    #[error("no response within the deadline")]
    Timeout,

    /// The peer answered with a reset.
    #[error("connection refused by peer")]
    PeerReset,

    /// An ICMP error was received for the session.
    #[error("destination unreachable (icmp type {kind}, code {code})")]
    Unreachable {
        /// The ICMP message type.
        kind: u8,
        /// The ICMP message code.
        code: u8,
    },

    /// There is no next hop towards the destination.
    #[error("no route to host")]
    NoRoute,

    /// The operation was interrupted through the cancellation flag.
    #[error("interrupted")]
    Cancelled,

    /// The action could not be completed because there were not enough resources.
    #[error("resources exhausted")]
    Exhausted,

    /// The operation was not permitted.
    ///
    /// Returned when a configuration or call does not allow or implement an operation.
    #[error("operation not permitted")]
    Illegal,
}

/// A standard wrapper for a function implementing a handler trait.
///
/// Keeps the type alias overhead low by providing a single wrapper type that implements the
/// handler traits of all layers, where applicable.
pub struct FnHandler<F>(pub F);
