//! The tcp engine.
//!
//! A host plays both roles of a connection. Inbound connections are handled by the
//! [`Responder`], which reacts to every segment with the reply its state machine picks and keeps
//! one block per conversation in a fixed [`SessionTable`]. The one outbound connection of a host
//! is driven by a blocking [`Connection`] on the caller's thread.
//!
//! Neither side buffers more than one segment, there is no congestion control and no
//! retransmission timer. The initiator retries a fixed number of times instead, the responder
//! answers every duplicate as if it was new.
//!
//! ## Session states
//!
//! The state of a session is not stored explicitly. It follows from the flags this host sent last
//! and those the peer sent last:
//!
//! | sent        | state           |
//! |-------------|-----------------|
//! | nothing     | no session      |
//! | SYN+ACK     | SYN-RECEIVED    |
//! | ACK(+PSH)   | ESTABLISHED     |
//! | ACK+FIN     | FIN-WAIT        |
//!
//! An ACK received in FIN-WAIT frees the slot.
//!
//! [`Responder`]: struct.Responder.html
//! [`SessionTable`]: struct.SessionTable.html
//! [`Connection`]: initiator/struct.Connection.html
pub mod builder;
pub mod initiator;
mod responder;
mod response;
mod service;
mod session;
mod siphash;


pub use self::initiator::{Channel, Connection, Transfer};
pub use self::responder::{transition, Answer, Responder, Settings, Step};
pub use self::response::{classify, Response, Segment};
pub use self::service::{PayloadHandler, Services};
pub use self::session::{Claim, Conflict, FourTuple, OwnSession, Scb, SessionTable};
pub use self::siphash::IsnGenerator;
