//! The blocking, outbound half of the TCP engine.
//!
//! A [`Connection`] drives the single outbound session of a host through handshake, data
//! exchange and teardown. Every operation sends one segment, then waits on the inbound queue
//! until a response for the session arrives or the per-attempt deadline passes, for at most
//! [`ATTEMPTS`] rounds. Raising the cancellation flag (and waking the queue) aborts the wait.
//!
//! The same type sends ICMP and UDP probes, which have no handshake and a single attempt.
//!
//! [`Connection`]: struct.Connection.html
//! [`ATTEMPTS`]: constant.ATTEMPTS.html
use std::mem;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use crate::layer::{Error, Result};
use crate::nic::{PacketQueue, Poll};
use crate::time::Ticks;
use crate::wire::{IpProtocol, TcpFlags, TcpSeqNumber};

use super::builder;
use super::response::{classify, Response, Segment};
use super::session::{OwnSession, Scb};
use super::siphash::IsnGenerator;

/// The number of rounds of every operation.
pub const ATTEMPTS: usize = 3;

/// The queues and shared state of the host an outbound connection belongs to.
#[derive(Clone, Copy)]
pub struct Channel<'a> {
    /// Frames the dispatcher surfaced to the application.
    pub inbound: &'a PacketQueue,
    /// Frames waiting for transmission.
    pub outbound: &'a PacketQueue,
    /// The claim that routes answers to `inbound`.
    pub own: &'a OwnSession,
    /// Source of initial sequence numbers.
    pub isn: &'a IsnGenerator,
    /// The tick counter, for timestamps and session freshness.
    pub ticks: &'a Ticks,
    /// Raised to abort any wait.
    pub cancel: &'a AtomicBool,
    /// The deadline of one attempt.
    pub waittime: Duration,
}

/// How the peer reacted to data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transfer {
    /// All data was acknowledged.
    Acked,
    /// All data was sent and the peer answered with data of its own, already acknowledged.
    Answered(Vec<u8>),
    /// The peer closed its direction before the transfer was complete.
    PeerClosing {
        /// How many bytes of the data the peer acknowledged.
        sent: usize,
        /// The answers of the peer up to and including its FIN.
        data: Vec<u8>,
    },
}

/// The reaction of the peer to a single segment.
enum Reaction {
    Acked,
    Data { data: Vec<u8>, fin: bool },
}

/// The outbound session of a host.
///
/// Dropping the connection gives up the host's claim on its conversation.
pub struct Connection<'a> {
    channel: Channel<'a>,
    scb: Scb,
}

impl<'a> Connection<'a> {
    /// Take over a prepared session block.
    ///
    /// The block must be fully addressed, including both link addresses.
    pub fn new(channel: Channel<'a>, scb: Scb) -> Self {
        channel.own.claim(scb.tuple(), scb.protocol, channel.ticks.now());
        Connection { channel, scb }
    }

    /// The session block as of the last exchange.
    pub fn scb(&self) -> &Scb {
        &self.scb
    }

    /// Perform the three-way handshake.
    ///
    /// Every attempt starts over with a new initial sequence number. An ICMP error or a reset
    /// ends the handshake at once, any other unexpected segment is reset before the next attempt.
    pub fn connect(&mut self) -> Result<()> {
        if self.scb.protocol != IpProtocol::Tcp {
            return Err(Error::Illegal);
        }

        for attempt in 1..=ATTEMPTS {
            self.scb.seq = self.channel.isn.next(self.scb.tuple());
            self.scb.ack = TcpSeqNumber(0);
            self.scb.peer_mss = None;
            self.scb.peer_flags = TcpFlags::default();
            self.send(TcpFlags::SYN)?;

            let segment = match self.poll(self.deadline())? {
                Some(Response::Tcp(segment)) => segment,
                Some(Response::Icmp { kind, code, from, .. }) => {
                    net_debug!("tcp: {} reports {} unreachable (type {}, code {})",
                        from, self.scb.remote, kind, code);
                    return Err(Error::Unreachable { kind, code });
                },
                _ => {
                    net_debug!("tcp: connect attempt {} to {} timed out", attempt, self.scb.remote);
                    continue;
                },
            };

            if segment.flags.rst() {
                return Err(Error::PeerReset);
            }

            if segment.flags == TcpFlags::SYN | TcpFlags::ACK && segment.ack == self.scb.seq + 1 {
                self.scb.peer_mss = segment.mss.filter(|&mss| mss > 0);
                self.scb.seq = segment.ack;
                self.scb.ack = segment.seq + 1;
                return self.send(TcpFlags::ACK);
            }

            net_debug!("tcp: unexpected {} during connect, resetting", segment.flags);
            self.scb.seq = segment.ack;
            self.scb.ack = segment.seq;
            self.send(TcpFlags::RST | TcpFlags::ACK)?;
        }

        Err(Error::Timeout)
    }

    /// Send data on an established connection.
    ///
    /// Data larger than the peer's segment size goes out one segment at a time, each of them
    /// acknowledged before the next. The next segment starts at the peer's acknowledgment, and
    /// answers of the peer are collected over all segments. Only a FIN of the peer ends the
    /// transfer early.
    pub fn transfer(&mut self, data: &[u8]) -> Result<Transfer> {
        self.drain_data()?;

        let start = self.scb.seq;
        let mut answer: Option<Vec<u8>> = None;
        let mut stalled = 0;
        loop {
            let sent = self.acked_since(start, data.len());
            self.scb.payload = Some(data[sent..].to_vec());
            let len = self.scb.segment_len();

            if let Reaction::Data { data: more, fin } = self.exchange(len)? {
                let collected = answer.get_or_insert_with(Vec::new);
                collected.extend_from_slice(&more);
                if fin {
                    return Ok(Transfer::PeerClosing {
                        sent: self.acked_since(start, data.len()),
                        data: mem::take(collected),
                    });
                }
            }

            let acked = self.acked_since(start, data.len());
            if acked == data.len() {
                break;
            }
            if acked > sent {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled == ATTEMPTS {
                    net_debug!("tcp: {} stopped taking data after {} bytes",
                        self.scb.remote, acked);
                    return Err(Error::Timeout);
                }
            }
        }

        Ok(match answer {
            Some(data) => Transfer::Answered(data),
            None => Transfer::Acked,
        })
    }

    /// Close the connection in both directions.
    pub fn disconnect(&mut self) -> Result<()> {
        let peer_fin = self.drain_close()? || self.scb.peer_flags.fin();

        for attempt in 1..=ATTEMPTS {
            self.send(TcpFlags::FIN | TcpFlags::ACK | TcpFlags::PSH)?;

            let segment = match self.poll(self.deadline())? {
                Some(Response::Tcp(segment)) => segment,
                _ => {
                    net_debug!("tcp: close attempt {} to {} unanswered", attempt, self.scb.remote);
                    continue;
                },
            };

            if segment.flags.contains(TcpFlags::ACK | TcpFlags::FIN) {
                self.scb.seq = segment.ack;
                self.scb.ack = segment.seq + segment.data.len() + 1;
                return self.send(TcpFlags::ACK);
            }

            if segment.flags == TcpFlags::ACK {
                self.scb.seq = segment.ack;
                if peer_fin {
                    return Ok(());
                }
                return self.await_fin();
            }
        }

        Err(Error::Timeout)
    }

    /// Send one ICMP echo request or UDP probe and wait for it to come back.
    ///
    /// Returns the time to live of the answer.
    pub fn echo(&mut self) -> Result<u8> {
        match self.scb.protocol {
            IpProtocol::Icmp | IpProtocol::Udp => (),
            _ => return Err(Error::Illegal),
        }

        self.scb.echo_seq = self.scb.echo_seq.wrapping_add(1);
        self.send(TcpFlags::default())?;
        match self.poll(self.deadline())? {
            Some(Response::EchoReply { ttl }) | Some(Response::UdpEcho { ttl }) => Ok(ttl),
            Some(Response::Icmp { kind, code, .. }) => Err(Error::Unreachable { kind, code }),
            Some(Response::Tcp(_)) | None => Err(Error::Timeout),
        }
    }

    /// Send the current payload segment until the peer reacts.
    fn exchange(&mut self, len: usize) -> Result<Reaction> {
        for attempt in 1..=ATTEMPTS {
            self.send(TcpFlags::ACK | TcpFlags::PSH)?;

            let segment = match self.poll(self.deadline())? {
                Some(Response::Tcp(segment)) => segment,
                _ => {
                    net_debug!("tcp: data attempt {} to {} unanswered", attempt, self.scb.remote);
                    continue;
                },
            };

            if segment.flags == TcpFlags::ACK && segment.ack == self.scb.seq + len {
                self.scb.seq = segment.ack;
                self.scb.ack = segment.seq;
                return Ok(Reaction::Acked);
            }

            let fin = segment.flags == TcpFlags::ACK | TcpFlags::PSH | TcpFlags::FIN;
            if fin || segment.flags == TcpFlags::ACK | TcpFlags::PSH {
                self.accept_data(&segment)?;
                return Ok(Reaction::Data { data: segment.data, fin });
            }
        }

        Err(Error::Timeout)
    }

    /// Acknowledge data of the peer that answers ours, and its FIN when one came along.
    fn accept_data(&mut self, segment: &Segment) -> Result<()> {
        let fin = usize::from(segment.flags.fin());
        self.scb.seq = segment.ack;
        self.scb.ack = segment.seq + segment.data.len() + fin;
        self.scb.peer_flags = segment.flags;
        self.scb.received = segment.data.clone();
        self.send(TcpFlags::ACK)
    }

    /// The bytes of a transfer starting at `start` the peer acknowledged, at most `total`.
    fn acked_since(&self, start: TcpSeqNumber, total: usize) -> usize {
        let acked = self.scb.seq.0.wrapping_sub(start.0).max(0) as usize;
        acked.min(total)
    }

    /// Acknowledge data that is still queued from an earlier exchange.
    fn drain_data(&mut self) -> Result<()> {
        while let Some(frame) = self.channel.inbound.try_pop() {
            if let Some(Response::Tcp(segment)) = classify(&frame, &self.scb) {
                if segment.flags == TcpFlags::ACK | TcpFlags::PSH && segment.ack == self.scb.seq {
                    self.scb.ack = segment.seq + segment.data.len();
                    self.scb.received = segment.data;
                    self.send(TcpFlags::ACK)?;
                }
            }
        }
        Ok(())
    }

    /// Work through queued segments before closing, returning whether the peer sent its FIN.
    fn drain_close(&mut self) -> Result<bool> {
        let mut peer_fin = false;
        while let Some(frame) = self.channel.inbound.try_pop() {
            let segment = match classify(&frame, &self.scb) {
                Some(Response::Tcp(segment)) => segment,
                _ => continue,
            };

            if segment.flags == TcpFlags::ACK | TcpFlags::PSH {
                self.scb.ack = segment.seq + segment.data.len();
                self.send(TcpFlags::ACK)?;
            } else if segment.flags.contains(TcpFlags::ACK | TcpFlags::FIN) {
                self.scb.seq = segment.ack;
                self.scb.ack = segment.seq + 1;
                self.send(TcpFlags::ACK)?;
                peer_fin = true;
            } else if segment.flags == TcpFlags::ACK {
                self.scb.seq = segment.ack;
                self.scb.ack = segment.seq;
                break;
            }
        }
        Ok(peer_fin)
    }

    /// Wait for the FIN of a peer that only acknowledged ours.
    fn await_fin(&mut self) -> Result<()> {
        let deadline = self.deadline();
        loop {
            match self.poll(deadline)? {
                Some(Response::Tcp(segment)) if segment.flags.fin() => {
                    self.scb.seq = segment.ack;
                    self.scb.ack = segment.seq + segment.data.len() + 1;
                    return self.send(TcpFlags::ACK);
                },
                Some(_) => (),
                None => {
                    net_debug!("tcp: {} never sent its FIN", self.scb.remote);
                    return Err(Error::Timeout);
                },
            }
        }
    }

    /// Build and queue the next segment with `flags`.
    fn send(&mut self, flags: TcpFlags) -> Result<()> {
        let now = self.channel.ticks.now();
        self.scb.flags = flags;
        let frames = builder::build(&mut self.scb, now)?;
        for frame in frames {
            self.channel.outbound.push(frame);
        }
        self.scb.touched = Some(now);
        self.channel.own.claim(self.scb.tuple(), self.scb.protocol, now);
        Ok(())
    }

    /// Wait for the first response of the session until `deadline`.
    ///
    /// Unrelated frames are discarded.
    fn poll(&self, deadline: Instant) -> Result<Option<Response>> {
        loop {
            match self.channel.inbound.pop_until(deadline, self.channel.cancel) {
                Poll::Packet(frame) => match classify(&frame, &self.scb) {
                    Some(response) => return Ok(Some(response)),
                    None => {
                        net_trace!("tcp: discarding unrelated frame of {} bytes", frame.len());
                    },
                },
                Poll::TimedOut => return Ok(None),
                Poll::Cancelled => return Err(Error::Cancelled),
            }
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.channel.waittime
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        let ours = self.channel.own.current()
            .map_or(false, |claim| claim.tuple == self.scb.tuple());
        if ours {
            self.channel.own.release();
        }
    }
}
