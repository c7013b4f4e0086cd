use crate::layer::ip::{self, Datagram};
use crate::layer::Result;
use crate::nic::Packet;
use crate::time::Tick;
use crate::wire::{tcp_segment, EthernetAddress, IpProtocol, TcpChecksum, TcpFlags, TcpRepr};

use super::builder;
use super::service::Services;
use super::session::{Conflict, FourTuple, OwnSession, Scb, SessionTable};
use super::siphash::IsnGenerator;

/// The next reply chosen by the responder's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    /// The flags of the reply.
    pub flags: TcpFlags,
    /// The inbound segment closed the peer's direction.
    pub peer_fin: bool,
}

/// What became of an inbound segment.
#[derive(Debug)]
pub enum Answer {
    /// It belongs to the host's own outbound connection.
    Surface,
    /// These frames answer it. May be empty when the segment was dropped.
    Replies(Vec<Packet>),
}

/// The parameters of the host that replies need.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Source of all replies.
    pub hardware_addr: EthernetAddress,
    /// Time to live of replies.
    pub hop_limit: u8,
    /// The MTU replies are fragmented to.
    pub mtu: usize,
    /// Whether sessions may send fragmentable datagrams.
    pub fragment: bool,
}

/// The inbound half of the TCP engine.
///
/// Borrows the state of a host for the processing of a single segment.
pub struct Responder<'a> {
    /// The inbound sessions.
    pub sessions: &'a mut SessionTable,
    /// The listening services.
    pub services: &'a Services,
    /// The host's outbound connection, whose segments are not handled here.
    pub own: &'a OwnSession,
    /// Source of initial sequence numbers.
    pub isn: &'a IsnGenerator,
    /// Addressing of replies.
    pub settings: Settings,
}

#[derive(Clone, Copy)]
enum Kind {
    Reset,
    Syn,
    Data,
    Fin,
}

fn kind(scb: &Scb, seg: &TcpRepr) -> Option<Kind> {
    const SYN: TcpFlags = TcpFlags::SYN;
    const ACK_PSH: TcpFlags = TcpFlags(TcpFlags::ACK.0 | TcpFlags::PSH.0);
    const FIN: TcpFlags = TcpFlags::FIN;
    const ACK_FIN: TcpFlags = TcpFlags(TcpFlags::ACK.0 | TcpFlags::FIN.0);
    const FIN_PSH: TcpFlags = TcpFlags(TcpFlags::FIN.0 | TcpFlags::PSH.0);
    const ACK_FIN_PSH: TcpFlags = TcpFlags(TcpFlags::ACK.0 | TcpFlags::FIN.0 | TcpFlags::PSH.0);

    if scb.flags.rst() {
        return Some(Kind::Reset);
    }

    match seg.flags {
        SYN => Some(Kind::Syn),
        ACK_PSH => Some(Kind::Data),
        FIN | ACK_FIN | FIN_PSH | ACK_FIN_PSH => Some(Kind::Fin),
        _ => None,
    }
}

/// Advance a session by one inbound segment.
///
/// Sets acknowledgment, sequence number and flags of the reply in the block and returns the
/// reply's parameters. An unexpected combination of flags is rejected with `None` and leaves the
/// block untouched. A block whose last flags contain RST answers anything with those flags.
pub fn transition(scb: &mut Scb, seg: &TcpRepr) -> Option<Step> {
    let kind = kind(scb, seg)?;

    scb.ack = seg.seq_number;
    scb.peer_flags = seg.flags;
    scb.window = seg.window_len;

    let step = match kind {
        Kind::Reset => Step { flags: scb.flags, peer_fin: false },
        Kind::Syn => {
            scb.ack += 1;
            Step { flags: TcpFlags::SYN | TcpFlags::ACK, peer_fin: false }
        },
        Kind::Data => {
            scb.ack += seg.payload_len;
            Step { flags: TcpFlags::ACK | TcpFlags::PSH, peer_fin: false }
        },
        Kind::Fin => {
            scb.ack += if seg.payload_len > 0 { seg.payload_len } else { 1 };
            let flags = if scb.flags == TcpFlags::ACK | TcpFlags::FIN {
                TcpFlags::FIN | TcpFlags::ACK
            } else {
                TcpFlags::ACK
            };
            Step { flags, peer_fin: true }
        },
    };

    if seg.flags != TcpFlags::SYN {
        scb.seq = seg.ack_number;
    }
    scb.flags = step.flags;
    Some(step)
}

impl Responder<'_> {
    /// Handle one inbound TCP datagram addressed to the host.
    ///
    /// Errors are malformed segments and failed allocations. Everything the state machine does
    /// not want is an empty list of replies.
    pub fn process(&mut self, datagram: &Datagram, now: Tick) -> Result<Answer> {
        let segment = tcp_segment::new_checked(datagram.payload)?;
        let checksum = TcpChecksum::for_pseudo_header(datagram.src_addr, datagram.dst_addr);
        let repr = TcpRepr::parse(segment, checksum)?;
        let data = segment.payload_slice();
        let tuple = FourTuple {
            local: datagram.dst_addr,
            remote: datagram.src_addr,
            local_port: repr.dst_port,
            remote_port: repr.src_port,
        };

        match self.own.conflict(&tuple, IpProtocol::Tcp, now, self.sessions.timeout()) {
            Conflict::Fresh => return Ok(Answer::Surface),
            Conflict::Stale => {
                net_debug!("tcp: segment for stale own session to {}:{}, resetting",
                    tuple.remote, tuple.remote_port);
                return self.reset(datagram, &repr, tuple).map(Answer::Replies);
            },
            Conflict::None => (),
        }

        let syn = repr.flags == TcpFlags::SYN;
        let listening = self.services.is_listening(tuple.local_port);
        if syn && !listening && self.sessions.find(&tuple, now).is_none() {
            net_debug!("tcp: no service on port {}, dropping SYN from {}",
                tuple.local_port, tuple.remote);
            return Ok(Answer::Replies(Vec::new()));
        }

        let settings = self.settings;
        let isn = self.isn;
        let fresh = || Scb {
            local_hw: settings.hardware_addr,
            seq: isn.next(tuple),
            ttl: settings.hop_limit,
            mtu: settings.mtu,
            fragment: settings.fragment,
            protocol: IpProtocol::Tcp,
            ..Scb::default()
        };
        let idx = match self.sessions.find_or_allocate(tuple, syn, now, fresh) {
            Some(idx) => idx,
            None => {
                if syn {
                    net_debug!("tcp: session table exhausted, dropping SYN from {}", tuple.remote);
                } else {
                    net_trace!("tcp: no session for {} from {}", repr, tuple.remote);
                }
                return Ok(Answer::Replies(Vec::new()));
            },
        };

        let scb = match self.sessions.get_mut(idx) {
            Some(scb) => scb,
            None => return Ok(Answer::Replies(Vec::new())),
        };
        // Any matching segment keeps the session alive, even one the state machine rejects.
        scb.touched = Some(now);

        if repr.flags == TcpFlags::ACK && scb.flags == TcpFlags::ACK | TcpFlags::FIN {
            net_trace!("tcp: session {}:{} closed", tuple.remote, tuple.remote_port);
            self.sessions.free(idx);
            return Ok(Answer::Replies(Vec::new()));
        }

        let step = match transition(scb, &repr) {
            Some(step) => step,
            None => {
                net_trace!("tcp: rejected {} from {}", repr, tuple.remote);
                return Ok(Answer::Replies(Vec::new()));
            },
        };
        scb.received = data.to_vec();

        let response = if repr.flags == TcpFlags::ACK | TcpFlags::PSH && !data.is_empty() {
            self.services.handle(tuple.local_port, data)
        } else {
            Vec::new()
        };

        let mut replies = vec![builder::reply(datagram, scb, &response)?];
        if step.peer_fin {
            // The peer is done, follow up with our own FIN.
            scb.flags = TcpFlags::ACK | TcpFlags::FIN;
            if !step.flags.fin() {
                replies.push(builder::reply(datagram, scb, &[])?);
            }
        }

        let mtu = scb.mtu;
        let mut frames = Vec::with_capacity(replies.len());
        for reply in replies {
            frames.extend(ip::fragment(reply, mtu)?);
        }
        Ok(Answer::Replies(frames))
    }

    /// Answer a segment of a stale outbound connection with a reset.
    fn reset(&self, datagram: &Datagram, repr: &TcpRepr, tuple: FourTuple) -> Result<Vec<Packet>> {
        let mut scb = Scb {
            local_hw: self.settings.hardware_addr,
            flags: TcpFlags::RST | TcpFlags::FIN | TcpFlags::ACK,
            seq: self.isn.next(tuple),
            ttl: self.settings.hop_limit,
            mtu: self.settings.mtu,
            ..Scb::default()
        };
        scb.set_tuple(tuple);

        if transition(&mut scb, repr).is_none() {
            return Ok(Vec::new());
        }
        let packet = builder::reply(datagram, &scb, &[])?;
        Ok(ip::fragment(packet, scb.mtu)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::TcpSeqNumber;

    fn segment(flags: TcpFlags, seq: i32, ack: i32, payload_len: usize) -> TcpRepr {
        TcpRepr {
            src_port: 40000,
            dst_port: 80,
            flags,
            seq_number: TcpSeqNumber(seq),
            ack_number: TcpSeqNumber(ack),
            window_len: 1024,
            max_seg_size: None,
            window_scale: None,
            timestamp: None,
            payload_len,
        }
    }

    #[test]
    fn syn_keeps_sequence() {
        let mut scb = Scb { seq: TcpSeqNumber(500), ..Scb::default() };
        let step = transition(&mut scb, &segment(TcpFlags::SYN, 1000, 0, 0)).unwrap();
        assert_eq!(step, Step { flags: TcpFlags::SYN | TcpFlags::ACK, peer_fin: false });
        assert_eq!(scb.ack, TcpSeqNumber(1001));
        assert_eq!(scb.seq, TcpSeqNumber(500));
        assert_eq!(scb.window, 1024);
        assert_eq!(scb.flags, TcpFlags::SYN | TcpFlags::ACK);
    }

    #[test]
    fn data_advances_ack_once() {
        let mut scb = Scb { flags: TcpFlags::SYN | TcpFlags::ACK, ..Scb::default() };
        let step = transition(&mut scb, &segment(TcpFlags::ACK | TcpFlags::PSH, 1001, 501, 18))
            .unwrap();
        assert_eq!(step.flags, TcpFlags::ACK | TcpFlags::PSH);
        assert_eq!(scb.ack, TcpSeqNumber(1019));
        assert_eq!(scb.seq, TcpSeqNumber(501));
    }

    #[test]
    fn fin_group() {
        for &flags in &[
            TcpFlags::FIN,
            TcpFlags::ACK | TcpFlags::FIN,
            TcpFlags::FIN | TcpFlags::PSH,
            TcpFlags::ACK | TcpFlags::FIN | TcpFlags::PSH,
        ] {
            let mut scb = Scb { flags: TcpFlags::ACK | TcpFlags::PSH, ..Scb::default() };
            let step = transition(&mut scb, &segment(flags, 2000, 600, 0)).unwrap();
            assert_eq!(step, Step { flags: TcpFlags::ACK, peer_fin: true });
            assert_eq!(scb.ack, TcpSeqNumber(2001));
        }

        // With data the length alone is acknowledged.
        let mut scb = Scb { flags: TcpFlags::ACK | TcpFlags::FIN, ..Scb::default() };
        let step = transition(&mut scb, &segment(TcpFlags::FIN | TcpFlags::PSH, 2000, 600, 5))
            .unwrap();
        assert_eq!(step.flags, TcpFlags::FIN | TcpFlags::ACK);
        assert_eq!(scb.ack, TcpSeqNumber(2005));
    }

    #[test]
    fn unknown_flags_leave_block_alone() {
        let before = Scb {
            flags: TcpFlags::SYN | TcpFlags::ACK,
            seq: TcpSeqNumber(5),
            ack: TcpSeqNumber(6),
            ..Scb::default()
        };
        let odd = [TcpFlags::ACK, TcpFlags::RST, TcpFlags::SYN | TcpFlags::ACK, TcpFlags::PSH];
        for &flags in &odd {
            let mut scb = before.clone();
            assert_eq!(transition(&mut scb, &segment(flags, 1, 2, 0)), None);
            assert_eq!(scb, before);
        }
    }

    #[test]
    fn reset_answers_anything() {
        let reset = TcpFlags::RST | TcpFlags::FIN | TcpFlags::ACK;
        let mut scb = Scb { flags: reset, seq: TcpSeqNumber(9), ..Scb::default() };
        let step = transition(&mut scb, &segment(TcpFlags::SYN | TcpFlags::ACK, 300, 77, 0))
            .unwrap();
        assert_eq!(step.flags, reset);
        assert_eq!(scb.ack, TcpSeqNumber(300));
        assert_eq!(scb.seq, TcpSeqNumber(77));
    }
}
