use crate::layer::ip::Datagram;
use crate::layer::udp;
use crate::wire::{icmpv4_packet, ipv4_packet, tcp_segment, udp_packet};
use crate::wire::{Checksum, IpAddress, IpProtocol, Icmpv4Message, Icmpv4Repr};
use crate::wire::{TcpChecksum, TcpFlags, TcpRepr, TcpSeqNumber, UdpChecksum, UdpRepr};
use crate::wire::IPV4_HEADER_LEN;

use super::session::Scb;

/// An inbound frame recognized as an answer for an outbound session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// An ICMP error about a datagram of the session.
    Icmp {
        /// The ICMP message type.
        kind: u8,
        /// The ICMP message code.
        code: u8,
        /// Time to live of the error message.
        ttl: u8,
        /// The router or host reporting the error.
        from: IpAddress,
    },
    /// An echo reply to the session's ICMP probe.
    EchoReply {
        /// Time to live of the reply.
        ttl: u8,
    },
    /// The session's UDP probe came back.
    UdpEcho {
        /// Time to live of the echo.
        ttl: u8,
    },
    /// A segment of the TCP conversation.
    Tcp(Segment),
}

/// The parts of an inbound TCP segment the initiator acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Segment {
    pub seq: TcpSeqNumber,
    pub ack: TcpSeqNumber,
    pub flags: TcpFlags,
    pub ttl: u8,
    pub data: Vec<u8>,
    /// The maximum segment size, only read from the answer to our SYN.
    pub mss: Option<u16>,
}

/// Match an inbound frame against an outbound session.
///
/// ICMP errors may come from any router on the path and are matched by the datagram they quote.
/// Everything else must come from the remote end of the session. Frames that fail to parse or
/// belong to something else yield `None`.
pub fn classify(frame: &[u8], scb: &Scb) -> Option<Response> {
    let datagram = Datagram::parse(frame, Checksum::Manual).ok()?;

    if datagram.protocol == IpProtocol::Icmp {
        if let Some(response) = icmp_error(&datagram, scb) {
            return Some(response);
        }
    }

    if datagram.src_addr != scb.remote {
        return None;
    }

    match (datagram.protocol, scb.protocol) {
        (IpProtocol::Icmp, IpProtocol::Icmp) => {
            let icmp = icmpv4_packet::new_checked(datagram.payload).ok()?;
            match Icmpv4Repr::parse(icmp, Checksum::Manual).ok()? {
                Icmpv4Repr::EchoReply { seq_no, .. } if seq_no == scb.echo_seq => {
                    Some(Response::EchoReply { ttl: datagram.hop_limit })
                },
                _ => None,
            }
        },
        (IpProtocol::Udp, IpProtocol::Udp) => {
            let packet = udp_packet::new_checked(datagram.payload).ok()?;
            let checksum = UdpChecksum::for_pseudo_header(datagram.src_addr, datagram.dst_addr);
            let repr = UdpRepr::parse(packet, checksum).ok()?;
            let ports = repr.src_port == scb.remote_port && repr.dst_port == scb.local_port;
            if ports && udp::is_own_echo(packet.payload_slice(), scb.local_hw) {
                Some(Response::UdpEcho { ttl: datagram.hop_limit })
            } else {
                None
            }
        },
        (IpProtocol::Tcp, IpProtocol::Tcp) => {
            let segment = tcp_segment::new_checked(datagram.payload).ok()?;
            let checksum = TcpChecksum::for_pseudo_header(datagram.src_addr, datagram.dst_addr);
            let repr = TcpRepr::parse(segment, checksum).ok()?;
            if repr.src_port != scb.remote_port || repr.dst_port != scb.local_port {
                return None;
            }

            let answers_syn = scb.flags == TcpFlags::SYN
                && repr.flags == TcpFlags::SYN | TcpFlags::ACK;
            Some(Response::Tcp(Segment {
                seq: repr.seq_number,
                ack: repr.ack_number,
                flags: repr.flags,
                ttl: datagram.hop_limit,
                data: segment.payload_slice().to_vec(),
                mss: if answers_syn { repr.max_seg_size } else { None },
            }))
        },
        _ => None,
    }
}

fn icmp_error(datagram: &Datagram, scb: &Scb) -> Option<Response> {
    let icmp = icmpv4_packet::new_checked(datagram.payload).ok()?;
    let repr = Icmpv4Repr::parse(icmp, Checksum::Manual).ok()?;
    if !repr.is_error() {
        return None;
    }

    // The quote is cut short, only its fixed header is read.
    let quote = icmp.data();
    if quote.len() < IPV4_HEADER_LEN {
        return None;
    }
    let quoted = ipv4_packet::new_unchecked(quote);
    if IpAddress::Ipv4(quoted.dst_addr()) != scb.remote || quoted.protocol() != scb.protocol {
        return None;
    }

    let kind: Icmpv4Message = icmp.msg_type();
    Some(Response::Icmp {
        kind: kind.into(),
        code: icmp.msg_code(),
        ttl: datagram.hop_limit,
        from: datagram.src_addr,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::icmp::{self, Origin};
    use crate::layer::tcp::builder;
    use crate::time::Tick;
    use crate::wire::{EthernetAddress, Icmpv4DstUnreachable, Ipv4Address};

    const OURS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
    const THEIRS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);

    fn outbound() -> Scb {
        Scb {
            local: IpAddress::v4(10, 0, 0, 1),
            remote: IpAddress::v4(10, 0, 0, 2),
            local_port: 49152,
            remote_port: 80,
            local_hw: OURS,
            remote_hw: THEIRS,
            flags: TcpFlags::SYN,
            seq: TcpSeqNumber(100),
            ..Scb::default()
        }
    }

    /// The same conversation seen from the other end.
    fn mirrored(scb: &Scb) -> Scb {
        Scb {
            local: scb.remote,
            remote: scb.local,
            local_port: scb.remote_port,
            remote_port: scb.local_port,
            local_hw: scb.remote_hw,
            remote_hw: scb.local_hw,
            protocol: scb.protocol,
            ..Scb::default()
        }
    }

    #[test]
    fn syn_ack_with_mss() {
        let ours = outbound();
        let mut theirs = Scb {
            flags: TcpFlags::SYN | TcpFlags::ACK,
            seq: TcpSeqNumber(7000),
            ack: TcpSeqNumber(101),
            ..mirrored(&ours)
        };
        let frame = builder::build(&mut theirs, Tick(0)).unwrap().remove(0);

        match classify(&frame, &ours) {
            Some(Response::Tcp(segment)) => {
                assert_eq!(segment.flags, TcpFlags::SYN | TcpFlags::ACK);
                assert_eq!(segment.seq, TcpSeqNumber(7000));
                assert_eq!(segment.ack, TcpSeqNumber(101));
                assert_eq!(segment.ttl, 64);
                assert_eq!(segment.mss, Some(1460));
            },
            other => panic!("unexpected {:?}", other),
        }

        // Not an answer to a SYN, the option is ignored.
        let established = Scb { flags: TcpFlags::ACK, ..outbound() };
        match classify(&frame, &established) {
            Some(Response::Tcp(segment)) => assert_eq!(segment.mss, None),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn other_ports_ignored() {
        let ours = outbound();
        let mut theirs = Scb { flags: TcpFlags::ACK, remote_port: 49153, ..mirrored(&ours) };
        let frame = builder::build(&mut theirs, Tick(0)).unwrap().remove(0);
        assert_eq!(classify(&frame, &ours), None);
    }

    #[test]
    fn icmp_error_quoting_session() {
        let mut ours = outbound();
        let syn = builder::build(&mut ours, Tick(0)).unwrap().remove(0);
        let router = Origin {
            hardware_addr: THEIRS,
            protocol_addr: Ipv4Address::new(10, 0, 0, 254),
            hop_limit: 255,
            ident: 0,
        };
        let error = icmp::unreachable(&syn, Icmpv4DstUnreachable::HostUnreachable, 0, router)
            .unwrap();

        assert_eq!(classify(&error, &ours), Some(Response::Icmp {
            kind: 3,
            code: 1,
            ttl: 255,
            from: IpAddress::v4(10, 0, 0, 254),
        }));

        let elsewhere = Scb { remote: IpAddress::v4(10, 0, 0, 3), ..outbound() };
        assert_eq!(classify(&error, &elsewhere), None);
    }

    #[test]
    fn udp_echo_needs_our_mac() {
        let mut ours = Scb { protocol: IpProtocol::Udp, payload_len: 16, ..outbound() };
        let probe = builder::build(&mut ours, Tick(0)).unwrap().remove(0);
        let echo = udp::echo_reply(&probe, 60).unwrap();
        assert_eq!(classify(&echo, &ours), Some(Response::UdpEcho { ttl: 60 }));

        let someone_else = Scb { local_hw: THEIRS, ..ours.clone() };
        assert_eq!(classify(&echo, &someone_else), None);
    }

    #[test]
    fn echo_reply_sequence() {
        let mut ours = Scb {
            protocol: IpProtocol::Icmp,
            payload_len: 8,
            echo_seq: 3,
            ..outbound()
        };
        let request = builder::build(&mut ours, Tick(0)).unwrap().remove(0);
        let reply = icmp::echo_reply(request, 50).unwrap();
        assert_eq!(classify(&reply, &ours), Some(Response::EchoReply { ttl: 50 }));

        ours.echo_seq = 4;
        assert_eq!(classify(&reply, &ours), None);
    }
}
