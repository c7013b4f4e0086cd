//! Replies generated by the ICMP layer.
//!
//! Echo requests are answered by rewriting the request itself, error messages are built fresh and
//! quote the beginning of the offending datagram.
use crate::nic::Packet;
use crate::wire::{ethernet_frame, icmpv4_packet, ipv4_packet};
use crate::wire::{Checksum, EthernetAddress, EthernetProtocol, EthernetRepr, IpProtocol};
use crate::wire::{Icmpv4DstUnreachable, Icmpv4Message, Icmpv4Repr, Ipv4Address, Ipv4Repr};
use crate::wire::{ETHERNET_HEADER_LEN, ICMPV4_HEADER_LEN, IPV4_HEADER_LEN};
use super::Result;

/// The maximum number of bytes of the original datagram quoted in an error.
pub const QUOTE_LEN: usize = 44;

/// The addressing of a locally generated error message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Origin {
    /// The hardware address of the host.
    pub hardware_addr: EthernetAddress,
    /// The IPv4 address of the host.
    pub protocol_addr: Ipv4Address,
    /// The time to live of the message.
    pub hop_limit: u8,
    /// The identification of the message.
    pub ident: u16,
}

/// Turn an echo request frame into its reply.
///
/// Only the message type, the addresses and the time to live change so both checksums are
/// updated incrementally.
pub fn echo_reply(mut frame: Packet, hop_limit: u8) -> Result<Packet> {
    let ethernet = ethernet_frame::new_checked_mut(&mut frame[..])?;
    ethernet.swap_addrs();
    let ip = ipv4_packet::new_checked_mut(ethernet.payload_mut_slice())?;
    ip.swap_addrs();
    ip.set_hop_limit_fixup(hop_limit);
    let icmp = icmpv4_packet::new_checked_mut(ip.payload_mut_slice())?;
    icmp.set_msg_type_fixup(Icmpv4Message::EchoReply);
    Ok(frame)
}

/// Build a destination unreachable message about an inbound IPv4 frame.
///
/// The message quotes the original network header and the start of its payload, up to
/// `QUOTE_LEN` bytes in total. For `FragRequired` the next hop MTU is filled in.
pub fn unreachable(
    frame: &[u8],
    reason: Icmpv4DstUnreachable,
    next_hop_mtu: u16,
    origin: Origin,
) -> Result<Packet> {
    let ethernet = EthernetRepr::parse(ethernet_frame::new_checked(frame)?)?;
    let original = ipv4_packet::new_checked(&frame[ETHERNET_HEADER_LEN..])?;
    let quoted = usize::from(original.total_len()).min(QUOTE_LEN);
    let quote = &original.as_bytes()[..quoted];

    let icmp_repr = Icmpv4Repr::DstUnreachable {
        reason,
        next_hop_mtu: if reason == Icmpv4DstUnreachable::FragRequired { next_hop_mtu } else { 0 },
    };
    let ip_repr = Ipv4Repr {
        src_addr: origin.protocol_addr,
        dst_addr: original.src_addr(),
        protocol: IpProtocol::Icmp,
        payload_len: ICMPV4_HEADER_LEN + quoted,
        hop_limit: origin.hop_limit,
        ident: origin.ident,
        dont_frag: true,
        more_frags: false,
        frag_offset: 0,
    };
    let eth_repr = EthernetRepr {
        src_addr: origin.hardware_addr,
        dst_addr: ethernet.src_addr,
        ethertype: EthernetProtocol::Ipv4,
    };

    let mut packet = Packet::alloc(ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + ip_repr.payload_len)?;
    let eth = ethernet_frame::new_unchecked_mut(&mut packet[..]);
    eth_repr.emit(eth);
    let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
    ip_repr.emit(ip, Checksum::Manual);
    let icmp = icmpv4_packet::new_unchecked_mut(ip.payload_mut_slice());
    icmp.data_mut().copy_from_slice(quote);
    icmp_repr.emit(icmp, Checksum::Manual);
    Ok(packet)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::checksum;

    const OURS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
    const THEIRS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);
    const OUR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const THEIR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

    fn echo_request(data: &[u8]) -> Packet {
        let ip_repr = Ipv4Repr {
            src_addr: THEIR_IP,
            dst_addr: OUR_IP,
            protocol: IpProtocol::Icmp,
            payload_len: ICMPV4_HEADER_LEN + data.len(),
            hop_limit: 33,
            ident: 0x4242,
            dont_frag: false,
            more_frags: false,
            frag_offset: 0,
        };
        let mut packet = Packet::alloc(ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + ip_repr.payload_len)
            .unwrap();
        let eth = ethernet_frame::new_unchecked_mut(&mut packet[..]);
        EthernetRepr { src_addr: THEIRS, dst_addr: OURS, ethertype: EthernetProtocol::Ipv4 }
            .emit(eth);
        let ip = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
        ip_repr.emit(ip, Checksum::Manual);
        let icmp = icmpv4_packet::new_unchecked_mut(ip.payload_mut_slice());
        icmp.data_mut().copy_from_slice(data);
        Icmpv4Repr::EchoRequest { ident: 7, seq_no: 9 }.emit(icmp, Checksum::Manual);
        packet
    }

    #[test]
    fn echo_reply_in_place() {
        let request = echo_request(b"abcdefgh");
        let reply = echo_reply(request, 64).unwrap();

        let eth = ethernet_frame::new_checked(&reply[..]).unwrap();
        assert_eq!(eth.src_addr(), OURS);
        assert_eq!(eth.dst_addr(), THEIRS);
        let ip = ipv4_packet::new_checked(eth.payload_slice()).unwrap();
        assert!(ip.verify_checksum());
        assert_eq!(ip.src_addr(), OUR_IP);
        assert_eq!(ip.dst_addr(), THEIR_IP);
        assert_eq!(ip.hop_limit(), 64);
        let icmp = icmpv4_packet::new_checked(ip.payload_slice()).unwrap();
        assert!(icmp.verify_checksum());
        assert_eq!(Icmpv4Repr::parse(icmp, Checksum::Manual).unwrap(),
            Icmpv4Repr::EchoReply { ident: 7, seq_no: 9 });
        assert_eq!(icmp.data(), b"abcdefgh");
    }

    #[test]
    fn quotes_at_most_44_bytes() {
        let request = echo_request(&[0x55; 100]);
        let origin = Origin { hardware_addr: OURS, protocol_addr: OUR_IP, hop_limit: 64, ident: 1 };
        let reason = Icmpv4DstUnreachable::FragRequired;
        let reply = unreachable(&request, reason, 1500, origin).unwrap();
        let headers = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + ICMPV4_HEADER_LEN;
        assert_eq!(reply.len(), headers + QUOTE_LEN);

        let eth = ethernet_frame::new_checked(&reply[..]).unwrap();
        assert_eq!(eth.dst_addr(), THEIRS);
        let ip = ipv4_packet::new_checked(eth.payload_slice()).unwrap();
        assert!(ip.verify_checksum());
        assert!(ip.dont_frag());
        assert_eq!(ip.dst_addr(), THEIR_IP);
        assert_eq!(ip.protocol(), IpProtocol::Icmp);
        let icmp = icmpv4_packet::new_checked(ip.payload_slice()).unwrap();
        assert_eq!(!checksum::data(ip.payload_slice()), 0);
        assert_eq!(Icmpv4Repr::parse(icmp, Checksum::Manual).unwrap(), Icmpv4Repr::DstUnreachable {
            reason: Icmpv4DstUnreachable::FragRequired,
            next_hop_mtu: 1500,
        });
        assert_eq!(icmp.data(), &request[ETHERNET_HEADER_LEN..][..QUOTE_LEN]);
    }

    #[test]
    fn short_datagram_quoted_whole() {
        let request = echo_request(b"ab");
        let origin = Origin { hardware_addr: OURS, protocol_addr: OUR_IP, hop_limit: 64, ident: 1 };
        let reason = Icmpv4DstUnreachable::PortUnreachable;
        let reply = unreachable(&request, reason, 1500, origin).unwrap();
        let quoted = IPV4_HEADER_LEN + ICMPV4_HEADER_LEN + 2;
        assert_eq!(reply.len(), ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + ICMPV4_HEADER_LEN + quoted);
    }
}
