//! The UDP echo responder.
//!
//! A host answers any datagram addressed to it by sending it back. Probes the host sends itself
//! start their payload with its hardware address, which is how an echo coming back is told apart
//! from a request to echo.
use crate::nic::Packet;
use crate::wire::{ethernet_frame, ipv4_packet, udp_packet, EthernetAddress};
use super::Result;

/// The source port of DHCP servers.
pub const DHCP_SERVER_PORT: u16 = 67;
/// The destination port of DHCP clients.
pub const DHCP_CLIENT_PORT: u16 = 68;
/// The source port of DNS responses.
pub const DNS_PORT: u16 = 53;

/// Whether a datagram payload is an echo of a probe sent by `hardware_addr`.
pub fn is_own_echo(payload: &[u8], hardware_addr: EthernetAddress) -> bool {
    payload.starts_with(hardware_addr.as_bytes())
}

/// Build the echo of an inbound IPv4 frame carrying UDP.
///
/// The reply is a copy with the link, network and port addresses exchanged. Swapping addresses
/// keeps both checksums valid, only the new time to live needs an incremental update.
pub fn echo_reply(frame: &[u8], hop_limit: u8) -> Result<Packet> {
    let mut packet = Packet::copy_from(frame)?;
    let ethernet = ethernet_frame::new_checked_mut(&mut packet[..])?;
    ethernet.swap_addrs();
    let ip = ipv4_packet::new_checked_mut(ethernet.payload_mut_slice())?;
    ip.swap_addrs();
    ip.set_hop_limit_fixup(hop_limit);
    let udp = udp_packet::new_checked_mut(ip.payload_mut_slice())?;
    udp.swap_ports();
    Ok(packet)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Checksum, EthernetProtocol, EthernetRepr, IpProtocol, Ipv4Address, Ipv4Repr};
    use crate::wire::{UdpChecksum, UdpRepr, ETHERNET_HEADER_LEN, IPV4_HEADER_LEN, UDP_HEADER_LEN};

    const OURS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
    const THEIRS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);
    const OUR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const THEIR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

    fn datagram(payload: &[u8]) -> Packet {
        let udp_repr = UdpRepr {
            src_port: 40000,
            dst_port: 7,
            length: (UDP_HEADER_LEN + payload.len()) as u16,
        };
        let ip_repr = Ipv4Repr {
            src_addr: THEIR_IP,
            dst_addr: OUR_IP,
            protocol: IpProtocol::Udp,
            payload_len: usize::from(udp_repr.length),
            hop_limit: 12,
            ident: 99,
            dont_frag: true,
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
        let udp = udp_packet::new_unchecked_mut(ip.payload_mut_slice());
        udp.payload_mut_slice().copy_from_slice(payload);
        udp_repr.emit(udp, UdpChecksum::for_pseudo_header(THEIR_IP, OUR_IP));
        packet
    }

    #[test]
    fn echo_swaps_everything() {
        let request = datagram(b"hello");
        let reply = echo_reply(&request, 64).unwrap();

        let eth = ethernet_frame::new_checked(&reply[..]).unwrap();
        assert_eq!(eth.src_addr(), OURS);
        assert_eq!(eth.dst_addr(), THEIRS);
        let ip = ipv4_packet::new_checked(eth.payload_slice()).unwrap();
        assert!(ip.verify_checksum());
        assert_eq!(ip.hop_limit(), 64);
        let udp = udp_packet::new_checked(ip.payload_slice()).unwrap();
        assert_eq!(UdpRepr::parse(udp, UdpChecksum::for_pseudo_header(OUR_IP, THEIR_IP)).unwrap(),
            UdpRepr { src_port: 7, dst_port: 40000, length: 13 });
        assert_eq!(udp.payload_slice(), b"hello");
    }

    #[test]
    fn own_echo() {
        let mut payload = OURS.as_bytes().to_vec();
        payload.extend_from_slice(&[8, 9, 10]);
        assert!(is_own_echo(&payload, OURS));
        assert!(!is_own_echo(&payload, THEIRS));
        assert!(!is_own_echo(&payload[..4], OURS));
    }
}
