use crate::nic::{AllocError, Packet};
use crate::wire::{arp_packet, ethernet_frame};
use crate::wire::{ArpOperation, ArpRepr, EthernetAddress, EthernetProtocol, EthernetRepr};
use crate::wire::Ipv4Address;
use crate::wire::{Result, ETHERNET_HEADER_LEN};

/// An ARP packet as received in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    /// The link layer header of the frame.
    pub ethernet: EthernetRepr,
    /// The decoded ARP content.
    pub arp: ArpRepr,
}

impl Inbound {
    /// Parse a frame with ethertype ARP.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let ethernet = EthernetRepr::parse(ethernet_frame::new_checked(frame)?)?;
        let arp = ArpRepr::parse(arp_packet::new_checked(&frame[ETHERNET_HEADER_LEN..])?)?;
        Ok(Inbound { ethernet, arp })
    }

    /// Whether this is a request for `addr`.
    pub fn asks_for(&self, addr: Ipv4Address) -> bool {
        self.arp.operation == ArpOperation::Request && self.arp.target_protocol_addr == addr
    }
}

/// Build a broadcast request for the hardware address of `target`.
pub fn request(
    hardware_addr: EthernetAddress,
    protocol_addr: Ipv4Address,
    target: Ipv4Address,
) -> core::result::Result<Packet, AllocError> {
    let arp = ArpRepr {
        operation: ArpOperation::Request,
        source_hardware_addr: hardware_addr,
        source_protocol_addr: protocol_addr,
        target_hardware_addr: EthernetAddress::BROADCAST,
        target_protocol_addr: target,
    };
    let ethernet = EthernetRepr {
        src_addr: hardware_addr,
        dst_addr: EthernetAddress::BROADCAST,
        ethertype: EthernetProtocol::Arp,
    };

    let mut packet = Packet::alloc(ETHERNET_HEADER_LEN + arp.buffer_len())?;
    let frame = ethernet_frame::new_unchecked_mut(&mut packet[..]);
    ethernet.emit(frame);
    arp.emit(arp_packet::new_unchecked_mut(frame.payload_mut_slice()));
    Ok(packet)
}

/// Turn a received request into the reply claiming `hardware_addr`.
///
/// The frame is rewritten in place, any trailing padding is kept.
pub fn answer(mut frame: Packet, inbound: &Inbound, hardware_addr: EthernetAddress) -> Packet {
    let reply = inbound.arp.answer(hardware_addr);
    let ethernet = EthernetRepr {
        src_addr: hardware_addr,
        dst_addr: inbound.arp.source_hardware_addr,
        ethertype: EthernetProtocol::Arp,
    };

    let view = ethernet_frame::new_unchecked_mut(&mut frame[..]);
    ethernet.emit(view);
    reply.emit(arp_packet::new_unchecked_mut(view.payload_mut_slice()));
    frame
}

#[cfg(test)]
mod test {
    use super::*;

    const OURS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
    const THEIRS: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);
    const OUR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const THEIR_IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

    #[test]
    fn request_and_answer() {
        let packet = request(THEIRS, THEIR_IP, OUR_IP).unwrap();
        assert_eq!(packet.len(), 42);

        let inbound = Inbound::parse(&packet).unwrap();
        assert_eq!(inbound.ethernet.dst_addr, EthernetAddress::BROADCAST);
        assert!(inbound.asks_for(OUR_IP));
        assert!(!inbound.asks_for(THEIR_IP));

        let reply = answer(packet, &inbound, OURS);
        let parsed = Inbound::parse(&reply).unwrap();
        assert_eq!(parsed.ethernet.src_addr, OURS);
        assert_eq!(parsed.ethernet.dst_addr, THEIRS);
        assert_eq!(parsed.arp, ArpRepr {
            operation: ArpOperation::Reply,
            source_hardware_addr: OURS,
            source_protocol_addr: OUR_IP,
            target_hardware_addr: THEIRS,
            target_protocol_addr: THEIR_IP,
        });
    }

    #[test]
    fn truncated() {
        let packet = request(THEIRS, THEIR_IP, OUR_IP).unwrap();
        assert!(Inbound::parse(&packet[..30]).is_err());
    }
}
