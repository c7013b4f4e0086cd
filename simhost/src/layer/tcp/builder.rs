//! Serialization of session intent into frames.
//!
//! [`build`] turns what a session control block wants to send into complete Ethernet frames,
//! already split to the session's MTU. [`reply`] writes the answer of the responder to an inbound
//! segment, which reuses a few fields of the inbound datagram instead of the session's own.
//!
//! Outgoing data is either the session's payload or, when there is none, a deterministic filler
//! so that probes of a given length can be recognized on the wire.
//!
//! [`build`]: fn.build.html
//! [`reply`]: fn.reply.html
use crate::layer::ip::{self, AddressFamily, Datagram, IpHeader};
use crate::layer::{Error, Result};
use crate::nic::Packet;
use crate::time::Tick;
use crate::wire::{ethernet_frame, icmpv4_packet, tcp_segment, udp_packet};
use crate::wire::{Checksum, EthernetProtocol, EthernetRepr, IpProtocol, Icmpv4Repr};
use crate::wire::{TcpChecksum, TcpFlags, TcpRepr, UdpChecksum, UdpRepr};
use crate::wire::{ETHERNET_HEADER_LEN, ICMPV4_HEADER_LEN, UDP_HEADER_LEN};

use super::session::Scb;

/// The maximum segment size announced in a SYN.
pub const ANNOUNCED_MSS: u16 = 1460;

/// The window scale announced in a SYN.
pub const ANNOUNCED_WINDOW_SCALE: u8 = 1;

enum Transport {
    Icmp(Icmpv4Repr),
    Udp(UdpRepr),
    Tcp(TcpRepr),
}

/// Build the frames for the next transmission of a session.
///
/// The datagram takes the session's IP identifier, which is then advanced. The result holds more
/// than one frame only when the datagram exceeds the session's MTU.
pub fn build(scb: &mut Scb, now: Tick) -> Result<Vec<Packet>> {
    let family = ip::family(&scb.local).ok_or(Error::Illegal)?;
    let data_len = match scb.protocol {
        IpProtocol::Tcp if scb.flags != TcpFlags::ACK | TcpFlags::PSH => 0,
        _ => scb.segment_len(),
    };

    let transport = match scb.protocol {
        IpProtocol::Icmp if family.ethertype() == EthernetProtocol::Ipv4 => {
            Transport::Icmp(Icmpv4Repr::EchoRequest {
                ident: scb.local_port,
                seq_no: scb.echo_seq,
            })
        },
        IpProtocol::Udp => Transport::Udp(UdpRepr {
            src_port: scb.local_port,
            dst_port: scb.remote_port,
            // Checked against the maximum below, before anything is emitted.
            length: (UDP_HEADER_LEN + data_len) as u16,
        }),
        IpProtocol::Tcp => Transport::Tcp(segment_repr(scb, now, data_len)),
        other => {
            net_debug!("builder: can not send {} over {}", other, family.ethertype());
            return Err(Error::Illegal);
        },
    };

    let header_len = match &transport {
        Transport::Icmp(_) => ICMPV4_HEADER_LEN,
        Transport::Udp(_) => UDP_HEADER_LEN,
        Transport::Tcp(repr) => repr.header_len(),
    };
    if header_len + data_len > usize::from(u16::max_value()) {
        return Err(crate::wire::Error::Malformed.into());
    }

    let ident = scb.ident;
    scb.ident = scb.ident.wrapping_add(1);

    let header = IpHeader {
        src_addr: scb.local,
        dst_addr: scb.remote,
        protocol: scb.protocol,
        payload_len: header_len + data_len,
        hop_limit: scb.ttl,
        ident,
        dont_frag: !scb.fragment,
    };
    let link = EthernetRepr {
        src_addr: scb.local_hw,
        dst_addr: scb.remote_hw,
        ethertype: family.ethertype(),
    };

    let mut packet = frame(family, link, &header)?;
    {
        let buffer = &mut packet[ETHERNET_HEADER_LEN + family.header_len()..];
        fill_data(scb, &mut buffer[header_len..]);

        match transport {
            Transport::Icmp(repr) => {
                repr.emit(icmpv4_packet::new_unchecked_mut(buffer), Checksum::Manual);
            },
            Transport::Udp(repr) => {
                let checksum = UdpChecksum::for_pseudo_header(scb.local, scb.remote);
                repr.emit(udp_packet::new_unchecked_mut(buffer), checksum);
            },
            Transport::Tcp(repr) => {
                let checksum = TcpChecksum::for_pseudo_header(scb.local, scb.remote);
                repr.emit(tcp_segment::new_unchecked_mut(buffer), checksum);
            },
        }
    }

    Ok(ip::fragment(packet, scb.mtu)?)
}

/// Write the responder's answer to an inbound TCP segment.
///
/// Sequence, acknowledgment, flags and window come from the session, which the state machine
/// has already advanced. The network header copies identification and don't-fragment flag of the
/// inbound datagram and the TCP header carries no options.
pub fn reply(inbound: &Datagram, scb: &Scb, data: &[u8]) -> Result<Packet> {
    let family = ip::family(&inbound.dst_addr).ok_or(Error::Illegal)?;
    let repr = TcpRepr {
        src_port: scb.local_port,
        dst_port: scb.remote_port,
        flags: scb.flags,
        seq_number: scb.seq,
        ack_number: scb.ack,
        window_len: scb.window,
        max_seg_size: None,
        window_scale: None,
        timestamp: None,
        payload_len: data.len(),
    };
    let header = IpHeader {
        src_addr: inbound.dst_addr,
        dst_addr: inbound.src_addr,
        protocol: IpProtocol::Tcp,
        payload_len: repr.buffer_len(),
        hop_limit: scb.ttl,
        ident: inbound.ident,
        dont_frag: inbound.dont_frag,
    };
    let link = EthernetRepr {
        src_addr: scb.local_hw,
        dst_addr: inbound.ethernet.src_addr,
        ethertype: family.ethertype(),
    };

    let mut packet = frame(family, link, &header)?;
    let buffer = &mut packet[ETHERNET_HEADER_LEN + family.header_len()..];
    buffer[repr.header_len()..].copy_from_slice(data);
    let checksum = TcpChecksum::for_pseudo_header(header.src_addr, header.dst_addr);
    repr.emit(tcp_segment::new_unchecked_mut(buffer), checksum);
    Ok(packet)
}

fn segment_repr(scb: &Scb, now: Tick, payload_len: usize) -> TcpRepr {
    let syn = scb.flags.syn();
    TcpRepr {
        src_port: scb.local_port,
        dst_port: scb.remote_port,
        flags: scb.flags,
        seq_number: scb.seq,
        ack_number: scb.ack,
        window_len: scb.window,
        max_seg_size: if syn { Some(ANNOUNCED_MSS) } else { None },
        window_scale: if syn { Some(ANNOUNCED_WINDOW_SCALE) } else { None },
        // The tick counter wraps into the 32-bit field.
        timestamp: Some((now.0 as u32, 0)),
        payload_len,
    }
}

/// Allocate a frame and write link and network header.
fn frame(family: &dyn AddressFamily, link: EthernetRepr, header: &IpHeader) -> Result<Packet> {
    let mut packet = Packet::alloc(ETHERNET_HEADER_LEN + family.header_len() + header.payload_len)?;
    link.emit(ethernet_frame::new_unchecked_mut(&mut packet[..]));
    family.emit(header, &mut packet[ETHERNET_HEADER_LEN..])?;
    Ok(packet)
}

fn fill_data(scb: &Scb, data: &mut [u8]) {
    if let Some(payload) = &scb.payload {
        data.copy_from_slice(&payload[..data.len()]);
        return;
    }

    match scb.protocol {
        IpProtocol::Tcp => data.iter_mut()
            .enumerate()
            .for_each(|(i, byte)| *byte = if i % 2 == 0 { b'\r' } else { b'\n' }),
        IpProtocol::Udp => {
            counting_filler(data);
            let mac = scb.local_hw.as_bytes();
            let prefix = mac.len().min(data.len());
            data[..prefix].copy_from_slice(&mac[..prefix]);
        },
        _ => counting_filler(data),
    }
}

fn counting_filler(data: &mut [u8]) {
    data.iter_mut()
        .enumerate()
        .for_each(|(i, byte)| *byte = (i + 8) as u8);
}
