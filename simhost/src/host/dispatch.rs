use std::convert::TryFrom;

use crate::layer::{arp, icmp, udp, Error};
use crate::layer::ip::Datagram;
use crate::layer::tcp::{Answer, Responder};
use crate::nic::Packet;
use crate::wire::{ethernet_frame, icmpv4_packet, ipv4_packet, udp_packet};
use crate::wire::{Checksum, EthernetProtocol, EthernetRepr, IpAddress, IpProtocol};
use crate::wire::{Icmpv4DstUnreachable, Icmpv4Repr, UdpChecksum, UdpRepr, ETHERNET_HEADER_LEN};

use super::Host;

/// What became of an inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The frame was handed to the application through the inbound queue.
    Up,
    /// The frame was answered, or kept to be answered once its datagram is complete.
    Enqueued,
    /// The frame was not for this host, malformed or refused.
    Dropped,
}

impl Host {
    /// Handle one frame received from the segment.
    ///
    /// Replies are pushed to the outbound queue. Frames for the application, answers for the
    /// host's own outbound session among them, are pushed to the inbound queue.
    pub fn receive(&self, frame: Packet) -> Outcome {
        let parsed = ethernet_frame::new_checked(&frame[..]).and_then(EthernetRepr::parse);
        let ethernet = match parsed {
            Ok(repr) => repr,
            Err(err) => {
                net_trace!("host {}: dropping malformed frame: {}", self.context.host_id, err);
                return Outcome::Dropped;
            },
        };

        if ethernet.src_addr.is_multicast() {
            return Outcome::Dropped;
        }

        let hardware_addr = self.config.hardware_addr;
        if ethernet.dst_addr != hardware_addr && !ethernet.dst_addr.is_broadcast() {
            return Outcome::Dropped;
        }

        match ethernet.ethertype {
            EthernetProtocol::Arp => self.arp(frame),
            EthernetProtocol::Ipv4 => self.ipv4(frame),
            EthernetProtocol::Ipv6 => self.ipv6(frame),
            _ => Outcome::Dropped,
        }
    }

    fn arp(&self, frame: Packet) -> Outcome {
        let inbound = match arp::Inbound::parse(&frame) {
            Ok(inbound) => inbound,
            Err(_) => return Outcome::Dropped,
        };

        let now = self.context.ticks.now();
        let repr = inbound.arp;
        self.neighbors.update(repr.source_protocol_addr, repr.source_hardware_addr, now);

        if !inbound.asks_for(self.config.ipv4.address()) {
            return Outcome::Dropped;
        }

        net_trace!("host {}: answering arp request of {}",
            self.context.host_id, inbound.arp.source_protocol_addr);
        self.send(arp::answer(frame, &inbound, self.config.hardware_addr))
    }

    fn ipv4(&self, frame: Packet) -> Outcome {
        let frame = match self.admit(frame) {
            Ok(frame) => frame,
            Err(outcome) => return outcome,
        };

        let outcome = match Datagram::parse(&frame, Checksum::Manual) {
            Ok(datagram) => self.datagram(&frame, &datagram),
            Err(err) => {
                net_trace!("host {}: dropping ipv4 frame: {}", self.context.host_id, err);
                Outcome::Dropped
            },
        };
        self.surface(frame, outcome)
    }

    /// Only TCP is spoken over IPv6.
    fn ipv6(&self, frame: Packet) -> Outcome {
        let own = match self.config.ipv6 {
            Some(cidr) => IpAddress::Ipv6(cidr.address()),
            None => return Outcome::Dropped,
        };

        let outcome = match Datagram::parse(&frame, Checksum::Manual) {
            Ok(datagram) if datagram.dst_addr == own && datagram.protocol == IpProtocol::Tcp => {
                self.tcp(&datagram)
            },
            _ => Outcome::Dropped,
        };
        self.surface(frame, outcome)
    }

    /// Refuse oversized datagrams and put fragments back together.
    ///
    /// Returns the frame to process, or the outcome when there is nothing left to do yet.
    fn admit(&self, frame: Packet) -> Result<Packet, Outcome> {
        let header = ipv4_packet::new_checked(&frame[ETHERNET_HEADER_LEN..]);
        let (for_us, total_len, is_fragment) = match header {
            Ok(ip) => {
                let for_us = ip.dst_addr() == self.config.ipv4.address();
                (for_us, usize::from(ip.total_len()), ip.is_fragment())
            },
            Err(_) => return Err(Outcome::Dropped),
        };

        if !for_us {
            return Ok(frame);
        }

        if total_len > self.config.mtu {
            net_debug!("host {}: datagram of {} bytes exceeds the mtu",
                self.context.host_id, total_len);
            return Err(self.unreachable(&frame, Icmpv4DstUnreachable::FragRequired));
        }

        if !is_fragment {
            return Ok(frame);
        }

        let now = self.context.ticks.now();
        match self.lock_reassembly().push(&frame, now) {
            Ok(Some(datagram)) => Ok(datagram),
            Ok(None) => Err(Outcome::Enqueued),
            Err(err) => Err(self.failed(err)),
        }
    }

    fn datagram(&self, frame: &Packet, datagram: &Datagram) -> Outcome {
        if datagram.protocol == IpProtocol::Udp {
            return self.udp(frame, datagram);
        }

        if datagram.dst_addr != IpAddress::Ipv4(self.config.ipv4.address()) {
            return Outcome::Dropped;
        }

        match datagram.protocol {
            IpProtocol::Icmp => self.icmp(frame, datagram),
            IpProtocol::Tcp => self.tcp(datagram),
            _ => Outcome::Dropped,
        }
    }

    /// Echo requests are answered, everything else is for the application.
    fn icmp(&self, frame: &Packet, datagram: &Datagram) -> Outcome {
        let repr = icmpv4_packet::new_checked(datagram.payload)
            .and_then(|packet| Icmpv4Repr::parse(packet, Checksum::Manual));
        match repr {
            Ok(Icmpv4Repr::EchoRequest { .. }) => {
                match icmp::echo_reply(frame.clone(), self.config.ttl) {
                    Ok(reply) => self.send(reply),
                    Err(err) => self.failed(err),
                }
            },
            Ok(_) => Outcome::Up,
            Err(err) => {
                net_trace!("host {}: dropping icmp from {}: {}",
                    self.context.host_id, datagram.src_addr, err);
                Outcome::Dropped
            },
        }
    }

    /// Every datagram for the host is echoed, except for the application's own traffic.
    fn udp(&self, frame: &Packet, datagram: &Datagram) -> Outcome {
        let packet = match udp_packet::new_checked(datagram.payload) {
            Ok(packet) => packet,
            Err(_) => return Outcome::Dropped,
        };
        let checksum = UdpChecksum::for_pseudo_header(datagram.src_addr, datagram.dst_addr);
        let repr = match UdpRepr::parse(packet, checksum) {
            Ok(repr) => repr,
            Err(_) => return Outcome::Dropped,
        };

        if datagram.dst_addr.is_multicast() {
            return Outcome::Dropped;
        }

        if repr.src_port == udp::DHCP_SERVER_PORT && repr.dst_port == udp::DHCP_CLIENT_PORT {
            return Outcome::Up;
        }

        if datagram.dst_addr != IpAddress::Ipv4(self.config.ipv4.address()) {
            return Outcome::Dropped;
        }

        if repr.src_port == udp::DNS_PORT {
            return Outcome::Up;
        }

        if udp::is_own_echo(packet.payload_slice(), self.config.hardware_addr) {
            return Outcome::Up;
        }

        if datagram.hop_limit == 1 {
            return self.unreachable(frame, Icmpv4DstUnreachable::PortUnreachable);
        }

        match udp::echo_reply(frame, self.config.ttl) {
            Ok(reply) => self.send(reply),
            Err(err) => self.failed(err),
        }
    }

    fn tcp(&self, datagram: &Datagram) -> Outcome {
        // Handlers run without the registry lock.
        let services = self.lock_services().clone();
        let mut sessions = self.lock_sessions();
        let mut responder = Responder {
            sessions: &mut *sessions,
            services: &services,
            own: &self.own,
            isn: &self.isn,
            settings: self.settings(),
        };

        match responder.process(datagram, self.context.ticks.now()) {
            Ok(Answer::Surface) => Outcome::Up,
            Ok(Answer::Replies(replies)) => {
                if replies.is_empty() {
                    return Outcome::Dropped;
                }
                for reply in replies {
                    self.outbound.push(reply);
                }
                Outcome::Enqueued
            },
            Err(err) => self.failed(err),
        }
    }

    fn unreachable(&self, frame: &[u8], reason: Icmpv4DstUnreachable) -> Outcome {
        let origin = icmp::Origin {
            hardware_addr: self.config.hardware_addr,
            protocol_addr: self.config.ipv4.address(),
            hop_limit: self.config.ttl,
            ident: self.next_ident(),
        };
        let mtu = u16::try_from(self.config.mtu).unwrap_or(u16::max_value());

        match icmp::unreachable(frame, reason, mtu, origin) {
            Ok(reply) => self.send(reply),
            Err(err) => self.failed(err),
        }
    }

    fn send(&self, packet: Packet) -> Outcome {
        self.outbound.push(packet);
        Outcome::Enqueued
    }

    fn surface(&self, frame: Packet, outcome: Outcome) -> Outcome {
        if outcome == Outcome::Up {
            self.inbound.push(frame);
        }
        outcome
    }

    fn failed(&self, err: Error) -> Outcome {
        match err {
            Error::Allocation(err) => {
                net_warn!("host {}: dropping frame: {}", self.context.host_id, err);
            },
            err => {
                net_debug!("host {}: dropping frame: {}", self.context.host_id, err);
            },
        }
        Outcome::Dropped
    }
}
