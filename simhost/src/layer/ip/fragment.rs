//! IPv4 fragmentation and reassembly.
//!
//! Outbound datagrams larger than the MTU are split into fragments whose payloads are multiples
//! of 8 bytes, as the offset field counts in such units. Inbound fragments are collected per
//! (source, destination, identification, protocol) until the datagram is complete.
use core::ops::Range;

use crate::layer::{Error, Result};
use crate::nic::{AllocError, Packet};
use crate::time::Tick;
use crate::wire::{ethernet_frame, ipv4_packet, EthernetProtocol, IpProtocol, Ipv4Address};
use crate::wire::ETHERNET_HEADER_LEN;

/// Split an IPv4 frame to fit the MTU.
///
/// Frames that fit, and anything that is not IPv4, are returned unchanged as the only element.
/// The don't-fragment flag is not consulted, the stack always fragments its own datagrams.
pub fn fragment(packet: Packet, mtu: usize) -> core::result::Result<Vec<Packet>, AllocError> {
    match split(&packet, mtu)? {
        Some(fragments) => Ok(fragments),
        None => Ok(vec![packet]),
    }
}

fn split(frame: &[u8], mtu: usize) -> core::result::Result<Option<Vec<Packet>>, AllocError> {
    let ethernet = match ethernet_frame::new_checked(frame) {
        Ok(ethernet) if ethernet.ethertype() == EthernetProtocol::Ipv4 => ethernet,
        _ => return Ok(None),
    };
    let ip = match ipv4_packet::new_checked(ethernet.payload_slice()) {
        Ok(ip) => ip,
        Err(_) => return Ok(None),
    };

    let total_len = usize::from(ip.total_len());
    let header_len = usize::from(ip.header_len());
    let chunk = mtu.saturating_sub(header_len) & !7;
    if total_len <= mtu || chunk == 0 {
        return Ok(None);
    }

    let headers = &frame[..ETHERNET_HEADER_LEN + header_len];
    let base_offset = usize::from(ip.frag_offset());
    let more_after = ip.more_frags();
    let payload = ip.payload_slice();

    let mut fragments = Vec::with_capacity((payload.len() + chunk - 1) / chunk);
    for (idx, piece) in payload.chunks(chunk).enumerate() {
        let offset = idx * chunk;
        let last = offset + piece.len() == payload.len();

        let mut out = Packet::alloc(headers.len() + piece.len())?;
        out[..headers.len()].copy_from_slice(headers);
        out[headers.len()..].copy_from_slice(piece);

        let view = ipv4_packet::new_unchecked_mut(&mut out[ETHERNET_HEADER_LEN..]);
        view.set_total_len((header_len + piece.len()) as u16);
        view.set_frag_offset((base_offset + offset) as u16);
        view.set_more_frags(!last || more_after);
        view.fill_checksum();
        fragments.push(out);
    }

    net_trace!("ipv4: split {} bytes into {} fragments", total_len, fragments.len());
    Ok(Some(fragments))
}

/// Collects the fragments of inbound IPv4 datagrams.
#[derive(Debug)]
pub struct Reassembly {
    pending: Vec<Pending>,
    timeout: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Key {
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    ident: u16,
    protocol: IpProtocol,
}

#[derive(Debug)]
struct Pending {
    key: Key,
    /// Link and network header of the first fragment, once seen.
    headers: Option<Vec<u8>>,
    data: Vec<u8>,
    /// Received byte ranges, sorted and disjoint.
    present: Vec<Range<usize>>,
    /// The payload length, known after the last fragment arrived.
    total: Option<usize>,
    updated: Tick,
}

impl Reassembly {
    /// The number of datagrams that can be reassembled concurrently.
    pub const CAPACITY: usize = 8;

    /// Create an empty buffer whose incomplete datagrams expire after `timeout` ticks.
    pub fn new(timeout: u64) -> Self {
        Reassembly {
            pending: Vec::with_capacity(Self::CAPACITY),
            timeout,
        }
    }

    /// The number of incomplete datagrams.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Add one fragment, returning the whole datagram when it is complete.
    ///
    /// A frame that is not a fragment is returned immediately. Fails with `Exhausted` when the
    /// fragment would start a new datagram while all slots are taken.
    pub fn push(&mut self, frame: &[u8], now: Tick) -> Result<Option<Packet>> {
        let timeout = self.timeout;
        self.pending.retain(|pending| !now.is_expired(pending.updated, timeout));

        let ethernet = ethernet_frame::new_checked(frame)?;
        let ip = ipv4_packet::new_checked(ethernet.payload_slice())?;
        if !ip.is_fragment() {
            return Ok(Some(Packet::copy_from(frame)?));
        }

        let key = Key {
            src_addr: ip.src_addr(),
            dst_addr: ip.dst_addr(),
            ident: ip.ident(),
            protocol: ip.protocol(),
        };
        let header_len = usize::from(ip.header_len());
        let offset = usize::from(ip.frag_offset());
        let payload = ip.payload_slice();
        let end = offset + payload.len();
        if header_len + end > usize::from(u16::max_value()) {
            return Err(Error::Wire(crate::wire::Error::Malformed));
        }

        let idx = match self.pending.iter().position(|pending| pending.key == key) {
            Some(idx) => idx,
            None if self.pending.len() < Self::CAPACITY => {
                self.pending.push(Pending::new(key, now));
                self.pending.len() - 1
            },
            None => {
                net_debug!("ipv4: reassembly slots exhausted, dropping fragment id {}", key.ident);
                return Err(Error::Exhausted);
            },
        };

        let pending = &mut self.pending[idx];
        pending.updated = now;
        if pending.data.len() < end {
            pending.data.resize(end, 0);
        }
        pending.data[offset..end].copy_from_slice(payload);
        pending.insert(offset..end);
        if !ip.more_frags() {
            pending.total = Some(end);
        }
        if offset == 0 {
            pending.headers = Some(frame[..ETHERNET_HEADER_LEN + header_len].to_vec());
        }

        if !pending.is_complete() {
            return Ok(None);
        }

        let pending = self.pending.swap_remove(idx);
        pending.finish().map(Some)
    }
}

impl Pending {
    fn new(key: Key, now: Tick) -> Self {
        Pending {
            key,
            headers: None,
            data: Vec::new(),
            present: Vec::new(),
            total: None,
            updated: now,
        }
    }

    fn insert(&mut self, range: Range<usize>) {
        if range.start == range.end {
            return;
        }
        self.present.push(range);
        self.present.sort_by_key(|range| range.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.present.len());
        for range in self.present.drain(..) {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        self.present = merged;
    }

    fn is_complete(&self) -> bool {
        match (self.total, &self.headers) {
            (Some(total), Some(_)) => self.present.len() == 1 && self.present[0] == (0..total),
            _ => false,
        }
    }

    fn finish(self) -> Result<Packet> {
        let headers = self.headers.ok_or(Error::Illegal)?;
        let total = self.total.ok_or(Error::Illegal)?;

        let mut packet = Packet::alloc(headers.len() + total)?;
        packet[..headers.len()].copy_from_slice(&headers);
        packet[headers.len()..].copy_from_slice(&self.data[..total]);

        let header_len = headers.len() - ETHERNET_HEADER_LEN;
        let view = ipv4_packet::new_unchecked_mut(&mut packet[ETHERNET_HEADER_LEN..]);
        view.set_total_len((header_len + total) as u16);
        view.set_more_frags(false);
        view.set_frag_offset(0);
        view.fill_checksum();
        Ok(packet)
    }
}

#[cfg(test)]
mod test {
    use crate::wire::{Checksum, EthernetAddress, EthernetRepr, Ipv4Repr};
    use crate::wire::ipv4_packet;
    use super::*;

    fn datagram(payload_len: usize) -> Packet {
        let mut packet = Packet::alloc(14 + 20 + payload_len).unwrap();
        EthernetRepr {
            src_addr: EthernetAddress([0x02, 0, 0, 0, 0, 1]),
            dst_addr: EthernetAddress([0x02, 0, 0, 0, 0, 2]),
            ethertype: EthernetProtocol::Ipv4,
        }.emit(ethernet_frame::new_unchecked_mut(&mut packet));
        for (i, byte) in packet[34..].iter_mut().enumerate() {
            *byte = i as u8;
        }
        Ipv4Repr {
            src_addr: Ipv4Address::new(10, 0, 0, 1),
            dst_addr: Ipv4Address::new(10, 0, 0, 2),
            protocol: IpProtocol::Udp,
            payload_len,
            hop_limit: 64,
            ident: 42,
            dont_frag: false,
            more_frags: false,
            frag_offset: 0,
        }.emit(ipv4_packet::new_unchecked_mut(&mut packet[14..]), Checksum::Manual);
        packet
    }

    #[test]
    fn small_datagram_untouched() {
        let packet = datagram(100);
        let out = fragment(packet.clone(), 1500).unwrap();
        assert_eq!(out, vec![packet]);
    }

    #[test]
    fn split_at_mtu() {
        let out = fragment(datagram(3000), 1500).unwrap();
        assert_eq!(out.len(), 3);

        let views: Vec<_> = out.iter()
            .map(|frame| ipv4_packet::new_checked(&frame[14..]).unwrap())
            .collect();
        assert_eq!(views[0].total_len(), 1500);
        assert_eq!(views[0].frag_offset(), 0);
        assert!(views[0].more_frags());
        assert_eq!(views[1].frag_offset(), 1480);
        assert!(views[1].more_frags());
        assert_eq!(views[2].frag_offset(), 2960);
        assert!(!views[2].more_frags());
        assert_eq!(views[2].payload_slice().len(), 40);
        assert!(views.iter().all(|view| view.verify_checksum()));
        assert!(views.iter().all(|view| view.ident() == 42));
    }

    #[test]
    fn reassemble_out_of_order() {
        let original = datagram(3000);
        let mut fragments = fragment(original.clone(), 1500).unwrap();
        fragments.reverse();

        let mut reassembly = Reassembly::new(120);
        assert_eq!(reassembly.push(&fragments[0], Tick(0)).unwrap(), None);
        assert_eq!(reassembly.push(&fragments[1], Tick(0)).unwrap(), None);
        assert_eq!(reassembly.pending(), 1);
        let whole = reassembly.push(&fragments[2], Tick(1)).unwrap().unwrap();
        assert_eq!(whole, original);
        assert_eq!(reassembly.pending(), 0);
    }

    #[test]
    fn incomplete_expires() {
        let fragments = fragment(datagram(3000), 1500).unwrap();
        let mut reassembly = Reassembly::new(120);
        assert_eq!(reassembly.push(&fragments[0], Tick(0)).unwrap(), None);
        assert_eq!(reassembly.pending(), 1);

        // The first fragment is gone, the late ones do not complete anything.
        assert_eq!(reassembly.push(&fragments[1], Tick(200)).unwrap(), None);
        assert_eq!(reassembly.push(&fragments[2], Tick(200)).unwrap(), None);
        assert_eq!(reassembly.pending(), 1);
    }

    #[test]
    fn bounded_slots() {
        let mut reassembly = Reassembly::new(120);
        for ident in 0..Reassembly::CAPACITY as u16 {
            let mut packet = datagram(3000);
            ipv4_packet::new_unchecked_mut(&mut packet[14..]).set_ident(ident);
            let first = fragment(packet, 1500).unwrap().remove(0);
            assert_eq!(reassembly.push(&first, Tick(0)).unwrap(), None);
        }

        let mut packet = datagram(3000);
        ipv4_packet::new_unchecked_mut(&mut packet[14..]).set_ident(999);
        let first = fragment(packet, 1500).unwrap().remove(0);
        assert_eq!(reassembly.push(&first, Tick(0)), Err(Error::Exhausted));
    }
}
