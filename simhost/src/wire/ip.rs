use core::fmt;

use super::{Ipv4Address, Ipv6Address};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        /// Internet control message protocol.
        Icmp      = 0x01,
        /// Transmission control protocol.
        Tcp       = 0x06,
        /// User datagram protocol.
        Udp       = 0x11,
        /// Internet control message protocol for IPv6.
        Icmpv6    = 0x3a,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Protocol::Icmp => "ICMP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmpv6 => "ICMPv6",
            Protocol::Unknown(id) => return write!(f, "proto 0x{:02x}", id),
        };
        f.write_str(name)
    }
}

/// The address of either IP family.
///
/// `Unspecified` is the value of fields that were not filled in yet, e.g. in a default session.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Address {
    Unspecified,
    Ipv4(Ipv4Address),
    Ipv6(Ipv6Address),
}

impl Address {
    /// Shorthand for an IPv4 address from its four octets.
    pub const fn v4(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address::Ipv4(Ipv4Address::new(a0, a1, a2, a3))
    }

    /// The octets in network order, empty when unspecified.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Ipv4(addr) => addr.as_bytes(),
            Address::Ipv6(addr) => addr.as_bytes(),
            Address::Unspecified => &[],
        }
    }

    pub fn is_multicast(&self) -> bool {
        match self {
            Address::Ipv4(addr) => addr.is_multicast(),
            Address::Ipv6(addr) => addr.is_multicast(),
            Address::Unspecified => false,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            Address::Ipv4(addr) => addr.is_unspecified(),
            Address::Ipv6(addr) => addr.is_unspecified(),
            Address::Unspecified => true,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::Unspecified
    }
}

impl From<Ipv4Address> for Address {
    fn from(addr: Ipv4Address) -> Self {
        Address::Ipv4(addr)
    }
}

impl From<Ipv6Address> for Address {
    fn from(addr: Ipv6Address) -> Self {
        Address::Ipv6(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Ipv4(addr) => fmt::Display::fmt(addr, f),
            Address::Ipv6(addr) => fmt::Display::fmt(addr, f),
            Address::Unspecified => f.write_str("*"),
        }
    }
}

/// The one's-complement checksum of RFC 1071 and its incremental update.
///
/// Partial sums are kept without the final complement so they can be combined. Only the value
/// written into a header is complemented, see [`transport`] and [`fixup`].
///
/// [`transport`]: fn.transport.html
/// [`fixup`]: fn.fixup.html
pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::*;

    /// Fold a 32-bit accumulator into 16 bits with end-around carry.
    fn fold(mut sum: u32) -> u16 {
        while sum > 0xffff {
            sum = (sum >> 16) + (sum & 0xffff);
        }
        sum as u16
    }

    /// The uncomplemented sum over `data`, an odd last byte padded with zero.
    pub fn data(data: &[u8]) -> u16 {
        let words = data.chunks_exact(2);
        let odd = match words.remainder() {
            [last] => u32::from(*last) << 8,
            _ => 0,
        };
        let sum = words
            .map(|pair| u32::from(NetworkEndian::read_u16(pair)))
            .fold(odd, |acc, word| {
                let acc = acc + word;
                if acc > 0xffff_0000 { u32::from(fold(acc)) } else { acc }
            });
        fold(sum)
    }

    /// Add partial sums.
    pub fn combine(sums: &[u16]) -> u16 {
        fold(sums.iter().map(|&sum| u32::from(sum)).sum())
    }

    /// The sum over the pseudo header of a transport protocol.
    ///
    /// Two IPv4 addresses use the 12-byte layout of RFC 793, anything else the 40-byte layout of
    /// RFC 8200 with a 32-bit length.
    pub fn pseudo_header(src_addr: &Address, dst_addr: &Address,
                         protocol: Protocol, length: u32) -> u16 {
        let mut tail = [0u8; 8];
        let tail: &[u8] = match (src_addr, dst_addr) {
            (Address::Ipv4(_), Address::Ipv4(_)) => {
                tail[1] = protocol.into();
                NetworkEndian::write_u16(&mut tail[2..4], length as u16);
                &tail[..4]
            },
            _ => {
                NetworkEndian::write_u32(&mut tail[..4], length);
                tail[7] = protocol.into();
                &tail[..]
            },
        };

        combine(&[data(src_addr.as_bytes()), data(dst_addr.as_bytes()), data(tail)])
    }

    fn segment_sum(src_addr: &Address, dst_addr: &Address, protocol: Protocol, segment: &[u8])
        -> u16
    {
        let pseudo = pseudo_header(src_addr, dst_addr, protocol, segment.len() as u32);
        combine(&[pseudo, data(segment)])
    }

    /// The checksum to write into a transport header.
    ///
    /// `segment` is the complete transport header and payload with its checksum field zeroed.
    pub fn transport(src_addr: &Address, dst_addr: &Address, protocol: Protocol, segment: &[u8])
        -> u16
    {
        !segment_sum(src_addr, dst_addr, protocol, segment)
    }

    /// Whether the checksum contained in `segment` is correct.
    pub fn verify_transport(
        src_addr: &Address,
        dst_addr: &Address,
        protocol: Protocol,
        segment: &[u8],
    ) -> bool {
        segment_sum(src_addr, dst_addr, protocol, segment) == !0
    }

    /// Update a complemented checksum after one 16-bit word changed from `old` to `new`.
    ///
    /// This is equation 3 of RFC 1624, `HC' = ~(~HC + ~m + m')`. The result equals a full
    /// recomputation except when every covered word is zero afterwards, where `0x0000` and
    /// `0xffff` both denote zero.
    pub fn fixup(checksum: u16, old: u16, new: u16) -> u16 {
        !combine(&[!checksum, !old, new])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use super::checksum::*;
    use proptest::prelude::*;

    #[test]
    fn rfc1071_example() {
        // Example sum from section 3 of RFC 1071.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(data(&bytes), 0xddf2);
        assert_eq!(combine(&[data(&bytes[..4]), data(&bytes[4..])]), 0xddf2);
    }

    #[test]
    fn odd_trailing_byte() {
        assert_eq!(data(&[0x12]), 0x1200);
        assert_eq!(data(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
    }

    #[test]
    fn pseudo_header_v4() {
        let src = Address::v4(10, 0, 0, 1);
        let dst = Address::v4(10, 0, 0, 2);
        let expected = data(&[10, 0, 0, 1, 10, 0, 0, 2, 0, 6, 0, 20]);
        assert_eq!(pseudo_header(&src, &dst, Protocol::Tcp, 20), expected);
    }

    #[test]
    fn transport_verifies() {
        let src = Address::v4(192, 168, 1, 1);
        let dst = Address::v4(192, 168, 1, 2);
        let mut segment = vec![0x12, 0x34, 0x00, 0x35, 0x00, 0x0b, 0x00, 0x00, 0xde, 0xad, 0xbe];
        let sum = transport(&src, &dst, Protocol::Udp, &segment);
        segment[6..8].copy_from_slice(&sum.to_be_bytes());
        assert!(verify_transport(&src, &dst, Protocol::Udp, &segment));
        segment[9] ^= 1;
        assert!(!verify_transport(&src, &dst, Protocol::Udp, &segment));
    }

    proptest! {
        #[test]
        fn fixup_matches_recomputation(
            mut words in proptest::collection::vec(any::<u16>(), 2..64),
            index in any::<prop::sample::Index>(),
            new in any::<u16>(),
        ) {
            let at = index.index(words.len());
            let bytes = |words: &[u16]| -> Vec<u8> {
                words.iter().flat_map(|w| w.to_be_bytes().to_vec()).collect()
            };

            let before = !data(&bytes(&words));
            let old = words[at];
            words[at] = new;
            let after = bytes(&words);
            prop_assume!(after.iter().any(|&b| b != 0));

            prop_assert_eq!(fixup(before, old, new), !data(&after));
        }
    }
}
