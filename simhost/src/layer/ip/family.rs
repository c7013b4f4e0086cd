use crate::wire::{ipv4_packet, ipv6_packet, Checksum, EthernetProtocol, EthernetRepr};
use crate::wire::{IpAddress, IpProtocol, Ipv4Repr, Ipv6Repr};
use crate::wire::{Error, Result, IPV4_HEADER_LEN, IPV6_HEADER_LEN};

use super::Datagram;

/// The header fields of an outbound datagram, independent of the IP version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpHeader {
    pub src_addr: IpAddress,
    pub dst_addr: IpAddress,
    pub protocol: IpProtocol,
    pub payload_len: usize,
    pub hop_limit: u8,
    /// Ignored by IPv6.
    pub ident: u16,
    /// Ignored by IPv6.
    pub dont_frag: bool,
}

/// The version specific half of building and parsing datagrams.
///
/// A session picks its family once, from its addresses, and uses it for every packet.
pub trait AddressFamily: Sync {
    /// The ethertype of frames carrying this family.
    fn ethertype(&self) -> EthernetProtocol;

    /// The length of the network header this family emits.
    fn header_len(&self) -> usize;

    /// Write the network header to the start of `buffer`.
    ///
    /// The buffer spans the header and the complete payload.
    fn emit(&self, header: &IpHeader, buffer: &mut [u8]) -> Result<()>;

    /// Parse the network header of a frame whose link header has been parsed as `ethernet`.
    fn parse<'a>(&self, ethernet: EthernetRepr, buffer: &'a [u8], checksum: Checksum)
        -> Result<Datagram<'a>>;
}

/// IPv4 without options.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ipv4Family;

/// IPv6 without extension headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ipv6Family;

pub(crate) static IPV4: Ipv4Family = Ipv4Family;
pub(crate) static IPV6: Ipv6Family = Ipv6Family;

/// Select the family handling an address.
///
/// The unspecified address has no family.
pub fn family(addr: &IpAddress) -> Option<&'static dyn AddressFamily> {
    match addr {
        IpAddress::Ipv4(_) => Some(&IPV4),
        IpAddress::Ipv6(_) => Some(&IPV6),
        IpAddress::Unspecified => None,
    }
}

impl AddressFamily for Ipv4Family {
    fn ethertype(&self) -> EthernetProtocol {
        EthernetProtocol::Ipv4
    }

    fn header_len(&self) -> usize {
        IPV4_HEADER_LEN
    }

    fn emit(&self, header: &IpHeader, buffer: &mut [u8]) -> Result<()> {
        let (src_addr, dst_addr) = match (header.src_addr, header.dst_addr) {
            (IpAddress::Ipv4(src), IpAddress::Ipv4(dst)) => (src, dst),
            _ => return Err(Error::Unsupported),
        };
        let total_len = IPV4_HEADER_LEN + header.payload_len;
        if total_len > usize::from(u16::max_value()) {
            return Err(Error::Malformed);
        }
        let buffer = buffer.get_mut(..total_len).ok_or(Error::Truncated)?;

        let repr = Ipv4Repr {
            src_addr,
            dst_addr,
            protocol: header.protocol,
            payload_len: header.payload_len,
            hop_limit: header.hop_limit,
            ident: header.ident,
            dont_frag: header.dont_frag,
            more_frags: false,
            frag_offset: 0,
        };
        repr.emit(ipv4_packet::new_unchecked_mut(buffer), Checksum::Manual);
        Ok(())
    }

    fn parse<'a>(&self, ethernet: EthernetRepr, buffer: &'a [u8], checksum: Checksum)
        -> Result<Datagram<'a>>
    {
        let packet = ipv4_packet::new_checked(buffer)?;
        let repr = Ipv4Repr::parse(packet, checksum)?;
        Ok(Datagram {
            ethernet,
            src_addr: repr.src_addr.into(),
            dst_addr: repr.dst_addr.into(),
            protocol: repr.protocol,
            hop_limit: repr.hop_limit,
            ident: repr.ident,
            dont_frag: repr.dont_frag,
            is_fragment: packet.is_fragment(),
            header_len: usize::from(packet.header_len()),
            total_len: usize::from(packet.total_len()),
            payload: packet.payload_slice(),
        })
    }
}

impl AddressFamily for Ipv6Family {
    fn ethertype(&self) -> EthernetProtocol {
        EthernetProtocol::Ipv6
    }

    fn header_len(&self) -> usize {
        IPV6_HEADER_LEN
    }

    fn emit(&self, header: &IpHeader, buffer: &mut [u8]) -> Result<()> {
        let (src_addr, dst_addr) = match (header.src_addr, header.dst_addr) {
            (IpAddress::Ipv6(src), IpAddress::Ipv6(dst)) => (src, dst),
            _ => return Err(Error::Unsupported),
        };
        if header.payload_len > usize::from(u16::max_value()) {
            return Err(Error::Malformed);
        }
        let buffer = buffer.get_mut(..IPV6_HEADER_LEN + header.payload_len)
            .ok_or(Error::Truncated)?;

        let repr = Ipv6Repr {
            src_addr,
            dst_addr,
            next_header: header.protocol,
            payload_len: header.payload_len,
            hop_limit: header.hop_limit,
        };
        repr.emit(ipv6_packet::new_unchecked_mut(buffer));
        Ok(())
    }

    fn parse<'a>(&self, ethernet: EthernetRepr, buffer: &'a [u8], _: Checksum)
        -> Result<Datagram<'a>>
    {
        let packet = ipv6_packet::new_checked(buffer)?;
        let repr = Ipv6Repr::parse(packet)?;
        Ok(Datagram {
            ethernet,
            src_addr: repr.src_addr.into(),
            dst_addr: repr.dst_addr.into(),
            protocol: repr.next_header,
            hop_limit: repr.hop_limit,
            ident: 0,
            dont_frag: true,
            is_fragment: false,
            header_len: IPV6_HEADER_LEN,
            total_len: IPV6_HEADER_LEN + repr.payload_len,
            payload: packet.payload_slice(),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::wire::{EthernetAddress, Ipv4Address, Ipv6Address};
    use super::*;

    fn ethernet(ethertype: EthernetProtocol) -> EthernetRepr {
        EthernetRepr {
            src_addr: EthernetAddress([0x02, 0, 0, 0, 0, 1]),
            dst_addr: EthernetAddress([0x02, 0, 0, 0, 0, 2]),
            ethertype,
        }
    }

    #[test]
    fn selects_by_address() {
        let v4 = IpAddress::v4(10, 0, 0, 1);
        let v6 = IpAddress::Ipv6(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1));
        assert_eq!(family(&v4).map(|f| f.header_len()), Some(20));
        assert_eq!(family(&v6).map(|f| f.header_len()), Some(40));
        assert!(family(&IpAddress::Unspecified).is_none());
    }

    #[test]
    fn v4_emit_parse() {
        let header = IpHeader {
            src_addr: IpAddress::v4(10, 0, 0, 1),
            dst_addr: IpAddress::v4(10, 0, 0, 2),
            protocol: IpProtocol::Udp,
            payload_len: 4,
            hop_limit: 64,
            ident: 0x1234,
            dont_frag: true,
        };
        let mut buffer = vec![0; 24];
        IPV4.emit(&header, &mut buffer).unwrap();
        buffer[20..].copy_from_slice(b"ping");

        let parsed = IPV4.parse(ethernet(EthernetProtocol::Ipv4), &buffer, Checksum::Manual)
            .unwrap();
        assert_eq!(parsed.src_addr, header.src_addr);
        assert_eq!(parsed.ident, 0x1234);
        assert!(parsed.dont_frag);
        assert!(!parsed.is_fragment);
        assert_eq!(parsed.total_len, 24);
        assert_eq!(parsed.payload, b"ping");
    }

    #[test]
    fn v4_rejects_mixed_family() {
        let header = IpHeader {
            src_addr: IpAddress::Ipv4(Ipv4Address::new(10, 0, 0, 1)),
            dst_addr: IpAddress::Ipv6(Ipv6Address::UNSPECIFIED),
            protocol: IpProtocol::Tcp,
            payload_len: 0,
            hop_limit: 64,
            ident: 0,
            dont_frag: false,
        };
        let mut buffer = vec![0; 40];
        assert_eq!(IPV4.emit(&header, &mut buffer), Err(Error::Unsupported));
        assert_eq!(IPV6.emit(&header, &mut buffer), Err(Error::Unsupported));
    }

    #[test]
    fn v6_emit_parse() {
        let header = IpHeader {
            src_addr: Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).into(),
            dst_addr: Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2).into(),
            protocol: IpProtocol::Tcp,
            payload_len: 2,
            hop_limit: 64,
            ident: 7,
            dont_frag: false,
        };
        let mut buffer = vec![0; 42];
        IPV6.emit(&header, &mut buffer).unwrap();
        let parsed = IPV6.parse(ethernet(EthernetProtocol::Ipv6), &buffer, Checksum::Manual)
            .unwrap();
        assert_eq!(parsed.dst_addr, header.dst_addr);
        assert_eq!(parsed.protocol, IpProtocol::Tcp);
        assert_eq!(parsed.ident, 0);
        assert_eq!(parsed.payload.len(), 2);
    }
}
