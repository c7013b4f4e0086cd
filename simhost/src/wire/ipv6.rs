use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::ip::Protocol;

/// The fixed header, extension headers are not supported.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 16]);

impl Address {
    pub const UNSPECIFIED: Address = Address([0; 16]);

    /// An address from its eight groups, as written in the usual notation.
    pub fn new(a0: u16, a1: u16, a2: u16, a3: u16,
               a4: u16, a5: u16, a6: u16, a7: u16) -> Address {
        let groups = [a0, a1, a2, a3, a4, a5, a6, a7];
        let mut octets = [0; 16];
        NetworkEndian::write_u16_into(&groups, &mut octets);
        Address(octets)
    }

    /// Panics unless `data` holds exactly sixteen octets.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut octets = [0; 16];
        octets.copy_from_slice(data);
        Address(octets)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn to_bits(self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Address::UNSPECIFIED
    }
}

impl From<std::net::Ipv6Addr> for Address {
    fn from(addr: std::net::Ipv6Addr) -> Address {
        Address(addr.octets())
    }
}

impl From<Address> for std::net::Ipv6Addr {
    fn from(addr: Address) -> std::net::Ipv6Addr {
        addr.0.into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&std::net::Ipv6Addr::from(*self), f)
    }
}

/// An interface address and the length of its on-link prefix.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Cidr {
    address:    Address,
    prefix_len: u8,
}

impl Cidr {
    /// Prefix lengths beyond 128 are treated as 128.
    pub fn new(address: Address, prefix_len: u8) -> Cidr {
        Cidr { address, prefix_len: prefix_len.min(128) }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn contains(&self, address: Address) -> bool {
        let mask = (!0u128).checked_shl(128 - u32::from(self.prefix_len)).unwrap_or(0);
        (self.address.to_bits() ^ address.to_bits()) & mask == 0
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

byte_wrapper! {
    /// An IPv6 packet, the fixed header and its payload.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv6([u8]);
}

mod field {
    use crate::wire::field::Field;

    /// Version, traffic class and flow label.
    pub(crate) const VER_TC_FLOW: Field =  0..4;
    pub(crate) const LENGTH:      Field =  4..6;
    pub(crate) const NXT_HDR:     usize =  6;
    pub(crate) const HOP_LIMIT:   usize =  7;
    pub(crate) const SRC_ADDR:    Field =  8..24;
    pub(crate) const DST_ADDR:    Field = 24..40;
}

impl ipv6 {
    pub fn new_unchecked(buffer: &[u8]) -> &ipv6 {
        Self::__from_macro_new_unchecked(buffer)
    }

    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv6 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    pub fn new_checked(data: &[u8]) -> Result<&ipv6> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// The buffer holds the fixed header and as much payload as the length field announces.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        match self.payload_range() {
            range if range.end > self.0.len() => Err(Error::Truncated),
            _ => Ok(()),
        }
    }

    pub fn version(&self) -> u8 {
        self.0[field::VER_TC_FLOW.start] >> 4
    }

    pub fn payload_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    pub fn next_header(&self) -> Protocol {
        self.0[field::NXT_HDR].into()
    }

    pub fn hop_limit(&self) -> u8 {
        self.0[field::HOP_LIMIT]
    }

    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Also clears traffic class and flow label.
    pub fn set_version(&mut self, value: u8) {
        NetworkEndian::write_u32(&mut self.0[field::VER_TC_FLOW], u32::from(value) << 28);
    }

    pub fn set_payload_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    pub fn set_next_header(&mut self, value: Protocol) {
        self.0[field::NXT_HDR] = value.into()
    }

    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::HOP_LIMIT] = value
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes())
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes())
    }

    fn payload_range(&self) -> core::ops::Range<usize> {
        HEADER_LEN..HEADER_LEN + usize::from(self.payload_len())
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.payload_range()]
    }
}

/// The fixed header of a packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:    Address,
    pub dst_addr:    Address,
    pub next_header: Protocol,
    pub payload_len: usize,
    pub hop_limit:   u8,
}

impl Repr {
    pub fn parse(packet: &ipv6) -> Result<Repr> {
        packet.check_len()?;
        if packet.version() != 6 {
            return Err(Error::Malformed);
        }

        Ok(Repr {
            src_addr:    packet.src_addr(),
            dst_addr:    packet.dst_addr(),
            next_header: packet.next_header(),
            payload_len: packet.payload_len().into(),
            hop_limit:   packet.hop_limit(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Write the header, `payload_len` must fit the 16 bit length field.
    pub fn emit(&self, packet: &mut ipv6) {
        packet.set_version(6);
        packet.set_payload_len(self.payload_len as u16);
        packet.set_next_header(self.next_header);
        packet.set_hop_limit(self.hop_limit);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv6 {} > {} {} hlim {}",
               self.src_addr, self.dst_addr, self.next_header, self.hop_limit)
    }
}
