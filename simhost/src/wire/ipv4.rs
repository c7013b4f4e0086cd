use core::fmt;
use core::str::FromStr;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Result};
use super::ip::checksum;
use super::field::Field;

pub use super::ip::Protocol;

/// Every IPv4 link must carry datagrams of this size, RFC 791 section 3.1.
pub const MIN_MTU: usize = 576;

/// Size of a header without options.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

const DONT_FRAG: u16 = 0x4000;
const MORE_FRAGS: u16 = 0x2000;
const FLAGS: u16 = 0xe000;

/// An IPv4 address, octets in network order.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    pub const UNSPECIFIED: Address = Address([0; 4]);

    /// The limited broadcast `255.255.255.255`.
    pub const BROADCAST: Address = Address([0xff; 4]);

    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Copy the address out of a header field.
    ///
    /// Panics unless `data` holds exactly four octets.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut octets = [0; 4];
        octets.copy_from_slice(data);
        Address(octets)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn to_bits(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    fn from_bits(bits: u32) -> Self {
        Address(bits.to_be_bytes())
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Address::BROADCAST
    }

    /// Class D, `224.0.0.0/4`.
    pub fn is_multicast(&self) -> bool {
        self.0[0] >> 4 == 0xe
    }

    /// Anything in `0.0.0.0/8`.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }

    /// Clear all host bits beyond the first `prefix` bits.
    ///
    /// ```rust
    /// # use simhost::wire::Ipv4Address;
    /// let host = Ipv4Address::new(192, 168, 178, 32);
    /// assert_eq!(host.mask(24), Ipv4Address::new(192, 168, 178, 0));
    /// ```
    pub fn mask(&self, prefix: u8) -> Address {
        Address::from_bits(self.to_bits() & prefix_bits(prefix))
    }
}

/// The netmask of a prefix as an integer.
fn prefix_bits(prefix: u8) -> u32 {
    (!0u32).checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0)
}

impl From<std::net::Ipv4Addr> for Address {
    fn from(addr: std::net::Ipv4Addr) -> Address {
        Address(addr.octets())
    }
}

impl From<Address> for std::net::Ipv4Addr {
    fn from(addr: Address) -> std::net::Ipv4Addr {
        addr.0.into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&std::net::Ipv4Addr::from(*self), f)
    }
}

/// The address of an interface together with the length of its subnet prefix.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Cidr {
    address: Address,
    prefix_len: u8,
}

impl Cidr {
    /// Prefixes longer than 32 bits are clamped.
    pub const fn new(address: Address, prefix_len: u8) -> Cidr {
        let prefix_len = if prefix_len > 32 { 32 } else { prefix_len };
        Cidr { address, prefix_len }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn netmask(&self) -> Address {
        Address::from_bits(prefix_bits(self.prefix_len))
    }

    /// The directed broadcast of the subnet.
    ///
    /// Point-to-point prefixes of 31 bits and single hosts have none, see RFC 3021.
    pub fn broadcast(&self) -> Option<Address> {
        if self.prefix_len >= 31 {
            None
        } else {
            let host_bits = !prefix_bits(self.prefix_len);
            Some(Address::from_bits(self.address.to_bits() | host_bits))
        }
    }

    /// Whether `address` is on the subnet.
    pub fn contains(&self, address: Address) -> bool {
        self.address.mask(self.prefix_len) == address.mask(self.prefix_len)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// A string was not of the form `a.b.c.d/len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseCidrError {
    MissingPrefix,
    BadAddress,
    BadPrefix,
}

impl fmt::Display for ParseCidrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ParseCidrError::MissingPrefix => "expected a '/' followed by the prefix length",
            ParseCidrError::BadAddress => "not a dotted quad address",
            ParseCidrError::BadPrefix => "prefix length must be at most 32",
        })
    }
}

impl std::error::Error for ParseCidrError { }

impl FromStr for Cidr {
    type Err = ParseCidrError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseCidrError> {
        let mut parts = src.splitn(2, '/');
        let address = parts.next().unwrap_or("");
        let prefix = parts.next().ok_or(ParseCidrError::MissingPrefix)?;

        let address: std::net::Ipv4Addr = address.parse()
            .map_err(|_| ParseCidrError::BadAddress)?;
        let prefix_len = match prefix.parse::<u8>() {
            Ok(len) if len <= 32 => len,
            _ => return Err(ParseCidrError::BadPrefix),
        };

        Ok(Cidr::new(address.into(), prefix_len))
    }
}

byte_wrapper! {
    /// An IPv4 datagram, header options included.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
}

impl ipv4 {
    pub fn new_unchecked(buffer: &[u8]) -> &ipv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// View `data` as a datagram after validating its lengths.
    pub fn new_checked(data: &[u8]) -> Result<&ipv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut ipv4> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Validate the header length and the total length against the buffer.
    ///
    /// A header length below the minimum, or above the total length, is `Malformed`. A buffer
    /// shorter than either is `Truncated`. Trailing bytes beyond the total length, such as
    /// Ethernet padding, are allowed.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            return Err(Error::Truncated);
        }

        let header_len = usize::from(self.header_len());
        let total_len = usize::from(self.total_len());
        if header_len < HEADER_LEN || header_len > total_len {
            Err(Error::Malformed)
        } else if len < total_len {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    fn word(&self, field: Field) -> u16 {
        NetworkEndian::read_u16(&self.0[field])
    }

    fn set_word(&mut self, field: Field, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field], value)
    }

    fn set_flag(&mut self, flag: u16, value: bool) {
        let raw = self.word(field::FLG_OFF) & !flag;
        self.set_word(field::FLG_OFF, if value { raw | flag } else { raw });
    }

    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// Header length in octets, options included.
    pub fn header_len(&self) -> u8 {
        (self.0[field::VER_IHL] & 0xf) << 2
    }

    pub fn total_len(&self) -> u16 {
        self.word(field::LENGTH)
    }

    pub fn ident(&self) -> u16 {
        self.word(field::IDENT)
    }

    pub fn dont_frag(&self) -> bool {
        self.word(field::FLG_OFF) & DONT_FRAG != 0
    }

    pub fn more_frags(&self) -> bool {
        self.word(field::FLG_OFF) & MORE_FRAGS != 0
    }

    /// Offset of the fragment in octets, always a multiple of eight.
    pub fn frag_offset(&self) -> u16 {
        self.word(field::FLG_OFF) << 3
    }

    /// Whether the datagram is only part of the original one.
    pub fn is_fragment(&self) -> bool {
        self.more_frags() || self.frag_offset() != 0
    }

    /// The time to live.
    pub fn hop_limit(&self) -> u8 {
        self.0[field::TTL]
    }

    pub fn protocol(&self) -> Protocol {
        self.0[field::PROTOCOL].into()
    }

    pub fn checksum(&self) -> u16 {
        self.word(field::CHECKSUM)
    }

    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    fn header(&self) -> &[u8] {
        &self.0[..usize::from(self.header_len())]
    }

    /// Whether the header sums to all ones.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(self.header()) == !0
    }

    pub fn set_version(&mut self, value: u8) {
        let ihl = self.0[field::VER_IHL] & 0xf;
        self.0[field::VER_IHL] = value << 4 | ihl;
    }

    /// Set the header length in octets, rounded down to whole words.
    pub fn set_header_len(&mut self, value: u8) {
        let version = self.0[field::VER_IHL] & 0xf0;
        self.0[field::VER_IHL] = version | (value >> 2) & 0xf;
    }

    pub fn set_total_len(&mut self, value: u16) {
        self.set_word(field::LENGTH, value)
    }

    pub fn set_ident(&mut self, value: u16) {
        self.set_word(field::IDENT, value)
    }

    pub fn set_dont_frag(&mut self, value: bool) {
        self.set_flag(DONT_FRAG, value)
    }

    pub fn set_more_frags(&mut self, value: bool) {
        self.set_flag(MORE_FRAGS, value)
    }

    /// Set the offset in octets, the low three bits are dropped.
    pub fn set_frag_offset(&mut self, value: u16) {
        let flags = self.word(field::FLG_OFF) & FLAGS;
        self.set_word(field::FLG_OFF, flags | value >> 3);
    }

    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::TTL] = value
    }

    /// Set the time to live and patch the checksum incrementally.
    ///
    /// TTL and protocol share one 16-bit word of the sum.
    pub fn set_hop_limit_fixup(&mut self, value: u8) {
        let word = field::TTL..field::PROTOCOL + 1;
        let old = self.word(word.clone());
        self.set_hop_limit(value);
        let new = self.word(word);
        let sum = checksum::fixup(self.checksum(), old, new);
        self.set_checksum(sum);
    }

    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into()
    }

    pub fn set_checksum(&mut self, value: u16) {
        self.set_word(field::CHECKSUM, value)
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(&value.0)
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(&value.0)
    }

    /// Exchange source and destination.
    ///
    /// The header checksum does not depend on the order of words, it stays valid.
    pub fn swap_addrs(&mut self) {
        let src = self.src_addr();
        let dst = self.dst_addr();
        self.set_src_addr(dst);
        self.set_dst_addr(src);
    }

    /// Recompute the header checksum from scratch.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let sum = !checksum::data(self.header());
        self.set_checksum(sum)
    }

    /// Where the payload lies, from the end of the options to the total length.
    pub fn payload_range(&self) -> Field {
        usize::from(self.header_len())..usize::from(self.total_len())
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.payload_range()]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let range = self.payload_range();
        &mut self.0[range]
    }
}

/// The fields of an IPv4 header the stack reads and writes.
///
/// Options are skipped on parsing and never emitted, DSCP and ECN are always zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:    Address,
    pub dst_addr:    Address,
    pub protocol:    Protocol,
    /// Octets following the header, up to the total length.
    pub payload_len: usize,
    /// The time to live.
    pub hop_limit:   u8,
    pub ident:       u16,
    pub dont_frag:   bool,
    pub more_frags:  bool,
    /// In octets.
    pub frag_offset: u16,
}

impl Repr {
    /// Read the header of `packet`.
    ///
    /// Fragments are accepted as they are, putting them back together is up to the caller.
    pub fn parse(packet: &ipv4, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        if packet.version() != 4 {
            return Err(Error::Malformed);
        }
        if checksum.manual() && !packet.verify_checksum() {
            return Err(Error::WrongChecksum);
        }

        Ok(Repr {
            src_addr:    packet.src_addr(),
            dst_addr:    packet.dst_addr(),
            protocol:    packet.protocol(),
            payload_len: packet.payload_range().len(),
            hop_limit:   packet.hop_limit(),
            ident:       packet.ident(),
            dont_frag:   packet.dont_frag(),
            more_frags:  packet.more_frags(),
            frag_offset: packet.frag_offset(),
        })
    }

    /// Size of the emitted header.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Write the header to the start of `packet`.
    ///
    /// The buffer must hold at least the header, the payload is not touched.
    pub fn emit(&self, packet: &mut ipv4, checksum: Checksum) {
        packet.set_version(4);
        packet.set_header_len(HEADER_LEN as u8);
        packet.0[field::DSCP_ECN] = 0;
        packet.set_total_len((HEADER_LEN + self.payload_len) as u16);
        packet.set_ident(self.ident);
        packet.set_word(field::FLG_OFF, 0);
        packet.set_dont_frag(self.dont_frag);
        packet.set_more_frags(self.more_frags);
        packet.set_frag_offset(self.frag_offset);
        packet.set_hop_limit(self.hop_limit);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);

        match checksum {
            Checksum::Manual => packet.fill_checksum(),
            Checksum::Ignored => packet.set_checksum(0),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv4 {} > {} {} id {}",
               self.src_addr, self.dst_addr, self.protocol, self.ident)?;
        if self.more_frags || self.frag_offset != 0 {
            let more = if self.more_frags { "+" } else { "" };
            write!(f, " frag @{}{}", self.frag_offset, more)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A fragment of an ICMP datagram with both flags set, ten bytes of payload.
    const FRAGMENT: [u8; 30] = [
        0x45, 0x00, 0x00, 0x1e, 0x01, 0x02, 0x62, 0x03,
        0x1a, 0x01, 0xd5, 0x6e, 0x11, 0x12, 0x13, 0x14,
        0x21, 0x22, 0x23, 0x24, 0xaa, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0xff,
    ];

    fn fragment_repr() -> Repr {
        Repr {
            src_addr: Address::new(0x11, 0x12, 0x13, 0x14),
            dst_addr: Address::new(0x21, 0x22, 0x23, 0x24),
            protocol: Protocol::Icmp,
            payload_len: 10,
            hop_limit: 0x1a,
            ident: 0x102,
            dont_frag: true,
            more_frags: true,
            frag_offset: 0x203 * 8,
        }
    }

    #[test]
    fn fields_of_fragment() {
        let packet = ipv4::new_checked(&FRAGMENT[..]).unwrap();
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.total_len(), 30);
        assert_eq!(packet.checksum(), 0xd56e);
        assert!(packet.verify_checksum());
        assert!(packet.is_fragment());
        assert_eq!(packet.payload_slice(), &FRAGMENT[20..]);
        assert_eq!(Repr::parse(packet, Checksum::Manual), Ok(fragment_repr()));
    }

    #[test]
    fn emit_reproduces_fragment() {
        let mut bytes = vec![0xa5; FRAGMENT.len()];
        fragment_repr().emit(ipv4::new_unchecked_mut(&mut bytes), Checksum::Manual);
        bytes[HEADER_LEN..].copy_from_slice(&FRAGMENT[HEADER_LEN..]);
        assert_eq!(&bytes[..], &FRAGMENT[..]);
    }

    #[test]
    fn lengths_checked() {
        assert_eq!(ipv4::new_checked(&FRAGMENT[..19]).err(), Some(Error::Truncated));
        assert_eq!(ipv4::new_checked(&FRAGMENT[..29]).err(), Some(Error::Truncated));

        let mut bytes = FRAGMENT.to_vec();
        bytes.extend_from_slice(&[0; 16]);
        assert!(ipv4::new_checked(&bytes).is_ok());

        bytes[0] = 0x44;
        assert_eq!(ipv4::new_checked(&bytes).err(), Some(Error::Malformed));
        bytes[0] = 0x4f;
        assert_eq!(ipv4::new_checked(&bytes).err(), Some(Error::Malformed));
    }

    #[test]
    fn ttl_fixup_keeps_checksum() {
        let mut bytes = FRAGMENT.to_vec();
        let packet = ipv4::new_checked_mut(&mut bytes).unwrap();
        packet.set_hop_limit_fixup(64);
        assert_eq!(packet.hop_limit(), 64);
        assert!(packet.verify_checksum());
        packet.swap_addrs();
        assert!(packet.verify_checksum());
        assert_eq!(packet.src_addr(), Address::new(0x21, 0x22, 0x23, 0x24));
    }

    #[test]
    fn wrong_checksum() {
        let mut bytes = FRAGMENT.to_vec();
        bytes[11] ^= 0x01;
        let packet = ipv4::new_checked(&bytes).unwrap();
        assert_eq!(Repr::parse(packet, Checksum::Manual), Err(Error::WrongChecksum));
        assert!(Repr::parse(packet, Checksum::Ignored).is_ok());
    }

    #[test]
    fn cidr_of_subnet() {
        let cidr: Cidr = "192.168.1.10/24".parse().unwrap();
        assert_eq!(cidr.address(), Address::new(192, 168, 1, 10));
        assert_eq!(cidr.netmask(), Address::new(255, 255, 255, 0));
        assert_eq!(cidr.broadcast(), Some(Address::new(192, 168, 1, 255)));
        assert!(cidr.contains(Address::new(192, 168, 1, 77)));
        assert!(!cidr.contains(Address::new(192, 168, 2, 77)));
        assert_eq!(Cidr::new(cidr.address(), 31).broadcast(), None);
        assert_eq!(Cidr::new(cidr.address(), 0).netmask(), Address::UNSPECIFIED);
    }

    #[test]
    fn cidr_parse_errors() {
        assert_eq!("192.168.1.10".parse::<Cidr>(), Err(ParseCidrError::MissingPrefix));
        assert_eq!("192.168.1/8".parse::<Cidr>(), Err(ParseCidrError::BadAddress));
        assert_eq!("192.168.1.10/33".parse::<Cidr>(), Err(ParseCidrError::BadPrefix));
    }
}
