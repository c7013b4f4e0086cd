use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// The EtherType of a frame, the protocols the host speaks.
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp  = 0x0806,
        Ipv6 = 0x86DD,
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EtherType::Ipv4 => "IPv4",
            EtherType::Arp => "ARP",
            EtherType::Ipv6 => "IPv6",
            EtherType::Unknown(raw) => return write!(f, "type 0x{:04x}", raw),
        };
        f.write_str(name)
    }
}

/// A MAC address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// All zero, the hardware address of a neighbor that is not known yet.
    pub const UNSPECIFIED: Address = Address([0; 6]);

    /// Panics unless `data` holds exactly six octets.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut octets = [0; 6];
        octets.copy_from_slice(data);
        Address(octets)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Address::BROADCAST
    }

    /// The group bit, the lowest bit of the first octet. Broadcast is a group address too.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 1 == 1
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Address::UNSPECIFIED
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// A string that is not six colon separated hex octets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseAddressError {
    /// More or less than six octets.
    Length,
    /// An octet that is not hex or out of range.
    Octet,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ParseAddressError::Length => "a hardware address has six octets",
            ParseAddressError::Octet => "hardware address octets are two hex digits",
        })
    }
}

impl std::error::Error for ParseAddressError { }

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        if src.split(':').count() != 6 {
            return Err(ParseAddressError::Length);
        }

        let mut address = [0; 6];
        for (octet, text) in address.iter_mut().zip(src.split(':')) {
            *octet = u8::from_str_radix(text, 16).map_err(|_| ParseAddressError::Octet)?;
        }
        Ok(Address(address))
    }
}

byte_wrapper! {
    /// An Ethernet II frame without preamble and frame check sequence.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ethernet([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const DESTINATION: Field =  0..6;
    pub(crate) const SOURCE:      Field =  6..12;
    pub(crate) const ETHERTYPE:   Field = 12..14;
    pub(crate) const PAYLOAD:     Rest  = 14..;
}

/// Destination, source and EtherType. 802.1Q tags are not supported.
pub const HEADER_LEN: usize = field::PAYLOAD.start;

impl ethernet {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// View `data` as a frame if it holds at least a header.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let frame = Self::new_unchecked(data);
        frame.check_len()?;
        Ok(frame)
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn check_len(&self) -> Result<()> {
        match self.0.len() {
            len if len < HEADER_LEN => Err(Error::Truncated),
            _ => Ok(()),
        }
    }

    /// Size of a frame carrying `payload_len` octets.
    pub fn buffer_len(payload_len: usize) -> usize {
        HEADER_LEN + payload_len
    }

    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DESTINATION])
    }

    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SOURCE])
    }

    pub fn ethertype(&self) -> EtherType {
        NetworkEndian::read_u16(&self.0[field::ETHERTYPE]).into()
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DESTINATION].copy_from_slice(&value.0)
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SOURCE].copy_from_slice(&value.0)
    }

    pub fn set_ethertype(&mut self, value: EtherType) {
        NetworkEndian::write_u16(&mut self.0[field::ETHERTYPE], value.into())
    }

    /// Turn the frame around, e.g. to answer it in place.
    pub fn swap_addrs(&mut self) {
        let src = self.src_addr();
        let dst = self.dst_addr();
        self.set_src_addr(dst);
        self.set_dst_addr(src);
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::PAYLOAD]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[field::PAYLOAD]
    }
}

impl fmt::Display for ethernet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} > {} {}", self.src_addr(), self.dst_addr(), self.ethertype())
    }
}

/// The header of a frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:  Address,
    pub dst_addr:  Address,
    pub ethertype: EtherType,
}

impl Repr {
    pub fn parse(frame: &ethernet) -> Result<Repr> {
        frame.check_len()?;
        Ok(Repr {
            src_addr: frame.src_addr(),
            dst_addr: frame.dst_addr(),
            ethertype: frame.ethertype(),
        })
    }

    pub fn header_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit(&self, frame: &mut ethernet) {
        frame.set_dst_addr(self.dst_addr);
        frame.set_src_addr(self.src_addr);
        frame.set_ethertype(self.ethertype);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PEER: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    const HOST: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    /// An ARP frame from the host to the peer, payload cut short.
    const ARP_FRAME: [u8; 18] = [
        0x02, 0x00, 0x00, 0x00, 0x00, 0x02,
        0x02, 0x00, 0x00, 0x00, 0x00, 0x01,
        0x08, 0x06,
        0x00, 0x01, 0x08, 0x00,
    ];

    #[test]
    fn group_addresses() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address::BROADCAST.is_multicast());
        assert!(Address([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]).is_multicast());
        assert!(!PEER.is_multicast());
        assert!(Address::UNSPECIFIED.is_unspecified());
    }

    #[test]
    fn header_of_arp_frame() {
        let frame = ethernet::new_checked(&ARP_FRAME[..]).unwrap();
        let repr = Repr::parse(frame).unwrap();
        assert_eq!(repr, Repr { src_addr: HOST, dst_addr: PEER, ethertype: EtherType::Arp });
        assert_eq!(frame.payload_slice(), &ARP_FRAME[HEADER_LEN..]);
        assert_eq!(frame.to_string(), "02:00:00:00:00:01 > 02:00:00:00:00:02 ARP");
    }

    #[test]
    fn answer_in_place() {
        let mut bytes = ARP_FRAME.to_vec();
        let frame = ethernet::new_checked_mut(&mut bytes).unwrap();
        frame.swap_addrs();
        frame.set_ethertype(EtherType::Ipv6);
        assert_eq!(frame.src_addr(), PEER);
        assert_eq!(frame.dst_addr(), HOST);
        assert_eq!(&bytes[12..14], &[0x86, 0xdd]);
    }

    #[test]
    fn short_frame() {
        assert_eq!(ethernet::new_checked(&ARP_FRAME[..13]), Err(Error::Truncated));
        assert!(ethernet::new_checked(&ARP_FRAME[..14]).is_ok());
    }

    #[test]
    fn parse_address() {
        assert_eq!("02:00:00:00:00:0a".parse(), Ok(Address([2, 0, 0, 0, 0, 10])));
        assert_eq!("02:00:00:00:00".parse::<Address>(), Err(ParseAddressError::Length));
        assert_eq!("02:00:00:00:00:00:01".parse::<Address>(), Err(ParseAddressError::Length));
        assert_eq!("02:00:00:00:00:zz".parse::<Address>(), Err(ParseAddressError::Octet));
        assert_eq!(PEER.to_string(), "02:00:00:00:00:02");
    }
}
