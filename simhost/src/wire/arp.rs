use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::{EthernetAddress, EthernetProtocol, Ipv4Address};
use super::field::Field;

enum_with_unknown! {
    /// The link layer an ARP packet resolves to.
    pub enum Hardware(u16) {
        Ethernet = 1
    }
}

enum_with_unknown! {
    pub enum Operation(u16) {
        /// Asks for the hardware address of the target protocol address.
        Request = 1,
        /// Announces the sender pair.
        Reply = 2
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Request => f.write_str("who-has"),
            Operation::Reply => f.write_str("is-at"),
            Operation::Unknown(op) => write!(f, "op {}", op),
        }
    }
}

byte_wrapper! {
    /// An ARP packet resolving IPv4 addresses to Ethernet addresses.
    ///
    /// The address fields are only at their offsets for six octet hardware and four octet
    /// protocol addresses, other lengths are rejected by `Repr::parse`.
    #[derive(Debug, PartialEq, Eq)]
    pub struct arp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const HTYPE: Field =  0..2;
    pub(crate) const PTYPE: Field =  2..4;
    pub(crate) const HLEN:  usize =  4;
    pub(crate) const PLEN:  usize =  5;
    pub(crate) const OPER:  Field =  6..8;
    pub(crate) const SHA:   Field =  8..14;
    pub(crate) const SPA:   Field = 14..18;
    pub(crate) const THA:   Field = 18..24;
    pub(crate) const TPA:   Field = 24..28;
}

const HARDWARE_LEN: u8 = 6;
const PROTOCOL_LEN: u8 = 4;

/// Length of an Ethernet and IPv4 packet.
pub const PACKET_LEN: usize = field::TPA.end;

impl arp {
    pub fn new_unchecked(buffer: &[u8]) -> &arp {
        Self::__from_macro_new_unchecked(buffer)
    }

    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut arp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    pub fn new_checked(data: &[u8]) -> Result<&arp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// At least the length of an Ethernet and IPv4 packet, trailing octets are frame padding.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < PACKET_LEN {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    fn word(&self, field: Field) -> u16 {
        NetworkEndian::read_u16(&self.0[field])
    }

    fn set_word(&mut self, field: Field, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field], value)
    }

    pub fn hardware_type(&self) -> Hardware {
        self.word(field::HTYPE).into()
    }

    pub fn protocol_type(&self) -> EthernetProtocol {
        self.word(field::PTYPE).into()
    }

    pub fn hardware_len(&self) -> u8 {
        self.0[field::HLEN]
    }

    pub fn protocol_len(&self) -> u8 {
        self.0[field::PLEN]
    }

    pub fn operation(&self) -> Operation {
        self.word(field::OPER).into()
    }

    pub fn source_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::SHA])
    }

    pub fn source_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::SPA])
    }

    pub fn target_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::THA])
    }

    pub fn target_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::TPA])
    }

    /// Write the fixed preamble of an Ethernet and IPv4 packet.
    fn set_ethernet_ipv4(&mut self) {
        self.set_word(field::HTYPE, Hardware::Ethernet.into());
        self.set_word(field::PTYPE, EthernetProtocol::Ipv4.into());
        self.0[field::HLEN] = HARDWARE_LEN;
        self.0[field::PLEN] = PROTOCOL_LEN;
    }

    pub fn set_operation(&mut self, value: Operation) {
        self.set_word(field::OPER, value.into())
    }

    pub fn set_source_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::SHA].copy_from_slice(value.as_bytes())
    }

    pub fn set_source_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::SPA].copy_from_slice(value.as_bytes())
    }

    pub fn set_target_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::THA].copy_from_slice(value.as_bytes())
    }

    pub fn set_target_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::TPA].copy_from_slice(value.as_bytes())
    }
}

/// An ARP request or reply between Ethernet and IPv4.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: EthernetAddress,
    pub source_protocol_addr: Ipv4Address,
    pub target_hardware_addr: EthernetAddress,
    pub target_protocol_addr: Ipv4Address,
}

impl Repr {
    /// Read a request or reply.
    ///
    /// Other hardware, protocols, address lengths and operations are `Unrecognized`.
    pub fn parse(packet: &arp) -> Result<Repr> {
        packet.check_len()?;
        let ethernet_ipv4 = packet.hardware_type() == Hardware::Ethernet
            && packet.protocol_type() == EthernetProtocol::Ipv4
            && packet.hardware_len() == HARDWARE_LEN
            && packet.protocol_len() == PROTOCOL_LEN;
        let operation = match packet.operation() {
            Operation::Unknown(_) => return Err(Error::Unrecognized),
            known => known,
        };
        if !ethernet_ipv4 {
            return Err(Error::Unrecognized);
        }

        Ok(Repr {
            operation,
            source_hardware_addr: packet.source_hardware_addr(),
            source_protocol_addr: packet.source_protocol_addr(),
            target_hardware_addr: packet.target_hardware_addr(),
            target_protocol_addr: packet.target_protocol_addr(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        PACKET_LEN
    }

    pub fn emit(&self, packet: &mut arp) {
        packet.set_ethernet_ipv4();
        packet.set_operation(self.operation);
        packet.set_source_hardware_addr(self.source_hardware_addr);
        packet.set_source_protocol_addr(self.source_protocol_addr);
        packet.set_target_hardware_addr(self.target_hardware_addr);
        packet.set_target_protocol_addr(self.target_protocol_addr);
    }

    /// The reply to this request, claiming `hardware_addr` for the requested address.
    pub fn answer(&self, hardware_addr: EthernetAddress) -> Repr {
        Repr {
            operation: Operation::Reply,
            source_hardware_addr: hardware_addr,
            source_protocol_addr: self.target_protocol_addr,
            target_hardware_addr: self.source_hardware_addr,
            target_protocol_addr: self.source_protocol_addr,
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operation {
            Operation::Reply => write!(f, "ARP {} is-at {}",
                self.source_protocol_addr, self.source_hardware_addr),
            op => write!(f, "ARP {} {} tell {}",
                op, self.target_protocol_addr, self.source_protocol_addr),
        }
    }
}
