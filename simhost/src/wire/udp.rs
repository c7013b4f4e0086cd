use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, IpProtocol, IpAddress, Result};
use super::field::Field;
use super::ip::checksum;

byte_wrapper! {
    /// A UDP datagram, header and payload.
    #[derive(Debug, PartialEq, Eq)]
    pub struct udp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const LENGTH:   Field = 4..6;
    pub(crate) const CHECKSUM: Field = 6..8;
}

pub const HEADER_LEN: usize = field::CHECKSUM.end;

impl udp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// View `data` as a datagram after validating its length field.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let datagram = Self::new_unchecked(data);
        datagram.check_len()?;
        Ok(datagram)
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    /// Validate the length field against the buffer.
    ///
    /// A length shorter than the header is `Malformed`, one past the buffer `Truncated`.
    /// Octets after the length, IP padding, are ignored by all accessors.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        match usize::from(self.len()) {
            len if len < HEADER_LEN => Err(Error::Malformed),
            len if len > self.0.len() => Err(Error::Truncated),
            _ => Ok(()),
        }
    }

    fn word(&self, field: Field) -> u16 {
        NetworkEndian::read_u16(&self.0[field])
    }

    fn set_word(&mut self, field: Field, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field], value)
    }

    pub fn src_port(&self) -> u16 {
        self.word(field::SRC_PORT)
    }

    pub fn dst_port(&self) -> u16 {
        self.word(field::DST_PORT)
    }

    /// The length field, header included.
    pub fn len(&self) -> u16 {
        self.word(field::LENGTH)
    }

    pub fn checksum(&self) -> u16 {
        self.word(field::CHECKSUM)
    }

    pub fn set_src_port(&mut self, value: u16) {
        self.set_word(field::SRC_PORT, value)
    }

    pub fn set_dst_port(&mut self, value: u16) {
        self.set_word(field::DST_PORT, value)
    }

    pub fn set_len(&mut self, value: u16) {
        self.set_word(field::LENGTH, value)
    }

    pub fn set_checksum(&mut self, value: u16) {
        self.set_word(field::CHECKSUM, value)
    }

    /// Exchange the ports.
    ///
    /// Together with exchanging the addresses of the pseudo header the checksum stays valid.
    pub fn swap_ports(&mut self) {
        let src = self.src_port();
        let dst = self.dst_port();
        self.set_src_port(dst);
        self.set_dst_port(src);
    }

    /// Header and payload as given by the length field.
    fn datagram(&self) -> &[u8] {
        &self.0[..usize::from(self.len())]
    }

    /// Compute the checksum, a result of zero is sent as all ones.
    ///
    /// Zero on the wire means the sender computed no checksum at all.
    pub fn fill_checksum(&mut self, src_addr: IpAddress, dst_addr: IpAddress) {
        self.set_checksum(0);
        match checksum::transport(&src_addr, &dst_addr, IpProtocol::Udp, self.datagram()) {
            0 => self.set_checksum(!0),
            sum => self.set_checksum(sum),
        }
    }

    pub fn verify_checksum(&self, src_addr: IpAddress, dst_addr: IpAddress) -> bool {
        checksum::verify_transport(&src_addr, &dst_addr, IpProtocol::Udp, self.datagram())
    }

    fn payload_range(&self) -> Field {
        HEADER_LEN..usize::from(self.len())
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.payload_range()]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let range = self.payload_range();
        &mut self.0[range]
    }
}

/// The header of a datagram.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header and payload.
    pub length: u16,
}

/// Whether, and over which pseudo header, the checksum is handled.
#[derive(Debug, Clone, Copy)]
pub enum Checksum {
    Manual {
        src_addr: IpAddress,
        dst_addr: IpAddress,
    },
    Ignored,
}

impl Checksum {
    pub fn for_pseudo_header<A, B>(src_addr: A, dst_addr: B) -> Self
        where A: Into<IpAddress>, B: Into<IpAddress>
    {
        Checksum::Manual {
            src_addr: src_addr.into(),
            dst_addr: dst_addr.into(),
        }
    }
}

impl Repr {
    /// Read the header of `packet`.
    ///
    /// The destination port must not be zero. Over IPv4 a zero checksum means there is none
    /// and is accepted, over IPv6 the checksum is mandatory.
    pub fn parse(packet: &udp, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        if packet.dst_port() == 0 {
            return Err(Error::Malformed);
        }

        if let Checksum::Manual { src_addr, dst_addr } = checksum {
            let both_v4 = match (src_addr, dst_addr) {
                (IpAddress::Ipv4(_), IpAddress::Ipv4(_)) => true,
                _ => false,
            };
            let omitted = both_v4 && packet.checksum() == 0;
            if !omitted && !packet.verify_checksum(src_addr, dst_addr) {
                return Err(Error::WrongChecksum);
            }
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            length: packet.len(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        usize::from(self.length)
    }

    /// Write the header into `packet`.
    ///
    /// The payload must already be in place for a manual checksum.
    pub fn emit(&self, packet: &mut udp, checksum: Checksum) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_len(self.length);

        match checksum {
            Checksum::Manual { src_addr, dst_addr } => packet.fill_checksum(src_addr, dst_addr),
            Checksum::Ignored => packet.set_checksum(0),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UDP {} > {} len {}", self.src_port, self.dst_port, self.length)
    }
}
