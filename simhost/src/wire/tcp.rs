use core::{ops, cmp, fmt};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, IpProtocol, IpAddress, Result};
use super::field::Field;
use super::ip::checksum;

/// A position in the sequence space, arithmetic wraps at 2<sup>32</sup>.
///
/// Ordering follows RFC 1982 serial number arithmetic: `a < b` when `b` lies less than half the
/// space ahead of `a`. That makes the order meaningless for numbers exactly half apart and
/// keeps it correct across the wrap.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl From<u32> for SeqNumber {
    fn from(raw: u32) -> Self {
        SeqNumber(raw as i32)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&(self.0 as u32), f)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        self.0 = self.0.wrapping_add(rhs as i32);
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        Some(self.0.wrapping_sub(other.0).cmp(&0))
    }
}

/// The control bits of a segment.
///
/// Sessions compare whole sets, e.g. `flags == Flags::SYN | Flags::ACK`, so the constants
/// combine with `|`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u16);

impl Flags {
    pub const FIN: Flags = Flags(0x001);
    pub const SYN: Flags = Flags(0x002);
    pub const RST: Flags = Flags(0x004);
    pub const PSH: Flags = Flags(0x008);
    pub const ACK: Flags = Flags(0x010);
    pub const URG: Flags = Flags(0x020);

    /// The nine bits of the header that carry flags.
    const MASK: u16 = 0x1ff;

    /// Whether every flag of `other` is set in `self`.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn fin(self) -> bool {
        self.contains(Flags::FIN)
    }

    pub fn syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    pub fn rst(self) -> bool {
        self.contains(Flags::RST)
    }

    pub fn psh(self) -> bool {
        self.contains(Flags::PSH)
    }

    pub fn ack(self) -> bool {
        self.contains(Flags::ACK)
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

/// The set flags joined by `+`, e.g. `SYN+ACK`, or `-` for none.
impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 6] = [
            (Flags::SYN, "SYN"), (Flags::FIN, "FIN"), (Flags::RST, "RST"),
            (Flags::PSH, "PSH"), (Flags::ACK, "ACK"), (Flags::URG, "URG"),
        ];
        let mut set = NAMES.iter().filter(|(flag, _)| self.contains(*flag));
        match set.next() {
            None => f.write_str("-"),
            Some((_, name)) => {
                f.write_str(name)?;
                set.try_for_each(|(_, name)| write!(f, "+{}", name))
            },
        }
    }
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;
}

mod option {
    pub(crate) const END: u8 = 0;
    pub(crate) const NOP: u8 = 1;
    pub(crate) const MSS: u8 = 2;
    pub(crate) const WINDOW_SCALE: u8 = 3;
    pub(crate) const SACK_PERMITTED: u8 = 4;
    pub(crate) const TIMESTAMP: u8 = 8;
}

/// Size of a header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// The largest shift a window scale option may announce, RFC 7323 section 2.3.
const MAX_WINDOW_SCALE: u8 = 14;

byte_wrapper! {
    /// A TCP segment, header and data.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

impl tcp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// View `data` as a segment after validating the data offset.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let segment = Self::new_unchecked(data);
        segment.check_len()?;
        Ok(segment)
    }

    /// Validate the data offset against the buffer.
    ///
    /// An offset below five words is `Malformed`, one past the buffer `Truncated`. Changing the
    /// header length afterwards voids the check.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        let header_len = usize::from(self.header_len());
        if header_len < HEADER_LEN {
            Err(Error::Malformed)
        } else if header_len > self.0.len() {
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

    pub fn src_port(&self) -> u16 {
        self.word(field::SRC_PORT)
    }

    pub fn dst_port(&self) -> u16 {
        self.word(field::DST_PORT)
    }

    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::SEQ_NUM]))
    }

    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.0[field::ACK_NUM]))
    }

    pub fn flags(&self) -> Flags {
        Flags(self.word(field::FLAGS) & Flags::MASK)
    }

    /// The data offset in octets.
    pub fn header_len(&self) -> u8 {
        (self.0[field::FLAGS.start] >> 4) << 2
    }

    pub fn window_len(&self) -> u16 {
        self.word(field::WIN_SIZE)
    }

    pub fn checksum(&self) -> u16 {
        self.word(field::CHECKSUM)
    }

    pub fn urgent_at(&self) -> u16 {
        self.word(field::URGENT)
    }

    fn options_range(&self) -> Field {
        HEADER_LEN..usize::from(self.header_len())
    }

    pub fn options(&self) -> &[u8] {
        &self.0[self.options_range()]
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[usize::from(self.header_len())..]
    }

    /// Check the checksum over the whole buffer with the pseudo header of the addresses.
    pub fn verify_checksum(&self, src_addr: IpAddress, dst_addr: IpAddress) -> bool {
        checksum::verify_transport(&src_addr, &dst_addr, IpProtocol::Tcp, &self.0)
    }

    pub fn set_src_port(&mut self, value: u16) {
        self.set_word(field::SRC_PORT, value)
    }

    pub fn set_dst_port(&mut self, value: u16) {
        self.set_word(field::DST_PORT, value)
    }

    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::SEQ_NUM], value.0)
    }

    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Replace the flags, the data offset is kept.
    pub fn set_flags(&mut self, flags: Flags) {
        let offset = self.word(field::FLAGS) & 0xf000;
        self.set_word(field::FLAGS, offset | flags.0 & Flags::MASK)
    }

    /// Set the data offset in octets, rounded down to whole words.
    pub fn set_header_len(&mut self, value: u8) {
        let at = field::FLAGS.start;
        self.0[at] = (value >> 2) << 4 | self.0[at] & 0x0f;
    }

    pub fn set_window_len(&mut self, value: u16) {
        self.set_word(field::WIN_SIZE, value)
    }

    pub fn set_checksum(&mut self, value: u16) {
        self.set_word(field::CHECKSUM, value)
    }

    pub fn set_urgent_at(&mut self, value: u16) {
        self.set_word(field::URGENT, value)
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let range = self.options_range();
        &mut self.0[range]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let start = usize::from(self.header_len());
        &mut self.0[start..]
    }

    /// Compute the checksum over the whole buffer, data included.
    pub fn fill_checksum(&mut self, src_addr: IpAddress, dst_addr: IpAddress) {
        self.set_checksum(0);
        let sum = checksum::transport(&src_addr, &dst_addr, IpProtocol::Tcp, &self.0);
        self.set_checksum(sum)
    }
}

/// One entry of the option list.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    EndOfList,
    NoOperation,
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    Timestamp { value: u32, echo: u32 },
    Unknown { kind: u8, data: &'a [u8] },
}

impl<'a> TcpOption<'a> {
    /// Split the first option off `buffer`.
    ///
    /// Known options with a length other than their fixed one are `Malformed`, as is any length
    /// below two.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let kind = *buffer.first().ok_or(Error::Truncated)?;
        match kind {
            option::END => return Ok((&buffer[1..], TcpOption::EndOfList)),
            option::NOP => return Ok((&buffer[1..], TcpOption::NoOperation)),
            _ => (),
        }

        let length = usize::from(*buffer.get(1).ok_or(Error::Truncated)?);
        if length < 2 {
            return Err(Error::Malformed);
        }
        let data = buffer.get(2..length).ok_or(Error::Truncated)?;

        let parsed = match (kind, data.len()) {
            (option::MSS, 2) => TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
            (option::WINDOW_SCALE, 1) => TcpOption::WindowScale(data[0]),
            (option::SACK_PERMITTED, 0) => TcpOption::SackPermitted,
            (option::TIMESTAMP, 8) => TcpOption::Timestamp {
                value: NetworkEndian::read_u32(&data[..4]),
                echo: NetworkEndian::read_u32(&data[4..]),
            },
            (option::MSS, _) | (option::WINDOW_SCALE, _)
                | (option::SACK_PERMITTED, _) | (option::TIMESTAMP, _) => {
                return Err(Error::Malformed);
            },
            (kind, _) => TcpOption::Unknown { kind, data },
        };

        Ok((&buffer[length..], parsed))
    }

    /// Octets taken by the option, kind and length included.
    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList | TcpOption::NoOperation => 1,
            TcpOption::SackPermitted => 2,
            TcpOption::WindowScale(_) => 3,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    /// Write the option to the front of `buffer` and return the remainder.
    ///
    /// The end of list marker fills all of `buffer`, padding the header to its length.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                buffer.iter_mut().for_each(|pad| *pad = option::END);
                let end = buffer.len();
                return &mut buffer[end..];
            },
            TcpOption::NoOperation => buffer[0] = option::NOP,
            TcpOption::MaxSegmentSize(mss) => {
                buffer[0] = option::MSS;
                NetworkEndian::write_u16(&mut buffer[2..4], mss);
            },
            TcpOption::WindowScale(shift) => {
                buffer[0] = option::WINDOW_SCALE;
                buffer[2] = shift;
            },
            TcpOption::SackPermitted => buffer[0] = option::SACK_PERMITTED,
            TcpOption::Timestamp { value, echo } => {
                buffer[0] = option::TIMESTAMP;
                NetworkEndian::write_u32(&mut buffer[2..6], value);
                NetworkEndian::write_u32(&mut buffer[6..10], echo);
            },
            TcpOption::Unknown { kind, data } => {
                buffer[0] = kind;
                buffer[2..length].copy_from_slice(data);
            },
        }
        if length > 1 {
            buffer[1] = length as u8;
        }
        &mut buffer[length..]
    }
}

/// The header of a segment as the sessions see it.
///
/// Of the options only MSS, window scale and timestamps are kept, the data is represented by
/// its length.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:     u16,
    pub dst_port:     u16,
    pub flags:        Flags,
    pub seq_number:   SeqNumber,
    pub ack_number:   SeqNumber,
    pub window_len:   u16,
    pub max_seg_size: Option<u16>,
    pub window_scale: Option<u8>,
    /// The timestamp value and its echo.
    pub timestamp:    Option<(u32, u32)>,
    pub payload_len:  usize,
}

/// Whether, and over which pseudo header, the segment checksum is handled.
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
    /// A zero port on either side is `Malformed`. Window scales beyond 14 are clamped, options
    /// after an end of list are ignored.
    pub fn parse(packet: &tcp, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        if packet.src_port() == 0 || packet.dst_port() == 0 {
            return Err(Error::Malformed);
        }
        if let Checksum::Manual { src_addr, dst_addr } = checksum {
            if !packet.verify_checksum(src_addr, dst_addr) {
                return Err(Error::WrongChecksum);
            }
        }

        let mut repr = Repr {
            src_port:     packet.src_port(),
            dst_port:     packet.dst_port(),
            flags:        packet.flags(),
            seq_number:   packet.seq_number(),
            ack_number:   packet.ack_number(),
            window_len:   packet.window_len(),
            max_seg_size: None,
            window_scale: None,
            timestamp:    None,
            payload_len:  packet.payload_slice().len(),
        };

        let mut options = packet.options();
        while !options.is_empty() {
            let (rest, option) = TcpOption::parse(options)?;
            match option {
                TcpOption::EndOfList => break,
                TcpOption::MaxSegmentSize(mss) => repr.max_seg_size = Some(mss),
                TcpOption::WindowScale(shift) => {
                    repr.window_scale = Some(shift.min(MAX_WINDOW_SCALE));
                },
                TcpOption::Timestamp { value, echo } => repr.timestamp = Some((value, echo)),
                _ => (),
            }
            options = rest;
        }

        Ok(repr)
    }

    /// The data offset of the emitted header in octets.
    ///
    /// Options are laid out as MSS, then NOP NOP Timestamp, then NOP Window-scale. With all of
    /// them that is 20 bytes of options, a timestamp alone takes 12.
    pub fn header_len(&self) -> usize {
        let mss = if self.max_seg_size.is_some() { 4 } else { 0 };
        let timestamp = if self.timestamp.is_some() { 12 } else { 0 };
        let scale = if self.window_scale.is_some() { 4 } else { 0 };
        HEADER_LEN + mss + timestamp + scale
    }

    /// Header and data.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// Write the header into `packet`, which must span exactly header and data.
    ///
    /// The data must already be in place when the checksum is filled.
    pub fn emit(&self, packet: &mut tcp, checksum: Checksum) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number);
        packet.set_header_len(self.header_len() as u8);
        packet.set_flags(self.flags);
        packet.set_window_len(self.window_len);
        packet.set_urgent_at(0);

        let mut options = packet.options_mut();
        if let Some(mss) = self.max_seg_size {
            options = TcpOption::MaxSegmentSize(mss).emit(options);
        }
        if let Some((value, echo)) = self.timestamp {
            options = TcpOption::NoOperation.emit(options);
            options = TcpOption::NoOperation.emit(options);
            options = TcpOption::Timestamp { value, echo }.emit(options);
        }
        if let Some(shift) = self.window_scale {
            options = TcpOption::NoOperation.emit(options);
            options = TcpOption::WindowScale(shift).emit(options);
        }
        debug_assert!(options.is_empty());

        match checksum {
            Checksum::Manual { src_addr, dst_addr } => packet.fill_checksum(src_addr, dst_addr),
            Checksum::Ignored => packet.set_checksum(0),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP {} > {} [{}] seq {} ack {} win {} len {}",
               self.src_port, self.dst_port, self.flags,
               self.seq_number, self.ack_number, self.window_len, self.payload_len)?;
        match self.max_seg_size {
            Some(mss) => write!(f, " mss {}", mss),
            None => Ok(()),
        }
    }
}
