use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Result};
use super::field::Field;
use super::ip::checksum;

enum_with_unknown! {
    /// The type of an ICMP message, RFC 792.
    pub enum Message(u8) {
        EchoReply      =  0,
        DstUnreachable =  3,
        Redirect       =  5,
        EchoRequest    =  8,
        TimeExceeded   = 11,
        ParamProblem   = 12,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Message::EchoReply => "echo reply",
            Message::DstUnreachable => "unreachable",
            Message::Redirect => "redirect",
            Message::EchoRequest => "echo request",
            Message::TimeExceeded => "time exceeded",
            Message::ParamProblem => "parameter problem",
            Message::Unknown(raw) => return write!(f, "type {}", raw),
        };
        f.write_str(name)
    }
}

enum_with_unknown! {
    /// The code of a destination unreachable message.
    pub enum DstUnreachable(u8) {
        NetUnreachable   =  0,
        HostUnreachable  =  1,
        ProtoUnreachable =  2,
        PortUnreachable  =  3,
        /// The datagram exceeds the next hop MTU but must not be fragmented.
        FragRequired     =  4,
        CommProhibited   = 13,
    }
}

impl fmt::Display for DstUnreachable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let what = match self {
            DstUnreachable::NetUnreachable => "network unreachable",
            DstUnreachable::HostUnreachable => "host unreachable",
            DstUnreachable::ProtoUnreachable => "protocol unreachable",
            DstUnreachable::PortUnreachable => "port unreachable",
            DstUnreachable::FragRequired => "fragmentation needed",
            DstUnreachable::CommProhibited => "administratively prohibited",
            DstUnreachable::Unknown(code) => return write!(f, "unreachable code {}", code),
        };
        f.write_str(what)
    }
}

enum_with_unknown! {
    /// The code of a redirect message.
    pub enum Redirect(u8) {
        Net  = 0,
        Host = 1,
    }
}

enum_with_unknown! {
    /// The code of a time exceeded message.
    pub enum TimeExceeded(u8) {
        /// The TTL reached zero in transit.
        TtlExpired  = 0,
        /// Not all fragments arrived in time.
        FragExpired = 1,
    }
}

byte_wrapper! {
    /// An ICMPv4 message, the fixed header followed by its data.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const TYPE:       usize = 0;
    pub(crate) const CODE:       usize = 1;
    pub(crate) const CHECKSUM:   Field = 2..4;
    /// Identifier and sequence number of echo messages, the MTU of errors, zero otherwise.
    pub(crate) const REST:       Field = 4..8;
    pub(crate) const ECHO_IDENT: Field = 4..6;
    pub(crate) const ECHO_SEQNO: Field = 6..8;
    pub(crate) const NEXT_MTU:   Field = 6..8;
}

/// Type, code, checksum and the four octets that depend on the type.
pub const HEADER_LEN: usize = field::REST.end;

impl icmpv4 {
    pub fn new_unchecked(buffer: &[u8]) -> &icmpv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut icmpv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// View `data` as a message if it holds at least the fixed header.
    pub fn new_checked(data: &[u8]) -> Result<&icmpv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut icmpv4> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    pub fn check_len(&self) -> Result<()> {
        match self.0.len() {
            len if len < HEADER_LEN => Err(Error::Truncated),
            _ => Ok(()),
        }
    }

    fn word(&self, field: Field) -> u16 {
        NetworkEndian::read_u16(&self.0[field])
    }

    fn set_word(&mut self, field: Field, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field], value)
    }

    pub fn msg_type(&self) -> Message {
        self.0[field::TYPE].into()
    }

    pub fn msg_code(&self) -> u8 {
        self.0[field::CODE]
    }

    pub fn checksum(&self) -> u16 {
        self.word(field::CHECKSUM)
    }

    /// Only meaningful for echo request and reply.
    pub fn echo_ident(&self) -> u16 {
        self.word(field::ECHO_IDENT)
    }

    /// Only meaningful for echo request and reply.
    pub fn echo_seq_no(&self) -> u16 {
        self.word(field::ECHO_SEQNO)
    }

    /// The MTU announced by a fragmentation needed message, RFC 1191.
    pub fn next_hop_mtu(&self) -> u16 {
        self.word(field::NEXT_MTU)
    }

    /// The checksum covers the whole message, data included.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0) == !0
    }

    pub fn set_msg_type(&mut self, value: Message) {
        self.0[field::TYPE] = value.into()
    }

    pub fn set_msg_code(&mut self, value: u8) {
        self.0[field::CODE] = value
    }

    pub fn set_checksum(&mut self, value: u16) {
        self.set_word(field::CHECKSUM, value)
    }

    pub fn set_echo_ident(&mut self, value: u16) {
        self.set_word(field::ECHO_IDENT, value)
    }

    pub fn set_echo_seq_no(&mut self, value: u16) {
        self.set_word(field::ECHO_SEQNO, value)
    }

    /// Store the MTU, the unused half before it is zeroed.
    pub fn set_next_hop_mtu(&mut self, value: u16) {
        self.0[field::REST].iter_mut().for_each(|octet| *octet = 0);
        self.set_word(field::NEXT_MTU, value)
    }

    /// Change the type of a received message, e.g. a request into its reply.
    ///
    /// The checksum is patched incrementally, type and code form one word of the sum.
    pub fn set_msg_type_fixup(&mut self, value: Message) {
        let word = field::TYPE..field::CODE + 1;
        let old = self.word(word.clone());
        self.set_msg_type(value);
        let new = self.word(word);
        let sum = checksum::fixup(self.checksum(), old, new);
        self.set_checksum(sum);
    }

    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let sum = !checksum::data(&self.0);
        self.set_checksum(sum)
    }

    /// Everything after the fixed header: echo data, or the quote of an error.
    pub fn data(&self) -> &[u8] {
        &self.0[HEADER_LEN..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.0[HEADER_LEN..]
    }
}

/// The fixed header of a message, decoded by type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    EchoRequest {
        ident:  u16,
        seq_no: u16,
    },
    EchoReply {
        ident:  u16,
        seq_no: u16,
    },
    DstUnreachable {
        reason: DstUnreachable,
        /// Zero unless the reason is `FragRequired`.
        next_hop_mtu: u16,
    },
    Redirect {
        reason: Redirect,
    },
    TimeExceeded {
        reason: TimeExceeded,
    },
    /// Parameter problems and unknown types.
    Other {
        msg_type: Message,
        code: u8,
    },
}

impl Repr {
    pub fn parse(packet: &icmpv4, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        if checksum.manual() && !packet.verify_checksum() {
            return Err(Error::WrongChecksum);
        }

        let code = packet.msg_code();
        let repr = match packet.msg_type() {
            Message::EchoRequest => Repr::EchoRequest {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
            },
            Message::EchoReply => Repr::EchoReply {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
            },
            Message::DstUnreachable => Repr::DstUnreachable {
                reason: code.into(),
                next_hop_mtu: packet.next_hop_mtu(),
            },
            Message::Redirect => Repr::Redirect { reason: code.into() },
            Message::TimeExceeded => Repr::TimeExceeded { reason: code.into() },
            msg_type => Repr::Other { msg_type, code },
        };
        Ok(repr)
    }

    /// Whether the message is about a datagram sent earlier, quoting its header.
    pub fn is_error(&self) -> bool {
        match self {
            Repr::DstUnreachable { .. } | Repr::Redirect { .. } | Repr::TimeExceeded { .. } => {
                true
            },
            _ => false,
        }
    }

    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    fn type_and_code(&self) -> (Message, u8) {
        match *self {
            Repr::EchoRequest { .. } => (Message::EchoRequest, 0),
            Repr::EchoReply { .. } => (Message::EchoReply, 0),
            Repr::DstUnreachable { reason, .. } => (Message::DstUnreachable, reason.into()),
            Repr::Redirect { reason } => (Message::Redirect, reason.into()),
            Repr::TimeExceeded { reason } => (Message::TimeExceeded, reason.into()),
            Repr::Other { msg_type, code } => (msg_type, code),
        }
    }

    /// Write the fixed header.
    ///
    /// The checksum covers the data as well, so a manual checksum needs the data in place
    /// behind the header already.
    pub fn emit(&self, packet: &mut icmpv4, checksum: Checksum) {
        let (msg_type, code) = self.type_and_code();
        packet.set_msg_type(msg_type);
        packet.set_msg_code(code);

        match *self {
            Repr::EchoRequest { ident, seq_no } | Repr::EchoReply { ident, seq_no } => {
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
            },
            Repr::DstUnreachable { next_hop_mtu, .. } => packet.set_next_hop_mtu(next_hop_mtu),
            _ => packet.set_next_hop_mtu(0),
        }

        match checksum {
            Checksum::Manual => packet.fill_checksum(),
            Checksum::Ignored => packet.set_checksum(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A ping with identifier 0x1234, sequence 0xabcd and four bytes of data.
    const PING: [u8; 12] = [
        0x08, 0x00, 0x8e, 0xfe, 0x12, 0x34, 0xab, 0xcd,
        0xaa, 0x00, 0x00, 0xff,
    ];

    #[test]
    fn ping_fields() {
        let packet = icmpv4::new_checked(&PING[..]).unwrap();
        assert_eq!(packet.msg_type(), Message::EchoRequest);
        assert_eq!(packet.checksum(), 0x8efe);
        assert_eq!(packet.data(), &PING[HEADER_LEN..]);
        assert_eq!(Repr::parse(packet, Checksum::Manual),
                   Ok(Repr::EchoRequest { ident: 0x1234, seq_no: 0xabcd }));
        assert!(!Repr::parse(packet, Checksum::Manual).unwrap().is_error());
    }

    #[test]
    fn ping_emitted() {
        let mut bytes = vec![0xa5; PING.len()];
        bytes[HEADER_LEN..].copy_from_slice(&PING[HEADER_LEN..]);
        let repr = Repr::EchoRequest { ident: 0x1234, seq_no: 0xabcd };
        repr.emit(icmpv4::new_unchecked_mut(&mut bytes), Checksum::Manual);
        assert_eq!(&bytes[..], &PING[..]);
    }

    #[test]
    fn reply_in_place() {
        let mut bytes = PING.to_vec();
        let packet = icmpv4::new_checked_mut(&mut bytes).unwrap();
        packet.set_msg_type_fixup(Message::EchoReply);
        assert!(packet.verify_checksum());
        assert_eq!(Repr::parse(packet, Checksum::Manual),
                   Ok(Repr::EchoReply { ident: 0x1234, seq_no: 0xabcd }));
    }

    #[test]
    fn fragmentation_needed() {
        let mut bytes = vec![0xff; HEADER_LEN];
        let repr = Repr::DstUnreachable {
            reason: DstUnreachable::FragRequired,
            next_hop_mtu: 1500,
        };
        repr.emit(icmpv4::new_unchecked_mut(&mut bytes), Checksum::Manual);
        assert_eq!(&bytes[..4], &[0x03, 0x04, 0xf7, 0x1f]);
        assert_eq!(&bytes[4..], &[0x00, 0x00, 0x05, 0xdc]);

        let parsed = Repr::parse(icmpv4::new_checked(&bytes).unwrap(), Checksum::Manual);
        assert_eq!(parsed, Ok(repr));
        assert!(repr.is_error());
    }

    #[test]
    fn corrupted() {
        let mut bytes = PING.to_vec();
        bytes[9] = 0x01;
        let packet = icmpv4::new_checked(&bytes).unwrap();
        assert_eq!(Repr::parse(packet, Checksum::Manual), Err(Error::WrongChecksum));
        assert_eq!(icmpv4::new_checked(&PING[..7]), Err(Error::Truncated));
    }
}
