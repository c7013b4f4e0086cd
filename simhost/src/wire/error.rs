use core::fmt;

/// The error type for parsing and emitting wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// A packet could not be parsed because it was shorter than assumed.
    ///
    /// The buffer may be shorter than the minimum header, or a length field claims more data
    /// than was received.
    Truncated,

    /// A packet had an incorrect checksum.
    WrongChecksum,

    /// A packet could not be recognized.
    ///
    /// E.g. an Ethernet frame with an unknown EtherType or an ARP packet for a hardware type
    /// other than Ethernet.
    Unrecognized,

    /// A packet was recognized but was self-contradictory.
    ///
    /// Examples: a TCP header whose data offset points behind the end of the segment; a UDP
    /// packet claiming to contain less than 8 bytes of data.
    Malformed,

    /// Handling the packet depends on a feature this stack does not implement.
    ///
    /// Similar to `Unrecognized` but in contrast we know that our implementation is incomplete,
    /// for example IPv4 header options or IPv6 extension headers.
    Unsupported,
}

/// The result type for wire operations.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Unsupported   => write!(f, "unsupported option"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for Error { }
