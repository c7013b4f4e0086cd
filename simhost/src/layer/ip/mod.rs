//! The IP layer.
//!
//! Parses inbound frames into a [`Datagram`], writes outbound headers through an
//! [`AddressFamily`] chosen by the session's addresses, and splits or rejoins IPv4 fragments.
//!
//! [`Datagram`]: struct.Datagram.html
//! [`AddressFamily`]: trait.AddressFamily.html
mod family;
mod fragment;

use crate::wire::{ethernet_frame, Checksum, EthernetProtocol, EthernetRepr, IpAddress, IpProtocol};
use crate::wire::{Error, Result, ETHERNET_HEADER_LEN};

pub use self::family::{family, AddressFamily, IpHeader, Ipv4Family, Ipv6Family};
pub use self::fragment::{fragment, Reassembly};

/// The parsed network layer view of an inbound frame.
///
/// Borrows the transport payload from the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Datagram<'a> {
    /// The link layer header.
    pub ethernet: EthernetRepr,
    /// The source address.
    pub src_addr: IpAddress,
    /// The destination address.
    pub dst_addr: IpAddress,
    /// The transported protocol.
    pub protocol: IpProtocol,
    /// Time to live, or the hop limit for IPv6.
    pub hop_limit: u8,
    /// The identification of an IPv4 datagram, zero for IPv6.
    pub ident: u16,
    /// The don't-fragment flag of an IPv4 datagram.
    pub dont_frag: bool,
    /// Whether this is only one fragment of a larger datagram.
    pub is_fragment: bool,
    /// The length of the network header.
    pub header_len: usize,
    /// The total length of the datagram, header included.
    pub total_len: usize,
    /// The transport header and data.
    pub payload: &'a [u8],
}

impl<'a> Datagram<'a> {
    /// Parse an Ethernet frame carrying IPv4 or IPv6.
    ///
    /// Frames of any other ethertype are `Unrecognized`.
    pub fn parse(frame: &'a [u8], checksum: Checksum) -> Result<Self> {
        let ethernet = ethernet_frame::new_checked(frame)?;
        let repr = EthernetRepr::parse(ethernet)?;
        let family = match repr.ethertype {
            EthernetProtocol::Ipv4 => &family::IPV4 as &dyn AddressFamily,
            EthernetProtocol::Ipv6 => &family::IPV6 as &dyn AddressFamily,
            _ => return Err(Error::Unrecognized),
        };
        family.parse(repr, &frame[ETHERNET_HEADER_LEN..], checksum)
    }
}
