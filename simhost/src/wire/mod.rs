/*! Packet layouts and their header representations.

Every protocol comes in two shapes. The lowercase unsized types such as [`ethernet_frame`] or
[`tcp_segment`] wrap a byte slice in place and read or write single fields of it. The `Repr`
types such as [`ArpRepr`] or [`Ipv4Repr`] hold a decoded header as plain values, produced by
`Repr::parse` from a checked view and written back with `Repr::emit`.

[`ethernet_frame`]: struct.ethernet_frame.html
[`tcp_segment`]: struct.tcp_segment.html
[`ArpRepr`]: struct.ArpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html

Once `check_len` accepted a buffer, the accessors of a view do not panic until a field that
describes the layout, a header or total length, is changed. `new_checked` performs the check and
must be used on anything received. Buffers that are about to be filled are viewed with
`new_unchecked_mut` instead, their stale content says nothing about the packet to come.

`Repr::parse` does not panic. `Repr::emit` does not panic when the buffer has at least the length
reported by `buffer_len` (or `header_len` for layers that only describe their header).

All checksums are the internet checksum of RFC 1071, see [`checksum`]. Fields rewritten in place,
the time to live or the ICMP type, update the checksum incrementally (RFC 1624).

[`checksum`]: checksum/index.html

# Examples

Write an IPv4 header and read it back:

```rust
use simhost::wire::*;
let repr = Ipv4Repr {
    src_addr:    Ipv4Address::new(10, 0, 0, 1),
    dst_addr:    Ipv4Address::new(10, 0, 0, 2),
    protocol:    IpProtocol::Tcp,
    payload_len: 10,
    hop_limit:   64,
    ident:       1,
    dont_frag:   true,
    more_frags:  false,
    frag_offset: 0,
};
let mut buffer = vec![0; repr.buffer_len() + repr.payload_len];
repr.emit(ipv4_packet::new_unchecked_mut(&mut buffer), Checksum::Manual);

let packet = ipv4_packet::new_checked(&buffer).expect("truncated packet");
let parsed = Ipv4Repr::parse(packet, Checksum::Manual).expect("malformed packet");
assert_eq!(repr, parsed);
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD

// Field accessors are documented where their meaning is not obvious from the name.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod ethernet;
mod error;
mod arp;
mod ip;
mod ipv4;
mod ipv6;
mod icmpv4;
mod udp;
mod tcp;

/// Whether checksums are computed on emit and verified on parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    Manual,
    /// Left zero when emitting and not looked at when parsing.
    Ignored,
}

impl Checksum {
    pub fn manual(self) -> bool {
        match self {
            Checksum::Manual => true,
            Checksum::Ignored => false,
        }
    }
}

pub use self::ip::checksum;

pub use self::ethernet::{
    ethernet as ethernet_frame,
    EtherType as EthernetProtocol,
    Address as EthernetAddress,
    ParseAddressError as ParseEthernetAddressError,
    Repr as EthernetRepr,
    HEADER_LEN as ETHERNET_HEADER_LEN};

pub use self::error::{
    Error,
    Result};

pub use self::arp::{
    arp as arp_packet,
    Hardware as ArpHardware,
    Operation as ArpOperation,
    Repr as ArpRepr,
    PACKET_LEN as ARP_PACKET_LEN};

pub use self::ip::{
    Protocol as IpProtocol,
    Address as IpAddress};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Repr as Ipv4Repr,
    Cidr as Ipv4Cidr,
    ParseCidrError as ParseIpv4CidrError,
    MIN_MTU as IPV4_MIN_MTU,
    HEADER_LEN as IPV4_HEADER_LEN};

pub use self::ipv6::{
    ipv6 as ipv6_packet,
    Address as Ipv6Address,
    Repr as Ipv6Repr,
    Cidr as Ipv6Cidr,
    HEADER_LEN as IPV6_HEADER_LEN};

pub use self::icmpv4::{
    icmpv4 as icmpv4_packet,
    Message as Icmpv4Message,
    DstUnreachable as Icmpv4DstUnreachable,
    Redirect as Icmpv4Redirect,
    TimeExceeded as Icmpv4TimeExceeded,
    Repr as Icmpv4Repr,
    HEADER_LEN as ICMPV4_HEADER_LEN};

pub use self::udp::{
    udp as udp_packet,
    Checksum as UdpChecksum,
    Repr as UdpRepr,
    HEADER_LEN as UDP_HEADER_LEN};

pub use self::tcp::{
    tcp as tcp_segment,
    Checksum as TcpChecksum,
    SeqNumber as TcpSeqNumber,
    TcpOption,
    Repr as TcpRepr,
    Flags as TcpFlags,
    HEADER_LEN as TCP_HEADER_LEN};
