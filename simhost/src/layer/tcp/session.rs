use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::time::Tick;
use crate::wire::{EthernetAddress, IpAddress, IpProtocol, TcpFlags, TcpSeqNumber};

/// The options of every data segment, NOP NOP Timestamp.
const DATA_OPTIONS_LEN: usize = 12;

/// The addresses and ports identifying a conversation, seen from this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FourTuple {
    /// The address of this host.
    pub local: IpAddress,
    /// The address of the peer.
    pub remote: IpAddress,
    /// The port of this host.
    pub local_port: u16,
    /// The port of the peer.
    pub remote_port: u16,
}

/// The control block of one conversation.
///
/// `flags` always holds the flags this host last sent, `peer_flags` those it last received. A
/// block without a `touched` tick is free.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Scb {
    pub local: IpAddress,
    pub remote: IpAddress,
    pub local_port: u16,
    pub remote_port: u16,
    pub local_hw: EthernetAddress,
    pub remote_hw: EthernetAddress,
    /// The next sequence number to send.
    pub seq: TcpSeqNumber,
    /// The next sequence number expected from the peer.
    pub ack: TcpSeqNumber,
    pub flags: TcpFlags,
    pub peer_flags: TcpFlags,
    /// The advertised receive window.
    pub window: u16,
    pub mtu: usize,
    pub ttl: u8,
    /// The identification of the next IPv4 datagram.
    pub ident: u16,
    /// Whether the don't-fragment bit is left clear.
    pub fragment: bool,
    /// The last tick the session saw activity.
    pub touched: Option<Tick>,
    pub protocol: IpProtocol,
    /// Outgoing data, or `None` to send `payload_len` bytes of filler.
    pub payload: Option<Vec<u8>>,
    pub payload_len: usize,
    /// The data of the last segment received.
    pub received: Vec<u8>,
    /// The maximum segment size the peer advertised in its handshake.
    pub peer_mss: Option<u16>,
    /// The sequence number of echo requests.
    pub echo_seq: u16,
}

impl Scb {
    /// The identifying addresses and ports of the session.
    pub fn tuple(&self) -> FourTuple {
        FourTuple {
            local: self.local,
            remote: self.remote,
            local_port: self.local_port,
            remote_port: self.remote_port,
        }
    }

    /// Take over the addresses and ports of `tuple`.
    pub fn set_tuple(&mut self, tuple: FourTuple) {
        self.local = tuple.local;
        self.remote = tuple.remote;
        self.local_port = tuple.local_port;
        self.remote_port = tuple.remote_port;
    }

    /// Whether the session was active within the last `timeout` ticks.
    pub fn is_live(&self, now: Tick, timeout: u64) -> bool {
        self.touched.map_or(false, |touched| !now.is_expired(touched, timeout))
    }

    /// The number of data bytes the next data segment carries.
    ///
    /// A TCP segment is clamped so that its options and data fit the segment size the peer
    /// accepts, but always carries at least one byte.
    pub fn segment_len(&self) -> usize {
        let len = self.payload.as_ref().map_or(self.payload_len, Vec::len);
        match (self.protocol, self.peer_mss) {
            (IpProtocol::Tcp, Some(mss)) => {
                let room = usize::from(mss).saturating_sub(DATA_OPTIONS_LEN).max(1);
                len.min(room)
            },
            _ => len,
        }
    }
}

impl Default for Scb {
    fn default() -> Self {
        Scb {
            local: IpAddress::Unspecified,
            remote: IpAddress::Unspecified,
            local_port: 0,
            remote_port: 0,
            local_hw: EthernetAddress::UNSPECIFIED,
            remote_hw: EthernetAddress::UNSPECIFIED,
            seq: TcpSeqNumber::default(),
            ack: TcpSeqNumber::default(),
            flags: TcpFlags::default(),
            peer_flags: TcpFlags::default(),
            window: 0,
            mtu: 1500,
            ttl: 64,
            ident: 0,
            fragment: false,
            touched: None,
            protocol: IpProtocol::Tcp,
            payload: None,
            payload_len: 0,
            received: Vec::new(),
            peer_mss: None,
            echo_seq: 0,
        }
    }
}

/// A fixed number of inbound sessions.
///
/// Lookup is a linear scan and the index order is the allocation priority. The table never
/// grows, a slot is reused once its session was idle for longer than the timeout.
#[derive(Clone, Debug)]
pub struct SessionTable {
    slots: Vec<Scb>,
    timeout: u64,
}

impl SessionTable {
    /// The default number of slots.
    pub const CAPACITY: usize = 16;

    /// Create a table with the default capacity.
    pub fn new(timeout: u64) -> Self {
        Self::with_capacity(Self::CAPACITY, timeout)
    }

    /// Create a table with `capacity` slots.
    pub fn with_capacity(capacity: usize, timeout: u64) -> Self {
        SessionTable {
            slots: vec![Scb::default(); capacity],
            timeout,
        }
    }

    /// The idle time after which a slot is free again.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    /// The number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Find the live session of a conversation.
    pub fn find(&self, tuple: &FourTuple, now: Tick) -> Option<usize> {
        self.slots.iter().position(|scb| scb.is_live(now, self.timeout) && scb.tuple() == *tuple)
    }

    /// Find the session a segment belongs to, allocating one for a `syn`.
    ///
    /// Only a SYN may allocate: it gets the live session of the conversation if one exists,
    /// otherwise the first free or expired slot is reset to the block `init` creates. Any other
    /// segment only ever matches a live session.
    pub fn find_or_allocate<F>(&mut self, tuple: FourTuple, syn: bool, now: Tick, init: F)
        -> Option<usize>
        where F: FnOnce() -> Scb
    {
        if let Some(idx) = self.find(&tuple, now) {
            return Some(idx);
        }

        if !syn {
            return None;
        }

        let timeout = self.timeout;
        let idx = self.slots.iter().position(|scb| !scb.is_live(now, timeout))?;
        let slot = &mut self.slots[idx];
        *slot = init();
        slot.set_tuple(tuple);
        slot.touched = Some(now);
        Some(idx)
    }

    /// Clear a slot.
    pub fn free(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            *slot = Scb::default();
        }
    }

    /// The block in slot `idx`, free or not.
    pub fn get(&self, idx: usize) -> Option<&Scb> {
        self.slots.get(idx)
    }

    /// Mutable access to slot `idx`.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Scb> {
        self.slots.get_mut(idx)
    }

    /// Iterate over the live sessions.
    pub fn live(&self, now: Tick) -> impl Iterator<Item=&Scb> + '_ {
        let timeout = self.timeout;
        self.slots.iter().filter(move |scb| scb.is_live(now, timeout))
    }
}

/// The claim of the host's own outbound connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Claim {
    pub tuple: FourTuple,
    pub protocol: IpProtocol,
    pub touched: Tick,
}

/// How an inbound segment relates to the own outbound connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
    /// It belongs to some other conversation.
    None,
    /// It is an answer for the active outbound connection.
    Fresh,
    /// It matches an outbound connection that went quiet.
    Stale,
}

/// The slot of the single outbound connection of a host.
///
/// Shared between the thread driving the connection and the thread dispatching inbound frames,
/// which routes answers for it to the application.
#[derive(Debug, Default)]
pub struct OwnSession {
    claim: Mutex<Option<Claim>>,
}

impl OwnSession {
    /// Mark a conversation as the outbound connection.
    pub fn claim(&self, tuple: FourTuple, protocol: IpProtocol, now: Tick) {
        *self.lock() = Some(Claim { tuple, protocol, touched: now });
    }

    /// Record activity on the outbound connection.
    pub fn refresh(&self, now: Tick) {
        if let Some(claim) = self.lock().as_mut() {
            claim.touched = now;
        }
    }

    /// Give up the outbound connection.
    pub fn release(&self) {
        *self.lock() = None;
    }

    /// The current claim, if a connection is open.
    pub fn current(&self) -> Option<Claim> {
        *self.lock()
    }

    /// Check an inbound segment of conversation `tuple` against the outbound connection.
    ///
    /// The local address is not compared, an answer may arrive for any address of the host.
    pub fn conflict(&self, tuple: &FourTuple, protocol: IpProtocol, now: Tick, timeout: u64)
        -> Conflict
    {
        let claim = match *self.lock() {
            Some(claim) => claim,
            None => return Conflict::None,
        };

        let matches = claim.protocol == protocol
            && claim.tuple.remote == tuple.remote
            && claim.tuple.local_port == tuple.local_port
            && claim.tuple.remote_port == tuple.remote_port;
        if !matches {
            Conflict::None
        } else if now.is_expired(claim.touched, timeout) {
            Conflict::Stale
        } else {
            Conflict::Fresh
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Claim>> {
        self.claim.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn tuple(remote_port: u16) -> FourTuple {
        FourTuple {
            local: IpAddress::v4(10, 0, 0, 1),
            remote: IpAddress::v4(10, 0, 0, 2),
            local_port: 80,
            remote_port,
        }
    }

    fn fresh() -> Scb {
        Scb { seq: TcpSeqNumber(1000), ..Scb::default() }
    }

    #[test]
    fn syn_allocates_lowest_free() {
        let mut table = SessionTable::new(120);
        assert_eq!(table.find_or_allocate(tuple(1), true, Tick(5), fresh), Some(0));
        assert_eq!(table.find_or_allocate(tuple(2), true, Tick(5), fresh), Some(1));
        assert_eq!(table.get(1).unwrap().touched, Some(Tick(5)));
        assert_eq!(table.get(1).unwrap().remote_port, 2);

        table.free(0);
        assert_eq!(table.find_or_allocate(tuple(3), true, Tick(6), fresh), Some(0));
    }

    #[test]
    fn non_syn_needs_live_session() {
        let mut table = SessionTable::new(120);
        assert_eq!(table.find_or_allocate(tuple(1), false, Tick(0), fresh), None);
        table.find_or_allocate(tuple(1), true, Tick(0), fresh);
        assert_eq!(table.find_or_allocate(tuple(1), false, Tick(120), fresh), Some(0));
        assert_eq!(table.find_or_allocate(tuple(1), false, Tick(121), fresh), None);
    }

    #[test]
    fn duplicate_syn_keeps_session() {
        let mut table = SessionTable::new(120);
        table.find_or_allocate(tuple(1), true, Tick(0), fresh);
        table.get_mut(0).unwrap().seq = TcpSeqNumber(7);

        assert_eq!(table.find_or_allocate(tuple(1), true, Tick(1), fresh), Some(0));
        assert_eq!(table.get(0).unwrap().seq, TcpSeqNumber(7));
    }

    #[test]
    fn exhausted() {
        let mut table = SessionTable::with_capacity(2, 120);
        table.find_or_allocate(tuple(1), true, Tick(0), fresh);
        table.find_or_allocate(tuple(2), true, Tick(0), fresh);
        assert_eq!(table.find_or_allocate(tuple(3), true, Tick(100), fresh), None);
        // Expired slots are reused.
        assert_eq!(table.find_or_allocate(tuple(3), true, Tick(121), fresh), Some(0));
    }

    #[test]
    fn freed_slot_is_not_live() {
        let mut table = SessionTable::new(120);
        table.find_or_allocate(tuple(1), true, Tick(0), fresh);
        table.free(0);
        assert_eq!(table.get(0).unwrap().touched, None);
        assert_eq!(table.live(Tick(0)).count(), 0);
    }

    #[test]
    fn segment_len_clamped() {
        let scb = Scb { payload: Some(vec![0; 3000]), peer_mss: Some(1460), ..Scb::default() };
        assert_eq!(scb.segment_len(), 1448);
        let filler = Scb { payload_len: 56, ..Scb::default() };
        assert_eq!(filler.segment_len(), 56);
        let tiny = Scb { payload_len: 56, peer_mss: Some(8), ..Scb::default() };
        assert_eq!(tiny.segment_len(), 1);
        let udp = Scb { protocol: IpProtocol::Udp, peer_mss: Some(8), ..filler };
        assert_eq!(udp.segment_len(), 56);
    }

    #[test]
    fn own_session_conflicts() {
        let own = OwnSession::default();
        let answer = FourTuple { local: IpAddress::v4(10, 0, 0, 9), ..tuple(1) };
        assert_eq!(own.conflict(&answer, IpProtocol::Tcp, Tick(0), 120), Conflict::None);

        own.claim(tuple(1), IpProtocol::Tcp, Tick(0));
        assert_eq!(own.conflict(&answer, IpProtocol::Tcp, Tick(10), 120), Conflict::Fresh);
        assert_eq!(own.conflict(&answer, IpProtocol::Udp, Tick(10), 120), Conflict::None);
        assert_eq!(own.conflict(&tuple(2), IpProtocol::Tcp, Tick(10), 120), Conflict::None);
        assert_eq!(own.conflict(&answer, IpProtocol::Tcp, Tick(200), 120), Conflict::Stale);

        own.refresh(Tick(190));
        assert_eq!(own.conflict(&answer, IpProtocol::Tcp, Tick(200), 120), Conflict::Fresh);
        own.release();
        assert_eq!(own.conflict(&answer, IpProtocol::Tcp, Tick(200), 120), Conflict::None);
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Syn(u16),
        Segment(u16),
        Free(usize),
        Tick(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u16..8).prop_map(Op::Syn),
            (0u16..8).prop_map(Op::Segment),
            (0usize..4).prop_map(Op::Free),
            (0u64..80).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn live_sessions_are_unique(ops in proptest::collection::vec(op(), 1..200)) {
            let mut table = SessionTable::with_capacity(4, 100);
            let mut now = Tick(0);
            for op in ops {
                match op {
                    Op::Syn(port) => { table.find_or_allocate(tuple(port), true, now, fresh); },
                    Op::Segment(port) => {
                        table.find_or_allocate(tuple(port), false, now, fresh);
                    },
                    Op::Free(idx) => table.free(idx),
                    Op::Tick(by) => now += by,
                }

                let live: Vec<_> = table.live(now).map(Scb::tuple).collect();
                for (i, a) in live.iter().enumerate() {
                    prop_assert!(live[i + 1..].iter().all(|b| b != a));
                }
            }
        }
    }
}
