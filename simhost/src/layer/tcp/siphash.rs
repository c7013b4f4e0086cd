//! Initial sequence number generation.
//!
//! Every handshake attempt wants an unpredictable sequence number. The number is drawn from a
//! keyed hash function (SipHash-2-4) over the four tuple and a per-generator counter, so two
//! attempts of the same conversation never repeat a number. Hash function SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use std::sync::atomic::{AtomicU64, Ordering};

use super::session::FourTuple;
use crate::wire::{IpAddress, Ipv6Address, TcpSeqNumber};

/// An initial sequence number generator based on SipHash-2-4.
///
/// > ISN = SipHash-2-4(secretkey, localip, localport, remoteip, remoteport, counter)
#[derive(Debug)]
pub struct IsnGenerator {
    keys: (u64, u64),
    counter: AtomicU64,
}

/// The SipHash initialization constants, "somepseudorandomlygeneratedbytes" read big endian.
const IV: [u64; 4] = [
    0x736f_6d65_7073_6575,
    0x646f_7261_6e64_6f6d,
    0x6c79_6765_6e65_7261,
    0x7465_6462_7974_6573,
];

/// The four state words `v0` to `v3`.
struct Sip([u64; 4]);

impl IsnGenerator {
    /// A generator keyed from the process random state of `std`.
    ///
    /// The key halves are the hashes of `0` and `1` under one freshly seeded hasher.
    pub fn from_std_hash() -> Self {
        use std::hash::{BuildHasher, Hasher};
        use std::collections::hash_map::RandomState;

        let state = RandomState::new();
        let tag = |word: u64| {
            let mut hasher = state.build_hasher();
            hasher.write_u64(word);
            hasher.finish()
        };
        Self::from_key(tag(0), tag(1))
    }

    /// A generator with a fixed key, its numbers are reproducible.
    pub fn from_key(a: u64, b: u64) -> Self {
        IsnGenerator {
            keys: (a, b),
            counter: AtomicU64::new(0),
        }
    }

    /// Draw the next initial sequence number for a connection.
    ///
    /// An unspecified address hashes like the all-zero IPv6 address.
    pub fn next(&self, connection: FourTuple) -> TcpSeqNumber {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut sip = Sip::new(self.keys.0, self.keys.1);

        let (local_hi, local_lo) = Self::address_words(connection.local);
        let (remote_hi, remote_lo) = Self::address_words(connection.remote);
        // Ports in the low bytes, the 44 message bytes in the top byte.
        let ports = u64::from(connection.local_port)
            | u64::from(connection.remote_port) << 16
            | 44_u64 << 56;
        for word in [local_hi, local_lo, remote_hi, remote_lo, nonce, ports].iter() {
            sip.absorb(*word);
        }

        TcpSeqNumber(sip.finish() as i32)
    }

    /// IPv4 addresses hash as their IPv4-mapped IPv6 form.
    fn address_words(addr: IpAddress) -> (u64, u64) {
        let bits = match addr {
            IpAddress::Ipv4(addr) => 0xffff_0000_0000 | u128::from(u32::from_be_bytes(addr.0)),
            IpAddress::Ipv6(Ipv6Address(octets)) => u128::from_be_bytes(octets),
            IpAddress::Unspecified => 0,
        };
        ((bits >> 64) as u64, bits as u64)
    }
}

impl Sip {
    const COMPRESSION_ROUNDS: usize = 2;
    const FINAL_ROUNDS: usize = 4;

    fn new(k0: u64, k1: u64) -> Self {
        Sip([IV[0] ^ k0, IV[1] ^ k1, IV[2] ^ k0, IV[3] ^ k1])
    }

    fn round(&mut self) {
        let [mut v0, mut v1, mut v2, mut v3] = self.0;
        v0 = v0.wrapping_add(v1);
        v2 = v2.wrapping_add(v3);
        v1 = v1.rotate_left(13) ^ v0;
        v3 = v3.rotate_left(16) ^ v2;
        v0 = v0.rotate_left(32);

        v2 = v2.wrapping_add(v1);
        v0 = v0.wrapping_add(v3);
        v1 = v1.rotate_left(17) ^ v2;
        v3 = v3.rotate_left(21) ^ v0;
        v2 = v2.rotate_left(32);
        self.0 = [v0, v1, v2, v3];
    }

    /// Mix in one message word. The caller supplies the length word last.
    fn absorb(&mut self, m: u64) {
        self.0[3] ^= m;
        for _ in 0..Self::COMPRESSION_ROUNDS {
            self.round();
        }
        self.0[0] ^= m;
    }

    fn finish(mut self) -> u64 {
        self.0[2] ^= 0xff;
        for _ in 0..Self::FINAL_ROUNDS {
            self.round();
        }
        self.0.iter().fold(0, |tag, v| tag ^ v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The example of the SipHash paper, Appendix A: key 00..0f, message 00..0e.
    #[test]
    fn paper_example() {
        let mut sip = Sip::new(0x0706_0504_0302_0100, 0x0f0e_0d0c_0b0a_0908);
        sip.absorb(0x0706_0504_0302_0100);
        sip.absorb(0x0f0e_0d0c_0b0a_0908);
        assert_eq!(sip.finish(), 0xa129_ca61_49be_45e5);
    }

    #[test]
    fn attempts_differ() {
        let isn = IsnGenerator::from_key(1, 2);
        let tuple = FourTuple {
            local: IpAddress::v4(10, 0, 0, 1),
            remote: IpAddress::v4(10, 0, 0, 2),
            local_port: 40000,
            remote_port: 80,
        };
        let first = isn.next(tuple);
        let second = isn.next(tuple);
        assert_ne!(first, second);

        // Same key, same sequence.
        let again = IsnGenerator::from_key(1, 2);
        assert_eq!(again.next(tuple), first);
    }
}
