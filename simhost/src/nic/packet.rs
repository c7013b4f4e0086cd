use core::fmt;
use core::ops::{Deref, DerefMut};

/// One Ethernet frame, owned.
///
/// Ownership of a packet passes to whatever queue it is pushed onto and the consumer of that queue
/// drops it after transmission. There is no explicit free.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    data: Vec<u8>,
}

/// The allocation of a packet buffer failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[error("can not allocate a packet of {len} bytes")]
pub struct AllocError {
    /// The requested length.
    pub len: usize,
}

impl Packet {
    /// The largest frame a packet may hold: an Ethernet header and a maximal IP datagram.
    pub const MAX_LEN: usize = 14 + 65535;

    /// Allocate a zeroed packet of `len` bytes.
    ///
    /// Fails instead of aborting when the memory is not available or the length exceeds what a
    /// frame could ever carry.
    pub fn alloc(len: usize) -> Result<Self, AllocError> {
        if len > Self::MAX_LEN {
            return Err(AllocError { len });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| AllocError { len })?;
        data.resize(len, 0);
        Ok(Packet { data })
    }

    /// Allocate a packet holding a copy of `bytes`.
    pub fn copy_from(bytes: &[u8]) -> Result<Self, AllocError> {
        let mut packet = Packet::alloc(bytes.len())?;
        packet.data.copy_from_slice(bytes);
        Ok(packet)
    }

    /// Wrap an existing buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Packet { data }
    }

    /// The frame bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The frame bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Shorten the frame, keeping the first `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len)
    }

    /// Unwrap the buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Packet {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Packet {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Packet({} bytes:", self.data.len())?;
        for byte in self.data.iter().take(64) {
            write!(f, " {:02x}", byte)?;
        }
        if self.data.len() > 64 {
            write!(f, " ..")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn alloc_zeroed() {
        let packet = Packet::alloc(60).unwrap();
        assert_eq!(packet.len(), 60);
        assert!(packet.iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_too_large() {
        let len = Packet::MAX_LEN + 1;
        assert_eq!(Packet::alloc(len), Err(AllocError { len }));
    }

    #[test]
    fn debug_is_bounded() {
        let packet = Packet::alloc(100).unwrap();
        let text = format!("{:?}", packet);
        assert!(text.starts_with("Packet(100 bytes:"));
        assert!(text.ends_with(" ..)"));
    }
}
