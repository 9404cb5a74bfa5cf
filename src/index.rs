use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Index into the global (distributed) data.
///
/// The trie is parameterized by the width of its global indices so that
/// suffix and LCP arrays can be stored with 5 bytes per entry instead of 8.
/// All arithmetic happens in 64 bits; implementations only define the
/// conversions and the on-disk width.
pub trait IndexType:
    Pod + Copy + Eq + Ord + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Bytes one value occupies in raw little-endian array files.
    const WIDTH: usize;

    fn from_u64(value: u64) -> Self;
    fn to_u64(self) -> u64;

    /// Decodes one value from exactly `WIDTH` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Appends the `WIDTH`-byte little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

impl IndexType for u64 {
    const WIDTH: usize = 8;

    #[inline(always)]
    fn from_u64(value: u64) -> Self {
        value
    }

    #[inline(always)]
    fn to_u64(self) -> u64 {
        self
    }

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut value = 0;
        for (shift, byte) in bytes.iter().enumerate() {
            value |= u64::from(*byte) << (shift * 8);
        }
        value
    }

    #[inline]
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// 40-bit unsigned integer stored in five little-endian bytes.
///
/// Keeps suffix and LCP arrays for texts of up to a terabyte at 5/8 of the
/// 64-bit footprint, both on disk and in memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Uint40([u8; 5]);

impl Uint40 {
    pub const MAX: u64 = (1 << 40) - 1;

    #[inline(always)]
    pub fn new(value: u64) -> Self {
        debug_assert!(value <= Self::MAX);
        let bytes = value.to_le_bytes();
        Self([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]])
    }

    #[inline(always)]
    pub fn get(self) -> u64 {
        let Self([b0, b1, b2, b3, b4]) = self;
        u64::from_le_bytes([b0, b1, b2, b3, b4, 0, 0, 0])
    }
}

impl IndexType for Uint40 {
    const WIDTH: usize = 5;

    #[inline(always)]
    fn from_u64(value: u64) -> Self {
        Self::new(value)
    }

    #[inline(always)]
    fn to_u64(self) -> u64 {
        self.get()
    }

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        Self([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]])
    }

    #[inline]
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl PartialOrd for Uint40 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Uint40 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.get().cmp(&other.get())
    }
}

impl From<u64> for Uint40 {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<Uint40> for u64 {
    fn from(value: Uint40) -> Self {
        value.get()
    }
}

impl fmt::Debug for Uint40 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Display for Uint40 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
