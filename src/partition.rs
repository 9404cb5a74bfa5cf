use std::marker::PhantomData;
use std::sync::Arc;

use crate::index::IndexType;

/// PE rank and local offset of one element of a distributed array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PePosition {
    pub pe: usize,
    pub position: usize,
}

/// One PE's slice of a distributed 1-D array.
///
/// A partition knows more than its local data: it maps any global index to
/// the PE owning it and the offset inside that PE's slice. With `p` PEs and
/// `n` elements, every PE owns `n / p` elements and the last PE additionally
/// owns the remainder. The local data may carry trailing padding past the
/// slice (for the text partition, so short reads never cross a slice
/// boundary).
#[derive(Clone)]
pub struct Partition<T, G> {
    global_size: u64,
    local_size: usize,
    slice_size: u64,
    pes: usize,
    data: Arc<Vec<T>>,
    _index: PhantomData<G>,
}

impl<T, G: IndexType> Partition<T, G> {
    pub fn new(global_size: u64, local_size: usize, pes: usize, data: Vec<T>) -> Self {
        assert!(pes > 0);
        assert!(global_size >= pes as u64);
        assert!(data.len() >= local_size);
        Self {
            global_size,
            local_size,
            slice_size: global_size / pes as u64,
            pes,
            data: Arc::new(data),
            _index: PhantomData,
        }
    }

    /// PE owning the global index.
    #[inline(always)]
    pub fn pe(&self, index: G) -> usize {
        (self.pes - 1).min((index.to_u64() / self.slice_size) as usize)
    }

    /// PE owning the global index and the offset inside that PE's slice.
    #[inline(always)]
    pub fn pe_and_local(&self, index: G) -> PePosition {
        let pe = self.pe(index);
        PePosition { pe, position: (index.to_u64() - pe as u64 * self.slice_size) as usize }
    }

    #[inline(always)]
    pub fn global_size(&self) -> u64 {
        self.global_size
    }

    /// Elements of the local slice, excluding padding.
    #[inline(always)]
    pub fn local_size(&self) -> usize {
        self.local_size
    }

    #[inline(always)]
    pub fn pes(&self) -> usize {
        self.pes
    }

    /// The local slice without its padding.
    #[inline(always)]
    pub fn local(&self) -> &[T] {
        &self.data[..self.local_size]
    }

    /// The local slice including its padding.
    #[inline(always)]
    pub fn padded(&self) -> &[T] {
        &self.data
    }

    /// Shared handle onto the local data, for one-sided windows.
    pub(crate) fn shared(&self) -> Arc<Vec<T>> {
        self.data.clone()
    }
}

impl<T, G> std::ops::Index<usize> for Partition<T, G> {
    type Output = T;

    #[inline(always)]
    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(global: u64, pes: usize) -> Partition<u8, u64> {
        // Mapping tests never touch the data.
        Partition::new(global, 0, pes, Vec::new())
    }

    #[test]
    fn maps_global_indices_to_pes() {
        let part = partition(100, 4);
        assert_eq!(part.pe(0), 0);
        assert_eq!(part.pe(24), 0);
        assert_eq!(part.pe(25), 1);
        assert_eq!(part.pe(99), 3);
    }

    #[test]
    fn last_pe_takes_the_remainder() {
        let part = partition(103, 4);
        // Slices of 25; indices 100..103 spill onto the last PE.
        assert_eq!(part.pe(99), 3);
        assert_eq!(part.pe(100), 3);
        assert_eq!(part.pe(102), 3);
        assert_eq!(part.pe_and_local(102), PePosition { pe: 3, position: 27 });
    }

    #[test]
    fn local_offsets_restart_at_every_slice() {
        let part = partition(100, 4);
        assert_eq!(part.pe_and_local(0), PePosition { pe: 0, position: 0 });
        assert_eq!(part.pe_and_local(25), PePosition { pe: 1, position: 0 });
        assert_eq!(part.pe_and_local(26), PePosition { pe: 1, position: 1 });
        assert_eq!(part.pe_and_local(75), PePosition { pe: 3, position: 0 });
    }

    #[test]
    fn mapping_is_monotonic() {
        for pes in 1..9 {
            let part = partition(57, pes);
            let mut previous = 0;
            for index in 0..57u64 {
                let pe = part.pe(index);
                assert!(pe >= previous);
                assert!(pe < pes);
                previous = pe;
            }
        }
    }

    #[test]
    fn local_excludes_padding() {
        let part: Partition<u8, u64> = Partition::new(8, 4, 2, vec![1, 2, 3, 4, 0, 0]);
        assert_eq!(part.local(), &[1, 2, 3, 4]);
        assert_eq!(part.padded().len(), 6);
        assert_eq!(part[5], 0);
    }
}
