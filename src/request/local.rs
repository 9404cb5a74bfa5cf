//! Single-PE request strategy, mainly for tests and sequential runs.
//!
//! With one PE every global position is a local offset, so requests are plain
//! slice reads.

use crate::error::Result;
use crate::index::IndexType;
use crate::partition::Partition;

pub(super) fn request_characters<G: IndexType>(
    positions: &[G],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    debug_assert_eq!(text.pes(), 1);
    Ok(positions.iter().map(|position| text[position.to_u64() as usize]).collect())
}

pub(super) fn request_substrings<G: IndexType>(
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    assert_eq!(positions.len(), lengths.len());
    let mut result = Vec::with_capacity(lengths.iter().map(|l| *l as usize).sum());
    for (position, length) in positions.iter().zip(lengths) {
        let from = position.to_u64() as usize;
        result.extend_from_slice(&text.padded()[from..from + *length as usize]);
    }
    Ok(result)
}

pub(super) fn request_substrings_head<G: IndexType>(
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    assert_eq!(positions.len(), lengths.len());
    let mut heads = Vec::with_capacity(positions.len());
    let mut tails = Vec::new();
    for (position, length) in positions.iter().zip(lengths) {
        let from = position.to_u64() as usize;
        heads.push(text[from]);
        tails.extend_from_slice(&text.padded()[from + 1..from + *length as usize]);
    }
    Ok((heads, tails))
}
