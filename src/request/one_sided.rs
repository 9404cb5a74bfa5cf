//! One-sided request strategy.
//!
//! Reads are posted directly against the owning PE's window in fence-bounded
//! rounds of at most [`REQ_ROUND_SIZE`] requests, which bounds the number of
//! outstanding reads per epoch. PEs drain their queues at different speeds;
//! after every round an and-reduction over "my queue is empty" decides
//! whether the group keeps fencing.

use crate::comm::{Communicator, Window};
use crate::error::Result;
use crate::index::IndexType;
use crate::partition::Partition;

/// Window reads posted per fence-bounded round.
const REQ_ROUND_SIZE: usize = 1024 * 128;

pub(super) fn request_characters<G: IndexType>(
    comm: &Communicator,
    window: &Window<u8>,
    positions: &[G],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    let mut result = vec![0u8; positions.len()];
    let mut cursor = 0;
    let mut iteration = 1;
    let mut completed = false;
    while !completed {
        let round_end = positions.len().min(iteration * REQ_ROUND_SIZE);
        window.fence(comm);
        while cursor < round_end {
            let at = text.pe_and_local(positions[cursor]);
            result[cursor] = window.get_one(at.pe, at.position);
            cursor += 1;
        }
        window.fence(comm);
        completed = comm.allreduce_and(cursor == positions.len())?;
        iteration += 1;
    }
    Ok(result)
}

pub(super) fn request_substrings<G: IndexType>(
    comm: &Communicator,
    window: &Window<u8>,
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    assert_eq!(positions.len(), lengths.len());
    // Reads between two fences complete in no particular order, so every
    // request gets its output span assigned up front.
    let mut offsets = Vec::with_capacity(lengths.len() + 1);
    offsets.push(0usize);
    for length in lengths {
        offsets.push(offsets[offsets.len() - 1] + *length as usize);
    }

    let mut result = vec![0u8; offsets[offsets.len() - 1]];
    let mut cursor = 0;
    let mut iteration = 1;
    let mut completed = false;
    while !completed {
        let round_end = positions.len().min(iteration * REQ_ROUND_SIZE);
        window.fence(comm);
        while cursor < round_end {
            let at = text.pe_and_local(positions[cursor]);
            window.get(at.pe, at.position, &mut result[offsets[cursor]..offsets[cursor + 1]]);
            cursor += 1;
        }
        window.fence(comm);
        completed = comm.allreduce_and(cursor == positions.len())?;
        iteration += 1;
    }
    Ok(result)
}

pub(super) fn request_substrings_head<G: IndexType>(
    comm: &Communicator,
    window: &Window<u8>,
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let heads = request_characters(comm, window, positions, text)?;
    let tail_positions: Vec<G> =
        positions.iter().map(|position| G::from_u64(position.to_u64() + 1)).collect();
    let tail_lengths: Vec<u32> = lengths.iter().map(|length| length.saturating_sub(1)).collect();
    let tails = request_substrings(comm, window, &tail_positions, &tail_lengths, text)?;
    Ok((heads, tails))
}
