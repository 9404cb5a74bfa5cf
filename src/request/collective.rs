//! Collective request strategy.
//!
//! A batch is answered with two variable all-to-all exchanges: the requests
//! travel to their owning PEs (as local offsets), every PE gathers the
//! answers from its slice in receive order, and the responses travel back.
//! Because both exchanges preserve per-pair order, the requester scatters the
//! responses into the original request order with one running cursor per PE.

use bytemuck::{Pod, Zeroable};

use super::displacements;
use crate::comm::Communicator;
use crate::error::Result;
use crate::index::IndexType;
use crate::partition::Partition;

/// Wire record of one substring request, normalized to its owner's slice.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct PosSize {
    position: u32,
    size: u32,
}

pub(super) fn request_characters<G: IndexType>(
    comm: &Communicator,
    positions: &[G],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    let pes = comm.pes();
    let mut hist = vec![0usize; pes];
    for position in positions {
        hist[text.pe(*position)] += 1;
    }
    let mut fill = displacements(&hist);
    let mut owners = Vec::with_capacity(positions.len());
    let mut normalized = vec![0u32; positions.len()];
    for position in positions {
        let at = text.pe_and_local(*position);
        normalized[fill[at.pe]] = at.position as u32;
        fill[at.pe] += 1;
        owners.push(at.pe);
    }

    let (request_counts, requests) = comm.alltoallv_counts(&normalized, &hist)?;
    let mut response = Vec::with_capacity(requests.len());
    for request in &requests {
        response.push(text[*request as usize]);
    }
    drop(requests);
    let characters = comm.alltoallv(&response, &request_counts)?;

    let mut cursor = displacements(&hist);
    let mut result = Vec::with_capacity(characters.len());
    for owner in &owners {
        result.push(characters[cursor[*owner]]);
        cursor[*owner] += 1;
    }
    Ok(result)
}

pub(super) fn request_substrings<G: IndexType>(
    comm: &Communicator,
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<Vec<u8>> {
    assert_eq!(positions.len(), lengths.len());
    let (owners, characters, mut cursor) = exchange_substrings(comm, positions, lengths, text)?;

    let mut result = Vec::with_capacity(characters.len());
    for (owner, length) in owners.iter().zip(lengths) {
        let from = cursor[*owner];
        result.extend_from_slice(&characters[from..from + *length as usize]);
        cursor[*owner] += *length as usize;
    }
    Ok(result)
}

pub(super) fn request_substrings_head<G: IndexType>(
    comm: &Communicator,
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    assert_eq!(positions.len(), lengths.len());
    let (owners, characters, mut cursor) = exchange_substrings(comm, positions, lengths, text)?;

    let mut heads = vec![0u8; positions.len()];
    let mut tails = Vec::with_capacity(characters.len().saturating_sub(positions.len()));
    for (request, (owner, length)) in owners.iter().zip(lengths).enumerate() {
        heads[request] = characters[cursor[*owner]];
        cursor[*owner] += 1;
        if *length > 1 {
            let from = cursor[*owner];
            tails.extend_from_slice(&characters[from..from + *length as usize - 1]);
            cursor[*owner] += *length as usize - 1;
        }
    }
    Ok((heads, tails))
}

/// Shared two-exchange round trip. Returns the owner of every request, the
/// received response bytes (grouped by responding PE) and the byte cursor of
/// every PE's group.
fn exchange_substrings<G: IndexType>(
    comm: &Communicator,
    positions: &[G],
    lengths: &[u32],
    text: &Partition<u8, G>,
) -> Result<(Vec<usize>, Vec<u8>, Vec<usize>)> {
    let pes = comm.pes();

    // Requests per owner and response bytes per owner.
    let mut hist = vec![0usize; pes];
    let mut hist_bytes = vec![0usize; pes];
    for (position, length) in positions.iter().zip(lengths) {
        let pe = text.pe(*position);
        hist[pe] += 1;
        hist_bytes[pe] += *length as usize;
    }

    let mut fill = displacements(&hist);
    let mut owners = Vec::with_capacity(positions.len());
    let mut records = vec![PosSize::zeroed(); positions.len()];
    for (position, length) in positions.iter().zip(lengths) {
        let at = text.pe_and_local(*position);
        records[fill[at.pe]] = PosSize { position: at.position as u32, size: *length };
        fill[at.pe] += 1;
        owners.push(at.pe);
    }

    let (request_counts, requests) = comm.alltoallv_counts(&records, &hist)?;

    // Answer in receive order; track how many bytes go back to each source.
    let response_size: usize = requests.iter().map(|request| request.size as usize).sum();
    let mut response = Vec::with_capacity(response_size);
    let mut response_sizes = vec![0usize; pes];
    let mut request = 0;
    for (source, count) in request_counts.iter().enumerate() {
        for _ in 0..*count {
            let PosSize { position, size } = requests[request];
            request += 1;
            response
                .extend_from_slice(&text.padded()[position as usize..(position + size) as usize]);
            response_sizes[source] += size as usize;
        }
    }
    drop(requests);

    let characters = comm.alltoallv(&response, &response_sizes)?;
    Ok((owners, characters, displacements(&hist_bytes)))
}
