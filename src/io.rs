//! File loading for the distributed structures.
//!
//! Every PE opens the shared input files itself and reads only its slice.
//! Texts are sliced by byte, index arrays by element; both leave the
//! remainder on the last PE, matching the [`Partition`] layout. The query
//! file is read by PE 0 alone and shipped line-block by line-block.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::index::IndexType;
use crate::partition::Partition;

const QUERY_LINES_TAG: u32 = 7;

/// Distributes a raw byte file; every PE additionally reads `padding` bytes
/// past its slice (zero-filled at the end of the file) so short substring
/// reads never cross a slice boundary.
pub fn distribute_text<G: IndexType>(
    comm: &Communicator,
    path: &Path,
    padding: u64,
) -> Result<Partition<u8, G>> {
    let mut file = File::open(path).map_err(|source| Error::io(path, source))?;
    let global_size =
        file.metadata().map_err(|source| Error::io(path, source))?.len();
    let pes = comm.pes() as u64;
    let rank = comm.rank() as u64;
    let slice = global_size / pes;
    let local = if rank + 1 == pes { global_size - rank * slice } else { slice };

    file.seek(SeekFrom::Start(rank * slice)).map_err(|source| Error::io(path, source))?;
    let mut data = vec![0u8; (local + padding) as usize];
    read_available(&mut file, &mut data).map_err(|source| Error::io(path, source))?;
    Ok(Partition::new(global_size, local as usize, comm.pes(), data))
}

/// Distributes a raw little-endian array of `G`; the element count is the
/// file size divided by the index width.
pub fn distribute_index_file<G: IndexType>(
    comm: &Communicator,
    path: &Path,
) -> Result<Partition<G, G>> {
    let mut file = File::open(path).map_err(|source| Error::io(path, source))?;
    let bytes = file.metadata().map_err(|source| Error::io(path, source))?.len();
    let global_size = bytes / G::WIDTH as u64;
    let pes = comm.pes() as u64;
    let rank = comm.rank() as u64;
    let slice = global_size / pes;
    let local = if rank + 1 == pes { global_size - rank * slice } else { slice };

    file.seek(SeekFrom::Start(rank * slice * G::WIDTH as u64))
        .map_err(|source| Error::io(path, source))?;
    let mut raw = vec![0u8; local as usize * G::WIDTH];
    read_available(&mut file, &mut raw).map_err(|source| Error::io(path, source))?;
    let values: Vec<G> = raw.chunks_exact(G::WIDTH).map(G::from_le_slice).collect();
    Ok(Partition::new(global_size, local as usize, comm.pes(), values))
}

/// Distributes a query file line-wise: PE `r` receives lines
/// `[r * lines_per_pe, (r + 1) * lines_per_pe)`, each truncated to
/// `max_line_length` bytes and terminated by `separator`. PE 0 reads the
/// file and ships every other PE its block.
pub fn distribute_linewise(
    comm: &Communicator,
    path: &Path,
    lines_per_pe: u64,
    max_line_length: usize,
    separator: u8,
) -> Result<Vec<u8>> {
    if comm.rank() != 0 {
        return comm.recv(0, QUERY_LINES_TAG);
    }

    let file = File::open(path).map_err(|source| Error::io(path, source))?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut own_block = Vec::new();
    for target in 0..comm.pes() {
        let mut block = Vec::new();
        for _ in 0..lines_per_pe {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|source| Error::io(path, source))?;
            if read == 0 {
                break;
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            block.extend_from_slice(&line[..line.len().min(max_line_length)]);
            block.push(separator);
        }
        if target == 0 {
            own_block = block;
        } else {
            comm.send(target, QUERY_LINES_TAG, &block)?;
        }
    }
    Ok(own_block)
}

/// Writes every PE's `data` into one shared file, ordered by rank.
pub fn write_shared<T: Pod>(comm: &Communicator, data: &[T], path: &Path) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let sizes = comm.allgather(&[bytes.len() as u64])?;
    let offset: u64 = sizes[..comm.rank()].iter().sum();
    if comm.is_root() {
        let file = File::create(path).map_err(|source| Error::io(path, source))?;
        file.set_len(sizes.iter().sum()).map_err(|source| Error::io(path, source))?;
    }
    comm.barrier();
    let mut file =
        OpenOptions::new().write(true).open(path).map_err(|source| Error::io(path, source))?;
    file.seek(SeekFrom::Start(offset)).map_err(|source| Error::io(path, source))?;
    file.write_all(bytes).map_err(|source| Error::io(path, source))?;
    comm.barrier();
    Ok(())
}

/// Fills `buffer` from the reader's current position, stopping early at the
/// end of the file and leaving the zero tail in place.
fn read_available(file: &mut File, buffer: &mut [u8]) -> std::io::Result<()> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::execute;
    use crate::index::Uint40;
    use crate::test_util::{write_index_file, write_text_file};

    #[test]
    fn text_slices_cover_the_file_and_pad_with_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text");
        write_text_file(&path, b"0123456789abc").unwrap();
        let results = execute(4, |comm| {
            let part = distribute_text::<u64>(&comm, &path, 5).unwrap();
            (part.local().to_vec(), part.padded().to_vec())
        });
        assert_eq!(results[0].0, b"012");
        assert_eq!(results[0].1, b"01234567");
        assert_eq!(results[1].0, b"345");
        assert_eq!(results[3].0, b"9abc");
        // Past the end of the file the padding is zero-filled.
        assert_eq!(results[3].1, b"9abc\0\0\0\0\0");
    }

    #[test]
    fn index_files_round_trip_in_both_widths() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u64> = (0..13).map(|v| v * 3 + 1).collect();
        for (name, wide) in [("narrow", false), ("wide", true)] {
            let path = dir.path().join(name);
            if wide {
                write_index_file::<u64>(&path, &values).unwrap();
                let results = execute(3, |comm| {
                    distribute_index_file::<u64>(&comm, &path).unwrap().local().to_vec()
                });
                let joined: Vec<u64> = results.concat();
                assert_eq!(joined, values);
                assert_eq!(results[0].len(), 4);
                assert_eq!(results[2].len(), 5);
            } else {
                write_index_file::<Uint40>(&path, &values).unwrap();
                let results = execute(3, |comm| {
                    distribute_index_file::<Uint40>(&comm, &path).unwrap().local().to_vec()
                });
                let joined: Vec<u64> = results.concat().iter().map(|v| v.get()).collect();
                assert_eq!(joined, values);
            }
        }
    }

    #[test]
    fn twenty_lines_split_five_per_pe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries");
        let mut content = String::new();
        for index in 1..=20 {
            content.push_str(&format!("line number {index}\n"));
        }
        write_text_file(&path, content.as_bytes()).unwrap();
        let results = execute(4, |comm| {
            distribute_linewise(&comm, &path, 5, 30, 0).unwrap()
        });
        for (rank, block) in results.iter().enumerate() {
            let lines: Vec<&[u8]> =
                block.split(|byte| *byte == 0).filter(|line| !line.is_empty()).collect();
            assert_eq!(lines.len(), 5, "rank {rank}");
            for (offset, line) in lines.iter().enumerate() {
                let expected = format!("line number {}", rank * 5 + offset + 1);
                assert_eq!(*line, expected.as_bytes(), "rank {rank}");
            }
        }
    }

    #[test]
    fn linewise_truncates_long_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long");
        write_text_file(&path, b"0123456789ABCDEF\nshort\n").unwrap();
        let results = execute(1, |comm| distribute_linewise(&comm, &path, 2, 8, 0).unwrap());
        assert_eq!(results[0], b"01234567\0short\0");
    }

    #[test]
    fn shared_writes_land_in_rank_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        execute(3, |comm| {
            let data: Vec<u32> = (0..comm.rank() as u32 + 1).map(|k| comm.rank() as u32 * 10 + k).collect();
            write_shared(&comm, &data, &path).unwrap();
        });
        let bytes = std::fs::read(&path).unwrap();
        let values: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(values, vec![0, 10, 11, 20, 21, 22]);
    }
}
