/// Packed batch of variable-length byte queries.
///
/// Stores all queries back to back plus the prefix sums of their lengths, so
/// `query(i)` is an O(1) slice. Immutable once built; batches travel between
/// PEs as their two flat buffers.
#[derive(Clone, Debug, Default)]
pub struct QueryBatch {
    bytes: Vec<u8>,
    starts: Vec<u32>,
}

impl QueryBatch {
    /// Splits a separator-delimited stream into queries, truncating each one
    /// to `max_length` bytes. A trailing separator does not open an empty
    /// final query.
    pub fn from_separated(stream: &[u8], separator: u8, max_length: usize) -> Self {
        let mut bytes = Vec::with_capacity(stream.len());
        let mut starts = vec![0u32];
        if !stream.is_empty() {
            let stream = stream.strip_suffix(&[separator]).unwrap_or(stream);
            for query in stream.split(|byte| *byte == separator) {
                bytes.extend_from_slice(&query[..query.len().min(max_length)]);
                starts.push(bytes.len() as u32);
            }
        }
        Self { bytes, starts }
    }

    /// Builds a batch from concatenated queries and their lengths.
    pub fn from_parts(bytes: Vec<u8>, lengths: &[u32]) -> Self {
        let mut starts = Vec::with_capacity(lengths.len() + 1);
        starts.push(0);
        for length in lengths {
            starts.push(starts[starts.len() - 1] + length);
        }
        debug_assert_eq!(starts[starts.len() - 1] as usize, bytes.len());
        Self { bytes, starts }
    }

    /// Number of queries in the batch.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.starts.len() - 1
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The `index`-th query.
    #[inline(always)]
    pub fn query(&self, index: usize) -> &[u8] {
        &self.bytes[self.starts[index] as usize..self.starts[index + 1] as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.size()).map(move |index| self.query(index))
    }

    /// Total bytes over all queries.
    #[inline(always)]
    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }
}
