//! Naive oracles and fixture writers for the test suite.
//!
//! The suffix and LCP arrays are built by plain comparison sorting; fine for
//! the small fixture texts the tests use, and independent of the code under
//! test.

use std::io::Write;
use std::path::Path;

use crate::index::IndexType;

/// Suffix array of `text` by direct suffix comparison.
pub fn suffix_array(text: &[u8]) -> Vec<u64> {
    let mut sa: Vec<u64> = (0..text.len() as u64).collect();
    sa.sort_by(|a, b| text[*a as usize..].cmp(&text[*b as usize..]));
    sa
}

/// LCP array matching `suffix_array`; `lcp[0] == 0`.
pub fn lcp_array(text: &[u8], sa: &[u64]) -> Vec<u64> {
    let mut lcp = vec![0u64; sa.len()];
    for i in 1..sa.len() {
        let a = &text[sa[i - 1] as usize..];
        let b = &text[sa[i] as usize..];
        lcp[i] = a.iter().zip(b).take_while(|(x, y)| x == y).count() as u64;
    }
    lcp
}

/// Number of (possibly overlapping) occurrences of `pattern` in `text`.
pub fn count_occurrences(text: &[u8], pattern: &[u8]) -> usize {
    if pattern.is_empty() || pattern.len() > text.len() {
        return 0;
    }
    text.windows(pattern.len()).filter(|window| *window == pattern).count()
}

/// Starting positions of all occurrences of `pattern` in `text`, ascending.
pub fn find_occurrences(text: &[u8], pattern: &[u8]) -> Vec<u64> {
    if pattern.is_empty() || pattern.len() > text.len() {
        return Vec::new();
    }
    text.windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern)
        .map(|(at, _)| at as u64)
        .collect()
}

/// Writes `values` as a raw little-endian array of `G`.
pub fn write_index_file<G: IndexType>(path: &Path, values: &[u64]) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(values.len() * G::WIDTH);
    for value in values {
        G::from_u64(*value).write_le(&mut bytes);
    }
    std::fs::File::create(path)?.write_all(&bytes)
}

pub fn write_text_file(path: &Path, text: &[u8]) -> std::io::Result<()> {
    std::fs::File::create(path)?.write_all(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abracadabra_suffix_array() {
        let text = b"abracadabra";
        let sa = suffix_array(text);
        assert_eq!(sa, vec![10, 7, 0, 3, 5, 8, 1, 4, 6, 9, 2]);
        let lcp = lcp_array(text, &sa);
        assert_eq!(lcp, vec![0, 1, 4, 1, 1, 0, 3, 0, 0, 0, 2]);
    }

    #[test]
    fn counting_and_positions_agree() {
        let text = b"abracadabra";
        for pattern in [&b"a"[..], b"abra", b"bra", b"zz", b"abracadabra"] {
            let positions = find_occurrences(text, pattern);
            assert_eq!(positions.len(), count_occurrences(text, pattern));
            for at in positions {
                assert_eq!(&text[at as usize..at as usize + pattern.len()], pattern);
            }
        }
    }
}
