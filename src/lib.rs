//! Distributed Patricia trie over a partitioned text and suffix array.
//!
//! The text, its suffix array and its LCP array are split into equally sized
//! slices, one per processing element (PE). Every PE builds a Patricia trie
//! over its slice and all PEs share a small compact trie built from the slice
//! boundaries, which routes each query to the PEs whose slice can contain a
//! match. Queries are answered in batches: routed, exchanged all-to-all,
//! answered blindly against the local trie and verified with a single
//! substring read from the distributed text.

pub mod comm;
pub mod error;
pub mod facade;
pub mod index;
pub mod io;
pub mod partition;
pub mod query;
pub mod request;
pub mod test_util;
pub mod trie;

pub use error::{Error, Result};
