//! Batched character and substring requests against the distributed text.
//!
//! Trie construction and query verification need bytes that usually live on
//! other PEs. The [`RequestManager`] bundles the text partition with one of
//! the interchangeable strategies: [`Collective`](Strategy::Collective)
//! answers a batch with two all-to-all exchanges, [`OneSided`](Strategy::OneSided)
//! posts fence-bounded window reads, and [`Local`](Strategy::Local) reads the
//! partition directly when the group has a single PE. All operations are
//! collective: every PE must call them with the same strategy, request counts
//! may differ.

use crate::comm::{Communicator, Window};
use crate::error::{Error, Result};
use crate::index::IndexType;
use crate::partition::Partition;

mod collective;
mod local;
mod one_sided;

/// How distributed text requests are answered.
#[derive(PartialEq, Eq, Default, Clone, Copy, Debug)]
pub enum Strategy {
    /// Histogram by owner, exchange requests, exchange responses back.
    #[default]
    Collective,
    /// Fence-bounded one-sided window reads.
    OneSided,
    /// Direct reads; only valid for a group of one PE.
    Local,
}

/// Exclusive prefix sums of `counts`, i.e. the displacement of each PE's
/// segment in a concatenated buffer.
pub(crate) fn displacements(counts: &[usize]) -> Vec<usize> {
    let mut displacements = vec![0; counts.len()];
    for pe in 1..counts.len() {
        displacements[pe] = displacements[pe - 1] + counts[pe - 1];
    }
    displacements
}

/// Answers batched text requests for one PE.
///
/// Owns the text partition; with the one-sided strategy it also owns the
/// window over the local text, created once at construction.
pub struct RequestManager<G: IndexType> {
    text: Partition<u8, G>,
    strategy: Strategy,
    window: Option<Window<u8>>,
}

impl<G: IndexType> RequestManager<G> {
    /// Collective over the PE group.
    pub fn new(comm: &Communicator, text: Partition<u8, G>, strategy: Strategy) -> Result<Self> {
        assert!(strategy != Strategy::Local || comm.pes() == 1);
        let window = match strategy {
            Strategy::OneSided => Some(Window::create(comm, text.shared())?),
            _ => None,
        };
        Ok(Self { text, strategy, window })
    }

    /// Characters of the distributed text at the given global positions, in
    /// request order.
    pub fn request_characters(&self, comm: &Communicator, positions: &[G]) -> Result<Vec<u8>> {
        match self.strategy {
            Strategy::Collective => collective::request_characters(comm, positions, &self.text),
            Strategy::OneSided => {
                one_sided::request_characters(comm, self.window()?, positions, &self.text)
            }
            Strategy::Local => local::request_characters(positions, &self.text),
        }
    }

    /// Substrings of the distributed text, concatenated in request order.
    pub fn request_substrings(
        &self,
        comm: &Communicator,
        positions: &[G],
        lengths: &[u32],
    ) -> Result<Vec<u8>> {
        match self.strategy {
            Strategy::Collective => {
                collective::request_substrings(comm, positions, lengths, &self.text)
            }
            Strategy::OneSided => {
                one_sided::request_substrings(comm, self.window()?, positions, lengths, &self.text)
            }
            Strategy::Local => local::request_substrings(positions, lengths, &self.text),
        }
    }

    /// Like [`request_substrings`](Self::request_substrings), but the first
    /// byte of every substring lands in a dense `heads` vector and the
    /// remaining bytes are concatenated into `tails`. The compact trie wants
    /// the branching character of each edge in its own array.
    pub fn request_substrings_head(
        &self,
        comm: &Communicator,
        positions: &[G],
        lengths: &[u32],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        match self.strategy {
            Strategy::Collective => {
                collective::request_substrings_head(comm, positions, lengths, &self.text)
            }
            Strategy::OneSided => one_sided::request_substrings_head(
                comm,
                self.window()?,
                positions,
                lengths,
                &self.text,
            ),
            Strategy::Local => local::request_substrings_head(positions, lengths, &self.text),
        }
    }

    pub fn text(&self) -> &Partition<u8, G> {
        &self.text
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn window(&self) -> Result<&Window<u8>> {
        self.window
            .as_ref()
            .ok_or_else(|| Error::Transport("one-sided window was never created".into()))
    }
}
