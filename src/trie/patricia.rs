//! Patricia trie over one PE's suffix-array slice.
//!
//! A single sweep over the local SA/LCP pair builds the trie bottom-up with
//! an explicit stack of pending nodes. Edges store only their branching
//! character, fetched from the distributed text in one batched request after
//! the sweep. Searches are therefore blind: the descent compares one byte per
//! edge and may accept a wrong candidate, which a single substring read per
//! query resolves afterwards.

use tracing::debug;

use super::{Frame, SearchResult, SearchState, TrieNode};
use crate::comm::Communicator;
use crate::error::Result;
use crate::index::IndexType;
use crate::partition::Partition;
use crate::query::QueryBatch;
use crate::request::RequestManager;

pub struct PatriciaTrie<G> {
    labels: Vec<u8>,
    nodes: Vec<TrieNode>,
    root: TrieNode,
    boundary_sa: [G; 2],
    boundary_lcp: [G; 2],
}

impl<G: IndexType> PatriciaTrie<G> {
    /// Builds the trie from the local SA/LCP slices. Collective: the
    /// branching characters are fetched from the distributed text.
    ///
    /// Entries whose LCP reaches `max_lcp` are folded into the preceding
    /// leaf; the trie only distinguishes the first `max_lcp` characters and
    /// verification reads the full suffix anyway.
    #[profiling::function]
    pub fn construct(
        sa: &Partition<G, G>,
        lcp: &Partition<G, G>,
        manager: &RequestManager<G>,
        comm: &Communicator,
        max_lcp: u64,
    ) -> Result<Self> {
        let sa_slice = sa.local();
        let lcp_slice = lcp.local();
        assert_eq!(sa_slice.len(), lcp_slice.len());
        assert!(!sa_slice.is_empty());

        let mut nodes = Vec::new();
        let mut requests: Vec<G> = Vec::new();
        let mut pending: Vec<TrieNode> = Vec::new();
        let mut witness: Vec<G> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        // SA position of the latest considered entry; its leaf is emitted
        // when the next considered pair (or the end of the sweep) closes it.
        let mut last_leaf = 0u32;
        let mut min_interior = u64::MAX;

        for i in 1..sa_slice.len() {
            let prev_sa = sa_slice[i - 1].to_u64();
            let cur_sa = sa_slice[i].to_u64();
            let cur_lcp = lcp_slice[i].to_u64();
            min_interior = min_interior.min(cur_lcp);
            if cur_lcp >= max_lcp {
                continue;
            }
            pending.push(TrieNode::leaf(last_leaf));
            last_leaf = i as u32;
            close_deeper_frames(
                &mut stack,
                cur_lcp,
                &mut pending,
                &mut witness,
                &mut nodes,
                &mut requests,
                |_node, _parent_lcp| {},
            );
            match stack.last_mut() {
                Some(top) if top.lcp == cur_lcp => {
                    top.children += 1;
                    witness.push(G::from_u64(cur_sa + cur_lcp));
                }
                _ => {
                    stack.push(Frame {
                        lcp: cur_lcp,
                        children: 2,
                        node_pos: pending.len() - 1,
                        text_pos: witness.len(),
                    });
                    witness.push(G::from_u64(prev_sa + cur_lcp));
                    witness.push(G::from_u64(cur_sa + cur_lcp));
                }
            }
        }
        pending.push(TrieNode::leaf(last_leaf));
        close_deeper_frames(
            &mut stack,
            0,
            &mut pending,
            &mut witness,
            &mut nodes,
            &mut requests,
            |_node, _parent_lcp| {},
        );
        // Any remaining frame sits at depth 0; the last node closed (or the
        // lone leaf of a trivial slice) becomes the root.
        debug_assert!(stack.is_empty() || (stack.len() == 1 && stack[0].lcp == 0));
        if let Some(frame) = stack.pop() {
            close_frame(frame, &mut pending, &mut witness, &mut nodes, &mut requests, |_, _| {});
        }
        let root = pending.pop().unwrap_or_else(|| TrieNode::leaf(0));

        if min_interior == u64::MAX {
            // Slice of one entry; the boundary pair degenerates to the full
            // suffix.
            min_interior = sa.global_size() - sa_slice[0].to_u64();
        }
        let boundary_sa = [sa_slice[0], sa_slice[sa_slice.len() - 1]];
        let boundary_lcp = [lcp_slice[0], G::from_u64(min_interior)];

        let labels = manager.request_characters(comm, &requests)?;
        debug!(
            nodes = nodes.len(),
            labels = labels.len(),
            entries = sa_slice.len(),
            "local patricia trie built"
        );
        Ok(Self { labels, nodes, root, boundary_sa, boundary_lcp })
    }

    /// The slice boundary, `([first_sa, last_sa], [first_lcp, min_interior_lcp])`,
    /// gathered from every PE to build the routing trie.
    pub fn boundary(&self) -> ([G; 2], [G; 2]) {
        (self.boundary_sa, self.boundary_lcp)
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Answers one batch of existential queries. Collective: the candidate
    /// suffixes are verified with one substring request.
    pub fn existential_batched(
        &self,
        queries: &QueryBatch,
        manager: &RequestManager<G>,
        comm: &Communicator,
        sa: &Partition<G, G>,
    ) -> Result<Vec<SearchState>> {
        let mut positions = Vec::new();
        let mut lengths = Vec::new();
        let mut states = Vec::with_capacity(queries.size());
        for query in queries.iter() {
            let found = self.blind_search(query);
            states.push(found.state);
            if found.state == SearchState::NotYetFound {
                let leaf = self.leftmost_leaf(found.node);
                positions.push(sa[leaf.edge_begin as usize]);
                lengths.push(query.len() as u32);
            }
        }
        let substrings = manager.request_substrings(comm, &positions, &lengths)?;

        let mut offset = 0;
        for (index, query) in queries.iter().enumerate() {
            if states[index] == SearchState::NotYetFound {
                let candidate = &substrings[offset..offset + query.len()];
                offset += query.len();
                states[index] =
                    if candidate == query { SearchState::Match } else { SearchState::NoMatch };
            }
        }
        Ok(states)
    }

    /// Answers one batch of counting queries with the number of occurrences
    /// in the local slice.
    pub fn counting_batched(
        &self,
        queries: &QueryBatch,
        manager: &RequestManager<G>,
        comm: &Communicator,
        sa: &Partition<G, G>,
    ) -> Result<Vec<u32>> {
        let (results, verified) = self.verified_candidates(queries, manager, comm, sa)?;
        let mut occurrences = vec![0u32; queries.size()];
        for (index, result) in results.iter().enumerate() {
            if verified[index] {
                let left = self.leftmost_leaf(result.node).edge_begin;
                let right = self.rightmost_leaf(result.node).edge_begin;
                occurrences[index] = right - left + 1;
            }
        }
        Ok(occurrences)
    }

    /// Answers one batch of enumeration queries with the occurrence
    /// positions in the local slice: all positions concatenated, plus the
    /// per-query counts.
    pub fn enumeration_batched(
        &self,
        queries: &QueryBatch,
        manager: &RequestManager<G>,
        comm: &Communicator,
        sa: &Partition<G, G>,
    ) -> Result<(Vec<G>, Vec<u32>)> {
        let (results, verified) = self.verified_candidates(queries, manager, comm, sa)?;
        let mut intervals = Vec::new();
        let mut interval_sizes = vec![0u32; queries.size()];
        for (index, result) in results.iter().enumerate() {
            if verified[index] {
                let left = self.leftmost_leaf(result.node).edge_begin as usize;
                let right = self.rightmost_leaf(result.node).edge_begin as usize;
                intervals.extend_from_slice(&sa.local()[left..=right]);
                interval_sizes[index] = (right - left + 1) as u32;
            }
        }
        Ok((intervals, interval_sizes))
    }

    /// Blind search for every query plus the verification round trip;
    /// `verified[i]` is true iff query `i` really occurs below its candidate.
    fn verified_candidates(
        &self,
        queries: &QueryBatch,
        manager: &RequestManager<G>,
        comm: &Communicator,
        sa: &Partition<G, G>,
    ) -> Result<(Vec<SearchResult>, Vec<bool>)> {
        let mut positions = Vec::new();
        let mut lengths = Vec::new();
        let mut results = Vec::with_capacity(queries.size());
        for query in queries.iter() {
            let found = self.blind_search(query);
            if found.state == SearchState::NotYetFound {
                positions.push(sa[self.leftmost_leaf(found.node).edge_begin as usize]);
                lengths.push(query.len() as u32);
            }
            results.push(found);
        }
        let substrings = manager.request_substrings(comm, &positions, &lengths)?;

        let mut verified = vec![false; queries.size()];
        let mut offset = 0;
        for (index, query) in queries.iter().enumerate() {
            if results[index].state == SearchState::NotYetFound {
                let candidate = &substrings[offset..offset + query.len()];
                offset += query.len();
                verified[index] = candidate == query;
            }
        }
        Ok((results, verified))
    }

    /// Descends comparing only the branching character of each edge. The
    /// returned node's subtree is the candidate range; it may be wrong at
    /// non-branching characters, so callers verify against the text.
    fn blind_search(&self, query: &[u8]) -> SearchResult {
        let mut node = self.root;
        while node.string_depth < query.len() as u32 && node.out_degree > 0 {
            let target = query[node.string_depth as usize];
            let begin = node.edge_begin as usize;
            let out = node.out_degree as usize;
            let mut child = 0;
            while child < out && self.labels[begin + child] < target {
                child += 1;
            }
            if child == out || self.labels[begin + child] != target {
                return SearchResult { state: SearchState::NoMatch, node };
            }
            node = self.nodes[begin + child];
        }
        SearchResult { state: SearchState::NotYetFound, node }
    }

    fn leftmost_leaf(&self, mut node: TrieNode) -> TrieNode {
        while node.out_degree > 0 {
            node = self.nodes[node.edge_begin as usize];
        }
        node
    }

    fn rightmost_leaf(&self, mut node: TrieNode) -> TrieNode {
        while node.out_degree > 0 {
            node = self.nodes[node.edge_begin as usize + node.out_degree as usize - 1];
        }
        node
    }
}

/// Closes every stack frame deeper than `lcp`: its children move from the
/// pending buffers into the final arrays and the closed node becomes a
/// pending child of the frame below. `on_child` sees every moved child and
/// the depth of the closing frame (the compact trie derives edge lengths
/// from it).
pub(super) fn close_deeper_frames<G: IndexType>(
    stack: &mut Vec<Frame>,
    lcp: u64,
    pending: &mut Vec<TrieNode>,
    witness: &mut Vec<G>,
    nodes: &mut Vec<TrieNode>,
    requests: &mut Vec<G>,
    mut on_child: impl FnMut(TrieNode, u64),
) {
    while stack.last().is_some_and(|top| top.lcp > lcp) {
        if let Some(frame) = stack.pop() {
            close_frame(frame, pending, witness, nodes, requests, &mut on_child);
        }
    }
}

pub(super) fn close_frame<G: IndexType>(
    frame: Frame,
    pending: &mut Vec<TrieNode>,
    witness: &mut Vec<G>,
    nodes: &mut Vec<TrieNode>,
    requests: &mut Vec<G>,
    mut on_child: impl FnMut(TrieNode, u64),
) {
    debug_assert_eq!(pending.len() - frame.node_pos, frame.children as usize);
    debug_assert_eq!(witness.len() - frame.text_pos, frame.children as usize);
    assert!(frame.children <= u8::MAX as u32);
    let first_child = nodes.len() as u32;
    for child in pending.drain(frame.node_pos..) {
        on_child(child, frame.lcp);
        nodes.push(child);
    }
    requests.extend(witness.drain(frame.text_pos..));
    pending.push(TrieNode::internal(frame.lcp as u32, frame.children as u8, first_child));
}
