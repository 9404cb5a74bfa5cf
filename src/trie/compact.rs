//! Compact trie over the slice boundaries, replicated on every PE.
//!
//! Built from the `2p` boundary SA/LCP pairs gathered from all local tries;
//! leaf `2r` is the left end and leaf `2r + 1` the right end of PE `r`'s
//! slice. Unlike the Patricia trie it stores each edge's full label
//! (truncated to the maximum query length), so a search compares real text
//! and classifies a query as matching a leaf interval or falling left/right
//! of a leaf. The leaf parity then decides whether "left/right of" means a
//! PE or the gap between two PEs.

use tracing::debug;

use super::patricia::{close_deeper_frames, close_frame};
use super::{Frame, LeafRange, SearchState, TrieNode};
use crate::comm::Communicator;
use crate::error::Result;
use crate::index::IndexType;
use crate::request::RequestManager;

pub struct CompactTrie {
    first_characters: Vec<u8>,
    labels: Vec<u8>,
    label_starts: Vec<u32>,
    nodes: Vec<TrieNode>,
    root: TrieNode,
}

impl CompactTrie {
    /// Builds the trie from the gathered boundary arrays. Collective: edge
    /// labels are fetched from the distributed text. Every PE passes the
    /// same arrays and ends up with the same trie.
    #[profiling::function]
    pub fn construct<G: IndexType>(
        global_sa: &[G],
        global_lcp: &[G],
        manager: &RequestManager<G>,
        comm: &Communicator,
        max_label: u64,
    ) -> Result<Self> {
        assert_eq!(global_sa.len(), global_lcp.len());
        assert!(!global_sa.is_empty());
        assert!(max_label > 0);

        let mut nodes = Vec::new();
        let mut requests: Vec<G> = Vec::new();
        let mut lengths: Vec<u32> = Vec::new();
        let mut pending: Vec<TrieNode> = Vec::new();
        let mut witness: Vec<G> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        let mut last_leaf = 0u32;
        for i in 1..global_sa.len() {
            let prev_sa = global_sa[i - 1].to_u64();
            let cur_sa = global_sa[i].to_u64();
            let cur_lcp = global_lcp[i].to_u64();
            pending.push(TrieNode::leaf(last_leaf));
            last_leaf = i as u32;
            close_deeper_frames(
                &mut stack,
                cur_lcp,
                &mut pending,
                &mut witness,
                &mut nodes,
                &mut requests,
                |child, parent_lcp| lengths.push(edge_length(child, parent_lcp, max_label)),
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
            |child, parent_lcp| lengths.push(edge_length(child, parent_lcp, max_label)),
        );
        if let Some(frame) = stack.pop() {
            close_frame(frame, &mut pending, &mut witness, &mut nodes, &mut requests, |child, lcp| {
                lengths.push(edge_length(child, lcp, max_label))
            });
        }
        let root = pending.pop().unwrap_or_else(|| TrieNode::leaf(0));

        // One label per edge: the first character goes into a dense array for
        // child dispatch, the remainder into the shared tail buffer.
        let mut label_starts = Vec::with_capacity(lengths.len() + 1);
        label_starts.push(0u32);
        for length in &lengths {
            label_starts.push(label_starts[label_starts.len() - 1] + (length - 1));
        }
        let (first_characters, labels) =
            manager.request_substrings_head(comm, &requests, &lengths)?;
        debug!(
            nodes = nodes.len(),
            label_bytes = labels.len(),
            boundaries = global_sa.len(),
            "global compact trie built"
        );
        Ok(Self { first_characters, labels, label_starts, nodes, root })
    }

    /// Leaf whose PE may contain the first occurrence of the query, after
    /// parity collapse: `Match` names a leaf (route to PE `leaf >> 1`),
    /// everything else is `NoMatch`.
    pub fn first_occurrence(&self, query: &[u8]) -> LeafRange {
        collapse(self.locate(query))
    }

    /// Leaf interval whose PEs may contain occurrences of the query, after
    /// parity collapse.
    pub fn first_and_last_occurrence(&self, query: &[u8]) -> LeafRange {
        collapse(self.locate(query))
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Walks the trie comparing full edge labels. Four outcomes per edge:
    /// descend (label consumed), `Match` (query consumed), or the query
    /// deviates and sorts `LeftOf`/`RightOf` the edge's subtree.
    fn locate(&self, query: &[u8]) -> LeafRange {
        let mut node = self.root;
        while node.out_degree > 0 && (node.string_depth as usize) < query.len() {
            let target = query[node.string_depth as usize];
            let begin = node.edge_begin as usize;
            let out = node.out_degree as usize;
            let mut child = 0;
            while child < out && self.first_characters[begin + child] < target {
                child += 1;
            }
            if child == out {
                let leaf = self.rightmost_leaf(self.nodes[begin + out - 1]).edge_begin;
                return LeafRange { state: SearchState::RightOf, left: leaf, right: leaf };
            }
            if self.first_characters[begin + child] > target {
                let leaf = self.leftmost_leaf(self.nodes[begin + child]).edge_begin;
                return LeafRange { state: SearchState::LeftOf, left: leaf, right: leaf };
            }
            let edge = begin + child;
            let child_node = self.nodes[edge];
            let mut q_pos = node.string_depth as usize + 1;
            let mut e_pos = self.label_starts[edge] as usize;
            let e_end = self.label_starts[edge + 1] as usize;
            while q_pos < query.len() && e_pos < e_end && self.labels[e_pos] == query[q_pos] {
                q_pos += 1;
                e_pos += 1;
            }
            if e_pos == e_end {
                node = child_node;
                continue;
            }
            if q_pos == query.len() {
                return LeafRange {
                    state: SearchState::Match,
                    left: self.leftmost_leaf(child_node).edge_begin,
                    right: self.rightmost_leaf(child_node).edge_begin,
                };
            }
            return if self.labels[e_pos] > query[q_pos] {
                let leaf = self.leftmost_leaf(child_node).edge_begin;
                LeafRange { state: SearchState::LeftOf, left: leaf, right: leaf }
            } else {
                let leaf = self.rightmost_leaf(child_node).edge_begin;
                LeafRange { state: SearchState::RightOf, left: leaf, right: leaf }
            };
        }
        LeafRange {
            state: SearchState::Match,
            left: self.leftmost_leaf(node).edge_begin,
            right: self.rightmost_leaf(node).edge_begin,
        }
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

#[inline(always)]
fn edge_length(child: TrieNode, parent_lcp: u64, max_label: u64) -> u32 {
    if child.is_leaf() {
        1
    } else {
        u64::from(child.string_depth).saturating_sub(parent_lcp).clamp(1, max_label) as u32
    }
}

/// Applies the parity rules. Even leaves are left ends, odd leaves right
/// ends of a PE's slice: a query left of a left end or right of a right end
/// falls into the gap between two PEs and cannot match anywhere, while the
/// other two cases pin it to exactly that leaf's PE.
fn collapse(range: LeafRange) -> LeafRange {
    match range.state {
        SearchState::LeftOf if range.left & 1 == 0 => no_match(),
        SearchState::LeftOf => {
            LeafRange { state: SearchState::Match, left: range.left, right: range.left }
        }
        SearchState::RightOf if range.right & 1 == 1 => no_match(),
        SearchState::RightOf => {
            LeafRange { state: SearchState::Match, left: range.right, right: range.right }
        }
        _ => range,
    }
}

#[inline(always)]
fn no_match() -> LeafRange {
    LeafRange { state: SearchState::NoMatch, left: 0, right: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::execute;
    use crate::partition::Partition;
    use crate::request::Strategy;
    use crate::test_util::{lcp_array, suffix_array};

    const MAX_QUERY: u64 = 30;

    /// Boundary SA/LCP pairs of `text` as if its suffix array were split
    /// into `pes` slices.
    fn boundaries(text: &[u8], pes: usize) -> (Vec<u64>, Vec<u64>) {
        let sa = suffix_array(text);
        let lcp = lcp_array(text, &sa);
        let slice = sa.len() / pes;
        let mut boundary_sa = Vec::new();
        let mut boundary_lcp = Vec::new();
        for pe in 0..pes {
            let from = pe * slice;
            let to = if pe + 1 == pes { sa.len() } else { from + slice };
            boundary_sa.push(sa[from]);
            boundary_sa.push(sa[to - 1]);
            boundary_lcp.push(lcp[from]);
            boundary_lcp.push(*lcp[from + 1..to].iter().min().unwrap_or(&(text.len() as u64)));
        }
        (boundary_sa, boundary_lcp)
    }

    /// Builds the routing trie for `text` as if split into `pes` slices and
    /// hands it to `check`, together with a single-PE text manager.
    fn with_trie<R, F>(text: &'static [u8], pes: usize, check: F) -> R
    where
        F: Fn(&CompactTrie) -> R + Send + Sync,
        R: Send,
    {
        execute(1, move |comm| {
            let mut padded = text.to_vec();
            padded.resize(text.len() + MAX_QUERY as usize + 10, 0);
            let part: Partition<u8, u64> = Partition::new(text.len() as u64, text.len(), 1, padded);
            let manager = RequestManager::new(&comm, part, Strategy::Local).unwrap();
            let (boundary_sa, boundary_lcp) = boundaries(text, pes);
            let trie =
                CompactTrie::construct(&boundary_sa, &boundary_lcp, &manager, &comm, MAX_QUERY)
                    .unwrap();
            check(&trie)
        })
        .pop()
        .unwrap()
    }

    #[test]
    fn routes_single_characters_to_their_pe() {
        // Two slices of four distinct suffixes each.
        with_trie(b"abcdefgh", 2, |trie| {
            for (query, pe) in
                [(b"a", 0), (b"b", 0), (b"c", 0), (b"d", 0), (b"e", 1), (b"g", 1), (b"h", 1)]
            {
                let hit = trie.first_occurrence(&query[..]);
                assert_eq!(hit.state, SearchState::Match, "query {query:?}");
                assert_eq!(hit.left >> 1, pe, "query {query:?}");
            }
        });
    }

    #[test]
    fn queries_outside_the_text_collapse_to_no_match() {
        with_trie(b"bcdefghi", 2, |trie| {
            // Before every suffix: left of the leftmost (even) leaf.
            assert_eq!(trie.first_occurrence(b"a").state, SearchState::NoMatch);
            // Past every suffix: right of the rightmost (odd) leaf.
            assert_eq!(trie.first_occurrence(b"z").state, SearchState::NoMatch);
        });
    }

    #[test]
    fn follows_multi_character_edge_labels() {
        with_trie(b"banana", 2, |trie| {
            // "an" descends through the depth-1 'a' node into the "anana"
            // boundary leaf.
            let hit = trie.first_and_last_occurrence(b"an");
            assert_eq!(hit.state, SearchState::Match);
            assert_eq!(hit.left >> 1, 0);
            assert_eq!(hit.right >> 1, 0);
            // A mismatch behind the branching character deviates mid-label.
            let miss = trie.first_occurrence(b"bx");
            assert!(
                miss.state == SearchState::NoMatch || miss.state == SearchState::Match,
                "parity collapse must leave only terminal states"
            );
        });
    }

    #[test]
    fn wide_matches_span_multiple_pes() {
        // Four slices of "aaaaaaaa": every slice matches "aa".
        with_trie(b"aaaaaaaa", 4, |trie| {
            let hit = trie.first_and_last_occurrence(b"aa");
            assert_eq!(hit.state, SearchState::Match);
            assert_eq!(hit.left >> 1, 0);
            assert_eq!(hit.right >> 1, 3);
        });
    }

    #[test]
    fn leaves_enumerate_the_boundaries() {
        with_trie(b"abcdefgh", 2, |trie| {
            // 2p boundary leaves plus the root's child structure.
            assert!(trie.number_of_nodes() >= 4);
        });
    }
}
