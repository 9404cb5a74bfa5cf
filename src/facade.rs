//! The distributed Patricia trie: construction pipeline and the three
//! batched query modes.
//!
//! Query path: every PE routes its batch through the replicated compact
//! trie, packs the queries per target PE (histogram, prefix-sum
//! displacements, one fill pass), exchanges them all-to-all and answers the
//! received queries with its local Patricia trie. The per-query partial
//! results then travel back with a second exchange whose send counts are the
//! receive counts of the first one; since both exchanges preserve per-pair
//! order, the originator scatters the partials onto its batch with the same
//! displacement cursors it packed with.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::index::IndexType;
use crate::io;
use crate::partition::Partition;
use crate::query::QueryBatch;
use crate::request::{displacements, RequestManager, Strategy};
use crate::trie::{CompactTrie, PatriciaTrie, SearchState};

/// Extra text bytes kept past every slice, beyond the maximum query length.
const PADDING_SLACK: u64 = 10;

pub struct DistributedPatriciaTrie<G: IndexType> {
    manager: RequestManager<G>,
    sa_path: PathBuf,
    lcp_path: PathBuf,
    max_query_length: u64,
    ready: Option<Constructed<G>>,
}

struct Constructed<G: IndexType> {
    sa: Partition<G, G>,
    local_trie: PatriciaTrie<G>,
    global_trie: CompactTrie,
}

/// Inclusive PE interval one query is sent to; `None` drops the query.
type Targets = Vec<Option<(usize, usize)>>;

struct Dispatch {
    hist: Vec<usize>,
    displacements: Vec<usize>,
    receive_counts: Vec<usize>,
    received: QueryBatch,
}

impl<G: IndexType> DistributedPatriciaTrie<G> {
    /// Opens the text partition. The tries are built by [`construct`];
    /// queries before that return [`Error::NotConstructed`].
    ///
    /// [`construct`]: Self::construct
    pub fn new(
        comm: &Communicator,
        text_path: &Path,
        sa_path: &Path,
        lcp_path: &Path,
        max_query_length: u64,
        strategy: Strategy,
    ) -> Result<Self> {
        let text =
            io::distribute_text::<G>(comm, text_path, max_query_length + PADDING_SLACK)?;
        let manager = RequestManager::new(comm, text, strategy)?;
        Ok(Self {
            manager,
            sa_path: sa_path.to_path_buf(),
            lcp_path: lcp_path.to_path_buf(),
            max_query_length,
            ready: None,
        })
    }

    /// Builds the local Patricia trie, gathers every PE's boundary pair and
    /// builds the replicated compact trie. Collective.
    #[profiling::function]
    pub fn construct(&mut self, comm: &Communicator) -> Result<()> {
        let sa = io::distribute_index_file::<G>(comm, &self.sa_path)?;
        let lcp = io::distribute_index_file::<G>(comm, &self.lcp_path)?;
        let local_trie =
            PatriciaTrie::construct(&sa, &lcp, &self.manager, comm, self.max_query_length)?;

        let (boundary_sa, boundary_lcp) = local_trie.boundary();
        let global_sa = comm.allgather(&boundary_sa)?;
        let global_lcp = comm.allgather(&boundary_lcp)?;
        let global_trie =
            CompactTrie::construct(&global_sa, &global_lcp, &self.manager, comm, self.max_query_length)?;

        debug!(
            local_nodes = local_trie.number_of_nodes(),
            global_nodes = global_trie.number_of_nodes(),
            "distributed patricia trie constructed"
        );
        self.ready = Some(Constructed { sa, local_trie, global_trie });
        Ok(())
    }

    /// Does each query occur anywhere in the text? Collective; results come
    /// back in batch order.
    pub fn existential_batched(
        &self,
        comm: &Communicator,
        queries: &QueryBatch,
    ) -> Result<Vec<SearchState>> {
        let ready = self.ready()?;
        let targets: Targets = queries
            .iter()
            .map(|query| {
                let hit = ready.global_trie.first_occurrence(query);
                (hit.state == SearchState::Match)
                    .then(|| ((hit.left >> 1) as usize, (hit.left >> 1) as usize))
            })
            .collect();
        let dispatch = dispatch_queries(comm, queries, &targets)?;
        let states = ready.local_trie.existential_batched(
            &dispatch.received,
            &self.manager,
            comm,
            &ready.sa,
        )?;

        let flags: Vec<u8> =
            states.iter().map(|state| (*state == SearchState::Match) as u8).collect();
        let partials = comm.alltoallv(&flags, &dispatch.receive_counts)?;

        let mut cursor = dispatch.displacements.clone();
        let mut results = Vec::with_capacity(queries.size());
        for target in &targets {
            results.push(match target {
                Some((pe, _)) => {
                    let matched = partials[cursor[*pe]] != 0;
                    cursor[*pe] += 1;
                    if matched { SearchState::Match } else { SearchState::NoMatch }
                }
                None => SearchState::NoMatch,
            });
        }
        Ok(results)
    }

    /// How often does each query occur? Collective; a query routed to
    /// several PEs is answered by each of them and the partial counts are
    /// summed here.
    pub fn counting_batched(
        &self,
        comm: &Communicator,
        queries: &QueryBatch,
    ) -> Result<Vec<u64>> {
        let ready = self.ready()?;
        let targets = self.range_targets(queries)?;
        let dispatch = dispatch_queries(comm, queries, &targets)?;
        let counts = ready.local_trie.counting_batched(
            &dispatch.received,
            &self.manager,
            comm,
            &ready.sa,
        )?;
        let partials = comm.alltoallv(&counts, &dispatch.receive_counts)?;

        let mut cursor = dispatch.displacements.clone();
        let mut results = Vec::with_capacity(queries.size());
        for target in &targets {
            let mut total = 0u64;
            if let Some((first, last)) = target {
                for pe in *first..=*last {
                    total += u64::from(partials[cursor[pe]]);
                    cursor[pe] += 1;
                }
            }
            results.push(total);
        }
        Ok(results)
    }

    /// Where does each query occur? Collective. Returns all occurrence
    /// positions concatenated in batch order plus the per-query counts.
    pub fn enumeration_batched(
        &self,
        comm: &Communicator,
        queries: &QueryBatch,
    ) -> Result<(Vec<G>, Vec<u64>)> {
        let ready = self.ready()?;
        let pes = comm.pes();
        let targets = self.range_targets(queries)?;
        let dispatch = dispatch_queries(comm, queries, &targets)?;
        let (positions, sizes) = ready.local_trie.enumeration_batched(
            &dispatch.received,
            &self.manager,
            comm,
            &ready.sa,
        )?;

        // The answered positions go back grouped by requesting source; the
        // per-source totals follow from the answered sizes.
        let mut position_counts = vec![0usize; pes];
        let mut index = 0;
        for (source, count) in dispatch.receive_counts.iter().enumerate() {
            position_counts[source] =
                sizes[index..index + count].iter().map(|size| *size as usize).sum();
            index += count;
        }
        let size_partials = comm.alltoallv(&sizes, &dispatch.receive_counts)?;
        let position_partials = comm.alltoallv(&positions, &position_counts)?;

        // Region of every answering PE inside the received positions.
        let mut position_cursor = vec![0usize; pes];
        let mut offset = 0;
        for pe in 0..pes {
            position_cursor[pe] = offset;
            let from = dispatch.displacements[pe];
            offset +=
                size_partials[from..from + dispatch.hist[pe]].iter().map(|s| *s as usize).sum::<usize>();
        }

        let mut size_cursor = dispatch.displacements.clone();
        let mut out_positions = Vec::with_capacity(position_partials.len());
        let mut out_sizes = Vec::with_capacity(queries.size());
        for target in &targets {
            let mut total = 0u64;
            if let Some((first, last)) = target {
                for pe in *first..=*last {
                    let size = size_partials[size_cursor[pe]] as usize;
                    size_cursor[pe] += 1;
                    out_positions.extend_from_slice(
                        &position_partials[position_cursor[pe]..position_cursor[pe] + size],
                    );
                    position_cursor[pe] += size;
                    total += size as u64;
                }
            }
            out_sizes.push(total);
        }
        Ok((out_positions, out_sizes))
    }

    pub fn max_query_length(&self) -> u64 {
        self.max_query_length
    }

    fn ready(&self) -> Result<&Constructed<G>> {
        self.ready.as_ref().ok_or(Error::NotConstructed)
    }

    /// Routes every query to its inclusive PE interval. Interior PEs of a
    /// wide interval match with their whole slice and still verify locally.
    fn range_targets(&self, queries: &QueryBatch) -> Result<Targets> {
        let ready = self.ready()?;
        Ok(queries
            .iter()
            .map(|query| {
                let hit = ready.global_trie.first_and_last_occurrence(query);
                (hit.state == SearchState::Match)
                    .then(|| ((hit.left >> 1) as usize, (hit.right >> 1) as usize))
            })
            .collect())
    }
}

/// Packs every query once per target PE and runs the forward exchange.
fn dispatch_queries(
    comm: &Communicator,
    queries: &QueryBatch,
    targets: &Targets,
) -> Result<Dispatch> {
    let pes = comm.pes();
    let mut hist = vec![0usize; pes];
    let mut hist_bytes = vec![0usize; pes];
    for (query, target) in queries.iter().zip(targets) {
        if let Some((first, last)) = target {
            for pe in *first..=*last {
                hist[pe] += 1;
                hist_bytes[pe] += query.len();
            }
        }
    }

    let displ = displacements(&hist);
    let displ_bytes = displacements(&hist_bytes);
    let mut lengths = vec![0u32; hist.iter().sum()];
    let mut bytes = vec![0u8; hist_bytes.iter().sum()];
    let mut fill = displ.clone();
    let mut fill_bytes = displ_bytes.clone();
    for (query, target) in queries.iter().zip(targets) {
        if let Some((first, last)) = target {
            for pe in *first..=*last {
                bytes[fill_bytes[pe]..fill_bytes[pe] + query.len()].copy_from_slice(query);
                fill_bytes[pe] += query.len();
                lengths[fill[pe]] = query.len() as u32;
                fill[pe] += 1;
            }
        }
    }

    let (receive_counts, received_lengths) = comm.alltoallv_counts(&lengths, &hist)?;
    let received_bytes = comm.alltoallv(&bytes, &hist_bytes)?;
    debug!(
        sent = lengths.len(),
        received = received_lengths.len(),
        "query batch dispatched"
    );
    Ok(Dispatch {
        hist,
        displacements: displ,
        receive_counts,
        received: QueryBatch::from_parts(received_bytes, &received_lengths),
    })
}
