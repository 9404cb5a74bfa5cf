//! In-process SPMD runtime.
//!
//! [`execute`] spawns one worker thread per processing element and hands each
//! a [`Communicator`]. Every pair of PEs is connected by a FIFO channel in
//! each direction, which gives the ordering guarantee the rest of the crate
//! relies on: the receive side of an exchange is ordered by source rank, and
//! within one source by send order. Collectives are lockstep; every PE of the
//! group must issue the same sequence of calls.

use std::any::Any;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use bytemuck::Pod;

use crate::error::{Error, Result};

mod window;

pub use window::Window;

/// Message tag of the chunked variable all-to-all payload.
pub const EXCHANGE_TAG: u32 = 44227;

const PLAIN_TAG: u32 = 0;

/// Tunables of a communicator group.
#[derive(Clone, Copy, Debug)]
pub struct CommConfig {
    /// Largest number of elements a single message may carry. Per-pair
    /// transfers above it are split into blocks plus a leftover and
    /// reassembled on the receive side.
    pub max_message_len: usize,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self { max_message_len: i32::MAX as usize }
    }
}

struct Packet {
    tag: u32,
    bytes: Vec<u8>,
}

struct GroupShared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
    config: CommConfig,
}

/// One PE's handle onto its group.
pub struct Communicator {
    rank: usize,
    pes: usize,
    senders: Vec<Sender<Packet>>,
    receivers: Vec<Receiver<Packet>>,
    shared: Arc<GroupShared>,
}

impl Communicator {
    #[inline(always)]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline(always)]
    pub fn pes(&self) -> usize {
        self.pes
    }

    #[inline(always)]
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    pub fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn send_packet(&self, target: usize, tag: u32, bytes: Vec<u8>) -> Result<()> {
        self.senders[target]
            .send(Packet { tag, bytes })
            .map_err(|_| Error::Transport(format!("PE {target} is gone")))
    }

    fn recv_packet(&self, source: usize, tag: u32) -> Result<Vec<u8>> {
        let packet = self.receivers[source]
            .recv()
            .map_err(|_| Error::Transport(format!("PE {source} is gone")))?;
        if packet.tag != tag {
            return Err(Error::Transport(format!(
                "expected tag {tag} from PE {source}, got {}",
                packet.tag
            )));
        }
        Ok(packet.bytes)
    }

    /// Tagged point-to-point send.
    pub fn send<T: Pod>(&self, target: usize, tag: u32, data: &[T]) -> Result<()> {
        self.send_packet(target, tag, bytemuck::cast_slice(data).to_vec())
    }

    /// Receives one message from `source`, in the order it was sent.
    pub fn recv<T: Pod>(&self, source: usize, tag: u32) -> Result<Vec<T>> {
        Ok(bytemuck::pod_collect_to_vec(&self.recv_packet(source, tag)?))
    }

    /// Equal-sized exchange: sends `data.len() / pes` elements to every PE
    /// and returns as many from each, concatenated in rank order.
    pub fn alltoall<T: Pod>(&self, data: &[T]) -> Result<Vec<T>> {
        assert_eq!(data.len() % self.pes, 0);
        let per_pe = data.len() / self.pes;
        for target in 0..self.pes {
            self.send(target, PLAIN_TAG, &data[target * per_pe..(target + 1) * per_pe])?;
        }
        let mut received = Vec::with_capacity(data.len());
        for source in 0..self.pes {
            received.extend(self.recv::<T>(source, PLAIN_TAG)?);
        }
        Ok(received)
    }

    /// Variable exchange; `data` holds the per-target segments back to back,
    /// `send_counts[target]` their element counts. Returns the concatenated
    /// receive buffer, ordered by source rank.
    pub fn alltoallv<T: Pod>(&self, data: &[T], send_counts: &[usize]) -> Result<Vec<T>> {
        Ok(self.alltoallv_counts(data, send_counts)?.1)
    }

    /// Like [`alltoallv`](Self::alltoallv), also returning the per-source
    /// receive counts.
    pub fn alltoallv_counts<T: Pod>(
        &self,
        data: &[T],
        send_counts: &[usize],
    ) -> Result<(Vec<usize>, Vec<T>)> {
        assert_eq!(send_counts.len(), self.pes);
        debug_assert_eq!(send_counts.iter().sum::<usize>(), data.len());
        let receive_counts = self.alltoall(send_counts)?;

        // Transfers above the message limit go out as full blocks plus a
        // leftover; the counts exchanged above tell the receiver how many
        // blocks to expect from each source.
        let max_len = self.shared.config.max_message_len.max(1);
        let mut offset = 0;
        for target in 0..self.pes {
            let mut remaining = &data[offset..offset + send_counts[target]];
            offset += send_counts[target];
            while remaining.len() > max_len {
                let (block, rest) = remaining.split_at(max_len);
                self.send(target, EXCHANGE_TAG, block)?;
                remaining = rest;
            }
            if !remaining.is_empty() {
                self.send(target, EXCHANGE_TAG, remaining)?;
            }
        }

        let mut received = Vec::with_capacity(receive_counts.iter().sum());
        for source in 0..self.pes {
            let mut pending = receive_counts[source];
            while pending > 0 {
                let block = self.recv::<T>(source, EXCHANGE_TAG)?;
                debug_assert!(block.len() <= pending);
                pending -= block.len();
                received.extend(block);
            }
        }
        Ok((receive_counts, received))
    }

    /// Every PE contributes `data`; returns all contributions concatenated in
    /// rank order.
    pub fn allgather<T: Pod>(&self, data: &[T]) -> Result<Vec<T>> {
        let mut send = Vec::with_capacity(data.len() * self.pes);
        for _ in 0..self.pes {
            send.extend_from_slice(data);
        }
        self.alltoall(&send)
    }

    pub fn allreduce_and(&self, value: bool) -> Result<bool> {
        let all = self.allgather(&[value as u8])?;
        Ok(all.iter().all(|v| *v != 0))
    }

    pub fn allreduce_max(&self, value: u64) -> Result<u64> {
        let all = self.allgather(&[value])?;
        Ok(all.into_iter().max().unwrap_or(value))
    }

    /// Collectively exchanges one (cheaply clonable) handle per PE and
    /// returns the rank-ordered handles. Used to set up one-sided windows.
    pub(crate) fn exchange_handles<T: Clone + Send + 'static>(&self, handle: T) -> Result<Vec<T>> {
        let poisoned = || Error::Transport("handle slots poisoned".into());
        {
            let mut slots = self.shared.slots.lock().map_err(|_| poisoned())?;
            slots[self.rank] = Some(Box::new(handle));
        }
        self.barrier();
        let gathered = {
            let slots = self.shared.slots.lock().map_err(|_| poisoned())?;
            let mut out = Vec::with_capacity(self.pes);
            for slot in slots.iter() {
                let handle = slot
                    .as_ref()
                    .and_then(|boxed| boxed.downcast_ref::<T>())
                    .ok_or_else(|| Error::Transport("mismatched handle exchange".into()))?;
                out.push(handle.clone());
            }
            out
        };
        self.barrier();
        {
            let mut slots = self.shared.slots.lock().map_err(|_| poisoned())?;
            slots[self.rank] = None;
        }
        self.barrier();
        Ok(gathered)
    }
}

/// Runs `worker` once per PE, each on its own thread, and returns the
/// per-rank results in rank order. A panicking PE aborts the whole group.
pub fn execute<R, F>(pes: usize, worker: F) -> Vec<R>
where
    F: Fn(Communicator) -> R + Send + Sync,
    R: Send,
{
    execute_with_config(pes, CommConfig::default(), worker)
}

pub fn execute_with_config<R, F>(pes: usize, config: CommConfig, worker: F) -> Vec<R>
where
    F: Fn(Communicator) -> R + Send + Sync,
    R: Send,
{
    assert!(pes > 0);
    let shared = Arc::new(GroupShared {
        barrier: Barrier::new(pes),
        slots: Mutex::new((0..pes).map(|_| None).collect()),
        config,
    });

    let mut senders: Vec<Vec<Sender<Packet>>> = (0..pes).map(|_| Vec::with_capacity(pes)).collect();
    let mut receivers: Vec<Vec<Receiver<Packet>>> =
        (0..pes).map(|_| Vec::with_capacity(pes)).collect();
    for source in 0..pes {
        for target in 0..pes {
            let (sender, receiver) = channel();
            senders[source].push(sender);
            receivers[target].push(receiver);
        }
    }

    let comms: Vec<Communicator> = senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (senders, receivers))| Communicator {
            rank,
            pes,
            senders,
            receivers,
            shared: shared.clone(),
        })
        .collect();

    let worker = &worker;
    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move || worker(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alltoall_exchanges_equal_blocks() {
        let results = execute(4, |comm| {
            let rank = comm.rank() as u32;
            let send: Vec<u32> = (0..4).map(|target| rank * 10 + target).collect();
            comm.alltoall(&send).unwrap()
        });
        for (rank, received) in results.iter().enumerate() {
            let expected: Vec<u32> = (0..4).map(|source| source * 10 + rank as u32).collect();
            assert_eq!(received, &expected);
        }
    }

    #[test]
    fn alltoallv_orders_by_source_and_send_order() {
        // PE r sends r + 1 elements to every target; element k carries
        // (source, k) so the receiver can check both orderings.
        let results = execute(3, |comm| {
            let rank = comm.rank() as u64;
            let counts = vec![rank as usize + 1; 3];
            let mut send = Vec::new();
            for _target in 0..3 {
                for k in 0..=rank {
                    send.push(rank * 100 + k);
                }
            }
            comm.alltoallv_counts(&send, &counts).unwrap()
        });
        for (counts, received) in &results {
            assert_eq!(counts, &vec![1, 2, 3]);
            let expected: Vec<u64> = vec![0, 100, 101, 200, 201, 202];
            assert_eq!(received, &expected);
        }
    }

    #[test]
    fn alltoallv_handles_skewed_and_empty_pairs() {
        let results = execute(4, |comm| {
            // Only PE 0 sends, and only to PE 2.
            let (send, counts) = if comm.rank() == 0 {
                (vec![7u8, 8, 9], vec![0, 0, 3, 0])
            } else {
                (Vec::new(), vec![0; 4])
            };
            comm.alltoallv(&send, &counts).unwrap()
        });
        assert_eq!(results[0], Vec::<u8>::new());
        assert_eq!(results[1], Vec::<u8>::new());
        assert_eq!(results[2], vec![7, 8, 9]);
        assert_eq!(results[3], Vec::<u8>::new());
    }

    #[test]
    fn chunked_exchange_matches_unchunked() {
        let payload = |rank: usize| -> Vec<u64> { (0..40).map(|k| (rank * 1000 + k) as u64).collect() };
        let run = |config: CommConfig| {
            execute_with_config(3, config, |comm| {
                let send = payload(comm.rank());
                let counts = vec![10, 13, 17];
                assert_eq!(counts.iter().sum::<usize>(), send.len());
                comm.alltoallv(&send, &counts).unwrap()
            })
        };
        let unchunked = run(CommConfig::default());
        // A tiny limit forces every pair through the block + leftover path.
        let chunked = run(CommConfig { max_message_len: 3 });
        assert_eq!(unchunked, chunked);
    }

    #[test]
    fn allgather_and_reductions() {
        let results = execute(4, |comm| {
            let rank = comm.rank() as u64;
            let gathered = comm.allgather(&[rank, rank]).unwrap();
            let max = comm.allreduce_max(rank * 3).unwrap();
            let all_done = comm.allreduce_and(true).unwrap();
            let some_done = comm.allreduce_and(comm.rank() != 2).unwrap();
            (gathered, max, all_done, some_done)
        });
        for (gathered, max, all_done, some_done) in results {
            assert_eq!(gathered, vec![0, 0, 1, 1, 2, 2, 3, 3]);
            assert_eq!(max, 9);
            assert!(all_done);
            assert!(!some_done);
        }
    }

    #[test]
    fn point_to_point_preserves_order() {
        let results = execute(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, PLAIN_TAG, &[1u32]).unwrap();
                comm.send(1, PLAIN_TAG, &[2u32, 3]).unwrap();
                Vec::new()
            } else {
                let first: Vec<u32> = comm.recv(0, PLAIN_TAG).unwrap();
                let second: Vec<u32> = comm.recv(0, PLAIN_TAG).unwrap();
                [first, second].concat()
            }
        });
        assert_eq!(results[1], vec![1, 2, 3]);
    }

    #[test]
    fn windows_can_be_created_one_after_another() {
        // The handle slots are shared; a second collective creation must not
        // see leftovers of the first.
        let results = execute(2, |comm| {
            let first = Window::create(&comm, Arc::new(vec![comm.rank() as u8])).unwrap();
            let second = Window::create(&comm, Arc::new(vec![comm.rank() as u16 + 10])).unwrap();
            first.fence(&comm);
            let reads = (first.get_one(1 - comm.rank(), 0), second.get_one(1 - comm.rank(), 0));
            first.fence(&comm);
            reads
        });
        assert_eq!(results[0], (1, 11));
        assert_eq!(results[1], (0, 10));
    }

    #[test]
    fn window_reads_any_rank() {
        let results = execute(3, |comm| {
            let rank = comm.rank();
            let local: Vec<u32> = (0..5).map(|k| (rank * 10 + k) as u32).collect();
            let window = Window::create(&comm, Arc::new(local)).unwrap();
            window.fence(&comm);
            let mut out = [0u32; 2];
            window.get((rank + 1) % 3, 1, &mut out);
            let single = window.get_one((rank + 2) % 3, 4);
            window.fence(&comm);
            (out, single)
        });
        assert_eq!(results[0], ([11, 12], 24));
        assert_eq!(results[1], ([21, 22], 4));
        assert_eq!(results[2], ([1, 2], 14));
    }
}
