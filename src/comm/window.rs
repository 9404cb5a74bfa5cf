use std::sync::Arc;

use bytemuck::Pod;

use crate::comm::Communicator;
use crate::error::Result;

/// Read-only one-sided window over one distributed array.
///
/// Created collectively, once per array. Reads posted between two [`fence`]
/// calls are unordered, so callers assign every read its output slot up
/// front. The window never outlives the construction-time contents of the
/// array; all mutation happens before the window exists.
///
/// [`fence`]: Window::fence
pub struct Window<T> {
    slices: Vec<Arc<Vec<T>>>,
}

impl<T: Pod + Send + Sync + 'static> Window<T> {
    /// Collective; every PE contributes its local slice.
    pub fn create(comm: &Communicator, local: Arc<Vec<T>>) -> Result<Self> {
        Ok(Self { slices: comm.exchange_handles(local)? })
    }

    /// Synchronization fence; every PE of the group must call it.
    pub fn fence(&self, comm: &Communicator) {
        comm.barrier();
    }

    /// Reads `out.len()` elements starting at `offset` of `target`'s slice.
    #[inline(always)]
    pub fn get(&self, target: usize, offset: usize, out: &mut [T]) {
        out.copy_from_slice(&self.slices[target][offset..offset + out.len()]);
    }

    /// Reads the element at `offset` of `target`'s slice.
    #[inline(always)]
    pub fn get_one(&self, target: usize, offset: usize) -> T {
        self.slices[target][offset]
    }
}
