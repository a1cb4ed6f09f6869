//! A fixed-size slice writable from many threads at disjoint indices.
//!
//! Publication protocols live with the callers: the hash table writes a
//! slot under its bucket lock and publishes it through a release store of
//! the bucket occupancy count; the occurrence index hands each thread a
//! distinct range via fetch-add cursors.

use std::cell::UnsafeCell;

pub struct SharedSlice<T> {
    data: Box<[UnsafeCell<T>]>,
}

// Writers coordinate through atomics/locks; see module docs.
unsafe impl<T: Send> Sync for SharedSlice<T> {}
unsafe impl<T: Send> Send for SharedSlice<T> {}

impl<T: Copy + Default> SharedSlice<T> {
    pub fn new(len: usize) -> Self {
        SharedSlice {
            data: (0..len).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }

    /// Read index `i`.
    ///
    /// # Safety
    /// The caller must have observed publication of the value (e.g. an
    /// acquire load of the guarding counter) and no writer may currently
    /// hold the index.
    #[inline(always)]
    pub unsafe fn get(&self, i: usize) -> T {
        *self.data[i].get()
    }

    /// Write index `i`.
    ///
    /// # Safety
    /// The caller must exclusively own index `i` (bucket lock or reserved
    /// range) for the duration of the write.
    #[inline(always)]
    pub unsafe fn set(&self, i: usize, v: T) {
        *self.data[i].get() = v;
    }

    /// Reclaim the storage once all writers are done.
    pub fn into_vec(self) -> Vec<T> {
        self.data
            .into_vec()
            .into_iter()
            .map(UnsafeCell::into_inner)
            .collect()
    }
}
