//! Build-time dedupe set for link insertion: open-addressed buckets of
//! (k-mer slot, record index) entries keyed by the k-mer slot and the
//! packed junction bytes. Entries are append-only, so the full-bucket
//! probe can search lock-free; only the bucket that still has room takes
//! its byte-lock while deciding between "found" and "create".

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::error::EngineError;
use crate::graph::hash_table::{HKey, MAX_BUCKET_SIZE, REHASH_LIMIT};
use crate::graph::locks::ByteLocks;
use crate::kmer::binary_kmer::Orient;
use crate::paths::gpath::{PathIndex, PATH_NULL};
use crate::paths::gpath_store::GPathStore;

const ENTRY_UNSET: u64 = u64::MAX;

pub struct GPathHash {
    hkeys: Box<[AtomicU64]>,
    pindexes: Box<[AtomicU64]>,
    bucket_fill: Box<[AtomicU8]>,
    locks: ByteLocks,
    num_buckets: usize,
    bucket_size: usize,
    hash_mask: u64,
    num_entries: AtomicUsize,
}

impl GPathHash {
    pub fn new(req_entries: usize) -> Self {
        let (num_buckets, bucket_size) = crate::graph::hash_table::capacity_for(req_entries);
        let bucket_size = bucket_size.min(MAX_BUCKET_SIZE);
        let capacity = num_buckets * bucket_size;
        GPathHash {
            hkeys: (0..capacity).map(|_| AtomicU64::new(ENTRY_UNSET)).collect(),
            pindexes: (0..capacity).map(|_| AtomicU64::new(ENTRY_UNSET)).collect(),
            bucket_fill: (0..num_buckets).map(|_| AtomicU8::new(0)).collect(),
            locks: ByteLocks::new(num_buckets),
            num_buckets,
            bucket_size,
            hash_mask: (num_buckets - 1) as u64,
            num_entries: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.num_buckets * self.bucket_size
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries.load(Ordering::Relaxed)
    }

    fn bucket_of(&self, hkey: HKey, juncs: &[u8], attempt: usize, prev: u64) -> usize {
        let mut h = fxhash::FxHasher64::default();
        (prev ^ attempt as u64).hash(&mut h);
        hkey.hash(&mut h);
        juncs.hash(&mut h);
        (h.finish() & self.hash_mask) as usize
    }

    fn entry_matches(
        &self,
        store: &GPathStore,
        slot: usize,
        hkey: HKey,
        orient: Orient,
        num_juncs: usize,
        juncs: &[u8],
    ) -> Option<PathIndex> {
        if self.hkeys[slot].load(Ordering::Relaxed) != hkey as u64 {
            return None;
        }
        let pindex = self.pindexes[slot].load(Ordering::Relaxed);
        let path = store.path(pindex);
        path.same_link(orient, num_juncs, juncs).then_some(pindex)
    }

    /// Find the entry for (hkey, link) or create the record via `create`
    /// and register it. Returns `(pindex, found)` where `found` is true
    /// when the link already existed.
    pub fn find_or_insert(
        &self,
        store: &GPathStore,
        hkey: HKey,
        orient: Orient,
        num_juncs: usize,
        juncs: &[u8],
        create: impl FnOnce() -> Result<PathIndex, EngineError>,
    ) -> Result<(PathIndex, bool), EngineError> {
        let mut hash = 0u64;
        for attempt in 0..REHASH_LIMIT {
            let bucket = self.bucket_of(hkey, juncs, attempt, hash);
            hash = bucket as u64;
            let base = bucket * self.bucket_size;

            let seen = self.bucket_fill[bucket].load(Ordering::Acquire) as usize;
            for e in 0..seen {
                if let Some(p) = self.entry_matches(store, base + e, hkey, orient, num_juncs, juncs)
                {
                    return Ok((p, true));
                }
            }
            if seen == self.bucket_size {
                continue;
            }

            self.locks.acquire(bucket);
            let fill = self.bucket_fill[bucket].load(Ordering::Relaxed) as usize;
            for e in seen..fill {
                if let Some(p) = self.entry_matches(store, base + e, hkey, orient, num_juncs, juncs)
                {
                    self.locks.release(bucket);
                    return Ok((p, true));
                }
            }
            if fill < self.bucket_size {
                let pindex = match create() {
                    Ok(p) => p,
                    Err(e) => {
                        self.locks.release(bucket);
                        return Err(e);
                    }
                };
                debug_assert_ne!(pindex, PATH_NULL);
                self.hkeys[base + fill].store(hkey as u64, Ordering::Relaxed);
                self.pindexes[base + fill].store(pindex, Ordering::Relaxed);
                self.bucket_fill[bucket].store((fill + 1) as u8, Ordering::Release);
                self.locks.release(bucket);
                self.num_entries.fetch_add(1, Ordering::Relaxed);
                return Ok((pindex, false));
            }
            self.locks.release(bucket);
        }
        Err(EngineError::OutOfPathMemory {
            used: self.num_entries(),
            capacity: self.capacity(),
        })
    }
}
