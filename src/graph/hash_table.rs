//! Fixed-capacity concurrent hash table of canonical k-mers.
//!
//! Open addressing over `num_buckets x bucket_size` slots. Each bucket
//! carries a one-byte occupancy count and a byte-lock; a k-mer that does
//! not fit is rehashed with the next seed of a hash family, up to
//! `REHASH_LIMIT` attempts. Slots are append-only and never relocated,
//! which is what makes the lock-free `find` safe: a reader scans at most
//! the occupancy it observed with an acquire load, and those entries were
//! fully written before the count was released.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::error::EngineError;
use crate::graph::locks::ByteLocks;
use crate::graph::shared::SharedSlice;
use crate::kmer::binary_kmer::{num_words, BinaryKmer};

pub const REHASH_LIMIT: usize = 16;
pub const MAX_BUCKET_SIZE: usize = 254;

/// Index of an occupied slot: `bucket * bucket_size + entry`.
pub type HKey = usize;

pub struct KmerTable {
    kmers: SharedSlice<BinaryKmer>,
    bucket_fill: Box<[AtomicU8]>,
    locks: ByteLocks,
    num_buckets: usize,
    bucket_size: usize,
    hash_mask: u64,
    num_kmers: AtomicUsize,
    nwords: usize,
}

/// Pick `(num_buckets, bucket_size)` for a requested k-mer count:
/// power-of-two buckets, headroom so the rehash chain rarely runs long.
pub fn capacity_for(req_kmers: usize) -> (usize, usize) {
    let req = req_kmers.max(64);
    let mut num_buckets = 64usize;
    while req.div_ceil(num_buckets) > 16 {
        num_buckets <<= 1;
    }
    // 25% headroom on top of the mean fill
    let bucket_size = (req.div_ceil(num_buckets) * 5 / 4 + 1).clamp(2, MAX_BUCKET_SIZE);
    (num_buckets, bucket_size)
}

impl KmerTable {
    pub fn new(kmer_size: usize, req_kmers: usize) -> Self {
        let (num_buckets, bucket_size) = capacity_for(req_kmers);
        Self::with_shape(kmer_size, num_buckets, bucket_size)
    }

    pub fn with_shape(kmer_size: usize, num_buckets: usize, bucket_size: usize) -> Self {
        assert!(num_buckets.is_power_of_two());
        assert!((1..=MAX_BUCKET_SIZE).contains(&bucket_size));
        let capacity = num_buckets * bucket_size;
        KmerTable {
            kmers: SharedSlice::new(capacity),
            bucket_fill: (0..num_buckets).map(|_| AtomicU8::new(0)).collect(),
            locks: ByteLocks::new(num_buckets),
            num_buckets,
            bucket_size,
            hash_mask: (num_buckets - 1) as u64,
            num_kmers: AtomicUsize::new(0),
            nwords: num_words(kmer_size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.num_buckets * self.bucket_size
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn num_kmers(&self) -> usize {
        self.num_kmers.load(Ordering::Relaxed)
    }

    fn bucket_of(&self, key: &BinaryKmer, attempt: usize, prev: u64) -> u64 {
        // chain the seeds so successive attempts decorrelate
        key.hash_with_seed(self.nwords, prev ^ attempt as u64) & self.hash_mask
    }

    /// The k-mer stored at `hkey`. Only meaningful for occupied slots.
    #[inline]
    pub fn bkmer(&self, hkey: HKey) -> BinaryKmer {
        debug_assert!(hkey < self.capacity());
        // occupied slots are immutable once published
        unsafe { self.kmers.get(hkey) }
    }

    /// Lock-free lookup. `key` must be canonical.
    pub fn find(&self, key: &BinaryKmer) -> Option<HKey> {
        let mut hash = 0u64;
        for attempt in 0..REHASH_LIMIT {
            hash = self.bucket_of(key, attempt, hash);
            let bucket = hash as usize;
            let fill = self.bucket_fill[bucket].load(Ordering::Acquire) as usize;
            let base = bucket * self.bucket_size;
            for e in 0..fill {
                if unsafe { self.kmers.get(base + e) } == *key {
                    return Some(base + e);
                }
            }
            // room left in this bucket means the key was never pushed on
            if fill < self.bucket_size {
                return None;
            }
        }
        None
    }

    /// Find `key` or append it. Returns the slot and whether it was
    /// inserted by this call. `key` must be canonical.
    pub fn find_or_insert(&self, key: &BinaryKmer) -> Result<(HKey, bool), EngineError> {
        let mut hash = 0u64;
        for attempt in 0..REHASH_LIMIT {
            hash = self.bucket_of(key, attempt, hash);
            let bucket = hash as usize;
            let base = bucket * self.bucket_size;

            // optimistic lock-free scan of what is already published
            let seen = self.bucket_fill[bucket].load(Ordering::Acquire) as usize;
            for e in 0..seen {
                if unsafe { self.kmers.get(base + e) } == *key {
                    return Ok((base + e, false));
                }
            }
            if seen == self.bucket_size {
                continue; // full bucket, next seed
            }

            self.locks.acquire(bucket);
            let fill = self.bucket_fill[bucket].load(Ordering::Relaxed) as usize;
            // re-check entries added since the optimistic scan
            for e in seen..fill {
                if unsafe { self.kmers.get(base + e) } == *key {
                    self.locks.release(bucket);
                    return Ok((base + e, false));
                }
            }
            if fill < self.bucket_size {
                unsafe { self.kmers.set(base + fill, *key) };
                self.bucket_fill[bucket].store((fill + 1) as u8, Ordering::Release);
                self.locks.release(bucket);
                self.num_kmers.fetch_add(1, Ordering::Relaxed);
                return Ok((base + fill, true));
            }
            self.locks.release(bucket);
        }
        Err(EngineError::TableFull {
            occupancy: self.num_kmers(),
            capacity: self.capacity(),
        })
    }

    /// Visit every occupied slot of partition `part` of `nparts`.
    /// Buckets are split evenly so worker threads touch disjoint slots.
    pub fn for_each_in_partition(&self, part: usize, nparts: usize, mut visit: impl FnMut(HKey)) {
        assert!(part < nparts);
        let lo = part * self.num_buckets / nparts;
        let hi = (part + 1) * self.num_buckets / nparts;
        for bucket in lo..hi {
            let fill = self.bucket_fill[bucket].load(Ordering::Acquire) as usize;
            let base = bucket * self.bucket_size;
            for e in 0..fill {
                visit(base + e);
            }
        }
    }

    /// All occupied slots, in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = HKey> + '_ {
        (0..self.num_buckets).flat_map(move |bucket| {
            let fill = self.bucket_fill[bucket].load(Ordering::Acquire) as usize;
            let base = bucket * self.bucket_size;
            (0..fill).map(move |e| base + e)
        })
    }
}
