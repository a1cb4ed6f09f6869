//! Append-only arena of link records plus a per-k-mer head pointer that
//! forms a singly linked list, newest first.
//!
//! Insertion is multi-threaded: the k-mer's byte-lock serialises writers
//! of one chain, the arena head advances by fetch-add, and a record is
//! published by a release store of the head pointer so lock-free readers
//! that observe the new head also observe the record bytes. Color bits
//! and seen-counts are the only bytes mutated after publication; they are
//! atomic and flipped under the k-mer lock.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use smallvec::SmallVec;

use crate::error::EngineError;
use crate::graph::hash_table::HKey;
use crate::graph::locks::ByteLocks;
use crate::kmer::binary_kmer::Orient;
use crate::kmer::packed_seq;
use crate::paths::gpath::{
    uvarint_decode, uvarint_encode, uvarint_size, GPath, LinkAdd, PathIndex, PATH_NULL,
};
use crate::paths::gpath_hash::GPathHash;

pub struct GPathStore {
    arena: Box<[AtomicU8]>,
    head: AtomicUsize,
    kmer_heads: Box<[AtomicU64]>,
    kmer_locks: ByteLocks,
    pub ncols: usize,
    colset_bytes: usize,
    num_paths: AtomicUsize,
    num_kmers_with_paths: AtomicUsize,
}

impl GPathStore {
    /// * `arena_bytes` - fixed link memory; exhausting it is fatal
    /// * `num_kmers`   - hash table capacity (one head pointer per slot)
    pub fn new(arena_bytes: usize, num_kmers: usize, ncols: usize) -> Self {
        assert!(ncols > 0);
        GPathStore {
            arena: (0..arena_bytes).map(|_| AtomicU8::new(0)).collect(),
            head: AtomicUsize::new(0),
            kmer_heads: (0..num_kmers).map(|_| AtomicU64::new(PATH_NULL)).collect(),
            kmer_locks: ByteLocks::new(num_kmers),
            ncols,
            colset_bytes: ncols.div_ceil(8),
            num_paths: AtomicUsize::new(0),
            num_kmers_with_paths: AtomicUsize::new(0),
        }
    }

    pub fn num_paths(&self) -> usize {
        self.num_paths.load(Ordering::Relaxed)
    }

    pub fn num_kmers_with_paths(&self) -> usize {
        self.num_kmers_with_paths.load(Ordering::Relaxed)
    }

    /// Bytes of arena used so far.
    pub fn path_bytes(&self) -> usize {
        self.head.load(Ordering::Relaxed).min(self.arena.len())
    }

    pub fn capacity_bytes(&self) -> usize {
        self.arena.len()
    }

    /* ---------------- reading ---------------- */

    #[inline]
    fn byte(&self, off: usize) -> u8 {
        self.arena[off].load(Ordering::Relaxed)
    }

    /// Newest link of `hkey`, if any.
    pub fn first_link(&self, hkey: HKey) -> Option<PathIndex> {
        match self.kmer_heads[hkey].load(Ordering::Acquire) {
            PATH_NULL => None,
            p => Some(p),
        }
    }

    /// Decode the record at `pindex`.
    pub fn path(&self, pindex: PathIndex) -> GPath {
        let base = pindex as usize;
        let mut prev_bytes = [0u8; 8];
        for (i, b) in prev_bytes.iter_mut().enumerate() {
            *b = self.byte(base + i);
        }
        let prev = u64::from_le_bytes(prev_bytes);

        let colset_off = base + 8;
        let mut off = colset_off + self.colset_bytes;
        let (num_kmers, n1) = uvarint_decode(|i| self.byte(off + i));
        off += n1;
        let (lo, n2) = uvarint_decode(|i| self.byte(off + i));
        off += n2;
        let orient = if lo & 1 == 0 {
            Orient::Forward
        } else {
            Orient::Reverse
        };
        let num_juncs = (lo >> 1) as usize;

        let seq_bytes = packed_seq::num_bytes(num_juncs);
        let mut seq = SmallVec::with_capacity(seq_bytes);
        for i in 0..seq_bytes {
            seq.push(self.byte(off + i));
        }
        off += seq_bytes;

        GPath {
            pindex,
            prev,
            orient,
            num_kmers: num_kmers as usize,
            num_juncs,
            seq,
            colset_off,
            nseen_off: off,
        }
    }

    /// Iterate the link chain of `hkey`, newest first.
    pub fn links(&self, hkey: HKey) -> LinkIter<'_> {
        LinkIter {
            store: self,
            next: self.first_link(hkey).unwrap_or(PATH_NULL),
        }
    }

    /// Lock-free chain walk for the first record matching
    /// (orient, njuncs, seq).
    pub fn find_link(
        &self,
        hkey: HKey,
        orient: Orient,
        num_juncs: usize,
        juncs: &[u8],
    ) -> Option<GPath> {
        self.links(hkey).find(|p| p.same_link(orient, num_juncs, juncs))
    }

    pub fn colset_has(&self, path: &GPath, col: usize) -> bool {
        debug_assert!(col < self.ncols);
        self.arena[path.colset_off + col / 8].load(Ordering::Relaxed) & (1 << (col % 8)) != 0
    }

    /// Colors carried by a link, ascending.
    pub fn path_cols(&self, path: &GPath) -> Vec<usize> {
        (0..self.ncols).filter(|&c| self.colset_has(path, c)).collect()
    }

    pub fn nseen(&self, path: &GPath, col: usize) -> u8 {
        debug_assert!(col < self.ncols);
        self.arena[path.nseen_off + col].load(Ordering::Relaxed)
    }

    pub(crate) fn set_nseen(&self, path: &GPath, col: usize, count: u8) {
        self.arena[path.nseen_off + col].store(count, Ordering::Relaxed);
    }

    /* ---------------- insertion ---------------- */

    /// Record a link observation in color `ctpcol`, deduplicating through
    /// `gphash`. `juncs` is the packed junction string.
    pub fn find_or_add_mt(
        &self,
        gphash: &GPathHash,
        hkey: HKey,
        orient: Orient,
        num_kmers: usize,
        num_juncs: usize,
        juncs: &[u8],
        ctpcol: usize,
    ) -> Result<(PathIndex, LinkAdd), EngineError> {
        assert!(ctpcol < self.ncols);
        assert!(num_juncs > 0 && num_juncs <= num_kmers);

        self.kmer_locks.acquire(hkey);
        let result = gphash.find_or_insert(self, hkey, orient, num_juncs, juncs, || {
            self.append_record(hkey, orient, num_kmers, num_juncs, juncs, ctpcol)
        });
        let out = match result {
            Ok((pindex, true)) => {
                // existing record: flip the color bit, bump the counter
                let path = self.path(pindex);
                let newly = self.set_color(&path, ctpcol);
                self.bump_nseen(&path, ctpcol);
                let add = if newly {
                    LinkAdd::AddedColor
                } else {
                    LinkAdd::AlreadyPresent
                };
                Ok((pindex, add))
            }
            Ok((pindex, false)) => Ok((pindex, LinkAdd::NewPath)),
            Err(e) => Err(e),
        };
        self.kmer_locks.release(hkey);
        out
    }

    /// Reserve arena space, write the record and publish it as the new
    /// chain head. Called with the k-mer lock (and the gphash bucket
    /// lock) held.
    fn append_record(
        &self,
        hkey: HKey,
        orient: Orient,
        num_kmers: usize,
        num_juncs: usize,
        juncs: &[u8],
        ctpcol: usize,
    ) -> Result<PathIndex, EngineError> {
        let seq_bytes = packed_seq::num_bytes(num_juncs);
        let lo = (num_juncs as u64) << 1 | orient.idx() as u64;
        let size =
            8 + self.colset_bytes + uvarint_size(num_kmers as u64) + uvarint_size(lo) + seq_bytes
                + self.ncols;

        let off = self.head.fetch_add(size, Ordering::Relaxed);
        if off + size > self.arena.len() {
            return Err(EngineError::OutOfPathMemory {
                used: off,
                capacity: self.arena.len(),
            });
        }

        let prev = self.kmer_heads[hkey].load(Ordering::Relaxed);

        let mut rec: SmallVec<[u8; 64]> = SmallVec::new();
        rec.extend_from_slice(&prev.to_le_bytes());
        // colset: only ctpcol set
        let colset_start = rec.len();
        rec.extend(std::iter::repeat(0u8).take(self.colset_bytes));
        rec[colset_start + ctpcol / 8] |= 1 << (ctpcol % 8);
        let mut vbuf = [0u8; 10];
        let n = uvarint_encode(num_kmers as u64, &mut vbuf);
        rec.extend_from_slice(&vbuf[..n]);
        let n = uvarint_encode(lo, &mut vbuf);
        rec.extend_from_slice(&vbuf[..n]);
        rec.extend_from_slice(&juncs[..seq_bytes]);
        // nseen: 1 for ctpcol
        let nseen_start = rec.len();
        rec.extend(std::iter::repeat(0u8).take(self.ncols));
        rec[nseen_start + ctpcol] = 1;
        debug_assert_eq!(rec.len(), size);

        for (i, &b) in rec.iter().enumerate() {
            self.arena[off + i].store(b, Ordering::Relaxed);
        }

        // release: readers that see the new head see the record bytes
        self.kmer_heads[hkey].store(off as u64, Ordering::Release);

        self.num_paths.fetch_add(1, Ordering::Relaxed);
        if prev == PATH_NULL {
            self.num_kmers_with_paths.fetch_add(1, Ordering::Relaxed);
        }
        Ok(off as PathIndex)
    }

    /// Set the color bit; true if it was previously clear.
    fn set_color(&self, path: &GPath, col: usize) -> bool {
        let mask = 1u8 << (col % 8);
        let old = self.arena[path.colset_off + col / 8].fetch_or(mask, Ordering::Relaxed);
        old & mask == 0
    }

    fn bump_nseen(&self, path: &GPath, col: usize) {
        let _ = self.arena[path.nseen_off + col].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |c| (c < u8::MAX).then(|| c + 1),
        );
    }
}

pub struct LinkIter<'s> {
    store: &'s GPathStore,
    next: PathIndex,
}

impl Iterator for LinkIter<'_> {
    type Item = GPath;

    fn next(&mut self) -> Option<GPath> {
        if self.next == PATH_NULL {
            return None;
        }
        let p = self.store.path(self.next);
        self.next = p.prev;
        Some(p)
    }
}
