//! Colored graph overlay: three parallel arrays indexed by
//! `slot * num_cols + color` on top of the k-mer table. Coverage and
//! edge bytes are atomics so graph build can run multi-threaded; after
//! load they are treated as read-only shared data.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use smallvec::SmallVec;

use crate::error::EngineError;
use crate::graph::edges::Edges;
use crate::graph::hash_table::{HKey, KmerTable};
use crate::kmer::binary_kmer::{BinaryKmer, Orient, MAX_KMER_SIZE, MIN_KMER_SIZE};
use crate::kmer::nuc::Nuc;

pub type Covg = u32;

/// A node is a stored (canonical) k-mer plus the strand we are reading it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbNode {
    pub key: HKey,
    pub orient: Orient,
}

impl DbNode {
    pub fn new(key: HKey, orient: Orient) -> Self {
        DbNode { key, orient }
    }

    #[inline(always)]
    pub fn reverse(self) -> DbNode {
        DbNode {
            key: self.key,
            orient: self.orient.opposite(),
        }
    }
}

pub struct DbGraph {
    pub kmer_size: usize,
    pub num_cols: usize,
    pub ht: KmerTable,
    col_covgs: Box<[AtomicU32]>,
    col_edges: Box<[AtomicU8]>,
    node_in_cols: Option<Box<[AtomicU8]>>,
    /// Two bits per slot (fw/rv read-start marks), allocated only when
    /// PCR duplicate filtering is on during build.
    pub(crate) readstrt: Option<Box<[AtomicU8]>>,
}

pub fn check_kmer_size(kmer_size: usize) -> Result<(), EngineError> {
    if kmer_size < MIN_KMER_SIZE || kmer_size > MAX_KMER_SIZE || kmer_size % 2 == 0 {
        return Err(EngineError::UnsupportedKmerSize {
            kmer_size,
            min: MIN_KMER_SIZE,
            max: MAX_KMER_SIZE,
        });
    }
    Ok(())
}

impl DbGraph {
    /// * `req_kmers`        - expected number of distinct canonical k-mers
    /// * `track_in_cols`    - allocate the per-color presence bitset
    /// * `track_read_starts`- allocate the duplicate-filtering bitset
    pub fn alloc(
        kmer_size: usize,
        num_cols: usize,
        req_kmers: usize,
        track_in_cols: bool,
        track_read_starts: bool,
    ) -> Result<Self, EngineError> {
        check_kmer_size(kmer_size)?;
        assert!(num_cols > 0);
        let ht = KmerTable::new(kmer_size, req_kmers);
        let capacity = ht.capacity();
        Ok(DbGraph {
            kmer_size,
            num_cols,
            ht,
            col_covgs: (0..capacity * num_cols).map(|_| AtomicU32::new(0)).collect(),
            col_edges: (0..capacity * num_cols).map(|_| AtomicU8::new(0)).collect(),
            node_in_cols: track_in_cols
                .then(|| (0..(capacity * num_cols).div_ceil(8)).map(|_| AtomicU8::new(0)).collect()),
            readstrt: track_read_starts
                .then(|| (0..capacity.div_ceil(4)).map(|_| AtomicU8::new(0)).collect()),
        })
    }

    #[inline(always)]
    fn cidx(&self, hkey: HKey, col: usize) -> usize {
        debug_assert!(col < self.num_cols);
        hkey * self.num_cols + col
    }

    /* ---------------- lookup ---------------- */

    pub fn find(&self, key: &BinaryKmer) -> Option<HKey> {
        self.ht.find(key)
    }

    /// Find the node for a k-mer in any orientation.
    pub fn find_node(&self, bkmer: &BinaryKmer) -> Option<DbNode> {
        let (key, orient) = bkmer.key_orient(self.kmer_size);
        self.ht.find(&key).map(|hkey| DbNode::new(hkey, orient))
    }

    pub fn find_or_insert_node(&self, bkmer: &BinaryKmer) -> Result<(DbNode, bool), EngineError> {
        let (key, orient) = bkmer.key_orient(self.kmer_size);
        let (hkey, inserted) = self.ht.find_or_insert(&key)?;
        Ok((DbNode::new(hkey, orient), inserted))
    }

    /// The k-mer of `node` as read on its strand.
    pub fn node_bkmer(&self, node: DbNode) -> BinaryKmer {
        self.ht.bkmer(node.key).oriented(node.orient, self.kmer_size)
    }

    /* ---------------- coverage ---------------- */

    pub fn covg(&self, hkey: HKey, col: usize) -> Covg {
        self.col_covgs[self.cidx(hkey, col)].load(Ordering::Relaxed)
    }

    /// Saturating coverage increment.
    pub fn incr_covg(&self, hkey: HKey, col: usize) {
        let _ = self.col_covgs[self.cidx(hkey, col)].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |c| (c < Covg::MAX).then(|| c + 1),
        );
    }

    pub fn set_covg(&self, hkey: HKey, col: usize, covg: Covg) {
        self.col_covgs[self.cidx(hkey, col)].store(covg, Ordering::Relaxed);
    }

    pub fn add_covg(&self, hkey: HKey, col: usize, covg: Covg) {
        let _ = self.col_covgs[self.cidx(hkey, col)].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |c| Some(c.saturating_add(covg)),
        );
    }

    /* ---------------- edges ---------------- */

    pub fn edges(&self, hkey: HKey, col: usize) -> Edges {
        Edges(self.col_edges[self.cidx(hkey, col)].load(Ordering::Relaxed))
    }

    pub fn add_edge(&self, hkey: HKey, col: usize, nuc: Nuc, orient: Orient) {
        self.col_edges[self.cidx(hkey, col)].fetch_or(Edges::mask(nuc, orient), Ordering::Relaxed);
    }

    pub fn merge_edges(&self, hkey: HKey, col: usize, edges: Edges) {
        self.col_edges[self.cidx(hkey, col)].fetch_or(edges.0, Ordering::Relaxed);
    }

    /// Union of edges over all colors.
    pub fn edges_union(&self, hkey: HKey) -> Edges {
        self.edges_in_cols(hkey, 0, self.num_cols - 1)
    }

    /// Union of edges over the inclusive color range `from..=to`.
    pub fn edges_in_cols(&self, hkey: HKey, from: usize, to: usize) -> Edges {
        let mut e = Edges::default();
        for col in from..=to {
            e = e.union(self.edges(hkey, col));
        }
        e
    }

    /* ---------------- per-color presence ---------------- */

    pub fn set_node_in_col(&self, hkey: HKey, col: usize) {
        if let Some(bits) = &self.node_in_cols {
            let bit = self.cidx(hkey, col);
            bits[bit / 8].fetch_or(1 << (bit % 8), Ordering::Relaxed);
        }
    }

    /// Whether `hkey` was seen in `col`. Falls back to coverage when the
    /// presence bitset was not allocated.
    pub fn node_has_col(&self, hkey: HKey, col: usize) -> bool {
        match &self.node_in_cols {
            Some(bits) => {
                let bit = self.cidx(hkey, col);
                bits[bit / 8].load(Ordering::Relaxed) & (1 << (bit % 8)) != 0
            }
            None => self.covg(hkey, col) > 0,
        }
    }

    /* ---------------- traversal ---------------- */

    /// Successors of `node` along the set bits of `edges`, with the edge
    /// base as read on the node's strand. Edges imply the successor slot
    /// exists; a miss would mean a corrupted graph and is skipped.
    pub fn next_nodes(&self, node: DbNode, edges: Edges) -> SmallVec<[(DbNode, Nuc); 4]> {
        let oriented = self.node_bkmer(node);
        let mut out = SmallVec::new();
        for nuc in edges.out_nucs(node.orient) {
            let next = oriented.shift_append(self.kmer_size, nuc);
            let (key, orient) = next.key_orient(self.kmer_size);
            debug_assert!(self.ht.find(&key).is_some());
            if let Some(hkey) = self.ht.find(&key) {
                out.push((DbNode::new(hkey, orient), nuc));
            }
        }
        out
    }

    /* ---------------- sequence emission ---------------- */

    /// Full sequence of a node path: `kmer_size + len - 1` bases.
    pub fn nodes_to_string(&self, nodes: &[DbNode]) -> String {
        let Some(&first) = nodes.first() else {
            return String::new();
        };
        let mut s = self.node_bkmer(first).to_string(self.kmer_size);
        s.reserve(nodes.len().saturating_sub(1));
        for &n in &nodes[1..] {
            let bk = self.node_bkmer(n);
            s.push(crate::kmer::nuc::nuc_to_char(bk.base(self.kmer_size - 1)) as char);
        }
        s
    }

    /// Continuation form: one base per node, no leading k-mer.
    pub fn nodes_to_string_cont(&self, nodes: &[DbNode]) -> String {
        nodes
            .iter()
            .map(|&n| {
                let bk = self.node_bkmer(n);
                crate::kmer::nuc::nuc_to_char(bk.base(self.kmer_size - 1)) as char
            })
            .collect()
    }
}
