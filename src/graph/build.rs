//! Sequence loading: roll k-mers into the table, bump per-color coverage
//! and weld edges between consecutive nodes. Read-pair loading optionally
//! drops PCR duplicates using a two-bit-per-k-mer "read start" mark: a
//! pair whose mates both start on an already-marked (k-mer, strand) is
//! taken to be a duplicate of an earlier fragment.

use std::sync::atomic::Ordering;

use crate::error::EngineError;
use crate::graph::db_graph::{DbGraph, DbNode};
use crate::kmer::binary_kmer::BinaryKmer;
use crate::kmer::nuc::{nuc_complement, nuc_from_char};

#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub total_reads: u64,
    pub dup_reads: u64,
    pub total_bases: u64,
    pub kmers_loaded: u64,
    pub novel_kmers: u64,
    pub contigs_loaded: u64,
}

impl std::ops::AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.total_reads += other.total_reads;
        self.dup_reads += other.dup_reads;
        self.total_bases += other.total_bases;
        self.kmers_loaded += other.kmers_loaded;
        self.novel_kmers += other.novel_kmers;
        self.contigs_loaded += other.contigs_loaded;
    }
}

pub struct SeqLoader<'g> {
    graph: &'g DbGraph,
    col: usize,
    remove_dup_pairs: bool,
    remove_dup_se_reads: bool,
    pub stats: LoadStats,
}

impl<'g> SeqLoader<'g> {
    pub fn new(graph: &'g DbGraph, col: usize) -> Self {
        assert!(col < graph.num_cols);
        SeqLoader {
            graph,
            col,
            remove_dup_pairs: false,
            remove_dup_se_reads: false,
            stats: LoadStats::default(),
        }
    }

    pub fn remove_pcr_dup_pairs(mut self, yes: bool) -> Self {
        assert!(
            !yes || self.graph.readstrt.is_some(),
            "duplicate filtering needs the read-start bitset allocated"
        );
        self.remove_dup_pairs = yes;
        self
    }

    pub fn remove_pcr_dup_reads(mut self, yes: bool) -> Self {
        assert!(!yes || self.graph.readstrt.is_some());
        self.remove_dup_se_reads = yes;
        self
    }

    /// Load a reference contig: no duplicate handling, every k-mer counted.
    pub fn load_contig(&mut self, seq: &[u8]) -> Result<(), EngineError> {
        self.stats.contigs_loaded += 1;
        self.load_seq(seq)
    }

    /// Load a single-end read.
    pub fn load_read(&mut self, seq: &[u8]) -> Result<(), EngineError> {
        self.stats.total_reads += 1;
        if self.remove_dup_se_reads {
            if let Some(start) = self.read_start_node(seq) {
                if self.start_mark_is_set(start) {
                    self.stats.dup_reads += 1;
                    return Ok(());
                }
            }
        }
        self.load_seq(seq)?;
        self.mark_read_start(seq);
        Ok(())
    }

    /// Load a read pair, skipping both mates when the pair is a PCR
    /// duplicate (both first k-mers already marked on their strands).
    pub fn load_read_pair(&mut self, r1: &[u8], r2: &[u8]) -> Result<(), EngineError> {
        self.stats.total_reads += 2;
        if self.remove_dup_pairs {
            let s1 = self.read_start_node(r1);
            let s2 = self.read_start_node(r2);
            if let (Some(n1), Some(n2)) = (s1, s2) {
                if self.start_mark_is_set(n1) && self.start_mark_is_set(n2) {
                    self.stats.dup_reads += 2;
                    return Ok(());
                }
            }
        }
        self.load_seq(r1)?;
        self.load_seq(r2)?;
        self.mark_read_start(r1);
        self.mark_read_start(r2);
        Ok(())
    }

    /* ---------------- internals ---------------- */

    /// Walk k-mers of every ACGT stretch of `seq`, inserting nodes and
    /// welding edges between consecutive ones.
    fn load_seq(&mut self, seq: &[u8]) -> Result<(), EngineError> {
        let k = self.graph.kmer_size;
        self.stats.total_bases += seq.len() as u64;
        for stretch in valid_stretches(seq) {
            if stretch.len() < k {
                continue;
            }
            let mut bk = BinaryKmer::zero();
            for (i, &c) in stretch[..k].iter().enumerate() {
                bk.set_base(i, nuc_from_char(c).unwrap_or(0));
            }
            let mut prev = self.insert_kmer(&bk)?;
            let mut prev_bk = bk;
            for &c in &stretch[k..] {
                let nuc = nuc_from_char(c).unwrap_or(0);
                bk = bk.shift_append(k, nuc);
                let node = self.insert_kmer(&bk)?;
                // forward edge on prev, matching back edge on node
                self.graph.add_edge(prev.key, self.col, nuc, prev.orient);
                self.graph.add_edge(
                    node.key,
                    self.col,
                    nuc_complement(prev_bk.base(0)),
                    node.orient.opposite(),
                );
                prev = node;
                prev_bk = bk;
            }
        }
        Ok(())
    }

    fn insert_kmer(&mut self, bk: &BinaryKmer) -> Result<DbNode, EngineError> {
        let (node, inserted) = self.graph.find_or_insert_node(bk)?;
        self.graph.incr_covg(node.key, self.col);
        self.graph.set_node_in_col(node.key, self.col);
        self.stats.kmers_loaded += 1;
        if inserted {
            self.stats.novel_kmers += 1;
        }
        Ok(node)
    }

    /// Node of the first full-ACGT k-mer window, if the graph already
    /// holds it. Used for duplicate checks before loading.
    fn read_start_node(&self, seq: &[u8]) -> Option<DbNode> {
        let k = self.graph.kmer_size;
        let stretch = valid_stretches(seq).find(|s| s.len() >= k)?;
        let bk = BinaryKmer::from_str(std::str::from_utf8(&stretch[..k]).ok()?, k)?;
        self.graph.find_node(&bk)
    }

    fn start_mark_is_set(&self, node: DbNode) -> bool {
        let Some(bits) = &self.graph.readstrt else {
            return false;
        };
        let bit = node.key * 2 + node.orient.idx();
        bits[bit / 8].load(Ordering::Relaxed) & (1 << (bit % 8)) != 0
    }

    fn mark_read_start(&self, seq: &[u8]) {
        let Some(bits) = &self.graph.readstrt else {
            return;
        };
        if let Some(node) = self.read_start_node(seq) {
            let bit = node.key * 2 + node.orient.idx();
            bits[bit / 8].fetch_or(1 << (bit % 8), Ordering::Relaxed);
        }
    }
}

/// Split a read into maximal stretches of ACGT bases.
fn valid_stretches(seq: &[u8]) -> impl Iterator<Item = &[u8]> {
    seq.split(|&c| nuc_from_char(c).is_none()).filter(|s| !s.is_empty())
}
