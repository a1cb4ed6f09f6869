//! Reference k-mer occurrence index (KOGraph) and reference-run
//! bookkeeping for crawls.
//!
//! For every k-mer of a reference contig set the index stores a block of
//! `(chrom, offset, strand)` records, sorted within each hash slot. A
//! crawl extends `KOccurRun`s through these blocks one node at a time:
//! a run continues when the next node carries an occurrence at the run's
//! next expected reference offset on its strand, and retires otherwise.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::graph::db_graph::{DbGraph, DbNode};
use crate::graph::hash_table::HKey;
use crate::graph::shared::SharedSlice;
use crate::kmer::binary_kmer::{BinaryKmer, Orient};
use crate::kmer::nuc::nuc_from_char;

/// One reference placement of a k-mer. `fw` is true when reading the
/// stored (canonical) key forward reproduces the reference forward
/// strand at `offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KOccur {
    pub chrom: u32,
    pub offset: u32,
    pub fw: bool,
}

pub struct KOGraph {
    pub chrom_names: Vec<String>,
    pub chrom_lengths: Vec<u32>,
    starts: Vec<u32>,
    occs: Vec<KOccur>,
}

impl KOGraph {
    /// Build the index, inserting any reference k-mer missing from the
    /// graph so that every occurrence has a slot.
    pub fn build(graph: &DbGraph, contigs: &[(String, Vec<u8>)]) -> Result<Self, EngineError> {
        let k = graph.kmer_size;
        let capacity = graph.ht.capacity();

        // pass 1: per-slot occurrence counts
        let counts: Vec<AtomicU32> = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        contigs.par_iter().try_for_each(|(_, seq)| {
            for (_, stretch) in contig_stretches(seq) {
                if stretch.len() < k {
                    continue;
                }
                for_each_kmer(stretch, k, |bk| {
                    let (key, _) = bk.key_orient(k);
                    let (hkey, _) = graph.ht.find_or_insert(&key)?;
                    counts[hkey].fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })?;
            }
            Ok::<(), EngineError>(())
        })?;

        // prefix sums give each slot its block
        let mut starts = vec![0u32; capacity + 1];
        for i in 0..capacity {
            starts[i + 1] = starts[i] + counts[i].load(Ordering::Relaxed);
        }
        let total = starts[capacity] as usize;

        // pass 2: fill blocks through per-slot cursors
        let cursors: Vec<AtomicU32> = starts[..capacity]
            .iter()
            .map(|&s| AtomicU32::new(s))
            .collect();
        let fill: SharedSlice<KOccur> = SharedSlice::new(total);
        contigs
            .par_iter()
            .enumerate()
            .try_for_each(|(chrom, (_, seq))| {
                for (base, stretch) in contig_stretches(seq) {
                    if stretch.len() < k {
                        continue;
                    }
                    let mut pos = base;
                    for_each_kmer(stretch, k, |bk| {
                        let (key, orient) = bk.key_orient(k);
                        let hkey = find_existing(graph, &key)?;
                        let idx = cursors[hkey].fetch_add(1, Ordering::Relaxed) as usize;
                        // the cursor hands this thread exclusive ownership of idx
                        unsafe {
                            fill.set(
                                idx,
                                KOccur {
                                    chrom: chrom as u32,
                                    offset: pos as u32,
                                    fw: orient == Orient::Forward,
                                },
                            )
                        };
                        pos += 1;
                        Ok(())
                    })?;
                }
                Ok::<(), EngineError>(())
            })?;

        let mut occs = fill.into_vec();
        // ties at the same (chrom, offset) with opposite strands both stay
        for i in 0..capacity {
            let (lo, hi) = (starts[i] as usize, starts[i + 1] as usize);
            occs[lo..hi].sort_unstable_by_key(|o| (o.chrom, o.offset, o.fw));
        }

        Ok(KOGraph {
            chrom_names: contigs.iter().map(|(n, _)| n.clone()).collect(),
            chrom_lengths: contigs.iter().map(|(_, s)| s.len() as u32).collect(),
            starts,
            occs,
        })
    }

    #[inline]
    pub fn occurrences(&self, hkey: HKey) -> &[KOccur] {
        &self.occs[self.starts[hkey] as usize..self.starts[hkey + 1] as usize]
    }

    /// Number of reference placements of this slot; zero means the k-mer
    /// is not in the reference.
    #[inline]
    pub fn num_occ(&self, hkey: HKey) -> usize {
        (self.starts[hkey + 1] - self.starts[hkey]) as usize
    }
}

fn find_existing(graph: &DbGraph, key: &BinaryKmer) -> Result<HKey, EngineError> {
    // pass 1 inserted every reference kmer, so this cannot miss
    graph.ht.find(key).ok_or(EngineError::TableFull {
        occupancy: graph.ht.num_kmers(),
        capacity: graph.ht.capacity(),
    })
}

/// ACGT stretches of a contig with their base offsets.
fn contig_stretches(seq: &[u8]) -> Vec<(usize, &[u8])> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &c) in seq.iter().enumerate() {
        match (nuc_from_char(c).is_some(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, &seq[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &seq[s..]));
    }
    out
}

fn for_each_kmer(
    stretch: &[u8],
    k: usize,
    mut f: impl FnMut(&BinaryKmer) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let mut bk = BinaryKmer::zero();
    for (i, &c) in stretch[..k].iter().enumerate() {
        bk.set_base(i, nuc_from_char(c).unwrap_or(0));
    }
    f(&bk)?;
    for &c in &stretch[k..] {
        bk = bk.shift_append(k, nuc_from_char(c).unwrap_or(0));
        f(&bk)?;
    }
    Ok(())
}

/* ---------------------------------------------------------------------- */
/*  reference runs                                                        */
/* ---------------------------------------------------------------------- */

/// A contiguous match of a crawl against one reference contig.
/// Offsets are k-mer start positions; `first` is where the run began and
/// `last` the most recent match, so `first > last` on `-` strand runs.
/// `qoffset` is the query step index the run started at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KOccurRun {
    pub chrom: u32,
    pub first: u32,
    pub last: u32,
    pub qoffset: u32,
    pub fw: bool,
}

impl KOccurRun {
    /// Span of the run in k-mers.
    pub fn num_kmers(&self) -> usize {
        self.first.abs_diff(self.last) as usize + 1
    }

    /// Reference offset the next matching k-mer must sit at.
    fn next_offset(&self) -> Option<u32> {
        if self.fw {
            Some(self.last + 1)
        } else {
            self.last.checked_sub(1)
        }
    }
}

/// Extend live `runs` across `nodes` (in walk order). Runs that fail to
/// extend retire into `ended` when at least `min_len` k-mers long; when
/// `pickup` is set, occurrences that did not extend anything seed new
/// runs with the given query offset.
pub fn filter_extend(
    kograph: &KOGraph,
    nodes: &[DbNode],
    min_len: usize,
    qoffset: u32,
    runs: &mut Vec<KOccurRun>,
    ended: &mut Vec<KOccurRun>,
    pickup: bool,
) {
    for node in nodes {
        let occs = kograph.occurrences(node.key);
        let mut used: SmallVec<[bool; 8]> = smallvec::smallvec![false; occs.len()];

        runs.retain_mut(|run| {
            let want = run.next_offset();
            let hit = occs.iter().position(|o| {
                o.chrom == run.chrom
                    && Some(o.offset) == want
                    && run_direction(o, node) == run.fw
            });
            match hit {
                Some(j) => {
                    used[j] = true;
                    run.last = occs[j].offset;
                    true
                }
                None => {
                    if run.num_kmers() >= min_len {
                        ended.push(*run);
                    }
                    false
                }
            }
        });

        if pickup {
            for (j, occ) in occs.iter().enumerate() {
                if !used[j] {
                    runs.push(KOccurRun {
                        chrom: occ.chrom,
                        first: occ.offset,
                        last: occ.offset,
                        qoffset,
                        fw: run_direction(occ, node),
                    });
                }
            }
        }
    }
}

/// Whether walking through `node` advances along the reference forward
/// strand at this occurrence.
#[inline]
fn run_direction(occ: &KOccur, node: &DbNode) -> bool {
    occ.fw == (node.orient == Orient::Forward)
}

/// Keep runs spanning at least `min_len` k-mers.
pub fn filter_runs(runs: &[KOccurRun], min_len: usize) -> Vec<KOccurRun> {
    runs.iter()
        .filter(|r| r.num_kmers() >= min_len)
        .copied()
        .collect()
}

pub fn sort_runs_by_qoffset(runs: &mut [KOccurRun]) {
    runs.sort_unstable_by_key(|r| r.qoffset);
}

/// Remap runs onto the reverse-complemented query: a run covering query
/// k-mers `[q, q+len)` of a walk of `qlen` nodes covers
/// `[qlen-q-len, qlen-q)` of the flipped walk, on the opposite strand.
pub fn reverse_runs(runs: &mut [KOccurRun], qlen: usize) {
    for run in runs {
        let len = run.num_kmers();
        run.qoffset = (qlen - run.qoffset as usize - len) as u32;
        std::mem::swap(&mut run.first, &mut run.last);
        run.fw = !run.fw;
    }
}

/// Format runs as `chrom:start-end:strand:qoffset[,..]`. Coordinates are
/// 1-based inclusive base positions; `+` runs have start <= end, `-` runs
/// start >= end. `qoffset_sub`/`qoffset_add` shift the printed query
/// offset into the coordinates of the printed sequence.
pub fn format_runs(
    runs: &[KOccurRun],
    kmer_size: usize,
    kograph: &KOGraph,
    qoffset_sub: usize,
    qoffset_add: usize,
) -> String {
    let mut parts = Vec::with_capacity(runs.len());
    for run in runs {
        let (start, end) = if run.fw {
            (run.first as usize + 1, run.last as usize + kmer_size)
        } else {
            (run.first as usize + kmer_size, run.last as usize + 1)
        };
        let q = (run.qoffset as usize + qoffset_add).saturating_sub(qoffset_sub);
        parts.push(format!(
            "{}:{}-{}:{}:{}",
            kograph.chrom_names[run.chrom as usize],
            start,
            end,
            if run.fw { '+' } else { '-' },
            q
        ));
    }
    parts.join(",")
}

/* ---------------------------------------------------------------------- */
/*  run-list parsing                                                      */
/* ---------------------------------------------------------------------- */

/// A parsed `chrom:start-end:strand:offset` entry, with `start <= end`
/// regardless of strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromPosOffset {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub fw_strand: bool,
    pub offset: u64,
}

fn parse_one(tok: &str) -> Result<ChromPosOffset> {
    let parts: Vec<&str> = tok.split(':').collect();
    let [chrom, span, strand, offset] = parts[..] else {
        return Err(anyhow!("expected 4 ':'-separated fields in '{tok}'"));
    };
    let (a, b) = span
        .split_once('-')
        .ok_or_else(|| anyhow!("missing '-' in span '{span}'"))?;
    let a: u64 = a.parse()?;
    let b: u64 = b.parse()?;
    let fw_strand = match strand {
        "+" => true,
        "-" => false,
        _ => return Err(anyhow!("bad strand '{strand}'")),
    };
    // '+' requires start <= end, '-' requires start >= end
    if (a < b && !fw_strand) || (a > b && fw_strand) {
        return Err(anyhow!("span direction does not match strand in '{tok}'"));
    }
    Ok(ChromPosOffset {
        chrom: chrom.to_string(),
        start: a.min(b),
        end: a.max(b),
        fw_strand,
        offset: offset.parse()?,
    })
}

/// Parse a comma-separated run list. An empty string is an empty list.
pub fn parse_run_list(s: &str) -> Result<Vec<ChromPosOffset>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(parse_one).collect()
}
