//! Link generation: thread a sequence through the graph, recording the
//! branch choices it makes so later traversals can replay them.
//!
//! A link is added from every position a walker could arrive at without
//! context (the sequence start and every node with in-degree > 1),
//! carrying the junction choices taken at each fork from there to the
//! last fork the sequence crosses.

use smallvec::SmallVec;

use crate::error::EngineError;
use crate::graph::db_graph::{DbGraph, DbNode};
use crate::kmer::binary_kmer::BinaryKmer;
use crate::kmer::nuc::{nuc_from_char, Nuc};
use crate::kmer::packed_seq;
use crate::paths::gpath::LinkAdd;
use crate::paths::gpath_hash::GPathHash;
use crate::paths::gpath_store::GPathStore;

#[derive(Debug, Default, Clone)]
pub struct ThreadStats {
    pub seqs_threaded: u64,
    pub new_links: u64,
    pub colored_links: u64,
    pub repeated_links: u64,
}

impl std::ops::AddAssign for ThreadStats {
    fn add_assign(&mut self, other: Self) {
        self.seqs_threaded += other.seqs_threaded;
        self.new_links += other.new_links;
        self.colored_links += other.colored_links;
        self.repeated_links += other.repeated_links;
    }
}

/// Per-color histogram of threaded contig lengths (in k-mers), saved into
/// the link file header.
#[derive(Debug, Clone)]
pub struct ContigHists {
    hists: Vec<Vec<u64>>,
}

impl ContigHists {
    pub fn new(ncols: usize) -> Self {
        ContigHists {
            hists: vec![Vec::new(); ncols],
        }
    }

    pub fn record(&mut self, col: usize, len_kmers: usize) {
        let h = &mut self.hists[col];
        if h.len() <= len_kmers {
            h.resize(len_kmers + 1, 0);
        }
        h[len_kmers] += 1;
    }

    /// Non-zero (length, count) pairs for one color, ascending.
    pub fn entries(&self, col: usize) -> Vec<(usize, u64)> {
        self.hists[col]
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(l, &c)| (l, c))
            .collect()
    }

    pub fn ncols(&self) -> usize {
        self.hists.len()
    }
}

/// Thread every ACGT stretch of `seq` through the graph in both
/// directions, inserting links for color `col`. All k-mers of the
/// sequence must already be loaded.
pub fn thread_seq(
    graph: &DbGraph,
    store: &GPathStore,
    gphash: &GPathHash,
    col: usize,
    seq: &[u8],
    stats: &mut ThreadStats,
    hists: &mut ContigHists,
) -> Result<(), EngineError> {
    let k = graph.kmer_size;
    stats.seqs_threaded += 1;

    for stretch in seq.split(|&c| nuc_from_char(c).is_none()) {
        if stretch.len() < k {
            continue;
        }
        let Some(nodes) = nodes_of_stretch(graph, stretch) else {
            continue; // sequence not fully present in the graph
        };
        hists.record(col, nodes.len());

        thread_nodes(graph, store, gphash, col, &nodes, stats)?;
        let rev: Vec<DbNode> = nodes.iter().rev().map(|n| n.reverse()).collect();
        thread_nodes(graph, store, gphash, col, &rev, stats)?;
    }
    Ok(())
}

fn nodes_of_stretch(graph: &DbGraph, stretch: &[u8]) -> Option<Vec<DbNode>> {
    let k = graph.kmer_size;
    let mut bk = BinaryKmer::zero();
    for (i, &c) in stretch[..k].iter().enumerate() {
        bk.set_base(i, nuc_from_char(c)?);
    }
    let mut nodes = Vec::with_capacity(stretch.len() - k + 1);
    nodes.push(graph.find_node(&bk)?);
    for &c in &stretch[k..] {
        bk = bk.shift_append(k, nuc_from_char(c)?);
        nodes.push(graph.find_node(&bk)?);
    }
    Some(nodes)
}

fn thread_nodes(
    graph: &DbGraph,
    store: &GPathStore,
    gphash: &GPathHash,
    col: usize,
    nodes: &[DbNode],
    stats: &mut ThreadStats,
) -> Result<(), EngineError> {
    let k = graph.kmer_size;
    let n = nodes.len();
    if n < 2 {
        return Ok(());
    }

    // forks[j]: leaving node j has >1 exit in this color; the choice made
    // is the trailing base of node j+1 on its walking strand
    let mut fork_pos: SmallVec<[usize; 16]> = SmallVec::new();
    let mut fork_choice: SmallVec<[Nuc; 16]> = SmallVec::new();
    for j in 0..n - 1 {
        if graph.edges(nodes[j].key, col).outdegree(nodes[j].orient) > 1 {
            fork_pos.push(j);
            fork_choice.push(graph.node_bkmer(nodes[j + 1]).base(k - 1));
        }
    }
    if fork_pos.is_empty() {
        return Ok(());
    }
    let last_fork = *fork_pos.last().unwrap();

    // starts: sequence head plus every node reachable from >1 predecessor
    let mut starts: SmallVec<[usize; 16]> = SmallVec::new();
    starts.push(0);
    for (j, node) in nodes.iter().enumerate().take(last_fork + 1).skip(1) {
        if graph.edges(node.key, col).indegree(node.orient) > 1 {
            starts.push(j);
        }
    }

    let mut fork_from = 0usize;
    for &s in &starts {
        while fork_from < fork_pos.len() && fork_pos[fork_from] < s {
            fork_from += 1;
        }
        if fork_from == fork_pos.len() {
            break;
        }
        let juncs = &fork_choice[fork_from..];
        let num_juncs = juncs.len();
        let num_kmers = last_fork + 2 - s;

        let mut packed = vec![0u8; packed_seq::num_bytes(num_juncs)];
        packed_seq::pack(&mut packed, juncs);

        let (_, add) = store.find_or_add_mt(
            gphash,
            nodes[s].key,
            nodes[s].orient,
            num_kmers,
            num_juncs,
            &packed,
            col,
        )?;
        match add {
            LinkAdd::NewPath => stats.new_links += 1,
            LinkAdd::AddedColor => stats.colored_links += 1,
            LinkAdd::AlreadyPresent => stats.repeated_links += 1,
        }
    }
    Ok(())
}
