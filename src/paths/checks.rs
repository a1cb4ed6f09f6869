//! Link store consistency checking, used by `view --check` style tooling
//! and tests: every stored junction string must be walkable in the graph.

use anyhow::{bail, Result};

use crate::graph::db_graph::{DbGraph, DbNode};
use crate::graph::edges::Edges;
use crate::paths::gpath::GPath;
use crate::paths::gpath_store::GPathStore;

#[derive(Debug, Default)]
pub struct LinkCheckSummary {
    pub num_paths: usize,
    pub num_kmers_with_paths: usize,
}

/// Union of graph edges over the colors a link carries.
fn edges_in_link_cols(graph: &DbGraph, store: &GPathStore, path: &GPath, hkey: usize) -> Edges {
    let mut e = Edges::default();
    for col in 0..store.ncols {
        if store.colset_has(path, col) {
            e = e.union(graph.edges(hkey, col));
        }
    }
    e
}

/// Walk one link from its k-mer in its orientation and confirm that at
/// every fork the next junction base matches an outgoing edge in at least
/// one of the link's colors.
pub fn check_link(graph: &DbGraph, store: &GPathStore, start: usize, path: &GPath) -> Result<()> {
    if path.num_juncs == 0 || path.num_juncs > path.num_kmers {
        bail!(
            "link at kmer {start}: bad lengths ({} juncs, {} kmers)",
            path.num_juncs,
            path.num_kmers
        );
    }
    if (0..store.ncols).all(|c| !store.colset_has(path, c)) {
        bail!("link at kmer {start}: no colors set");
    }

    let mut node = DbNode::new(start, path.orient);
    let mut plen = 0usize;
    let mut klen = 0usize;

    while plen < path.num_juncs {
        if klen > path.num_kmers {
            bail!(
                "link at kmer {start}: ran {klen} kmers without consuming all junctions"
            );
        }
        let edges = edges_in_link_cols(graph, store, path, node.key);
        let nexts = graph.next_nodes(node, edges);
        match nexts.len() {
            0 => bail!(
                "link at kmer {start}: dead end after {plen}/{} junctions",
                path.num_juncs
            ),
            1 => node = nexts[0].0,
            _ => {
                let want = path.junc(plen);
                match nexts.iter().find(|(_, nuc)| *nuc == want) {
                    Some(&(next, _)) => {
                        node = next;
                        plen += 1;
                    }
                    None => bail!(
                        "link at kmer {start}: junction {plen} wants base {} but graph lacks it",
                        crate::kmer::nuc::nuc_to_char(want) as char
                    ),
                }
            }
        }
        klen += 1;
    }
    Ok(())
}

/// Check every link in the store and that the store counters agree with
/// the chains.
pub fn check_all_links(graph: &DbGraph, store: &GPathStore) -> Result<LinkCheckSummary> {
    let mut summary = LinkCheckSummary::default();
    for hkey in graph.ht.iter() {
        let mut n_here = 0usize;
        for path in store.links(hkey) {
            check_link(graph, store, hkey, &path)?;
            n_here += 1;
        }
        summary.num_paths += n_here;
        if n_here > 0 {
            summary.num_kmers_with_paths += 1;
        }
    }
    if summary.num_paths != store.num_paths() {
        bail!(
            "store counts {} paths but chains hold {}",
            store.num_paths(),
            summary.num_paths
        );
    }
    if summary.num_kmers_with_paths != store.num_kmers_with_paths() {
        bail!(
            "store counts {} kmers with paths but chains hold {}",
            store.num_kmers_with_paths(),
            summary.num_kmers_with_paths
        );
    }
    Ok(summary)
}
