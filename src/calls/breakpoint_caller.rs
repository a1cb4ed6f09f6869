//! Parallel breakpoint caller.
//!
//! Workers each take a partition of the hash table. At every in-reference
//! node with out-degree > 1 (on either strand) the exits are split into
//! reference and non-reference; for each non-reference exit the caller
//! crawls backwards for a 5' flank that tracks the reference, then
//! forwards (restricted to the flank's colors) for the allele until it
//! re-meets the reference, and emits one record per surviving path pair.
//! Records are written whole while holding the output mutex; the call id
//! comes from a shared fetch-add counter.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;
use parking_lot::Mutex;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::calls::kmer_occur::{
    filter_extend, filter_runs, format_runs, reverse_runs, sort_runs_by_qoffset, KOGraph,
    KOccurRun,
};
use crate::error::EngineError;
use crate::graph::db_graph::{DbGraph, DbNode};
use crate::kmer::binary_kmer::Orient;
use crate::paths::gpath_store::GPathStore;
use crate::traverse::graph_cache::GraphCache;
use crate::traverse::graph_crawler::{CrawlHooks, GraphCrawler};

#[derive(Debug, Clone)]
pub struct BreakpointOpts {
    pub nthreads: usize,
    /// Minimum reference run length (in k-mers) to keep a flank anchor.
    pub min_ref_nkmers: usize,
    /// Step budget for a single crawl.
    pub max_ref_nkmers: usize,
    /// Call name prefix; must not contain '.'.
    pub prefix: String,
}

impl Default for BreakpointOpts {
    fn default() -> Self {
        BreakpointOpts {
            nthreads: 1,
            min_ref_nkmers: 10,
            max_ref_nkmers: 1000,
            prefix: "call".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CallStats {
    pub ref_nodes_seen: u64,
    pub breaks_examined: u64,
    pub flank5p_unanchored: u64,
    pub calls_emitted: u64,
}

impl std::ops::AddAssign for CallStats {
    fn add_assign(&mut self, other: Self) {
        self.ref_nodes_seen += other.ref_nodes_seen;
        self.breaks_examined += other.breaks_examined;
        self.flank5p_unanchored += other.flank5p_unanchored;
        self.calls_emitted += other.calls_emitted;
    }
}

/// Slice of a run buffer belonging to one cache path.
#[derive(Debug, Clone, Copy, Default)]
struct PathRefRun {
    first: usize,
    len: usize,
}

/// Shared, read-only call context.
struct CallCtx<'g, W: Write> {
    graph: &'g DbGraph,
    kograph: &'g KOGraph,
    opts: &'g BreakpointOpts,
    out: &'g Mutex<W>,
    callid: &'g AtomicUsize,
}

/// Per-worker scratch buffers; never shared.
#[derive(Default)]
struct Scratch {
    koruns_5p: Vec<KOccurRun>,
    koruns_5p_ended: Vec<KOccurRun>,
    koruns_3p: Vec<KOccurRun>,
    koruns_3p_ended: Vec<KOccurRun>,
    flank5p_run_buf: Vec<KOccurRun>,
    allele_run_buf: Vec<KOccurRun>,
    flank5p_refs: Vec<PathRefRun>,
    allele_refs: Vec<PathRefRun>,
    flank5pbuf: Vec<DbNode>,
    allelebuf: Vec<DbNode>,
    stats: CallStats,
}

/* ---------------------------------------------------------------------- */
/*  crawl hooks                                                           */
/* ---------------------------------------------------------------------- */

/// Extends reference runs at each crawl step and decides whether the
/// walk should continue: stop once every run that started earliest has
/// retired (or, for 5' flanks, once no run is live at all).
struct RefCovgHooks<'a> {
    kograph: &'a KOGraph,
    min_ref_nkmers: usize,
    max_steps: usize,
    /// 5' flank mode: runs are only picked up on the first supernode and
    /// the walk needs a live run to keep going.
    flank5p_mode: bool,
    koruns: &'a mut Vec<KOccurRun>,
    koruns_ended: &'a mut Vec<KOccurRun>,
    runs_buf: &'a mut Vec<KOccurRun>,
    ref_runs: &'a mut Vec<PathRefRun>,
}

impl CrawlHooks for RefCovgHooks<'_> {
    fn step(&mut self, cache: &GraphCache, step_idx: usize) -> bool {
        let step = *cache.step(step_idx);
        let qoffset = cache.path(step.pathid).num_steps - 1;
        let pickup = !self.flank5p_mode || cache.is_first_step(step_idx);

        filter_extend(
            self.kograph,
            cache.step_nodes(&step),
            self.min_ref_nkmers,
            qoffset,
            self.koruns,
            self.koruns_ended,
            pickup,
        );

        if cache.path(step.pathid).num_steps as usize >= self.max_steps {
            return false;
        }
        if self.flank5p_mode && self.koruns.is_empty() {
            return false;
        }
        // continue while our earliest live runs have not all finished
        let min_run_q = self.koruns.iter().map(|r| r.qoffset).min();
        let min_ended_q = self.koruns_ended.iter().map(|r| r.qoffset).min();
        match (min_run_q, min_ended_q) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        }
    }

    fn path_finish(&mut self, _cache: &GraphCache, pathid: u32) {
        let init_len = self.runs_buf.len();
        self.runs_buf.append(self.koruns_ended);
        self.runs_buf
            .extend(filter_runs(self.koruns, self.min_ref_nkmers));
        self.koruns.clear();

        let pathid = pathid as usize;
        if self.ref_runs.len() <= pathid {
            self.ref_runs.resize(pathid + 1, PathRefRun::default());
        }
        self.ref_runs[pathid] = PathRefRun {
            first: init_len,
            len: self.runs_buf.len() - init_len,
        };
    }
}

/// Copy a path's runs out of the run buffer, remapping the step-index
/// query offsets into node offsets along the path, sorted by offset.
fn fetch_ref_contact(
    cache: &GraphCache,
    pathid: u32,
    ref_runs: &[PathRefRun],
    runs_buf: &[KOccurRun],
) -> Vec<KOccurRun> {
    let rr = ref_runs.get(pathid as usize).copied().unwrap_or_default();
    let mut runs = runs_buf[rr.first..rr.first + rr.len].to_vec();
    sort_runs_by_qoffset(&mut runs);

    let steps = cache.path_steps(pathid);
    let mut node_offset = 0usize;
    let mut r = 0usize;
    for (s, step) in steps.iter().enumerate() {
        while r < runs.len() && runs[r].qoffset == s as u32 {
            runs[r].qoffset = node_offset as u32;
            r += 1;
        }
        if r == runs.len() {
            break;
        }
        node_offset += step.num_nodes_used as usize;
    }
    runs
}

/* ---------------------------------------------------------------------- */
/*  per-node calling                                                      */
/* ---------------------------------------------------------------------- */

fn follow_break<W: Write>(
    ctx: &CallCtx<'_, W>,
    fw_crawler: &mut GraphCrawler<'_>,
    rv_crawler: &mut GraphCrawler<'_>,
    sc: &mut Scratch,
    node: DbNode,
) -> Result<(), EngineError> {
    let graph = ctx.graph;
    let nexts = graph.next_nodes(node, graph.edges_union(node.key));

    // split exits into in-reference and novel
    let nonref: SmallVec<[usize; 4]> = nexts
        .iter()
        .enumerate()
        .filter(|(_, (n, _))| ctx.kograph.num_occ(n.key) == 0)
        .map(|(i, _)| i)
        .collect();
    if nonref.is_empty() || nonref.len() == nexts.len() {
        return Ok(());
    }
    sc.stats.breaks_examined += 1;

    for &next_idx in &nonref {
        // 5' flank: walk backwards over the branch node in all colors
        let rev_start = nexts[next_idx].0.reverse();
        let rev_nexts = graph.next_nodes(rev_start, graph.edges_union(rev_start.key));
        let Some(rev_take) = rev_nexts.iter().position(|(n, _)| *n == node.reverse()) else {
            continue;
        };

        sc.koruns_5p.clear();
        sc.koruns_5p_ended.clear();
        sc.flank5p_run_buf.clear();
        sc.flank5p_refs.clear();
        {
            let mut hooks = RefCovgHooks {
                kograph: ctx.kograph,
                min_ref_nkmers: ctx.opts.min_ref_nkmers,
                max_steps: ctx.opts.max_ref_nkmers,
                flank5p_mode: true,
                koruns: &mut sc.koruns_5p,
                koruns_ended: &mut sc.koruns_5p_ended,
                runs_buf: &mut sc.flank5p_run_buf,
                ref_runs: &mut sc.flank5p_refs,
            };
            rv_crawler.fetch(rev_start, &rev_nexts, rev_take, None, &mut hooks);
        }

        for j in 0..rv_crawler.num_paths() {
            let mcp = rv_crawler.multicol_paths[j].clone();

            sc.flank5pbuf.clear();
            rv_crawler.path_nodes(j, &mut sc.flank5pbuf);
            let mut flank5p_runs = fetch_ref_contact(
                &rv_crawler.cache,
                mcp.pathid,
                &sc.flank5p_refs,
                &sc.flank5p_run_buf,
            );
            // flip the flank into its printing orientation
            reverse_runs(&mut flank5p_runs, sc.flank5pbuf.len());
            sort_runs_by_qoffset(&mut flank5p_runs);
            sc.flank5pbuf.reverse();
            for n in sc.flank5pbuf.iter_mut() {
                *n = n.reverse();
            }

            if flank5p_runs.is_empty() {
                sc.stats.flank5p_unanchored += 1;
                continue;
            }

            // allele + 3' flank, only in the colors this flank exists in
            sc.koruns_3p.clear();
            sc.koruns_3p_ended.clear();
            sc.allele_run_buf.clear();
            sc.allele_refs.clear();
            {
                let mut hooks = RefCovgHooks {
                    kograph: ctx.kograph,
                    min_ref_nkmers: ctx.opts.min_ref_nkmers,
                    max_steps: ctx.opts.max_ref_nkmers,
                    flank5p_mode: false,
                    koruns: &mut sc.koruns_3p,
                    koruns_ended: &mut sc.koruns_3p_ended,
                    runs_buf: &mut sc.allele_run_buf,
                    ref_runs: &mut sc.allele_refs,
                };
                fw_crawler.fetch(node, &nexts, next_idx, Some(&mcp.cols), &mut hooks);
            }

            for p in 0..fw_crawler.num_paths() {
                let amcp = fw_crawler.multicol_paths[p].clone();
                sc.allelebuf.clear();
                fw_crawler.path_nodes(p, &mut sc.allelebuf);
                let flank3p_runs = fetch_ref_contact(
                    &fw_crawler.cache,
                    amcp.pathid,
                    &sc.allele_refs,
                    &sc.allele_run_buf,
                );
                process_contig(
                    ctx,
                    &mut sc.stats,
                    &amcp.cols,
                    &sc.flank5pbuf,
                    &sc.allelebuf,
                    &flank5p_runs,
                    &flank3p_runs,
                )?;
            }
        }
    }
    Ok(())
}

/// Emit one record. Up to k-1 allele bases are absorbed into the 3'
/// flank so it anchors on a full reference k-mer.
#[allow(clippy::too_many_arguments)]
fn process_contig<W: Write>(
    ctx: &CallCtx<'_, W>,
    stats: &mut CallStats,
    cols: &[usize],
    flank5pbuf: &[DbNode],
    allelebuf: &[DbNode],
    flank5p_runs: &[KOccurRun],
    flank3p_runs: &[KOccurRun],
) -> Result<(), EngineError> {
    // we never re-met the ref
    if flank3p_runs.is_empty() {
        return Ok(());
    }
    let graph = ctx.graph;
    let k = graph.kmer_size;

    let callid = ctx.callid.fetch_add(1, Ordering::Relaxed);

    let flank3pidx = flank3p_runs[0].qoffset as usize;
    let extra3pbases = (k - 1).min(flank3pidx);
    let num_path_kmers = flank3pidx - extra3pbases;
    let kmer3poffset = k - 1 - extra3pbases;

    let chr5p = format_runs(flank5p_runs, k, ctx.kograph, 0, 0);
    let chr3p = format_runs(flank3p_runs, k, ctx.kograph, flank3pidx, kmer3poffset);
    let flank5p_seq = graph.nodes_to_string(flank5pbuf);
    let flank3p_seq = graph.nodes_to_string_cont(&allelebuf[num_path_kmers..]);
    let path_seq = graph.nodes_to_string_cont(&allelebuf[..num_path_kmers]);
    let cols_str = cols
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let prefix = &ctx.opts.prefix;

    // one record, contiguous under the lock
    let mut guard = ctx.out.lock();
    let w = &mut *guard;
    (|| -> std::io::Result<()> {
        writeln!(w, ">brkpnt.{prefix}{callid}.5pflank chr={chr5p}")?;
        writeln!(w, "{flank5p_seq}")?;
        writeln!(w, ">brkpnt.{prefix}{callid}.3pflank chr={chr3p}")?;
        writeln!(w, "{flank3p_seq}")?;
        writeln!(w, ">brkpnt.{prefix}{callid}.path cols={cols_str}")?;
        writeln!(w, "{path_seq}")?;
        writeln!(w)
    })()
    .map_err(|e| EngineError::io("<breakpoint output>", e))?;

    stats.calls_emitted += 1;
    Ok(())
}

/* ---------------------------------------------------------------------- */
/*  worker orchestration                                                  */
/* ---------------------------------------------------------------------- */

fn run_worker<W: Write>(
    ctx: &CallCtx<'_, W>,
    store: &GPathStore,
    tid: usize,
    nthreads: usize,
) -> Result<CallStats, EngineError> {
    let mut fw_crawler = GraphCrawler::new(ctx.graph, Some(store));
    let mut rv_crawler = GraphCrawler::new(ctx.graph, Some(store));
    let mut sc = Scratch::default();
    let mut first_err: Option<EngineError> = None;

    ctx.graph.ht.for_each_in_partition(tid, nthreads, |hkey| {
        if first_err.is_some() || ctx.kograph.num_occ(hkey) == 0 {
            return;
        }
        sc.stats.ref_nodes_seen += 1;
        let edges = ctx.graph.edges_union(hkey);
        for orient in [Orient::Forward, Orient::Reverse] {
            if edges.outdegree(orient) > 1 {
                let node = DbNode::new(hkey, orient);
                if let Err(e) = follow_break(ctx, &mut fw_crawler, &mut rv_crawler, &mut sc, node)
                {
                    first_err = Some(e);
                    return;
                }
            }
        }
    });

    match first_err {
        Some(e) => Err(e),
        None => Ok(sc.stats),
    }
}

/// Run the caller over the whole graph and write records to `out` (the
/// header should already be there). Returns merged statistics and the
/// writer.
pub fn call_breakpoints<W: Write + Send>(
    graph: &DbGraph,
    store: &GPathStore,
    kograph: &KOGraph,
    opts: &BreakpointOpts,
    out: W,
) -> Result<(CallStats, W), EngineError> {
    assert!(opts.nthreads > 0);
    assert!(!opts.prefix.contains('.'));

    info!(
        "[breakpoints] running with {} thread{}, homology >= {} kmers ({}bp)",
        opts.nthreads,
        if opts.nthreads == 1 { "" } else { "s" },
        opts.min_ref_nkmers,
        opts.min_ref_nkmers + graph.kmer_size - 1
    );

    let out = Mutex::new(out);
    let callid = AtomicUsize::new(0);
    let ctx = CallCtx {
        graph,
        kograph,
        opts,
        out: &out,
        callid: &callid,
    };

    let stats: CallStats = (0..opts.nthreads)
        .into_par_iter()
        .map(|tid| run_worker(&ctx, store, tid, opts.nthreads))
        .try_reduce(CallStats::default, |mut a, b| {
            a += b;
            Ok(a)
        })?;

    info!(
        "[breakpoints] {} calls from {} examined breaks ({} flanks unanchored)",
        stats.calls_emitted, stats.breaks_examined, stats.flank5p_unanchored
    );
    Ok((stats, out.into_inner()))
}
