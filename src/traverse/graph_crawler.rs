//! Multi-color crawler: explores every color-consistent extension from a
//! chosen branch exit, one link-guided walk per color, and coalesces
//! walks that emit identical supernode sequences into multi-color paths.

use smallvec::SmallVec;

use crate::graph::db_graph::{DbGraph, DbNode};
use crate::kmer::nuc::Nuc;
use crate::paths::gpath_store::GPathStore;
use crate::traverse::graph_cache::GraphCache;
use crate::traverse::graph_walker::GraphWalker;
use crate::traverse::repeat_walker::RepeatWalker;

/// Callbacks driving a crawl. Implemented by the caller and
/// monomorphized into the crawl loop; no boxed dispatch.
pub trait CrawlHooks {
    /// Consulted after each recorded step; returning false ends the path.
    fn step(&mut self, _cache: &GraphCache, _step_idx: usize) -> bool {
        true
    }

    /// A per-color walk finished as `pathid` (before coalescing).
    fn path_finish(&mut self, _cache: &GraphCache, _pathid: u32) {}
}

impl CrawlHooks for () {}

/// Colors whose walks emitted byte-identical sequences from the start.
#[derive(Debug, Clone)]
pub struct MultiColPath {
    pub pathid: u32,
    pub cols: Vec<usize>,
}

pub struct GraphCrawler<'g> {
    graph: &'g DbGraph,
    store: Option<&'g GPathStore>,
    pub cache: GraphCache<'g>,
    rpt: RepeatWalker,
    pub multicol_paths: Vec<MultiColPath>,
    touched: Vec<DbNode>,
}

impl<'g> GraphCrawler<'g> {
    pub fn new(graph: &'g DbGraph, store: Option<&'g GPathStore>) -> Self {
        GraphCrawler {
            graph,
            store,
            cache: GraphCache::new(graph),
            rpt: RepeatWalker::new(graph.ht.capacity()),
            multicol_paths: Vec::new(),
            touched: Vec::new(),
        }
    }

    pub fn num_paths(&self) -> usize {
        self.multicol_paths.len()
    }

    /// Nodes of coalesced path `i`, appended to `out`.
    pub fn path_nodes(&self, i: usize, out: &mut Vec<DbNode>) {
        self.cache.path_nodes(self.multicol_paths[i].pathid, out);
    }

    /// Crawl all extensions through `nexts[take_idx]` from the branch
    /// node `node0`.
    ///
    /// * `cols`  - color subset to walk, or `None` for every color
    /// * `hooks` - step predicate and per-path finish callback
    pub fn fetch<H: CrawlHooks>(
        &mut self,
        node0: DbNode,
        nexts: &[(DbNode, Nuc)],
        take_idx: usize,
        cols: Option<&[usize]>,
        hooks: &mut H,
    ) {
        self.cache.reset();
        self.multicol_paths.clear();
        let (node1, nuc1) = nexts[take_idx];

        let col_list: SmallVec<[usize; 8]> = match cols {
            Some(cs) => cs.iter().copied().collect(),
            None => (0..self.graph.num_cols).collect(),
        };

        let mut crawled: SmallVec<[(u32, usize); 8]> = SmallVec::new();
        for &col in &col_list {
            if !self
                .graph
                .edges(node0.key, col)
                .has_edge(nuc1, node0.orient)
            {
                continue; // this color never takes the chosen exit
            }
            let pathid = self.crawl_color(col, node0, node1, nuc1, hooks);
            crawled.push((pathid, col));
        }

        // coalesce identical walks
        let mut sigs: Vec<Vec<(u32, u32)>> = Vec::new();
        for (pathid, col) in crawled {
            let sig = self.cache.path_signature(pathid);
            match sigs.iter().position(|s| *s == sig) {
                Some(i) => self.multicol_paths[i].cols.push(col),
                None => {
                    sigs.push(sig);
                    self.multicol_paths.push(MultiColPath {
                        pathid,
                        cols: vec![col],
                    });
                }
            }
        }
    }

    /// Walk one color from `node1`, recording supernode steps. Returns
    /// the cache path id.
    fn crawl_color<H: CrawlHooks>(
        &mut self,
        col: usize,
        node0: DbNode,
        node1: DbNode,
        nuc1: Nuc,
        hooks: &mut H,
    ) -> u32 {
        let mut walker = GraphWalker::new(self.graph, self.store, col, col);
        walker.init(node0);
        walker.force_step(node1, nuc1);

        self.touched.clear();
        self.touched.push(node1);
        self.rpt.attempt_step(node1, nuc1);

        let pathid = self.cache.new_path();
        let mut cur = node1;
        loop {
            let sid = self.cache.get_or_add_snode(cur);
            let total = self.cache.snode(sid).num_nodes as usize;

            // follow the supernode interior; the color may die inside it
            // or the repeat guard may cut the walk short
            let mut used = 1usize;
            let mut blocked = false;
            while used < total {
                match walker.next() {
                    Some((n, nuc)) => {
                        if !self.rpt.attempt_step(n, nuc) {
                            blocked = true;
                            break;
                        }
                        self.touched.push(n);
                        debug_assert_eq!(n, self.cache.snode_nodes(sid)[used]);
                        used += 1;
                    }
                    None => {
                        blocked = true;
                        break;
                    }
                }
            }

            let step_idx = self.cache.push_step(pathid, sid, used as u32);
            let keep_going = hooks.step(&self.cache, step_idx);
            if !keep_going || blocked || used < total {
                break;
            }

            // cross the junction into the next supernode
            match walker.next() {
                Some((n, nuc)) => {
                    if !self.rpt.attempt_step(n, nuc) {
                        break;
                    }
                    self.touched.push(n);
                    cur = n;
                }
                None => break,
            }
        }

        hooks.path_finish(&self.cache, pathid);
        walker.finish();
        self.rpt.fast_clear(&self.touched);
        pathid
    }
}
