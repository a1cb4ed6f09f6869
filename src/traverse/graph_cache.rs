//! Scratch cache for one crawler invocation: supernodes walked once and
//! shared between per-color paths, steps grouped per path.
//!
//! A supernode here is the maximal unbranching run (in the union of all
//! colors) from an entry node: every interior node has union out-degree
//! one and its successor union in-degree one. A color-restricted walk may
//! stop partway through a supernode, so each step records how many of the
//! supernode's nodes it actually used.

use fxhash::FxHashMap;

use crate::graph::db_graph::{DbGraph, DbNode};

#[derive(Debug, Clone, Copy)]
pub struct GCacheSnode {
    first_node: u32,
    pub num_nodes: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct GCacheStep {
    pub supernode: u32,
    pub num_nodes_used: u32,
    pub pathid: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GCachePath {
    pub first_step: u32,
    pub num_steps: u32,
}

pub struct GraphCache<'g> {
    graph: &'g DbGraph,
    nodes: Vec<DbNode>,
    snodes: Vec<GCacheSnode>,
    steps: Vec<GCacheStep>,
    paths: Vec<GCachePath>,
    snode_map: FxHashMap<DbNode, u32>,
}

impl<'g> GraphCache<'g> {
    pub fn new(graph: &'g DbGraph) -> Self {
        GraphCache {
            graph,
            nodes: Vec::with_capacity(1024),
            snodes: Vec::new(),
            steps: Vec::new(),
            paths: Vec::new(),
            snode_map: FxHashMap::default(),
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.snodes.clear();
        self.steps.clear();
        self.paths.clear();
        self.snode_map.clear();
    }

    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    pub fn snode(&self, id: u32) -> &GCacheSnode {
        &self.snodes[id as usize]
    }

    pub fn snode_nodes(&self, id: u32) -> &[DbNode] {
        let s = &self.snodes[id as usize];
        &self.nodes[s.first_node as usize..(s.first_node + s.num_nodes) as usize]
    }

    pub fn step(&self, idx: usize) -> &GCacheStep {
        &self.steps[idx]
    }

    pub fn path(&self, pathid: u32) -> &GCachePath {
        &self.paths[pathid as usize]
    }

    pub fn path_steps(&self, pathid: u32) -> &[GCacheStep] {
        let p = &self.paths[pathid as usize];
        &self.steps[p.first_step as usize..(p.first_step + p.num_steps) as usize]
    }

    /// Nodes actually walked by a step.
    pub fn step_nodes(&self, step: &GCacheStep) -> &[DbNode] {
        &self.snode_nodes(step.supernode)[..step.num_nodes_used as usize]
    }

    /// True when `idx` is the first step of its path.
    pub fn is_first_step(&self, idx: usize) -> bool {
        self.paths[self.steps[idx].pathid as usize].first_step as usize == idx
    }

    /// Append all nodes of a path, in walk order.
    pub fn path_nodes(&self, pathid: u32, out: &mut Vec<DbNode>) {
        for step in self.path_steps(pathid) {
            out.extend_from_slice(self.step_nodes(step));
        }
    }

    /// Number of nodes along a path up to (not including) step `s`.
    pub fn path_node_offset(&self, pathid: u32, s: usize) -> usize {
        self.path_steps(pathid)[..s]
            .iter()
            .map(|st| st.num_nodes_used as usize)
            .sum()
    }

    /* ---------------- building ---------------- */

    /// Supernode from `entry`, walked on demand and deduplicated by its
    /// entry node.
    pub fn get_or_add_snode(&mut self, entry: DbNode) -> u32 {
        if let Some(&id) = self.snode_map.get(&entry) {
            return id;
        }
        let first_node = self.nodes.len() as u32;
        self.nodes.push(entry);
        let mut cur = entry;
        loop {
            let union = self.graph.edges_union(cur.key);
            let outs = self.graph.next_nodes(cur, union);
            if outs.len() != 1 {
                break;
            }
            let next = outs[0].0;
            // arriving from >1 predecessor starts a new supernode;
            // closing a perfect cycle would loop forever
            if self.graph.edges_union(next.key).indegree(next.orient) != 1 || next == entry {
                break;
            }
            self.nodes.push(next);
            cur = next;
        }
        let id = self.snodes.len() as u32;
        self.snodes.push(GCacheSnode {
            first_node,
            num_nodes: (self.nodes.len() as u32) - first_node,
        });
        self.snode_map.insert(entry, id);
        id
    }

    pub fn new_path(&mut self) -> u32 {
        let id = self.paths.len() as u32;
        self.paths.push(GCachePath {
            first_step: self.steps.len() as u32,
            num_steps: 0,
        });
        id
    }

    /// Record a step for the path currently being built (paths are built
    /// one at a time, so steps of a path stay contiguous).
    pub fn push_step(&mut self, pathid: u32, supernode: u32, num_nodes_used: u32) -> usize {
        debug_assert_eq!(pathid as usize, self.paths.len() - 1);
        let idx = self.steps.len();
        self.steps.push(GCacheStep {
            supernode,
            num_nodes_used,
            pathid,
        });
        self.paths[pathid as usize].num_steps += 1;
        idx
    }

    /// Step signature of a path, for coalescing identical walks.
    pub fn path_signature(&self, pathid: u32) -> Vec<(u32, u32)> {
        self.path_steps(pathid)
            .iter()
            .map(|s| (s.supernode, s.num_nodes_used))
            .collect()
    }
}
