//! Link-guided traversal. The walker keeps a set of "link cursors", one
//! per link picked up along the walk; at a fork each cursor votes for the
//! junction base it recorded, weighted by how often the link was seen.
//! The winning base is taken, agreeing cursors advance and disagreeing
//! ones are dropped.

use smallvec::SmallVec;

use crate::graph::db_graph::{DbGraph, DbNode};
use crate::kmer::nuc::Nuc;
use crate::paths::gpath_store::GPathStore;

/// Why the last `next()` returned `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Still walking.
    None,
    /// No outgoing edge in the walker's colors.
    NoEdge,
    /// More than one outgoing edge and no link voted.
    UnresolvedFork,
}

struct LinkCursor {
    seq: SmallVec<[u8; 8]>,
    num_juncs: usize,
    pos: usize,
    weight: u32,
    age: u64,
}

impl LinkCursor {
    #[inline]
    fn next_junc(&self) -> Nuc {
        crate::kmer::packed_seq::get(&self.seq, self.pos)
    }
}

pub struct GraphWalker<'g> {
    graph: &'g DbGraph,
    store: Option<&'g GPathStore>,
    col_from: usize,
    col_to: usize,
    pub node: DbNode,
    cursors: Vec<LinkCursor>,
    age_counter: u64,
    last_stop: StopReason,
}

impl<'g> GraphWalker<'g> {
    /// Walk in the inclusive color range `col_from..=col_to`, guided by
    /// `store` links when given.
    pub fn new(
        graph: &'g DbGraph,
        store: Option<&'g GPathStore>,
        col_from: usize,
        col_to: usize,
    ) -> Self {
        assert!(col_from <= col_to && col_to < graph.num_cols);
        GraphWalker {
            graph,
            store,
            col_from,
            col_to,
            node: DbNode::new(0, crate::kmer::binary_kmer::Orient::Forward),
            cursors: Vec::new(),
            age_counter: 0,
            last_stop: StopReason::None,
        }
    }

    /// Start a walk at `node`, seeding cursors from its links.
    pub fn init(&mut self, node: DbNode) {
        self.cursors.clear();
        self.node = node;
        self.last_stop = StopReason::None;
        self.pickup_links();
    }

    /// Drop all cursors. `last_stop` keeps describing the finished walk
    /// until the next `init`. Pair with `RepeatWalker::fast_clear` on the
    /// emitted nodes.
    pub fn finish(&mut self) {
        self.cursors.clear();
    }

    pub fn last_stop(&self) -> StopReason {
        self.last_stop
    }

    /// Load links of the current node as fresh cursors.
    fn pickup_links(&mut self) {
        let Some(store) = self.store else { return };
        for link in store.links(self.node.key) {
            if link.orient != self.node.orient {
                continue;
            }
            let weight: u32 = (self.col_from..=self.col_to)
                .filter(|&c| store.colset_has(&link, c))
                .map(|c| store.nseen(&link, c).max(1) as u32)
                .sum();
            if weight == 0 {
                continue; // no color overlap
            }
            self.age_counter += 1;
            self.cursors.push(LinkCursor {
                seq: link.seq.clone(),
                num_juncs: link.num_juncs,
                pos: 0,
                weight,
                age: self.age_counter,
            });
        }
    }

    /// Advance cursors that agree with `chosen`, discard the rest.
    fn consume_junction(&mut self, chosen: Nuc) {
        self.cursors.retain_mut(|c| {
            if c.next_junc() != chosen {
                return false;
            }
            c.pos += 1;
            c.pos < c.num_juncs
        });
    }

    /// Take one step. `None` when the walk cannot continue; see
    /// `last_stop` for why.
    pub fn next(&mut self) -> Option<(DbNode, Nuc)> {
        let edges = self
            .graph
            .edges_in_cols(self.node.key, self.col_from, self.col_to);
        let nexts = self.graph.next_nodes(self.node, edges);

        let (next, nuc) = match nexts.len() {
            0 => {
                self.last_stop = StopReason::NoEdge;
                return None;
            }
            1 => nexts[0],
            _ => {
                let Some(chosen) = self.vote(&nexts) else {
                    self.last_stop = StopReason::UnresolvedFork;
                    return None;
                };
                self.consume_junction(chosen);
                match nexts.iter().find(|(_, n)| *n == chosen) {
                    Some(&hit) => hit,
                    None => {
                        // vote() only returns bases present in nexts
                        self.last_stop = StopReason::UnresolvedFork;
                        return None;
                    }
                }
            }
        };
        self.node = next;
        self.pickup_links();
        Some((next, nuc))
    }

    /// Step to a predetermined next node, consuming cursors as if its
    /// base had won the vote. Used to orient the first step of a crawl.
    pub fn force_step(&mut self, next: DbNode, nuc: Nuc) {
        let edges = self
            .graph
            .edges_in_cols(self.node.key, self.col_from, self.col_to);
        if edges.outdegree(self.node.orient) > 1 {
            self.consume_junction(nuc);
        }
        self.node = next;
        self.pickup_links();
    }

    /// Pick the fork base with the maximum cursor votes. Ties go to the
    /// base backed by the most recently loaded link, then the lowest
    /// base. `None` when no cursor backs any valid exit.
    fn vote(&self, nexts: &[(DbNode, Nuc)]) -> Option<Nuc> {
        let mut votes = [0u64; 4];
        let mut newest = [0u64; 4];
        for c in &self.cursors {
            let b = c.next_junc() as usize;
            if nexts.iter().any(|(_, n)| *n as usize == b) {
                votes[b] += c.weight as u64;
                newest[b] = newest[b].max(c.age);
            }
        }
        let mut best: Option<usize> = None;
        for b in 0..4 {
            if votes[b] == 0 {
                continue;
            }
            best = match best {
                None => Some(b),
                Some(cur) => {
                    if votes[b] > votes[cur]
                        || (votes[b] == votes[cur] && newest[b] > newest[cur])
                    {
                        Some(b)
                    } else {
                        Some(cur)
                    }
                }
            };
        }
        best.map(|b| b as Nuc)
    }
}
