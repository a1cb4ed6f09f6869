//! Repeat guard for walks: one byte per hash slot, a bit per
//! (orientation, chosen base). Re-taking a step a walk already took means
//! the traversal has re-entered a repeat and must stop.

use crate::graph::db_graph::DbNode;
use crate::kmer::nuc::Nuc;

pub struct RepeatWalker {
    bits: Vec<u8>,
}

impl RepeatWalker {
    /// `capacity` is the hash table capacity (slots).
    pub fn new(capacity: usize) -> Self {
        RepeatWalker {
            bits: vec![0u8; capacity],
        }
    }

    #[inline(always)]
    fn mask(node: DbNode, nuc: Nuc) -> u8 {
        1u8 << (node.orient.idx() * 4 + (nuc & 3) as usize)
    }

    /// Mark the step onto `node` via `nuc`; false if it was already taken.
    pub fn attempt_step(&mut self, node: DbNode, nuc: Nuc) -> bool {
        let m = Self::mask(node, nuc);
        let b = &mut self.bits[node.key];
        if *b & m != 0 {
            return false;
        }
        *b |= m;
        true
    }

    /// Clear only the marks touched by `nodes`: O(len) instead of wiping
    /// the whole bitset between walks.
    pub fn fast_clear(&mut self, nodes: &[DbNode]) {
        for n in nodes {
            self.bits[n.key] = 0;
        }
    }
}
