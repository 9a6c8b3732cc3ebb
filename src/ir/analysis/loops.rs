use super::super::block::BlockId;
use super::super::cfg::Cfg;
use super::dom_tree::DomTree;
use std::collections::{BTreeMap, BTreeSet};

/// A natural loop. Loops sharing a header are merged into one.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: BTreeSet<BlockId>,
    pub latches: Vec<BlockId>,
    pub preheader: Option<BlockId>,
}

impl Loop {
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.blocks.contains(&block_id)
    }

    /// Only loops with a unique outside predecessor of the header are ever
    /// transformed.
    pub fn is_eligible(&self) -> bool {
        self.preheader.is_some()
    }

    /// Instruction indices covered by the loop, ascending.
    pub fn instr_indices(&self, cfg: &Cfg) -> Vec<usize> {
        let mut indices: Vec<usize> = self.blocks.iter().flat_map(|b| cfg[*b].range()).collect();

        indices.sort_unstable();
        indices
    }

    /// The loop occupies one unbroken run of the instruction list starting at
    /// its header.
    pub fn is_contiguous(&self, cfg: &Cfg) -> bool {
        let mut expected = cfg[self.header].start();

        for block_id in self.blocks.iter() {
            let block = &cfg[*block_id];

            if block.start() != expected {
                return false;
            }

            expected = block.end() + 1;
        }

        true
    }

    pub fn instr_count(&self, cfg: &Cfg) -> usize {
        self.blocks.iter().map(|b| cfg[*b].len()).sum()
    }
}

/// Finds every natural loop of the reachable part of the graph, innermost
/// (smallest) first.
pub fn find_loops(cfg: &Cfg, dom_tree: &DomTree) -> Vec<Loop> {
    let mut back_edges: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();

    for block in cfg.get_blocks().iter() {
        let from = block.get_id();

        if !dom_tree.is_reachable(from) {
            continue;
        }

        for succ in block.get_successors().iter() {
            if dom_tree.dominates(*succ, from) {
                back_edges.entry(*succ).or_default().push(from);
            }
        }
    }

    let mut loops: Vec<Loop> = back_edges
        .into_iter()
        .map(|(header, latches)| natural_loop(cfg, dom_tree, header, latches))
        .collect();

    loops.sort_by_key(|l| (l.blocks.len(), l.header));
    loops
}

fn natural_loop(cfg: &Cfg, dom_tree: &DomTree, header: BlockId, latches: Vec<BlockId>) -> Loop {
    let mut blocks = BTreeSet::from([header]);
    let mut work_list = vec![];

    for latch in latches.iter() {
        if blocks.insert(*latch) {
            work_list.push(*latch);
        }
    }

    while let Some(block_id) = work_list.pop() {
        for pred in cfg[block_id].get_predecessors().iter() {
            if dom_tree.is_reachable(*pred) && blocks.insert(*pred) {
                work_list.push(*pred);
            }
        }
    }

    let outside: Vec<BlockId> = cfg[header]
        .get_predecessors()
        .iter()
        .copied()
        .filter(|p| !blocks.contains(p))
        .collect();

    let preheader = if outside.len() == 1 { Some(outside[0]) } else { None };

    Loop {
        header,
        blocks,
        latches,
        preheader,
    }
}
