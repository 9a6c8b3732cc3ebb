use super::super::block::BlockId;
use super::super::cfg::Cfg;
use super::super::ENTRY_BLOCK_ID;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Dominator sets by plain iteration: `dom(entry) = {entry}` and
/// `dom(b) = {b} ∪ ⋂ dom(p)` over the reachable predecessors `p`. Only blocks
/// reachable from the entry appear in the result.
pub fn compute_dominator_sets(cfg: &Cfg) -> HashMap<BlockId, HashSet<BlockId>> {
    let rpo = cfg.reverse_postorder();
    let reachable: HashSet<BlockId> = rpo.iter().copied().collect();
    let mut dom: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();

    for block_id in rpo.iter() {
        if *block_id == ENTRY_BLOCK_ID {
            dom.insert(*block_id, HashSet::from([*block_id]));
        } else {
            dom.insert(*block_id, reachable.clone());
        }
    }

    let mut changed = true;
    while changed {
        changed = false;

        for block_id in rpo.iter().skip(1) {
            let mut new_set: Option<HashSet<BlockId>> = None;

            for pred in cfg[*block_id].get_predecessors().iter() {
                let Some(pred_set) = dom.get(pred) else {
                    continue;
                };

                new_set = Some(match new_set {
                    None => pred_set.clone(),
                    Some(set) => set.intersection(pred_set).copied().collect(),
                });
            }

            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(*block_id);

            if dom.get(block_id) != Some(&new_set) {
                dom.insert(*block_id, new_set);
                changed = true;
            }
        }
    }

    dom
}

pub fn compute_unreachable_blocks(cfg: &Cfg) -> BTreeSet<BlockId> {
    let reachable = cfg.reachable();

    cfg.get_block_ids()
        .into_iter()
        .filter(|id| !reachable.contains(id))
        .collect()
}

/// Dominator tree built with the Cooper, Harvey and Kennedy algorithm. An
/// Euler tour of the tree gives every reachable block an entry and exit time
/// so that dominance checks are constant time.
#[derive(Debug, Clone)]
pub struct DomTree {
    idom: Vec<Option<BlockId>>,
    children: Vec<Vec<BlockId>>,
    rpo_number: Vec<Option<usize>>,
    tin: Vec<usize>,
    tout: Vec<usize>,
    preorder: Vec<BlockId>,
}

impl DomTree {
    pub fn compute(cfg: &Cfg) -> Self {
        let n = cfg.len();
        let rpo = cfg.reverse_postorder();
        let mut rpo_number = vec![None; n];

        for (i, block_id) in rpo.iter().enumerate() {
            rpo_number[*block_id] = Some(i);
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];

        if !rpo.is_empty() {
            idom[ENTRY_BLOCK_ID] = Some(ENTRY_BLOCK_ID);
        }

        let mut changed = true;
        while changed {
            changed = false;

            for block_id in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;

                for pred in cfg[*block_id].get_predecessors().iter() {
                    if idom[*pred].is_none() {
                        continue;
                    }

                    new_idom = Some(match new_idom {
                        None => *pred,
                        Some(current) => intersect(&idom, &rpo_number, *pred, current),
                    });
                }

                if new_idom.is_some() && idom[*block_id] != new_idom {
                    idom[*block_id] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children = vec![vec![]; n];
        for block_id in rpo.iter().skip(1) {
            if let Some(parent) = idom[*block_id] {
                children[parent].push(*block_id);
            }
        }

        let mut tree = Self {
            idom,
            children,
            rpo_number,
            tin: vec![0; n],
            tout: vec![0; n],
            preorder: vec![],
        };

        tree.number_tree(!rpo.is_empty());
        tree
    }

    fn number_tree(&mut self, has_entry: bool) {
        if !has_entry {
            return;
        }

        let mut clock = 0;
        let mut stack = vec![(ENTRY_BLOCK_ID, 0)];

        self.tin[ENTRY_BLOCK_ID] = clock;
        self.preorder.push(ENTRY_BLOCK_ID);

        while let Some((block_id, next_child)) = stack.pop() {
            clock += 1;

            if next_child < self.children[block_id].len() {
                stack.push((block_id, next_child + 1));

                let child = self.children[block_id][next_child];
                self.tin[child] = clock;
                self.preorder.push(child);
                stack.push((child, 0));
            } else {
                self.tout[block_id] = clock;
            }
        }
    }

    pub fn is_reachable(&self, block_id: BlockId) -> bool {
        self.rpo_number.get(block_id).copied().flatten().is_some()
    }

    /// Immediate dominator; `None` for the entry block and unreachable blocks.
    pub fn idom(&self, block_id: BlockId) -> Option<BlockId> {
        if block_id == ENTRY_BLOCK_ID {
            return None;
        }

        self.idom.get(block_id).copied().flatten()
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }

        self.tin[a] <= self.tin[b] && self.tout[b] <= self.tout[a]
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn children(&self, block_id: BlockId) -> &[BlockId] {
        &self.children[block_id]
    }

    pub fn rpo_number(&self, block_id: BlockId) -> Option<usize> {
        self.rpo_number.get(block_id).copied().flatten()
    }

    /// Reachable blocks in dominator tree pre-order.
    pub fn preorder(&self) -> &[BlockId] {
        &self.preorder
    }

    pub fn dominance_frontiers(&self, cfg: &Cfg) -> Vec<BTreeSet<BlockId>> {
        let mut frontiers = vec![BTreeSet::new(); cfg.len()];

        for block in cfg.get_blocks().iter() {
            let id = block.get_id();
            let preds: Vec<BlockId> = block
                .get_predecessors()
                .iter()
                .copied()
                .filter(|p| self.is_reachable(*p))
                .collect();

            if preds.len() < 2 || !self.is_reachable(id) {
                continue;
            }

            let Some(stop) = self.idom(id) else {
                continue;
            };

            for pred in preds {
                let mut runner = pred;

                while runner != stop {
                    frontiers[runner].insert(id);

                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }

        frontiers
    }

    /// Iterated dominance frontier of a set of blocks.
    pub fn iterated_frontier(
        frontiers: &[BTreeSet<BlockId>],
        blocks: impl IntoIterator<Item = BlockId>,
    ) -> BTreeSet<BlockId> {
        let mut result = BTreeSet::new();
        let mut work_list: Vec<BlockId> = blocks.into_iter().collect();

        while let Some(block_id) = work_list.pop() {
            for frontier in frontiers[block_id].iter() {
                if result.insert(*frontier) {
                    work_list.push(*frontier);
                }
            }
        }

        result
    }
}

fn intersect(
    idom: &[Option<BlockId>],
    rpo_number: &[Option<usize>],
    mut b1: BlockId,
    mut b2: BlockId,
) -> BlockId {
    let num = |b: BlockId| rpo_number[b].unwrap_or(usize::MAX);

    while b1 != b2 {
        while num(b1) > num(b2) {
            match idom[b1] {
                Some(parent) => b1 = parent,
                None => return b2,
            }
        }
        while num(b2) > num(b1) {
            match idom[b2] {
                Some(parent) => b2 = parent,
                None => return b1,
            }
        }
    }

    b1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Tac, Type};

    fn t(id: u32) -> Operand {
        Operand::temp(id, Type::Boolean)
    }

    // b0 -> b1 (head) -> b2 (body) -> b3 (inner test) -> b1 | b4 ; b1 -> b5 (exit)
    fn nested_code() -> Vec<Tac> {
        vec![
            Tac::assign(t(0), Operand::boolean(true)),
            Tac::label("head"),
            Tac::cond_jump(t(0), "exit"),
            Tac::label("body"),
            Tac::cond_jump(t(1), "skip"),
            Tac::label("inner"),
            Tac::jump("head"),
            Tac::label("skip"),
            Tac::jump("head"),
            Tac::label("exit"),
            Tac::Return { value: None, return_var: None },
        ]
    }

    #[test]
    fn both_algorithms_agree() {
        let code = nested_code();
        let cfg = Cfg::new(&code);
        let sets = compute_dominator_sets(&cfg);
        let tree = DomTree::compute(&cfg);

        for a in cfg.get_block_ids() {
            for b in cfg.get_block_ids() {
                let by_sets = sets.get(&b).map(|s| s.contains(&a)).unwrap_or(false);

                assert_eq!(by_sets, tree.dominates(a, b), "dominates({a}, {b})");
            }
        }
    }

    #[test]
    fn dominance_is_a_partial_order() {
        let code = nested_code();
        let cfg = Cfg::new(&code);
        let tree = DomTree::compute(&cfg);
        let reachable = cfg.reachable();

        for a in reachable.iter() {
            assert!(tree.dominates(ENTRY_BLOCK_ID, *a));
            assert!(tree.dominates(*a, *a));

            for b in reachable.iter() {
                if a != b {
                    assert!(!(tree.dominates(*a, *b) && tree.dominates(*b, *a)));
                }
            }
        }
    }

    #[test]
    fn idoms_and_frontiers() {
        let code = nested_code();
        let cfg = Cfg::new(&code);
        let tree = DomTree::compute(&cfg);
        let head = cfg.block_for_label("head").unwrap();
        let body = cfg.block_for_label("body").unwrap();
        let inner = cfg.block_for_label("inner").unwrap();
        let skip = cfg.block_for_label("skip").unwrap();
        let exit = cfg.block_for_label("exit").unwrap();

        assert_eq!(tree.idom(ENTRY_BLOCK_ID), None);
        assert_eq!(tree.idom(head), Some(ENTRY_BLOCK_ID));
        assert_eq!(tree.idom(body), Some(head));
        assert_eq!(tree.idom(inner), Some(body));
        assert_eq!(tree.idom(skip), Some(body));
        assert_eq!(tree.idom(exit), Some(head));

        let frontiers = tree.dominance_frontiers(&cfg);

        assert!(frontiers[inner].contains(&head));
        assert!(frontiers[skip].contains(&head));
        assert!(frontiers[body].contains(&head));
        assert!(frontiers[ENTRY_BLOCK_ID].is_empty());

        let idf = DomTree::iterated_frontier(&frontiers, [inner]);
        assert_eq!(idf, BTreeSet::from([head]));
    }

    #[test]
    fn unreachable_blocks_are_not_dominated() {
        let code = vec![
            Tac::jump("end"),
            Tac::assign(t(0), Operand::boolean(false)),
            Tac::label("end"),
        ];
        let cfg = Cfg::new(&code);
        let tree = DomTree::compute(&cfg);

        assert_eq!(compute_unreachable_blocks(&cfg), BTreeSet::from([1]));
        assert!(!tree.dominates(ENTRY_BLOCK_ID, 1));
        assert!(tree.dominates(ENTRY_BLOCK_ID, 2));
        assert_eq!(tree.preorder(), &[0, 2]);
    }
}
