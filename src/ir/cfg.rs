use super::block::{BasicBlock, BlockId};
use super::cfg_builder::CfgBuilder;
use super::operand::LabelName;
use super::tac::Tac;
use super::ENTRY_BLOCK_ID;
use std::collections::{HashMap, HashSet};
use std::ops::Index;

/// Basic blocks over a flat instruction list. The CFG only stores index
/// ranges; the instructions stay owned by the caller.
#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
    label_map: HashMap<LabelName, BlockId>,
    instr_count: usize,
}

impl Cfg {
    pub fn new(code: &[Tac]) -> Self {
        CfgBuilder::build(code)
    }

    pub(super) fn from_parts(
        blocks: Vec<BasicBlock>,
        label_map: HashMap<LabelName, BlockId>,
        instr_count: usize,
    ) -> Self {
        Self {
            blocks,
            label_map,
            instr_count,
        }
    }

    pub fn get_blocks(&self) -> &Vec<BasicBlock> {
        &self.blocks
    }

    pub fn get_block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn get_block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|block| block.get_id()).collect()
    }

    pub fn get_entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.get(ENTRY_BLOCK_ID)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn instr_count(&self) -> usize {
        self.instr_count
    }

    pub fn block_for_label(&self, label: &str) -> Option<BlockId> {
        self.label_map.get(label).copied()
    }

    /// The block containing instruction `index`.
    pub fn block_of(&self, index: usize) -> Option<BlockId> {
        let pos = self.blocks.partition_point(|block| block.start() <= index);

        if pos == 0 {
            return None;
        }

        let block = &self.blocks[pos - 1];

        if index <= block.end() {
            Some(block.get_id())
        } else {
            None
        }
    }

    pub fn reachable(&self) -> HashSet<BlockId> {
        self.postorder().into_iter().collect()
    }

    /// Depth-first postorder from the entry block. Unreachable blocks are
    /// not included.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut order = vec![];

        if self.blocks.is_empty() {
            return order;
        }

        let mut visited = vec![false; self.blocks.len()];
        let mut stack: Vec<(BlockId, usize)> = vec![(ENTRY_BLOCK_ID, 0)];
        visited[ENTRY_BLOCK_ID] = true;

        while let Some((block_id, next_succ)) = stack.pop() {
            let succs = self.blocks[block_id].get_successors();

            if next_succ < succs.len() {
                stack.push((block_id, next_succ + 1));

                let succ = succs[next_succ];
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(block_id);
            }
        }

        order
    }

    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }
}

impl Index<BlockId> for Cfg {
    type Output = BasicBlock;

    fn index(&self, i: BlockId) -> &BasicBlock {
        self.get_block(i)
    }
}
