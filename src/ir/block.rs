use super::operand::LabelName;
use super::tac::Tac;
use std::ops::RangeInclusive;

pub type BlockId = usize;

/// A maximal straight-line run of the flat instruction list. `start` and `end`
/// are inclusive indices into that list.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    id: BlockId,
    start: usize,
    end: usize,
    label: Option<LabelName>,
    successors: Vec<BlockId>,
    predecessors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId, start: usize, end: usize, label: Option<LabelName>) -> Self {
        Self {
            id,
            start,
            end,
            label,
            successors: vec![],
            predecessors: vec![],
        }
    }

    pub fn get_id(&self) -> BlockId {
        self.id
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn get_successors(&self) -> &Vec<BlockId> {
        &self.successors
    }

    pub fn get_predecessors(&self) -> &Vec<BlockId> {
        &self.predecessors
    }

    pub fn add_successor(&mut self, block_id: BlockId) {
        if !self.successors.contains(&block_id) {
            self.successors.push(block_id);
        }
    }

    pub fn add_predecessor(&mut self, block_id: BlockId) {
        if !self.predecessors.contains(&block_id) {
            self.predecessors.push(block_id);
        }
    }

    pub fn instrs<'a>(&self, code: &'a [Tac]) -> &'a [Tac] {
        &code[self.start..=self.end]
    }

    pub fn terminator<'a>(&self, code: &'a [Tac]) -> Option<&'a Tac> {
        code.get(self.end).filter(|instr| instr.is_terminator())
    }

    /// Index at which code appended to this block must go: before its
    /// terminator, or after its last instruction when it falls through.
    pub fn insertion_point(&self, code: &[Tac]) -> usize {
        if self.terminator(code).is_some() {
            self.end
        } else {
            self.end + 1
        }
    }
}
