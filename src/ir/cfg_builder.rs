use super::block::{BasicBlock, BlockId};
use super::cfg::Cfg;
use super::operand::LabelName;
use super::tac::Tac;
use std::collections::HashMap;

pub struct CfgBuilder {
    blocks: Vec<BasicBlock>,
    label_map: HashMap<LabelName, BlockId>,
    jump_edges: Vec<(BlockId, LabelName)>,
    non_jump_edges: Vec<(BlockId, BlockId)>,
    current_start: Option<usize>,
    current_label: Option<LabelName>,
    non_jump_edge_flag: bool,
}

impl CfgBuilder {
    fn new() -> Self {
        Self {
            blocks: vec![],
            label_map: HashMap::new(),
            jump_edges: vec![],
            non_jump_edges: vec![],
            current_start: None,
            current_label: None,
            non_jump_edge_flag: false,
        }
    }

    pub fn build(code: &[Tac]) -> Cfg {
        let mut builder = Self::new();

        builder.blocks_from_tac(code);
        builder.link_blocks();

        Cfg::from_parts(builder.blocks, builder.label_map, code.len())
    }

    fn blocks_from_tac(&mut self, code: &[Tac]) {
        for (i, tac) in code.iter().enumerate() {
            match tac {
                Tac::Label { label } => self.process_label(i, label),
                Tac::Jump { label } => self.process_jump(i, label, false),
                Tac::CondJump { label, .. } => self.process_jump(i, label, true),
                Tac::Return { .. } => self.process_return(i),
                _ => self.process_basic_tac(i),
            }
        }

        if let Some(start) = self.current_start {
            self.close_block(start, code.len() - 1);
        }
    }

    fn process_basic_tac(&mut self, i: usize) {
        if self.current_start.is_none() {
            self.open_block(i, None);
        }
    }

    fn process_label(&mut self, i: usize, label: &LabelName) {
        if let Some(start) = self.current_start {
            self.close_block(start, i - 1);
            self.non_jump_edge_flag = true;
        }

        self.open_block(i, Some(label.clone()));
    }

    fn process_jump(&mut self, i: usize, label: &LabelName, conditional: bool) {
        let id = self.take_or_open(i);

        self.jump_edges.push((id, label.clone()));
        self.non_jump_edge_flag = conditional;
    }

    fn process_return(&mut self, i: usize) {
        self.take_or_open(i);

        self.non_jump_edge_flag = false;
    }

    // closes the block ending at `i`, returning its id
    fn take_or_open(&mut self, i: usize) -> BlockId {
        if self.current_start.is_none() {
            self.open_block(i, None);
        }

        let start = self.current_start.unwrap_or(i);

        self.close_block(start, i)
    }

    fn open_block(&mut self, start: usize, label: Option<LabelName>) {
        let id = self.blocks.len();

        if self.non_jump_edge_flag && id > 0 {
            self.non_jump_edges.push((id - 1, id));
        }

        if let Some(label) = &label {
            self.label_map.insert(label.clone(), id);
        }

        self.non_jump_edge_flag = false;
        self.current_start = Some(start);
        self.current_label = label;
    }

    fn close_block(&mut self, start: usize, end: usize) -> BlockId {
        let id = self.blocks.len();
        let label = self.current_label.take();

        self.blocks.push(BasicBlock::new(id, start, end, label));
        self.current_start = None;
        // a block closed without a jump falls through into the next one
        self.non_jump_edge_flag = true;

        id
    }

    fn link_blocks(&mut self) {
        let mut edges = vec![];

        for (from, to) in self.non_jump_edges.iter() {
            edges.push((*from, *to));
        }

        for (from, label) in self.jump_edges.iter() {
            if let Some(to) = self.label_map.get(label) {
                edges.push((*from, *to));
            }
        }

        // fallthrough edges first, then jump targets
        edges.sort_by_key(|(from, _)| *from);

        for (from, to) in edges.into_iter() {
            self.blocks[from].add_successor(to);
            self.blocks[to].add_predecessor(from);
        }
    }
}
