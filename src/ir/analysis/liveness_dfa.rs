use super::super::block::{BasicBlock, BlockId};
use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::dfa::DFA;
use std::collections::{HashMap, HashSet};

// Tracks temporaries and variables by storage identity. Phi sources are treated
// as plain uses of the phi's block, which over-approximates liveness in SSA form.

pub struct LivenessDFA {
    live_in: HashMap<BlockId, HashSet<OperandKey>>,
    live_out: HashMap<BlockId, HashSet<OperandKey>>,
}

fn tracked(operand: &Operand) -> bool {
    matches!(operand, Operand::Temporary { .. } | Operand::Variable(_))
}

impl LivenessDFA {
    pub fn new() -> Self {
        Self {
            live_in: HashMap::new(),
            live_out: HashMap::new(),
        }
    }

    pub fn is_live_on_entry(&self, block_id: BlockId, key: &OperandKey) -> bool {
        self.live_in.get(&block_id).map(|set| set.contains(key)).unwrap_or(false)
    }

    pub fn is_live_on_exit(&self, block_id: BlockId, key: &OperandKey) -> bool {
        self.live_out.get(&block_id).map(|set| set.contains(key)).unwrap_or(false)
    }

    pub fn get_live_in(&self, block_id: BlockId) -> Option<&HashSet<OperandKey>> {
        self.live_in.get(&block_id)
    }

    pub fn get_live_out(&self, block_id: BlockId) -> Option<&HashSet<OperandKey>> {
        self.live_out.get(&block_id)
    }
}

impl Default for LivenessDFA {
    fn default() -> Self {
        Self::new()
    }
}

impl DFA for LivenessDFA {
    const BACKWARDS: bool = true;

    type Data = HashSet<OperandKey>;

    fn complete(&mut self, inputs: HashMap<BlockId, Self::Data>, outputs: HashMap<BlockId, Self::Data>) {
        self.live_in = inputs;
        self.live_out = outputs;
    }

    fn init_block(&mut self, _block: &BasicBlock, _code: &[Tac]) -> (Self::Data, Self::Data) {
        (HashSet::new(), HashSet::new())
    }

    fn transfer(&mut self, block: &BasicBlock, code: &[Tac], live_out: &Self::Data, live_in: &mut Self::Data) -> bool {
        let mut defined: HashSet<OperandKey> = HashSet::new();
        let mut updated_flag = false;

        for instr in block.instrs(code).iter() {
            for operand in instr.used() {
                if !tracked(operand) {
                    continue;
                }

                let key = operand.key();
                if !defined.contains(&key) {
                    updated_flag |= live_in.insert(key);
                }
            }

            if let Some(dest) = instr.dest() {
                if tracked(dest) {
                    defined.insert(dest.key());
                }
            }
        }

        // LIVE IN = USED BEFORE DEFINED + LIVE OUT THAT WEREN'T DEFINED
        for key in live_out.difference(&defined) {
            updated_flag |= live_in.insert(key.clone());
        }

        updated_flag
    }

    fn merge(&mut self, updating: &mut Self::Data, merge: &Self::Data) {
        for key in merge.iter() {
            updating.insert(key.clone());
        }
    }
}
