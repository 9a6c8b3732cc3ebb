use super::super::block::{BasicBlock, BlockId};
use super::super::cfg::Cfg;
use super::super::tac::Tac;
use std::collections::HashMap;

/// A dataflow analysis over the blocks of a `Cfg`. The executor keeps one
/// input and one output value per block and reruns `transfer` until nothing
/// changes.
pub trait DFA: Sized {
    type Data;

    const BACKWARDS: bool = false;

    fn exec(&mut self, cfg: &Cfg, code: &[Tac]) {
        let mut executor = DFAExecutor::<Self>::new(cfg);

        executor.init(self, cfg, code);
        executor.exec(self, cfg, code);

        self.complete(executor.inputs, executor.outputs);
    }
    fn init_block(&mut self, block: &BasicBlock, code: &[Tac]) -> (Self::Data, Self::Data);
    fn complete(&mut self, inputs: HashMap<BlockId, Self::Data>, outputs: HashMap<BlockId, Self::Data>);
    fn merge(&mut self, updating: &mut Self::Data, merge: &Self::Data);
    fn transfer(&mut self, block: &BasicBlock, code: &[Tac], start: &Self::Data, end: &mut Self::Data) -> bool;
}

struct DFAExecutor<T>
where
    T: DFA,
{
    inputs: HashMap<BlockId, <T as DFA>::Data>,
    outputs: HashMap<BlockId, <T as DFA>::Data>,
    work_list: Vec<BlockId>,
}

impl<T: DFA> DFAExecutor<T> {
    fn new(cfg: &Cfg) -> Self {
        let mut work_list = cfg.get_block_ids();

        // the list is popped from the back, so forward analyses start at the entry
        if !T::BACKWARDS {
            work_list.reverse();
        }

        Self {
            inputs: HashMap::with_capacity(cfg.len()),
            outputs: HashMap::with_capacity(cfg.len()),
            work_list,
        }
    }

    fn init(&mut self, dfa: &mut T, cfg: &Cfg, code: &[Tac]) {
        for block in cfg.get_blocks().iter() {
            let (init_input, init_output) = dfa.init_block(block, code);

            self.inputs.insert(block.get_id(), init_input);
            self.outputs.insert(block.get_id(), init_output);
        }
    }

    fn exec(&mut self, dfa: &mut T, cfg: &Cfg, code: &[Tac]) {
        while let Some(block_id) = self.work_list.pop() {
            let block = &cfg[block_id];

            if T::BACKWARDS {
                self.propagate_backward(dfa, block, code)
            } else {
                self.propagate_forward(dfa, block, code)
            }
        }
    }

    fn propagate_backward(&mut self, dfa: &mut T, block: &BasicBlock, code: &[Tac]) {
        let id = block.get_id();

        for succ_id in block.get_successors().iter() {
            if let (Some(output), Some(succ_input)) = (self.outputs.get_mut(&id), self.inputs.get(succ_id)) {
                dfa.merge(output, succ_input);
            }
        }

        let (Some(input), Some(output)) = (self.inputs.get_mut(&id), self.outputs.get(&id)) else {
            return;
        };
        let update_flag = dfa.transfer(block, code, output, input);

        if update_flag {
            for pred_id in block.get_predecessors().iter() {
                self.work_list.push(*pred_id);
            }
        }
    }

    fn propagate_forward(&mut self, dfa: &mut T, block: &BasicBlock, code: &[Tac]) {
        let id = block.get_id();

        for pred_id in block.get_predecessors().iter() {
            if let (Some(input), Some(pred_output)) = (self.inputs.get_mut(&id), self.outputs.get(pred_id)) {
                dfa.merge(input, pred_output);
            }
        }

        let (Some(output), Some(input)) = (self.outputs.get_mut(&id), self.inputs.get(&id)) else {
            return;
        };
        let update_flag = dfa.transfer(block, code, input, output);

        if update_flag {
            for succ_id in block.get_successors().iter() {
                self.work_list.push(*succ_id);
            }
        }
    }
}
