use super::super::analysis::DFA;
use super::super::block::{BasicBlock, BlockId};
use super::super::cfg::Cfg;
use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::super::ENTRY_BLOCK_ID;
use std::collections::HashMap;

/// Available `dest <- src` copies, keyed by destination.
#[derive(Debug, Clone, Default, PartialEq)]
struct CopyTable {
    copies: HashMap<OperandKey, Operand>,
}

fn is_propagatable(dest: &Operand, src: &Operand) -> bool {
    dest.is_temp()
        && src.is_temp()
        && dest.ty() == src.ty()
        && !dest.same_location(src)
        && !dest.ty_or_object().is_mutable_container()
}

impl CopyTable {
    fn kill(&mut self, key: &OperandKey) {
        self.copies.retain(|dest, src| dest != key && src.key() != *key);
    }

    fn substitute(&self, instr: &Tac) -> Tac {
        if self.copies.is_empty() || instr.is_phi() {
            return instr.clone();
        }

        // the mutated object keeps its own name
        let mutated = instr.mutated_object().map(Operand::key);

        instr.map_used(|operand| {
            let key = operand.key();

            if Some(&key) == mutated.as_ref() {
                return operand.clone();
            }

            self.copies.get(&key).cloned().unwrap_or_else(|| operand.clone())
        })
    }

    /// Rewrites `instr` with the copies available before it, then updates the
    /// table with its effects.
    fn step(&mut self, instr: &Tac) -> Tac {
        let rewritten = self.substitute(instr);

        if let Some(dest) = rewritten.dest() {
            self.kill(&dest.key());
        }

        if let Some(object) = rewritten.mutated_object() {
            self.kill(&object.key());
        }

        if let Tac::Copy { dest, src } = &rewritten {
            if is_propagatable(dest, src) {
                self.copies.insert(dest.key(), src.clone());
            }
        }

        rewritten
    }
}

/// Block-local forward substitution of temporary-to-temporary copies.
pub fn propagate_copies_local(code: &[Tac]) -> Vec<Tac> {
    let mut table = CopyTable::default();
    let mut result = Vec::with_capacity(code.len());

    for instr in code.iter() {
        if instr.is_label() {
            table = CopyTable::default();
        }

        result.push(table.step(instr));

        if instr.is_terminator() {
            table = CopyTable::default();
        }
    }

    result
}

/// Copies available on entry to each block: the intersection over all
/// predecessors. `None` is the optimistic top value of blocks not yet reached.
struct AvailableCopiesDFA {
    inputs: HashMap<BlockId, Option<CopyTable>>,
}

impl DFA for AvailableCopiesDFA {
    type Data = Option<CopyTable>;

    fn init_block(&mut self, block: &BasicBlock, _code: &[Tac]) -> (Self::Data, Self::Data) {
        if block.get_id() == ENTRY_BLOCK_ID || block.get_predecessors().is_empty() {
            (Some(CopyTable::default()), None)
        } else {
            (None, None)
        }
    }

    fn complete(&mut self, inputs: HashMap<BlockId, Self::Data>, _outputs: HashMap<BlockId, Self::Data>) {
        self.inputs = inputs;
    }

    fn merge(&mut self, updating: &mut Self::Data, merge: &Self::Data) {
        let Some(incoming) = merge else {
            return;
        };

        match updating {
            None => *updating = Some(incoming.clone()),
            Some(table) => table
                .copies
                .retain(|dest, src| incoming.copies.get(dest) == Some(src)),
        }
    }

    fn transfer(&mut self, block: &BasicBlock, code: &[Tac], start: &Self::Data, end: &mut Self::Data) -> bool {
        let Some(start) = start else {
            return false;
        };

        let mut table = start.clone();
        for instr in block.instrs(code).iter() {
            table.step(instr);
        }

        let updated = Some(table);
        if *end != updated {
            *end = updated;
            true
        } else {
            false
        }
    }
}

/// Whole-CFG copy propagation: a copy reaches a block when it is available at
/// the end of every predecessor.
pub fn propagate_copies(code: &[Tac]) -> Vec<Tac> {
    let cfg = Cfg::new(code);
    let mut dfa = AvailableCopiesDFA {
        inputs: HashMap::new(),
    };

    dfa.exec(&cfg, code);

    let mut result = Vec::with_capacity(code.len());

    for block in cfg.get_blocks().iter() {
        let mut table = dfa
            .inputs
            .get(&block.get_id())
            .cloned()
            .flatten()
            .unwrap_or_default();

        for instr in block.instrs(code).iter() {
            result.push(table.step(instr));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};
    use pretty_assertions::assert_eq;

    fn t(id: u32) -> Operand {
        Operand::temp(id, Type::INT32)
    }

    #[test]
    fn local_copies_are_forwarded() {
        let code = vec![
            Tac::copy(t(1), t(0)),
            Tac::copy(t(2), t(1)),
            Tac::binary(t(3), t(2), BinaryOp::Add, Operand::int(1)),
        ];

        assert_eq!(
            propagate_copies_local(&code),
            vec![
                Tac::copy(t(1), t(0)),
                Tac::copy(t(2), t(0)),
                Tac::binary(t(3), t(0), BinaryOp::Add, Operand::int(1)),
            ]
        );
    }

    #[test]
    fn redefinition_of_source_kills_copy() {
        let code = vec![
            Tac::copy(t(1), t(0)),
            Tac::assign(t(0), Operand::int(5)),
            Tac::binary(t(2), t(1), BinaryOp::Add, Operand::int(1)),
        ];

        assert_eq!(propagate_copies_local(&code), code);
    }

    #[test]
    fn copies_do_not_cross_labels_locally() {
        let code = vec![
            Tac::copy(t(1), t(0)),
            Tac::label("next"),
            Tac::binary(t(2), t(1), BinaryOp::Add, Operand::int(1)),
        ];

        assert_eq!(propagate_copies_local(&code), code);
    }

    #[test]
    fn dataflow_intersects_predecessors() {
        let c = Operand::temp(9, Type::Boolean);
        let code = vec![
            Tac::copy(t(1), t(0)),
            Tac::cond_jump(c.clone(), "else"),
            Tac::copy(t(2), t(0)),
            Tac::jump("join"),
            Tac::label("else"),
            Tac::assign(t(2), Operand::int(3)),
            Tac::label("join"),
            Tac::binary(t(3), t(1), BinaryOp::Add, t(2)),
        ];

        let result = propagate_copies(&code);

        assert_eq!(
            result.last(),
            Some(&Tac::binary(t(3), t(0), BinaryOp::Add, t(2)))
        );
    }

    #[test]
    fn copies_flow_around_loops_only_when_unchanged() {
        let c = Operand::temp(9, Type::Boolean);
        let code = vec![
            Tac::copy(t(1), t(0)),
            Tac::label("loop"),
            Tac::binary(t(2), t(1), BinaryOp::Add, Operand::int(1)),
            Tac::assign(t(0), t(2)),
            Tac::cond_jump(c, "loop"),
        ];

        assert_eq!(propagate_copies(&code), code);
    }
}
