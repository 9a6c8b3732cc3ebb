use super::super::analysis::{find_loops, DomTree, Loop};
use super::super::cfg::Cfg;
use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::gvn::is_idempotent_member;
use super::util::{cannot_trap, use_sites};
use std::collections::{HashMap, HashSet};

const MAX_HOIST_ROUNDS: usize = 64;

struct LoopFacts<'a> {
    code: &'a [Tac],
    cfg: &'a Cfg,
    dom_tree: &'a DomTree,
    members: HashSet<usize>,
    def_counts: HashMap<OperandKey, usize>,
    uses: HashMap<OperandKey, Vec<usize>>,
    has_effects: bool,
    header_entered_directly: bool,
}

impl<'a> LoopFacts<'a> {
    fn new(code: &'a [Tac], cfg: &'a Cfg, dom_tree: &'a DomTree, l: &Loop, preheader: usize) -> Self {
        let members: HashSet<usize> = l.instr_indices(cfg).into_iter().collect();
        let mut def_counts = HashMap::new();
        let mut has_effects = false;

        for i in members.iter() {
            let instr = &code[*i];

            if let Some(dest) = instr.dest() {
                *def_counts.entry(dest.key()).or_insert(0) += 1;
            }

            has_effects |= instr.is_call() || instr.mutated_object().is_some();
        }

        Self {
            code,
            cfg,
            dom_tree,
            members,
            def_counts,
            uses: use_sites(code),
            has_effects,
            header_entered_directly: cfg[preheader].get_successors() == &vec![l.header],
        }
    }

    fn is_candidate_kind(&self, l: &Loop, index: usize) -> bool {
        let instr = &self.code[index];

        match instr {
            Tac::PropertyGet { property, .. } => {
                // the header runs whenever the loop is entered
                is_idempotent_member(property)
                    && self.header_entered_directly
                    && self.cfg.block_of(index) == Some(l.header)
            }
            _ => instr.is_pure_producer() && cannot_trap(instr),
        }
    }

    fn defines_once_and_only_feeds_loop(&self, l: &Loop, index: usize, dest: &Operand) -> bool {
        let key = dest.key();

        if !dest.is_unit_private() || self.def_counts.get(&key) != Some(&1) {
            return false;
        }

        let Some(def_block) = self.cfg.block_of(index) else {
            return false;
        };

        if !l.latches.iter().all(|latch| self.dom_tree.dominates(def_block, *latch)) {
            return false;
        }

        self.uses.get(&key).map(Vec::as_slice).unwrap_or(&[]).iter().all(|site| {
            if !self.members.contains(site) {
                return false;
            }

            match self.cfg.block_of(*site) {
                Some(use_block) if use_block == def_block => *site > index,
                Some(use_block) => self.dom_tree.strictly_dominates(def_block, use_block),
                None => false,
            }
        })
    }

    fn operand_is_invariant(&self, operand: &Operand, hoisted: &HashSet<OperandKey>) -> bool {
        if operand.is_constant() {
            return true;
        }

        // a call or store in the loop may change anything but private storage
        if self.has_effects && !operand.is_unit_private() {
            return false;
        }

        let key = operand.key();
        !self.def_counts.contains_key(&key) || hoisted.contains(&key)
    }
}

/// Picks the instructions of `l` to hoist, in an order where each comes after
/// the hoisted instructions it depends on.
fn select_invariants(facts: &LoopFacts, l: &Loop) -> Vec<usize> {
    let mut indices: Vec<usize> = facts.members.iter().copied().collect();
    indices.sort_unstable();

    let eligible: Vec<usize> = indices
        .into_iter()
        .filter(|i| facts.is_candidate_kind(l, *i))
        .filter(|i| match facts.code[*i].dest() {
            Some(dest) => facts.defines_once_and_only_feeds_loop(l, *i, dest),
            None => false,
        })
        .collect();

    let mut order = vec![];
    let mut hoisted_keys: HashSet<OperandKey> = HashSet::new();
    let mut changed = true;

    while changed {
        changed = false;

        for index in eligible.iter() {
            if order.contains(index) {
                continue;
            }

            let instr = &facts.code[*index];
            if instr
                .used()
                .into_iter()
                .all(|operand| facts.operand_is_invariant(operand, &hoisted_keys))
            {
                if let Some(dest) = instr.dest() {
                    hoisted_keys.insert(dest.key());
                }

                order.push(*index);
                changed = true;
            }
        }
    }

    order
}

fn hoist_once(code: &[Tac]) -> Option<Vec<Tac>> {
    let cfg = Cfg::new(code);
    let dom_tree = DomTree::compute(&cfg);

    for l in find_loops(&cfg, &dom_tree).iter() {
        let Some(preheader) = l.preheader else {
            continue;
        };

        let facts = LoopFacts::new(code, &cfg, &dom_tree, l, preheader);
        if facts.members.iter().any(|i| code[*i].is_phi()) {
            continue;
        }

        let order = select_invariants(&facts, l);
        if order.is_empty() {
            continue;
        }

        log::debug!("hoisting {} instructions out of the loop at block {}", order.len(), l.header);

        let at = cfg[preheader].insertion_point(code);
        let moved: HashSet<usize> = order.iter().copied().collect();
        let mut result = Vec::with_capacity(code.len());

        for (i, instr) in code.iter().enumerate() {
            if i == at {
                result.extend(order.iter().map(|index| code[*index].clone()));
            }

            if !moved.contains(&i) {
                result.push(instr.clone());
            }
        }

        if at == code.len() {
            result.extend(order.iter().map(|index| code[*index].clone()));
        }

        return Some(result);
    }

    None
}

/// Moves loop-invariant computations of loops with a preheader to the end of
/// that preheader, repeating until nothing moves.
pub fn hoist_loop_invariants(code: &[Tac]) -> Vec<Tac> {
    let mut code = code.to_vec();

    for _ in 0..MAX_HOIST_ROUNDS {
        match hoist_once(&code) {
            Some(next) => code = next,
            None => break,
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type, Variable};
    use pretty_assertions::assert_eq;

    fn t(id: u32) -> Operand {
        Operand::temp(id, Type::INT32)
    }

    fn counting_loop(body: Vec<Tac>) -> Vec<Tac> {
        let i = Operand::local("i", Type::INT32);
        let n = Operand::local("n", Type::INT32);
        let cond = Operand::temp(0, Type::Boolean);
        let mut code = vec![
            Tac::assign(i.clone(), Operand::int(0)),
            Tac::label("loop"),
            Tac::binary(cond.clone(), i.clone(), BinaryOp::Lt, n),
            Tac::cond_jump(cond, "end"),
        ];

        code.extend(body);
        code.push(Tac::jump("loop"));
        code.push(Tac::label("end"));
        code
    }

    #[test]
    fn invariant_chain_moves_to_preheader() {
        let i = Operand::local("i", Type::INT32);
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let code = counting_loop(vec![
            Tac::binary(t(1), a.clone(), BinaryOp::Mul, b.clone()),
            Tac::binary(t(2), t(1), BinaryOp::Add, Operand::int(1)),
            Tac::binary(i.clone(), i.clone(), BinaryOp::Add, t(2)),
        ]);

        let result = hoist_loop_invariants(&code);

        assert_eq!(result[0], code[0]);
        assert_eq!(result[1], code[4]);
        assert_eq!(result[2], code[5]);
        assert_eq!(result[3], Tac::label("loop"));
        assert_eq!(result.len(), code.len());
        assert_eq!(result[6], code[6]);
    }

    #[test]
    fn fields_stay_when_loop_calls_out() {
        let field = Operand::var(Variable::field("speed", Type::INT32));
        let call = Tac::Call {
            dest: None,
            func: "UnityEngine.Debug.Log".to_string(),
            args: vec![t(1)],
            tail_call: false,
        };
        let code = counting_loop(vec![
            Tac::binary(t(1), field, BinaryOp::Mul, Operand::int(2)),
            call,
        ]);

        assert_eq!(hoist_loop_invariants(&code), code);
    }

    #[test]
    fn division_by_unknown_value_stays() {
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let log = |arg| Tac::Call {
            dest: None,
            func: "UnityEngine.Debug.Log".to_string(),
            args: vec![arg],
            tail_call: false,
        };
        let code = counting_loop(vec![
            Tac::binary(t(1), a.clone(), BinaryOp::Div, b),
            log(t(1)),
        ]);

        assert_eq!(hoist_loop_invariants(&code), code);

        let code = counting_loop(vec![Tac::binary(t(1), a, BinaryOp::Div, Operand::int(4)), log(t(1))]);
        let result = hoist_loop_invariants(&code);

        assert_eq!(result[1], code[4]);
    }

    #[test]
    fn value_used_after_loop_stays() {
        let a = Operand::local("a", Type::INT32);
        let mut code = counting_loop(vec![Tac::binary(t(1), a, BinaryOp::Add, Operand::int(1))]);

        code.push(Tac::Return {
            value: Some(t(1)),
            return_var: None,
        });

        assert_eq!(hoist_loop_invariants(&code), code);
    }

    #[test]
    fn loop_without_preheader_is_skipped() {
        let a = Operand::local("a", Type::INT32);
        let c = Operand::temp(9, Type::Boolean);
        let code = vec![
            Tac::cond_jump(c.clone(), "head"),
            Tac::assign(t(5), Operand::int(1)),
            Tac::label("head"),
            Tac::binary(t(1), a, BinaryOp::Add, Operand::int(1)),
            Tac::cond_jump(c, "head"),
        ];

        assert_eq!(hoist_loop_invariants(&code), code);
    }

    #[test]
    fn conditional_arm_is_not_hoisted() {
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let sum = Operand::local("sum", Type::INT32);
        let code = counting_loop(vec![
            Tac::cond_jump(Operand::local("c", Type::Boolean), "skip"),
            Tac::binary(t(1), a, BinaryOp::Mul, b),
            Tac::binary(sum.clone(), sum, BinaryOp::Add, t(1)),
            Tac::label("skip"),
        ]);

        assert_eq!(hoist_loop_invariants(&code), code);
    }
}
