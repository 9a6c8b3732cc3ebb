use super::super::operand::LabelName;
use super::super::tac::Tac;
use super::util::{cannot_trap, referenced_labels, use_counts};
use std::collections::HashSet;

const MAX_CLEANUP_ROUNDS: usize = 32;

/// Drops instructions between a jump or return and the next label.
fn remove_unreachable_runs(code: &[Tac]) -> Vec<Tac> {
    let mut result = Vec::with_capacity(code.len());
    let mut dead = false;

    for instr in code.iter() {
        if instr.is_label() {
            dead = false;
        }

        if !dead {
            result.push(instr.clone());
        }

        if instr.ends_flow() {
            dead = true;
        }
    }

    result
}

/// Drops jumps whose target is among the labels directly following them.
fn remove_fallthrough_jumps(code: &[Tac]) -> Vec<Tac> {
    let mut result = Vec::with_capacity(code.len());

    for (i, instr) in code.iter().enumerate() {
        let redundant = match instr {
            Tac::Jump { label } | Tac::CondJump { label, .. } => code[i + 1..]
                .iter()
                .take_while(|next| next.is_label())
                .any(|next| next.label_name() == Some(label.as_str())),
            _ => false,
        };

        if !redundant {
            result.push(instr.clone());
        }
    }

    result
}

fn remove_unreferenced_labels(code: &[Tac], pinned: &HashSet<LabelName>) -> Vec<Tac> {
    let referenced = referenced_labels(code);

    code.iter()
        .filter(|instr| match instr.label_name() {
            Some(label) => referenced.contains(label) || pinned.contains(label),
            None => true,
        })
        .cloned()
        .collect()
}

/// Drops side-effect free definitions of temporaries nobody reads.
fn remove_dead_temps(code: &[Tac]) -> Vec<Tac> {
    let uses = use_counts(code);

    code.iter()
        .filter(|instr| match instr.dest() {
            Some(dest) if dest.is_temp() && instr.is_pure_producer() && cannot_trap(instr) => {
                uses.get(&dest.key()).copied().unwrap_or(0) > 0
            }
            _ => true,
        })
        .cloned()
        .collect()
}

/// Removes unreachable straight-line code, jumps to the next instruction,
/// labels nothing jumps to and unused temporaries, until none are left.
/// Labels in `pinned` are entry points and always stay.
pub fn remove_dead_code(code: &[Tac], pinned: &HashSet<LabelName>) -> Vec<Tac> {
    // block ids inside phis would no longer match
    if code.iter().any(Tac::is_phi) {
        return code.to_vec();
    }

    let mut code = code.to_vec();

    for _ in 0..MAX_CLEANUP_ROUNDS {
        let next = remove_unreachable_runs(&code);
        let next = remove_fallthrough_jumps(&next);
        let next = remove_unreferenced_labels(&next, pinned);
        let next = remove_dead_temps(&next);

        if next == code {
            break;
        }

        code = next;
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Operand, Type};
    use pretty_assertions::assert_eq;

    fn log(value: Operand) -> Tac {
        Tac::Call {
            dest: None,
            func: "UnityEngine.Debug.Log".to_string(),
            args: vec![value],
            tail_call: false,
        }
    }

    #[test]
    fn jump_to_next_label_and_the_label_go() {
        let code = vec![
            log(Operand::int(1)),
            Tac::jump("next"),
            Tac::label("next"),
            log(Operand::int(2)),
        ];

        assert_eq!(
            remove_dead_code(&code, &HashSet::new()),
            vec![log(Operand::int(1)), log(Operand::int(2))]
        );
    }

    #[test]
    fn code_after_return_is_dropped() {
        let code = vec![
            Tac::Return {
                value: None,
                return_var: None,
            },
            log(Operand::int(1)),
            Tac::label("entry"),
            log(Operand::int(2)),
        ];
        let pinned = HashSet::from(["entry".to_string()]);

        assert_eq!(
            remove_dead_code(&code, &pinned),
            vec![code[0].clone(), code[2].clone(), code[3].clone()]
        );
    }

    #[test]
    fn unused_temporaries_are_dropped_but_traps_stay() {
        let t = |id| Operand::temp(id, Type::INT32);
        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::binary(t(1), x.clone(), BinaryOp::Div, t(5)),
            Tac::assign(x.clone(), Operand::int(3)),
        ];

        assert_eq!(
            remove_dead_code(&code, &HashSet::new()),
            vec![code[1].clone(), code[2].clone()]
        );
    }

    #[test]
    fn referenced_labels_stay() {
        let c = Operand::temp(0, Type::Boolean);
        let code = vec![
            Tac::label("top"),
            log(Operand::int(1)),
            Tac::cond_jump(c, "top"),
        ];

        assert_eq!(remove_dead_code(&code, &HashSet::new()), code);
    }
}
