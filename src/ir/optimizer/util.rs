use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use std::collections::{HashMap, HashSet};

pub fn def_counts(code: &[Tac]) -> HashMap<OperandKey, usize> {
    let mut counts = HashMap::new();

    for instr in code.iter() {
        if let Some(dest) = instr.dest() {
            *counts.entry(dest.key()).or_insert(0) += 1;
        }
    }

    counts
}

pub fn use_counts(code: &[Tac]) -> HashMap<OperandKey, usize> {
    let mut counts = HashMap::new();

    for instr in code.iter() {
        for operand in instr.used() {
            if matches!(operand, Operand::Temporary { .. } | Operand::Variable(_)) {
                *counts.entry(operand.key()).or_insert(0) += 1;
            }
        }
    }

    counts
}

/// Index of every instruction using each operand.
pub fn use_sites(code: &[Tac]) -> HashMap<OperandKey, Vec<usize>> {
    let mut sites: HashMap<OperandKey, Vec<usize>> = HashMap::new();

    for (i, instr) in code.iter().enumerate() {
        for operand in instr.used() {
            if matches!(operand, Operand::Temporary { .. } | Operand::Variable(_)) {
                let entry = sites.entry(operand.key()).or_default();

                if entry.last() != Some(&i) {
                    entry.push(i);
                }
            }
        }
    }

    sites
}

pub fn referenced_labels(code: &[Tac]) -> HashSet<String> {
    code.iter()
        .filter_map(|instr| instr.jump_target())
        .map(str::to_string)
        .collect()
}

/// True when the code between `from` (exclusive) and `to` (exclusive) neither
/// redefines `key` nor leaves the straight line.
pub fn untouched_between(code: &[Tac], from: usize, to: usize, key: &OperandKey) -> bool {
    code[from + 1..to].iter().all(|instr| {
        !instr.is_label()
            && !instr.is_terminator()
            && instr.dest().map(|d| d.key() != *key).unwrap_or(true)
    })
}

/// Pure producers that cannot raise at runtime, so they may run earlier than
/// written or not at all.
pub fn cannot_trap(instr: &Tac) -> bool {
    match instr {
        Tac::Assign { .. } | Tac::Copy { .. } | Tac::Unary { .. } => true,
        Tac::Binary { op, right, dest, .. } if op.can_trap() && dest.ty_or_object().is_integer() => {
            match right.as_constant().and_then(|value| value.as_i128()) {
                Some(divisor) => divisor != 0 && divisor != -1,
                None => false,
            }
        }
        Tac::Binary { .. } => true,
        Tac::Cast { dest, src } => match (src.ty(), dest.ty()) {
            (Some(from), Some(to)) if from == to => true,
            (Some(from), Some(to)) => match (from.numeric_kind(), to.numeric_kind()) {
                (Some(from), Some(to)) => from.widens_losslessly_to(&to),
                _ => false,
            },
            _ => false,
        },
        _ => false,
    }
}
