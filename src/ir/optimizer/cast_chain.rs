use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::util::{def_counts, untouched_between, use_sites};
use std::collections::HashMap;

fn widens_losslessly(from: &Operand, to: &Operand) -> bool {
    match (
        from.ty().and_then(|ty| ty.numeric_kind()),
        to.ty().and_then(|ty| ty.numeric_kind()),
    ) {
        (Some(from), Some(to)) => from.widens_losslessly_to(&to),
        _ => false,
    }
}

/// Collapses `t = (B) x; d = (C) t` into `d = (C) x` when the first step is a
/// lossless numeric widening, so the value reaching the second conversion is
/// unchanged. A float narrowed to an integer still goes through the target's
/// own truncation. Casts to the operand's own type become assignments.
pub fn fold_cast_chains(code: &[Tac]) -> Vec<Tac> {
    let defs = def_counts(code);
    let uses = use_sites(code);
    let mut def_index: HashMap<OperandKey, usize> = HashMap::new();

    for (i, instr) in code.iter().enumerate() {
        if let Some(dest) = instr.dest() {
            def_index.insert(dest.key(), i);
        }
    }

    let mut result = code.to_vec();
    let mut removed = vec![false; code.len()];

    for (j, instr) in code.iter().enumerate() {
        let Tac::Cast { dest, src: link } = instr else {
            continue;
        };

        if dest.ty().is_some() && dest.ty() == link.ty() {
            result[j] = Tac::assign(dest.clone(), link.clone());
            continue;
        }

        let key = link.key();
        let single_use = uses.get(&key).map(Vec::as_slice) == Some(&[j][..]);

        if !link.is_temp() || defs.get(&key) != Some(&1) || !single_use {
            continue;
        }

        let Some(&i) = def_index.get(&key) else {
            continue;
        };

        let Tac::Cast { src: x, .. } = &code[i] else {
            continue;
        };

        let numeric_target = dest.ty_or_object().is_numeric();

        if i >= j || removed[i] || !numeric_target || !widens_losslessly(x, link) {
            continue;
        }

        if x.is_temp() || x.is_variable() {
            if !untouched_between(code, i, j, &x.key()) {
                continue;
            }
        }

        result[j] = if x.ty() == dest.ty() {
            Tac::assign(dest.clone(), x.clone())
        } else {
            Tac::Cast {
                dest: dest.clone(),
                src: x.clone(),
            }
        };
        removed[i] = true;
    }

    result
        .into_iter()
        .zip(removed)
        .filter_map(|(instr, removed)| if removed { None } else { Some(instr) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{NumericKind, Type};
    use pretty_assertions::assert_eq;

    fn cast(dest: Operand, src: Operand) -> Tac {
        Tac::Cast { dest, src }
    }

    #[test]
    fn widening_then_conversion_collapses() {
        let x = Operand::local("x", Type::INT32);
        let long = Operand::temp(0, Type::Numeric(NumericKind::Int64));
        let d = Operand::temp(1, Type::DOUBLE);
        let code = vec![cast(long, x.clone()), cast(d.clone(), Operand::temp(0, Type::Numeric(NumericKind::Int64)))];

        assert_eq!(fold_cast_chains(&code), vec![cast(d, x)]);
    }

    #[test]
    fn round_trip_becomes_assignment() {
        let x = Operand::local("x", Type::SINGLE);
        let wide = Operand::temp(0, Type::DOUBLE);
        let d = Operand::temp(1, Type::SINGLE);
        let code = vec![cast(wide.clone(), x.clone()), cast(d.clone(), wide)];

        assert_eq!(fold_cast_chains(&code), vec![Tac::assign(d, x)]);
    }

    #[test]
    fn truncation_step_is_kept() {
        let x = Operand::local("x", Type::DOUBLE);
        let int = Operand::temp(0, Type::INT32);
        let d = Operand::temp(1, Type::DOUBLE);
        let code = vec![cast(int.clone(), x), cast(d, int)];

        assert_eq!(fold_cast_chains(&code), code);
    }

    #[test]
    fn string_targets_are_kept() {
        let x = Operand::local("x", Type::INT32);
        let long = Operand::temp(0, Type::Numeric(NumericKind::Int64));
        let s = Operand::temp(1, Type::String);
        let code = vec![cast(long.clone(), x), cast(s, long)];

        assert_eq!(fold_cast_chains(&code), code);
    }
}
