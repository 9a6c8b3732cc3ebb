use super::super::op::BinaryOp;
use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::constant_fold::eval_binary;
use super::util::{def_counts, untouched_between, use_sites};
use std::collections::HashMap;

/// `value op constant`, with the constant moved right for commutative ops.
fn split(instr: &Tac) -> Option<(&Operand, BinaryOp, &Operand, &Operand)> {
    let Tac::Binary { dest, left, op, right } = instr else {
        return None;
    };

    if !matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) {
        return None;
    }

    match (left.is_constant(), right.is_constant()) {
        (false, true) => Some((dest, *op, left, right)),
        (true, false) if *op != BinaryOp::Sub => Some((dest, *op, right, left)),
        _ => None,
    }
}

/// The single operation equivalent to `(x inner c1) outer c2`.
fn combine(inner: BinaryOp, c1: &Operand, outer: BinaryOp, c2: &Operand, dest: &Operand) -> Option<(BinaryOp, Operand)> {
    let ty = dest.ty()?;

    let (op, value) = match (inner, outer) {
        (BinaryOp::Add, BinaryOp::Add) => (BinaryOp::Add, eval_binary(BinaryOp::Add, c1, c2, ty)?),
        (BinaryOp::Add, BinaryOp::Sub) => (BinaryOp::Add, eval_binary(BinaryOp::Sub, c1, c2, ty)?),
        (BinaryOp::Sub, BinaryOp::Add) => (BinaryOp::Add, eval_binary(BinaryOp::Sub, c2, c1, ty)?),
        (BinaryOp::Sub, BinaryOp::Sub) => (BinaryOp::Sub, eval_binary(BinaryOp::Add, c1, c2, ty)?),
        (BinaryOp::Mul, BinaryOp::Mul) => (BinaryOp::Mul, eval_binary(BinaryOp::Mul, c1, c2, ty)?),
        _ => return None,
    };

    Some((op, Operand::constant(value, ty.clone())))
}

/// Merges two integer operations against constants, joined by a temporary
/// used only once, into a single operation on the combined constant. Integer
/// arithmetic wraps, so the regrouping is exact.
pub fn reassociate(code: &[Tac]) -> Vec<Tac> {
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
        let Some((dest, outer, link, c2)) = split(instr) else {
            continue;
        };

        let key = link.key();
        if !link.is_temp() || defs.get(&key) != Some(&1) || uses.get(&key).map(Vec::as_slice) != Some(&[j][..]) {
            continue;
        }

        let Some(&i) = def_index.get(&key) else {
            continue;
        };

        if i >= j || removed[i] || result[i] != code[i] {
            continue;
        }

        let Some((_, inner, x, c1)) = split(&code[i]) else {
            continue;
        };

        let ty = dest.ty_or_object();
        let same_type = [link, x, c1, c2].iter().all(|operand| operand.ty() == Some(&ty));

        if !ty.is_integer() || !same_type || !untouched_between(code, i, j, &x.key()) {
            continue;
        }

        if let Some((op, constant)) = combine(inner, c1, outer, c2, dest) {
            result[j] = Tac::binary(dest.clone(), x.clone(), op, constant);
            removed[i] = true;
        }
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
    use crate::ir::Type;
    use pretty_assertions::assert_eq;

    fn t(id: u32) -> Operand {
        Operand::temp(id, Type::INT32)
    }

    #[test]
    fn additive_chain_collapses() {
        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::binary(t(1), t(0), BinaryOp::Add, Operand::int(2)),
        ];

        assert_eq!(
            reassociate(&code),
            vec![Tac::binary(t(1), x.clone(), BinaryOp::Add, Operand::int(3))]
        );

        let code = vec![
            Tac::binary(t(0), x.clone(), BinaryOp::Sub, Operand::int(5)),
            Tac::binary(t(1), t(0), BinaryOp::Add, Operand::int(2)),
        ];

        assert_eq!(
            reassociate(&code),
            vec![Tac::binary(t(1), x, BinaryOp::Add, Operand::int(-3))]
        );
    }

    #[test]
    fn multiplicative_chain_with_constant_on_the_left() {
        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::binary(t(0), Operand::int(2), BinaryOp::Mul, x.clone()),
            Tac::binary(t(1), t(0), BinaryOp::Mul, Operand::int(4)),
        ];

        assert_eq!(
            reassociate(&code),
            vec![Tac::binary(t(1), x, BinaryOp::Mul, Operand::int(8))]
        );
    }

    #[test]
    fn floats_and_shared_links_are_left_alone() {
        let f = |id| Operand::temp(id, Type::SINGLE);
        let code = vec![
            Tac::binary(f(0), f(5), BinaryOp::Add, Operand::float(0.1)),
            Tac::binary(f(1), f(0), BinaryOp::Add, Operand::float(0.2)),
        ];

        assert_eq!(reassociate(&code), code);

        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::binary(t(1), t(0), BinaryOp::Add, Operand::int(2)),
            Tac::binary(t(2), t(0), BinaryOp::Add, Operand::int(3)),
        ];

        assert_eq!(reassociate(&code), code);
    }

    #[test]
    fn redefined_base_blocks_the_fold() {
        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::assign(x.clone(), Operand::int(9)),
            Tac::binary(t(1), t(0), BinaryOp::Add, Operand::int(2)),
        ];

        assert_eq!(reassociate(&code), code);
    }
}
