use super::super::op::{BinaryOp, UnaryOp};
use super::super::operand::Operand;
use super::super::tac::Tac;
use super::super::types::Type;

fn bool_const(operand: &Operand) -> Option<bool> {
    operand.as_constant().and_then(|value| value.as_bool())
}

fn is_bool(operand: &Operand) -> bool {
    operand.ty() == Some(&Type::Boolean)
}

fn simplify_logical(dest: &Operand, left: &Operand, op: BinaryOp, right: &Operand) -> Option<Tac> {
    if !is_bool(dest) || !is_bool(left) || !is_bool(right) {
        return None;
    }

    let assign = |src: Operand| Some(Tac::assign(dest.clone(), src));
    // the absorbing element of && is false, of || is true
    let absorbing = op == BinaryOp::Or;

    match (bool_const(left), bool_const(right)) {
        (Some(l), _) if l == absorbing => assign(Operand::boolean(absorbing)),
        (_, Some(r)) if r == absorbing => assign(Operand::boolean(absorbing)),
        (Some(_), _) => assign(right.clone()),
        (_, Some(_)) => assign(left.clone()),
        (None, None) if left.same_location(right) => assign(left.clone()),
        (None, None) => None,
    }
}

fn simplify_equality(dest: &Operand, left: &Operand, op: BinaryOp, right: &Operand) -> Option<Tac> {
    if !is_bool(dest) {
        return None;
    }

    let (value, constant) = match (bool_const(left), bool_const(right)) {
        (None, Some(c)) if is_bool(left) => (left, c),
        (Some(c), None) if is_bool(right) => (right, c),
        _ => return None,
    };

    // x == true and x != false keep x, the other two negate it
    if constant == (op == BinaryOp::Eq) {
        Some(Tac::assign(dest.clone(), value.clone()))
    } else {
        Some(Tac::Unary {
            dest: dest.clone(),
            op: UnaryOp::Not,
            operand: value.clone(),
        })
    }
}

/// Boolean identities, equality against boolean literals and conditional
/// jumps on constant conditions.
pub fn simplify_boolean(code: &[Tac]) -> Vec<Tac> {
    let mut result = Vec::with_capacity(code.len());

    for instr in code.iter() {
        let simplified = match instr {
            Tac::Binary {
                dest,
                left,
                op: op @ (BinaryOp::And | BinaryOp::Or),
                right,
            } => simplify_logical(dest, left, *op, right),
            Tac::Binary {
                dest,
                left,
                op: op @ (BinaryOp::Eq | BinaryOp::Ne),
                right,
            } => simplify_equality(dest, left, *op, right),
            Tac::CondJump { cond, label } => match bool_const(cond) {
                // never taken
                Some(true) => continue,
                Some(false) => Some(Tac::jump(label)),
                None => None,
            },
            _ => None,
        };

        result.push(simplified.unwrap_or_else(|| instr.clone()));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn b(id: u32) -> Operand {
        Operand::temp(id, Type::Boolean)
    }

    #[test]
    fn constant_guards() {
        let code = vec![
            Tac::binary(b(1), b(0), BinaryOp::And, Operand::boolean(false)),
            Tac::binary(b(2), Operand::boolean(true), BinaryOp::And, b(0)),
            Tac::binary(b(3), b(0), BinaryOp::Or, Operand::boolean(true)),
            Tac::binary(b(4), Operand::boolean(false), BinaryOp::Or, b(0)),
            Tac::binary(b(5), b(0), BinaryOp::Or, b(0)),
        ];

        assert_eq!(
            simplify_boolean(&code),
            vec![
                Tac::assign(b(1), Operand::boolean(false)),
                Tac::assign(b(2), b(0)),
                Tac::assign(b(3), Operand::boolean(true)),
                Tac::assign(b(4), b(0)),
                Tac::assign(b(5), b(0)),
            ]
        );
    }

    #[test]
    fn equality_against_literal() {
        let code = vec![
            Tac::binary(b(1), b(0), BinaryOp::Eq, Operand::boolean(true)),
            Tac::binary(b(2), Operand::boolean(false), BinaryOp::Eq, b(0)),
            Tac::binary(b(3), b(0), BinaryOp::Ne, Operand::boolean(false)),
        ];

        assert_eq!(
            simplify_boolean(&code),
            vec![
                Tac::assign(b(1), b(0)),
                Tac::Unary {
                    dest: b(2),
                    op: UnaryOp::Not,
                    operand: b(0),
                },
                Tac::assign(b(3), b(0)),
            ]
        );
    }

    #[test]
    fn constant_conditional_jumps() {
        let code = vec![
            Tac::cond_jump(Operand::boolean(true), "skip"),
            Tac::cond_jump(Operand::boolean(false), "other"),
            Tac::label("skip"),
            Tac::label("other"),
        ];

        assert_eq!(
            simplify_boolean(&code),
            vec![Tac::jump("other"), Tac::label("skip"), Tac::label("other")]
        );
    }

    #[test]
    fn non_boolean_equality_is_kept() {
        let code = vec![Tac::binary(b(1), Operand::temp(0, Type::INT32), BinaryOp::Eq, Operand::int(1))];

        assert_eq!(simplify_boolean(&code), code);
    }
}
