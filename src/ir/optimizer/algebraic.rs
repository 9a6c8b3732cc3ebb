use super::super::op::BinaryOp;
use super::super::operand::{ConstValue, Operand};
use super::super::tac::Tac;
use super::super::types::Type;

fn zero_of(ty: &Type) -> Option<Operand> {
    let value = match ty {
        Type::Numeric(kind) if kind.is_unsigned() => ConstValue::UInt(0),
        Type::Numeric(kind) if kind.is_integer() => ConstValue::Int(0),
        Type::Boolean => ConstValue::Bool(false),
        _ => return None,
    };

    Some(Operand::constant(value, ty.clone()))
}

fn int_const(value: i128, ty: &Type) -> Option<Operand> {
    let kind = ty.numeric_kind()?;

    ConstValue::from_i128(value, kind).map(|value| Operand::constant(value, ty.clone()))
}

/// `log2(value)` when the integer constant is a power of two greater than one.
fn power_of_two(operand: &Operand) -> Option<u32> {
    if !operand.ty()?.is_integer() {
        return None;
    }

    let value = operand.as_constant()?.as_i128()?;

    if value > 1 && value & (value - 1) == 0 {
        Some(value.trailing_zeros())
    } else {
        None
    }
}

fn is_zero(operand: &Operand) -> bool {
    operand.as_constant().map(ConstValue::is_zero).unwrap_or(false)
}

fn is_one(operand: &Operand) -> bool {
    operand.as_constant().map(ConstValue::is_one).unwrap_or(false)
}

fn is_all_ones(operand: &Operand, ty: &Type) -> bool {
    let (Some(value), Some(kind)) = (operand.as_constant().and_then(ConstValue::as_i128), ty.numeric_kind()) else {
        return false;
    };

    match kind.int_range() {
        Some((_, hi)) if kind.is_unsigned() => value == hi,
        Some(_) => value == -1,
        None => false,
    }
}

fn shift(dest: &Operand, left: &Operand, op: BinaryOp, amount: u32) -> Tac {
    Tac::binary(dest.clone(), left.clone(), op, Operand::int(amount as i64))
}

fn simplify_binary(dest: &Operand, left: &Operand, op: BinaryOp, right: &Operand) -> Option<Tac> {
    let ty = dest.ty()?;
    let integer = ty.is_integer();
    let numeric = ty.is_numeric();
    // the identities only hold when the kept operand already has the
    // destination's storage type
    let keep_left = left.ty() == Some(ty);
    let keep_right = right.ty() == Some(ty);
    let same = left.same_location(right) && !left.is_constant();

    let assign = |src: &Operand| Some(Tac::assign(dest.clone(), src.clone()));

    match op {
        BinaryOp::Add if integer && keep_left && is_zero(right) => assign(left),
        BinaryOp::Add if integer && keep_right && is_zero(left) => assign(right),
        BinaryOp::Sub if numeric && keep_left && is_zero(right) => assign(left),
        BinaryOp::Sub if integer && same => assign(&zero_of(ty)?),
        BinaryOp::Mul if numeric && keep_left && is_one(right) => assign(left),
        BinaryOp::Mul if numeric && keep_right && is_one(left) => assign(right),
        BinaryOp::Mul if integer && (is_zero(left) || is_zero(right)) => assign(&zero_of(ty)?),
        BinaryOp::Mul if integer && keep_left && power_of_two(right).is_some() => {
            let amount = power_of_two(right)?;
            Some(shift(dest, left, BinaryOp::Shl, amount))
        }
        BinaryOp::Mul if integer && keep_right && power_of_two(left).is_some() => {
            let amount = power_of_two(left)?;
            Some(shift(dest, right, BinaryOp::Shl, amount))
        }
        BinaryOp::Div if numeric && keep_left && is_one(right) => assign(left),
        BinaryOp::Div if ty.is_unsigned() && keep_left && power_of_two(right).is_some() => {
            let amount = power_of_two(right)?;
            Some(shift(dest, left, BinaryOp::Shr, amount))
        }
        BinaryOp::Mod if integer && is_one(right) => assign(&zero_of(ty)?),
        BinaryOp::Mod if ty.is_unsigned() && keep_left && power_of_two(right).is_some() => {
            let amount = power_of_two(right)?;
            let mask = int_const((1i128 << amount) - 1, ty)?;

            Some(Tac::binary(dest.clone(), left.clone(), BinaryOp::BitAnd, mask))
        }
        BinaryOp::BitAnd if (integer || ty.is_boolean()) && same && keep_left => assign(left),
        BinaryOp::BitAnd if integer && (is_zero(left) || is_zero(right)) => assign(&zero_of(ty)?),
        BinaryOp::BitAnd if integer && keep_left && is_all_ones(right, ty) => assign(left),
        BinaryOp::BitAnd if integer && keep_right && is_all_ones(left, ty) => assign(right),
        BinaryOp::BitOr if (integer || ty.is_boolean()) && same && keep_left => assign(left),
        BinaryOp::BitOr if integer && keep_left && is_zero(right) => assign(left),
        BinaryOp::BitOr if integer && keep_right && is_zero(left) => assign(right),
        BinaryOp::BitXor if (integer || ty.is_boolean()) && same => assign(&zero_of(ty)?),
        BinaryOp::BitXor if integer && keep_left && is_zero(right) => assign(left),
        BinaryOp::BitXor if integer && keep_right && is_zero(left) => assign(right),
        BinaryOp::Shl | BinaryOp::Shr if integer && keep_left && is_zero(right) => assign(left),
        _ => None,
    }
}

/// Identity rules and strength reduction, each conditioned on the storage type
/// of the destination. Float destinations never fold `x * 0` or become shifts.
pub fn simplify_algebraic(code: &[Tac]) -> Vec<Tac> {
    code.iter()
        .map(|instr| match instr {
            Tac::Binary {
                dest,
                left,
                op,
                right,
            } => simplify_binary(dest, left, *op, right).unwrap_or_else(|| instr.clone()),
            _ => instr.clone(),
        })
        .collect()
}
