use super::super::analysis::DomTree;
use super::super::cfg::Cfg;
use super::super::op::{BinaryOp, UnaryOp};
use super::super::operand::{ConstValue, Operand};
use super::super::tac::Tac;
use super::super::types::{NumericKind, Type};
use super::util::{def_counts, use_sites};

/// Wraps an integer to the width of `kind`, two's complement.
fn wrap(value: i128, kind: NumericKind) -> i128 {
    let bits = kind.bits();
    let modulus = 1i128 << bits;
    let mut v = value.rem_euclid(modulus);

    if !kind.is_unsigned() && v >= modulus / 2 {
        v -= modulus;
    }

    v
}

fn float_const(value: f64, kind: NumericKind) -> Option<ConstValue> {
    let value = if kind == NumericKind::Single {
        value as f32 as f64
    } else {
        value
    };

    if value.is_finite() {
        Some(ConstValue::Float(value))
    } else {
        None
    }
}

fn int_const(value: i128, kind: NumericKind) -> Option<ConstValue> {
    ConstValue::from_i128(wrap(value, kind), kind)
}

fn shift_mask(kind: NumericKind) -> i128 {
    if kind.bits() == 64 {
        63
    } else {
        31
    }
}

fn eval_int_binary(op: BinaryOp, l: i128, r: i128, kind: NumericKind) -> Option<ConstValue> {
    // division traps on zero and on MIN / -1, both left to the runtime
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) {
        let (lo, _) = kind.int_range()?;

        if r == 0 || (l == lo && r == -1) {
            return None;
        }
    }

    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l.checked_mul(r)?,
        BinaryOp::Div => l / r,
        BinaryOp::Mod => l % r,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Shl => l.checked_shl((r & shift_mask(kind)) as u32)?,
        BinaryOp::Shr => l >> (r & shift_mask(kind)),
        _ => return None,
    };

    int_const(value, kind)
}

fn eval_float_binary(op: BinaryOp, l: f64, r: f64, kind: NumericKind) -> Option<ConstValue> {
    let value = if kind == NumericKind::Single {
        let (l, r) = (l as f32, r as f32);
        let value = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            BinaryOp::Mod => l % r,
            _ => return None,
        };

        value as f64
    } else {
        match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            BinaryOp::Mod => l % r,
            _ => return None,
        }
    };

    float_const(value, kind)
}

fn compare<T: PartialOrd>(op: BinaryOp, l: T, r: T) -> Option<bool> {
    Some(match op {
        BinaryOp::Eq => l == r,
        BinaryOp::Ne => l != r,
        BinaryOp::Lt => l < r,
        BinaryOp::Le => l <= r,
        BinaryOp::Gt => l > r,
        BinaryOp::Ge => l >= r,
        _ => return None,
    })
}

/// Evaluates `left op right` for a destination of type `dest_ty`. Returns
/// `None` whenever the result would not match what the target computes.
pub fn eval_binary(op: BinaryOp, left: &Operand, right: &Operand, dest_ty: &Type) -> Option<ConstValue> {
    let (Operand::Constant { value: l, ty: lty }, Operand::Constant { value: r, ty: rty }) = (left, right) else {
        return None;
    };

    if op.is_comparison() {
        if !dest_ty.is_boolean() {
            return None;
        }

        let result = match (l, r) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                compare(op, a, b)?
            }
            (ConstValue::String(a), ConstValue::String(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                compare(op, a, b)?
            }
            _ if lty.is_integer() && rty.is_integer() => compare(op, l.as_i128()?, r.as_i128()?)?,
            _ if lty.is_numeric() && rty.is_numeric() => compare(op, l.as_f64()?, r.as_f64()?)?,
            _ => return None,
        };

        return Some(ConstValue::Bool(result));
    }

    if let (ConstValue::Bool(a), ConstValue::Bool(b)) = (l, r) {
        if !dest_ty.is_boolean() {
            return None;
        }

        return match op {
            BinaryOp::And | BinaryOp::BitAnd => Some(ConstValue::Bool(*a && *b)),
            BinaryOp::Or | BinaryOp::BitOr => Some(ConstValue::Bool(*a || *b)),
            BinaryOp::BitXor => Some(ConstValue::Bool(a != b)),
            _ => None,
        };
    }

    if let (ConstValue::String(a), ConstValue::String(b)) = (l, r) {
        return match op {
            BinaryOp::Add if dest_ty.is_string() => Some(ConstValue::String(format!("{a}{b}"))),
            _ => None,
        };
    }

    let kind = dest_ty.numeric_kind()?;

    if kind.is_integer() {
        let shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr);

        if lty != dest_ty || !rty.is_integer() || (!shift && rty != dest_ty) {
            return None;
        }

        eval_int_binary(op, l.as_i128()?, r.as_i128()?, kind)
    } else {
        if !lty.is_numeric() || !rty.is_numeric() {
            return None;
        }

        eval_float_binary(op, l.as_f64()?, r.as_f64()?, kind)
    }
}

pub fn eval_unary(op: UnaryOp, operand: &Operand, dest_ty: &Type) -> Option<ConstValue> {
    let Operand::Constant { value, ty } = operand else {
        return None;
    };

    match (op, value) {
        (UnaryOp::Not, ConstValue::Bool(b)) if dest_ty.is_boolean() => Some(ConstValue::Bool(!b)),
        (UnaryOp::Neg, _) => {
            let kind = dest_ty.numeric_kind()?;

            if kind.is_float() && ty.is_numeric() {
                float_const(-value.as_f64()?, kind)
            } else if ty.is_integer() {
                int_const(-value.as_i128()?, kind)
            } else {
                None
            }
        }
        (UnaryOp::BitNot, _) => {
            let kind = dest_ty.numeric_kind()?;

            if kind.is_integer() && ty.is_integer() {
                int_const(-value.as_i128()? - 1, kind)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Folds a conversion the way `System.Convert` with truncation would perform
/// it. Out of range values are left for the runtime to reject.
pub fn eval_cast(operand: &Operand, dest_ty: &Type) -> Option<ConstValue> {
    let Operand::Constant { value, ty } = operand else {
        return None;
    };

    if ty == dest_ty {
        return Some(value.clone());
    }

    match (value, dest_ty) {
        (ConstValue::Bool(b), Type::Numeric(kind)) => {
            if kind.is_float() {
                Some(ConstValue::Float(if *b { 1.0 } else { 0.0 }))
            } else {
                ConstValue::from_i128(*b as i128, *kind)
            }
        }
        (_, Type::Boolean) if ty.is_numeric() => Some(ConstValue::Bool(!value.is_zero())),
        (_, Type::Numeric(kind)) if ty.is_integer() => {
            let v = value.as_i128()?;

            if kind.is_float() {
                float_const(v as f64, *kind)
            } else {
                ConstValue::from_i128(v, *kind)
            }
        }
        (_, Type::Numeric(kind)) if ty.is_float() => {
            let v = value.as_f64()?;

            if kind.is_float() {
                float_const(v, *kind)
            } else {
                if v.is_nan() {
                    return None;
                }

                let truncated = v.trunc();
                let (lo, hi) = kind.int_range()?;

                if truncated < lo as f64 || truncated > hi as f64 {
                    return None;
                }

                ConstValue::from_i128(truncated as i128, *kind)
            }
        }
        _ => None,
    }
}

fn fold_instr(instr: &Tac) -> Option<Tac> {
    let (dest, value) = match instr {
        Tac::Binary {
            dest,
            left,
            op,
            right,
        } => (dest, eval_binary(*op, left, right, dest.ty()?)?),
        Tac::Unary { dest, op, operand } => (dest, eval_unary(*op, operand, dest.ty()?)?),
        Tac::Cast { dest, src } => (dest, eval_cast(src, dest.ty()?)?),
        _ => return None,
    };

    let ty = dest.ty_or_object();

    Some(Tac::assign(dest.clone(), Operand::constant(value, ty)))
}

/// Replaces operations on constant operands by their result.
pub fn fold_constants(code: &[Tac]) -> Vec<Tac> {
    code.iter()
        .map(|instr| fold_instr(instr).unwrap_or_else(|| instr.clone()))
        .collect()
}

/// Substitutes temporaries that are assigned a constant exactly once into
/// every use dominated by that assignment, then drops the assignment when no
/// use is left.
pub fn propagate_constants(code: &[Tac]) -> Vec<Tac> {
    let defs = def_counts(code);
    let uses = use_sites(code);
    let cfg = Cfg::new(code);
    let dom_tree = DomTree::compute(&cfg);
    let mut result: Vec<Tac> = code.to_vec();
    let mut removed = vec![false; code.len()];

    for (i, instr) in code.iter().enumerate() {
        let (Tac::Assign { dest, src } | Tac::Copy { dest, src }) = instr else {
            continue;
        };

        if !dest.is_temp() || !src.is_constant() || src.ty() != dest.ty() {
            continue;
        }

        let key = dest.key();
        if defs.get(&key) != Some(&1) {
            continue;
        }

        let Some(def_block) = cfg.block_of(i) else {
            continue;
        };

        let sites = uses.get(&key).cloned().unwrap_or_default();
        let dominated = sites.iter().all(|site| match cfg.block_of(*site) {
            Some(use_block) if use_block == def_block => *site > i,
            Some(use_block) => dom_tree.strictly_dominates(def_block, use_block),
            None => false,
        });

        if !dominated {
            continue;
        }

        for site in sites.iter() {
            result[*site] = result[*site].map_used(|operand| {
                if operand.key() == key {
                    src.clone()
                } else {
                    operand.clone()
                }
            });
        }

        removed[i] = true;
    }

    result
        .into_iter()
        .zip(removed)
        .filter_map(|(instr, removed)| if removed { None } else { Some(instr) })
        .collect()
}
