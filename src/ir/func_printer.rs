use super::operand::Operand;
use super::tac::Tac;
use super::unit::TacUnit;
use std::fmt;

fn push_args(result: &mut String, args: &[Operand]) {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

    result.push_str(&args.join(", "));
}

pub fn tac_to_string(tac: &Tac) -> String {
    let mut result = String::new();

    match tac {
        Tac::Assign { dest, src } => result.push_str(&format!("{dest} = {src}")),
        Tac::Copy { dest, src } => result.push_str(&format!("{dest} = copy {src}")),
        Tac::Binary {
            dest,
            left,
            op,
            right,
        } => result.push_str(&format!("{dest} = {left} {op} {right}")),
        Tac::Unary { dest, op, operand } => result.push_str(&format!("{dest} = {op}{operand}")),
        Tac::Cast { dest, src } => {
            result.push_str(&format!("{dest} = ({}) {src}", dest.ty_or_object()))
        }
        Tac::CondJump { cond, label } => result.push_str(&format!("ifFalse {cond} goto {label}")),
        Tac::Jump { label } => result.push_str(&format!("goto {label}")),
        Tac::Label { label } => result.push_str(&format!("{label}:")),
        Tac::Call {
            dest,
            func,
            args,
            tail_call,
        } => {
            if let Some(dest) = dest {
                result.push_str(&format!("{dest} = "));
            }
            if *tail_call {
                result.push_str("tail ");
            }
            result.push_str(&format!("call {func}("));
            push_args(&mut result, args);
            result.push(')');
        }
        Tac::MethodCall {
            dest,
            object,
            method,
            args,
            tail_call,
        } => {
            if let Some(dest) = dest {
                result.push_str(&format!("{dest} = "));
            }
            if *tail_call {
                result.push_str("tail ");
            }
            result.push_str(&format!("call {object}.{method}("));
            push_args(&mut result, args);
            result.push(')');
        }
        Tac::PropertyGet {
            dest,
            object,
            property,
        } => result.push_str(&format!("{dest} = {object}.{property}")),
        Tac::PropertySet {
            object,
            property,
            value,
        } => result.push_str(&format!("{object}.{property} = {value}")),
        Tac::ArrayAccess { dest, array, index } => result.push_str(&format!("{dest} = {array}[{index}]")),
        Tac::ArrayAssign {
            array,
            index,
            value,
        } => result.push_str(&format!("{array}[{index}] = {value}")),
        Tac::Return { value, .. } => match value {
            Some(value) => result.push_str(&format!("return {value}")),
            None => result.push_str("return"),
        },
        Tac::Phi { dest, sources } => {
            let srcs: Vec<String> = sources
                .iter()
                .map(|s| format!("b{}: {}", s.pred, s.value))
                .collect();

            result.push_str(&format!("{dest} = phi({})", srcs.join(", ")));
        }
    }

    result
}

pub fn code_to_string(code: &[Tac]) -> String {
    let mut result = String::new();

    for tac in code.iter() {
        if !tac.is_label() {
            result.push_str("  ");
        }
        result.push_str(&tac_to_string(tac));
        result.push('\n');
    }

    result
}

impl fmt::Display for Tac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", tac_to_string(self))
    }
}

impl fmt::Display for TacUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.entry_class_name {
            writeln!(f, "=== UNIT {name} ===")?;
        } else {
            writeln!(f, "=== UNIT ===")?;
        }

        write!(f, "{}", code_to_string(&self.instructions))?;
        write!(f, "=== END ===")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_a_small_loop() {
        let i = Operand::local("i", Type::INT32);
        let t0 = Operand::temp(0, Type::Boolean);
        let code = vec![
            Tac::label("start"),
            Tac::binary(t0.clone(), i.clone(), BinaryOp::Lt, Operand::int(10)),
            Tac::cond_jump(t0, "end"),
            Tac::binary(i.clone(), i.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::jump("start"),
            Tac::label("end"),
        ];

        let expected = "start:\n  t0 = i < 10\n  ifFalse t0 goto end\n  i = i + 1\n  goto start\nend:\n";

        assert_eq!(expected, code_to_string(&code));
    }
}
