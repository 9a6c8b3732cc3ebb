use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// String `+` is concatenation and never commutes, so callers must pass
    /// whether the operands are strings.
    pub fn is_commutative(&self, string_operands: bool) -> bool {
        match self {
            BinaryOp::Add => !string_operands,
            BinaryOp::Mul
            | BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::And
            | BinaryOp::Or => true,
            _ => false,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Integer division and modulo raise on a zero divisor.
    pub fn can_trap(&self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Mod)
    }

    /// Name of the operator overload on the owning type, e.g. `op_Addition`.
    pub fn overload_name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "op_Addition",
            BinaryOp::Sub => "op_Subtraction",
            BinaryOp::Mul => "op_Multiplication",
            BinaryOp::Div => "op_Division",
            BinaryOp::Mod => "op_Modulus",
            BinaryOp::Eq => "op_Equality",
            BinaryOp::Ne => "op_Inequality",
            BinaryOp::Lt => "op_LessThan",
            BinaryOp::Le => "op_LessThanOrEqual",
            BinaryOp::Gt => "op_GreaterThan",
            BinaryOp::Ge => "op_GreaterThanOrEqual",
            BinaryOp::And => "op_ConditionalAnd",
            BinaryOp::Or => "op_ConditionalOr",
            BinaryOp::BitAnd => "op_LogicalAnd",
            BinaryOp::BitOr => "op_LogicalOr",
            BinaryOp::BitXor => "op_LogicalXor",
            BinaryOp::Shl => "op_LeftShift",
            BinaryOp::Shr => "op_RightShift",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

impl UnaryOp {
    pub fn overload_name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "op_UnaryMinus",
            UnaryOp::Not => "op_UnaryNegation",
            UnaryOp::BitNot => "op_LogicalXor",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
