use super::types::{NumericKind, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TempId = u32;
pub type VersionId = u32;
pub type LabelName = String;

pub const THIS_NAME: &str = "this";
pub const RESERVED_PREFIX: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

impl ConstValue {
    /// Hashable identity of the literal, floats compared by bit pattern.
    pub fn literal_key(&self) -> String {
        match self {
            ConstValue::Int(i) => format!("i{i}"),
            ConstValue::UInt(u) => format!("u{u}"),
            ConstValue::Float(f) => format!("f{:016x}", f.to_bits()),
            ConstValue::Bool(b) => format!("b{b}"),
            ConstValue::String(s) => format!("s{s}"),
            ConstValue::Null => "null".to_string(),
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ConstValue::Int(i) => Some(*i as i128),
            ConstValue::UInt(u) => Some(*u as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(i) => Some(*i as f64),
            ConstValue::UInt(u) => Some(*u as f64),
            ConstValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            ConstValue::Int(0) | ConstValue::UInt(0) => true,
            ConstValue::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            ConstValue::Int(1) | ConstValue::UInt(1) => true,
            ConstValue::Float(f) => *f == 1.0,
            _ => false,
        }
    }

    /// Builds the literal for `value` stored in an integer slot of `kind`.
    pub fn from_i128(value: i128, kind: NumericKind) -> Option<Self> {
        let (lo, hi) = kind.int_range()?;

        if value < lo || value > hi {
            return None;
        }

        if kind.is_unsigned() {
            Some(ConstValue::UInt(value as u64))
        } else {
            Some(ConstValue::Int(value as i64))
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::UInt(u) => write!(f, "{u}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::String(s) => write!(f, "{s:?}"),
            ConstValue::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub is_parameter: bool,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub version: Option<VersionId>,
}

impl Variable {
    pub fn local(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            is_local: true,
            is_parameter: false,
            is_exported: false,
            version: None,
        }
    }

    pub fn field(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            is_local: false,
            is_parameter: false,
            is_exported: false,
            version: None,
        }
    }

    pub fn exported(name: &str, ty: Type) -> Self {
        Self {
            is_exported: true,
            ..Self::field(name, ty)
        }
    }

    pub fn parameter(name: &str, ty: Type) -> Self {
        Self {
            is_parameter: true,
            ..Self::local(name, ty)
        }
    }

    /// A genuine local: not `this`, not a parameter, not observable from outside
    /// the unit and not an internal name.
    pub fn is_genuine_local(&self) -> bool {
        self.is_local
            && !self.is_parameter
            && !self.is_exported
            && self.name != THIS_NAME
            && !self.name.starts_with(RESERVED_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Variable(Variable),
    Constant {
        value: ConstValue,
        ty: Type,
    },
    Temporary {
        id: TempId,
        ty: Type,
        #[serde(default)]
        version: Option<VersionId>,
    },
    Label(LabelName),
}

/// Storage identity of an operand. Two operands denote the same location iff
/// their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandKey {
    Var(String, Option<VersionId>),
    Temp(TempId, Option<VersionId>),
    Const(String, String),
    Label(LabelName),
}

impl OperandKey {
    pub fn is_temp(&self) -> bool {
        matches!(self, OperandKey::Temp(..))
    }

    pub fn base(&self) -> OperandKey {
        match self {
            OperandKey::Var(name, _) => OperandKey::Var(name.clone(), None),
            OperandKey::Temp(id, _) => OperandKey::Temp(*id, None),
            other => other.clone(),
        }
    }
}

impl Operand {
    pub fn temp(id: TempId, ty: Type) -> Self {
        Operand::Temporary { id, ty, version: None }
    }

    pub fn var(var: Variable) -> Self {
        Operand::Variable(var)
    }

    pub fn local(name: &str, ty: Type) -> Self {
        Operand::Variable(Variable::local(name, ty))
    }

    pub fn constant(value: ConstValue, ty: Type) -> Self {
        Operand::Constant { value, ty }
    }

    pub fn int(value: i64) -> Self {
        Operand::Constant {
            value: ConstValue::Int(value),
            ty: Type::INT32,
        }
    }

    pub fn float(value: f64) -> Self {
        Operand::Constant {
            value: ConstValue::Float(value),
            ty: Type::SINGLE,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Operand::Constant {
            value: ConstValue::Bool(value),
            ty: Type::Boolean,
        }
    }

    pub fn string(value: &str) -> Self {
        Operand::Constant {
            value: ConstValue::String(value.to_string()),
            ty: Type::String,
        }
    }

    pub fn label(name: &str) -> Self {
        Operand::Label(name.to_string())
    }

    pub fn ty(&self) -> Option<&Type> {
        match self {
            Operand::Variable(var) => Some(&var.ty),
            Operand::Constant { ty, .. } | Operand::Temporary { ty, .. } => Some(ty),
            Operand::Label(_) => None,
        }
    }

    /// Type of a typed operand, `Object` for labels.
    pub fn ty_or_object(&self) -> Type {
        self.ty().cloned().unwrap_or(Type::Object)
    }

    pub fn key(&self) -> OperandKey {
        match self {
            Operand::Variable(var) => OperandKey::Var(var.name.clone(), var.version),
            Operand::Temporary { id, version, .. } => OperandKey::Temp(*id, *version),
            Operand::Constant { value, ty } => OperandKey::Const(ty.udon_name(), value.literal_key()),
            Operand::Label(name) => OperandKey::Label(name.clone()),
        }
    }

    /// Identity ignoring any SSA version tag.
    pub fn base_key(&self) -> OperandKey {
        self.key().base()
    }

    pub fn same_location(&self, other: &Operand) -> bool {
        self.key() == other.key()
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Operand::Temporary { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Operand::Variable(_))
    }

    pub fn as_constant(&self) -> Option<&ConstValue> {
        match self {
            Operand::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(var) => Some(var),
            _ => None,
        }
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self {
            Operand::Temporary { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<VersionId> {
        match self {
            Operand::Variable(var) => var.version,
            Operand::Temporary { version, .. } => *version,
            _ => None,
        }
    }

    pub fn with_version(&self, version: Option<VersionId>) -> Operand {
        match self {
            Operand::Variable(var) => Operand::Variable(Variable {
                version,
                ..var.clone()
            }),
            Operand::Temporary { id, ty, .. } => Operand::Temporary {
                id: *id,
                ty: ty.clone(),
                version,
            },
            other => other.clone(),
        }
    }

    /// Temporaries and genuine locals: storage private to the unit that passes
    /// may rename, version or share.
    pub fn is_unit_private(&self) -> bool {
        match self {
            Operand::Temporary { .. } => true,
            Operand::Variable(var) => var.is_genuine_local(),
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(var) => match var.version {
                Some(v) => write!(f, "{}.{}", var.name, v),
                None => write!(f, "{}", var.name),
            },
            Operand::Temporary { id, version, .. } => match version {
                Some(v) => write!(f, "t{id}.{v}"),
                None => write!(f, "t{id}"),
            },
            Operand::Constant { value, .. } => write!(f, "{value}"),
            Operand::Label(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_follows_variant_and_id() {
        let a = Operand::temp(1, Type::INT32);
        let b = Operand::temp(1, Type::SINGLE);
        let c = Operand::local("1", Type::INT32);

        assert!(a.same_location(&b));
        assert!(!a.same_location(&c));
    }

    #[test]
    fn versions_split_identity_but_not_base() {
        let a = Operand::local("x", Type::INT32);
        let b = a.with_version(Some(2));

        assert!(!a.same_location(&b));
        assert_eq!(a.base_key(), b.base_key());
    }

    #[test]
    fn constants_keyed_by_value_and_type() {
        assert!(Operand::int(1).same_location(&Operand::int(1)));
        assert!(!Operand::int(1).same_location(&Operand::constant(ConstValue::Int(1), Type::Numeric(NumericKind::Int64))));
        assert!(!Operand::float(0.0).same_location(&Operand::float(-0.0)));
    }

    #[test]
    fn genuine_locals() {
        assert!(Variable::local("i", Type::INT32).is_genuine_local());
        assert!(!Variable::local("this", Type::Object).is_genuine_local());
        assert!(!Variable::local("__ret", Type::INT32).is_genuine_local());
        assert!(!Variable::parameter("p", Type::INT32).is_genuine_local());
        assert!(!Variable::exported("score", Type::INT32).is_genuine_local());
    }
}
