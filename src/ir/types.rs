use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
}

impl NumericKind {
    pub const ALL: [NumericKind; 10] = [
        NumericKind::SByte,
        NumericKind::Byte,
        NumericKind::Int16,
        NumericKind::UInt16,
        NumericKind::Int32,
        NumericKind::UInt32,
        NumericKind::Int64,
        NumericKind::UInt64,
        NumericKind::Single,
        NumericKind::Double,
    ];

    pub fn dotnet_name(&self) -> &'static str {
        match self {
            NumericKind::SByte => "System.SByte",
            NumericKind::Byte => "System.Byte",
            NumericKind::Int16 => "System.Int16",
            NumericKind::UInt16 => "System.UInt16",
            NumericKind::Int32 => "System.Int32",
            NumericKind::UInt32 => "System.UInt32",
            NumericKind::Int64 => "System.Int64",
            NumericKind::UInt64 => "System.UInt64",
            NumericKind::Single => "System.Single",
            NumericKind::Double => "System.Double",
        }
    }

    /// Member name used by `System.Convert`, e.g. `ToInt32`.
    pub fn convert_name(&self) -> &'static str {
        match self {
            NumericKind::SByte => "ToSByte",
            NumericKind::Byte => "ToByte",
            NumericKind::Int16 => "ToInt16",
            NumericKind::UInt16 => "ToUInt16",
            NumericKind::Int32 => "ToInt32",
            NumericKind::UInt32 => "ToUInt32",
            NumericKind::Int64 => "ToInt64",
            NumericKind::UInt64 => "ToUInt64",
            NumericKind::Single => "ToSingle",
            NumericKind::Double => "ToDouble",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, NumericKind::Single | NumericKind::Double)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            NumericKind::Byte | NumericKind::UInt16 | NumericKind::UInt32 | NumericKind::UInt64
        )
    }

    pub fn bits(&self) -> u32 {
        match self {
            NumericKind::SByte | NumericKind::Byte => 8,
            NumericKind::Int16 | NumericKind::UInt16 => 16,
            NumericKind::Int32 | NumericKind::UInt32 | NumericKind::Single => 32,
            NumericKind::Int64 | NumericKind::UInt64 | NumericKind::Double => 64,
        }
    }

    /// Inclusive value range of an integer kind, widened to i128.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        if self.is_float() {
            return None;
        }

        let bits = self.bits();

        if self.is_unsigned() {
            Some((0, (1i128 << bits) - 1))
        } else {
            Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
        }
    }

    /// Every value of `self` is exactly representable in `other`.
    pub fn widens_losslessly_to(&self, other: &NumericKind) -> bool {
        if self == other {
            return true;
        }

        match (self.is_float(), other.is_float()) {
            (true, true) => *self == NumericKind::Single && *other == NumericKind::Double,
            (true, false) => false,
            (false, true) => {
                let mantissa = if *other == NumericKind::Single { 24 } else { 53 };
                let needed = if self.is_unsigned() { self.bits() } else { self.bits() - 1 };

                needed <= mantissa
            }
            (false, false) => {
                let (lo, hi) = self.int_range().unwrap_or((0, 0));
                let (olo, ohi) = other.int_range().unwrap_or((0, 0));

                olo <= lo && hi <= ohi
            }
        }
    }
}

/// Semantic type carried by every non-label operand. The storage category used
/// for heap slots and extern signatures is the flattened target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Numeric(NumericKind),
    String,
    Boolean,
    Void,
    Object,
    Reference(String),
    Collection(String),
    Array(Box<Type>),
}

impl Type {
    pub const INT32: Type = Type::Numeric(NumericKind::Int32);
    pub const SINGLE: Type = Type::Numeric(NumericKind::Single);
    pub const DOUBLE: Type = Type::Numeric(NumericKind::Double);

    pub fn array_of(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            Type::Numeric(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Numeric(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Numeric(k) if k.is_float())
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Numeric(k) if k.is_integer())
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Numeric(k) if k.is_unsigned())
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Boolean)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::String)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Object | Type::Reference(_) | Type::Collection(_) | Type::Array(_) | Type::String
        )
    }

    /// Containers that are mutated in place and therefore copied on write.
    pub fn is_mutable_container(&self) -> bool {
        matches!(self, Type::Collection(_) | Type::Array(_))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn dotnet_name(&self) -> String {
        match self {
            Type::Numeric(kind) => kind.dotnet_name().to_string(),
            Type::String => "System.String".to_string(),
            Type::Boolean => "System.Boolean".to_string(),
            Type::Void => "System.Void".to_string(),
            Type::Object => "System.Object".to_string(),
            Type::Reference(name) | Type::Collection(name) => name.clone(),
            Type::Array(elem) => format!("{}[]", elem.dotnet_name()),
        }
    }

    /// Flattened name: namespace separators removed, arrays suffixed `Array`.
    pub fn udon_name(&self) -> String {
        match self {
            Type::Array(elem) => format!("{}Array", elem.udon_name()),
            other => flatten_type_name(&other.dotnet_name()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.udon_name())
    }
}

pub fn flatten_type_name(name: &str) -> String {
    name.replace("[]", "Array")
        .chars()
        .filter(|c| !matches!(c, '.' | '+' | ':'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattened_names() {
        assert_eq!(Type::INT32.udon_name(), "SystemInt32");
        assert_eq!(Type::Boolean.udon_name(), "SystemBoolean");
        assert_eq!(Type::Reference("UnityEngine.Transform".to_string()).udon_name(), "UnityEngineTransform");
        assert_eq!(Type::array_of(Type::SINGLE).udon_name(), "SystemSingleArray");
        assert_eq!(
            Type::Collection("VRC.SDK3.Data.DataList".to_string()).udon_name(),
            "VRCSDK3DataDataList"
        );
    }

    #[test]
    fn lossless_widening() {
        assert!(NumericKind::Int32.widens_losslessly_to(&NumericKind::Int64));
        assert!(NumericKind::Int32.widens_losslessly_to(&NumericKind::Double));
        assert!(!NumericKind::Int32.widens_losslessly_to(&NumericKind::Single));
        assert!(NumericKind::Int16.widens_losslessly_to(&NumericKind::Single));
        assert!(NumericKind::Single.widens_losslessly_to(&NumericKind::Double));
        assert!(!NumericKind::Double.widens_losslessly_to(&NumericKind::Int64));
        assert!(!NumericKind::Int32.widens_losslessly_to(&NumericKind::UInt32));
        assert!(NumericKind::UInt16.widens_losslessly_to(&NumericKind::Int32));
    }

    #[test]
    fn int_ranges() {
        assert_eq!(NumericKind::SByte.int_range(), Some((-128, 127)));
        assert_eq!(NumericKind::UInt16.int_range(), Some((0, 65535)));
        assert_eq!(NumericKind::Double.int_range(), None);
    }
}
