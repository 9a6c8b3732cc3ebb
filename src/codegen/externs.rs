use crate::error::{CompileError, CompileResult};
use crate::ir::{flatten_type_name, NumericKind, Type};
use murmurhash3::murmurhash3_x64_128;
use std::collections::{HashMap, HashSet};

/// A platform native: owner type, member and the storage types it takes and
/// returns. Owner names are kept flattened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternSignature {
    pub owner: String,
    pub member: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl ExternSignature {
    pub fn new(owner: &str, member: &str, params: Vec<Type>, ret: Type) -> Self {
        Self {
            owner: flatten_type_name(owner),
            member: member.to_string(),
            params,
            ret,
        }
    }

    /// `Owner.__member__p1_p2__ret`, the parameter group left out when empty.
    pub fn signature(&self) -> String {
        let ret = self.ret.udon_name();

        if self.params.is_empty() {
            return format!("{}.__{}__{}", self.owner, self.member, ret);
        }

        let params: Vec<String> = self.params.iter().map(Type::udon_name).collect();
        format!("{}.__{}__{}__{}", self.owner, self.member, params.join("_"), ret)
    }

    pub fn returns_value(&self) -> bool {
        !self.ret.is_void()
    }
}

/// Heap symbol under which an interned signature string is stored.
pub fn extern_symbol(signature: &str) -> String {
    let (high, low) = murmurhash3_x64_128(signature.as_bytes(), 0);

    format!("__extern_{:016x}", high ^ low)
}

/// How well an argument of type `arg` fits a parameter of type `param`.
/// `None` when it is not assignable at all; lower is better.
fn assignability(param: &Type, arg: &Type) -> Option<u8> {
    if param.udon_name() == arg.udon_name() {
        return Some(0);
    }

    match (param, arg) {
        (Type::Numeric(to), Type::Numeric(from)) if from.widens_losslessly_to(to) => Some(1),
        (Type::Object, _) => Some(2),
        _ => None,
    }
}

type MemberKey = (String, String, usize);

/// Table of known natives, looked up by owner, member and arity with the
/// closest assignable overload winning.
#[derive(Debug, Clone, Default)]
pub struct ExternRegistry {
    by_member: HashMap<MemberKey, Vec<ExternSignature>>,
    known_types: HashSet<String>,
}

impl ExternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: ExternSignature) {
        self.known_types.insert(signature.owner.clone());
        self.known_types.insert(signature.ret.udon_name());
        self.known_types
            .extend(signature.params.iter().map(Type::udon_name));

        let key = (
            signature.owner.clone(),
            signature.member.clone(),
            signature.params.len(),
        );
        let overloads = self.by_member.entry(key).or_default();

        if !overloads.contains(&signature) {
            overloads.push(signature);
        }
    }

    pub fn len(&self) -> usize {
        self.by_member.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Whether any registered native mentions the flattened type name.
    pub fn knows_type(&self, ty: &Type) -> bool {
        match ty {
            Type::Reference(_) | Type::Collection(_) => self.known_types.contains(&ty.udon_name()),
            Type::Array(elem) => self.knows_type(elem),
            _ => true,
        }
    }

    /// Resolves `member` on a flattened owner name for the given argument
    /// types.
    pub fn resolve(&self, owner: &str, member: &str, args: &[Type]) -> CompileResult<ExternSignature> {
        let owner = flatten_type_name(owner);
        let key = (owner.clone(), member.to_string(), args.len());

        self.by_member
            .get(&key)
            .and_then(|overloads| {
                overloads
                    .iter()
                    .filter_map(|sig| {
                        let scores: Option<Vec<u8>> = sig
                            .params
                            .iter()
                            .zip(args)
                            .map(|(param, arg)| assignability(param, arg))
                            .collect();

                        scores.map(|scores| (scores.iter().map(|s| *s as u32).sum::<u32>(), sig))
                    })
                    .min_by_key(|(score, _)| *score)
                    .map(|(_, sig)| sig.clone())
            })
            .ok_or_else(|| CompileError::MissingSignature {
                owner,
                member: member.to_string(),
                args: args.iter().map(Type::udon_name).collect(),
            })
    }

    /// Resolves a member on a value of type `owner`. Arrays expose their
    /// accessors for every element type; members `System.Object` declares
    /// are found on any reference.
    pub fn resolve_on(&self, owner: &Type, member: &str, args: &[Type]) -> CompileResult<ExternSignature> {
        if let Some(signature) = array_member(owner, member, args) {
            return Ok(signature);
        }

        match self.resolve(&owner.udon_name(), member, args) {
            Err(err) if owner.is_reference() => self
                .resolve("SystemObject", member, args)
                .map_err(|_| err),
            result => result,
        }
    }

    /// Operators for every numeric type, boolean and string operators,
    /// conversions and a handful of common natives.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let int32 = Type::INT32;
        let boolean = Type::Boolean;
        let string = Type::String;
        let object = Type::Object;

        for kind in NumericKind::ALL {
            let ty = Type::Numeric(kind);
            let owner = kind.dotnet_name();
            let pair = vec![ty.clone(), ty.clone()];

            for member in ["op_Addition", "op_Subtraction", "op_Multiplication", "op_Division", "op_Modulus"] {
                registry.register(ExternSignature::new(owner, member, pair.clone(), ty.clone()));
            }

            for member in [
                "op_Equality",
                "op_Inequality",
                "op_LessThan",
                "op_LessThanOrEqual",
                "op_GreaterThan",
                "op_GreaterThanOrEqual",
            ] {
                registry.register(ExternSignature::new(owner, member, pair.clone(), boolean.clone()));
            }

            registry.register(ExternSignature::new(owner, "op_UnaryMinus", vec![ty.clone()], ty.clone()));
            registry.register(ExternSignature::new(owner, "ToString", vec![], string.clone()));

            if kind.is_integer() {
                for member in ["op_LogicalAnd", "op_LogicalOr", "op_LogicalXor"] {
                    registry.register(ExternSignature::new(owner, member, pair.clone(), ty.clone()));
                }

                for member in ["op_LeftShift", "op_RightShift"] {
                    registry.register(ExternSignature::new(owner, member, vec![ty.clone(), int32.clone()], ty.clone()));
                }
            }
        }

        let bools = vec![boolean.clone(), boolean.clone()];
        for member in [
            "op_ConditionalAnd",
            "op_ConditionalOr",
            "op_Equality",
            "op_Inequality",
            "op_LogicalAnd",
            "op_LogicalOr",
            "op_LogicalXor",
        ] {
            registry.register(ExternSignature::new("System.Boolean", member, bools.clone(), boolean.clone()));
        }
        registry.register(ExternSignature::new("System.Boolean", "op_UnaryNegation", vec![boolean.clone()], boolean.clone()));
        registry.register(ExternSignature::new("System.Boolean", "ToString", vec![], string.clone()));

        let strings = vec![string.clone(), string.clone()];
        registry.register(ExternSignature::new("System.String", "Concat", strings.clone(), string.clone()));
        registry.register(ExternSignature::new("System.String", "Concat", vec![object.clone(), object.clone()], string.clone()));
        registry.register(ExternSignature::new("System.String", "op_Equality", strings.clone(), boolean.clone()));
        registry.register(ExternSignature::new("System.String", "op_Inequality", strings, boolean.clone()));
        registry.register(ExternSignature::new("System.String", "get_Length", vec![], int32.clone()));

        let convertible: Vec<Type> = NumericKind::ALL
            .iter()
            .map(|kind| Type::Numeric(*kind))
            .chain([boolean.clone(), string.clone()])
            .collect();

        for target in convertible.iter() {
            let member = match target {
                Type::Numeric(kind) => kind.convert_name(),
                Type::Boolean => "ToBoolean",
                _ => "ToString",
            };

            for source in convertible.iter() {
                registry.register(ExternSignature::new("System.Convert", member, vec![source.clone()], target.clone()));
            }
        }

        registry.register(ExternSignature::new("System.Math", "Truncate", vec![Type::DOUBLE], Type::DOUBLE));

        registry.register(ExternSignature::new("System.Object", "ToString", vec![], string.clone()));
        registry.register(ExternSignature::new("System.Object", "Equals", vec![object.clone()], boolean.clone()));
        for member in ["op_Equality", "op_Inequality"] {
            registry.register(ExternSignature::new(
                "System.Object",
                member,
                vec![object.clone(), object.clone()],
                boolean.clone(),
            ));
        }
        registry.register(ExternSignature::new(
            "System.Object",
            "GetType",
            vec![],
            Type::Reference("System.Type".to_string()),
        ));

        for collection in ["VRC.SDK3.Data.DataList", "VRC.SDK3.Data.DataDictionary"] {
            let ty = Type::Collection(collection.to_string());

            registry.register(ExternSignature::new(collection, "ShallowClone", vec![], ty.clone()));
            registry.register(ExternSignature::new(collection, "get_Count", vec![], int32.clone()));
            registry.register(ExternSignature::new(collection, "Clear", vec![], Type::Void));
            registry.register(ExternSignature::new(collection, "ctor", vec![], ty));
        }

        for member in ["Log", "LogWarning", "LogError"] {
            registry.register(ExternSignature::new("UnityEngine.Debug", member, vec![object.clone()], Type::Void));
        }

        for member in ["Abs", "Sqrt", "Sin", "Cos", "Floor", "Ceil"] {
            registry.register(ExternSignature::new("UnityEngine.Mathf", member, vec![Type::SINGLE], Type::SINGLE));
        }
        for member in ["Min", "Max"] {
            registry.register(ExternSignature::new("UnityEngine.Mathf", member, vec![Type::SINGLE, Type::SINGLE], Type::SINGLE));
        }
        for member in ["Clamp", "Lerp"] {
            registry.register(ExternSignature::new(
                "UnityEngine.Mathf",
                member,
                vec![Type::SINGLE, Type::SINGLE, Type::SINGLE],
                Type::SINGLE,
            ));
        }
        for member in ["Abs", "Sqrt", "Floor"] {
            registry.register(ExternSignature::new("System.Math", member, vec![Type::DOUBLE], Type::DOUBLE));
        }
        for member in ["Min", "Max"] {
            registry.register(ExternSignature::new("System.Math", member, vec![Type::DOUBLE, Type::DOUBLE], Type::DOUBLE));
        }

        registry.register(ExternSignature::new("UnityEngine.Time", "get_deltaTime", vec![], Type::SINGLE));

        let transform = Type::Reference("UnityEngine.Transform".to_string());
        let game_object = Type::Reference("UnityEngine.GameObject".to_string());
        let vector = Type::Reference("UnityEngine.Vector3".to_string());

        registry.register(ExternSignature::new("UnityEngine.Component", "get_transform", vec![], transform.clone()));
        registry.register(ExternSignature::new("UnityEngine.Component", "get_gameObject", vec![], game_object.clone()));
        registry.register(ExternSignature::new("UnityEngine.GameObject", "get_transform", vec![], transform.clone()));
        registry.register(ExternSignature::new("UnityEngine.Transform", "get_position", vec![], vector.clone()));
        registry.register(ExternSignature::new("UnityEngine.Transform", "set_position", vec![vector.clone()], Type::Void));
        registry.register(ExternSignature::new(
            "UnityEngine.Vector3",
            "ctor",
            vec![Type::SINGLE, Type::SINGLE, Type::SINGLE],
            vector,
        ));

        registry
    }
}

/// Accessors every array type exposes.
fn array_member(owner: &Type, member: &str, args: &[Type]) -> Option<ExternSignature> {
    let elem = owner.element_type()?.clone();
    let owner_name = owner.udon_name();
    let index_ok = |arg: &Type| assignability(&Type::INT32, arg).is_some();

    let (params, ret) = match (member, args) {
        ("Get", [index]) if index_ok(index) => (vec![Type::INT32], elem),
        ("Set", [index, _]) if index_ok(index) => (vec![Type::INT32, elem], Type::Void),
        ("get_Length", []) => (vec![], Type::INT32),
        ("Clone", []) => (vec![], Type::Object),
        ("ctor", [length]) if index_ok(length) => (vec![Type::INT32], owner.clone()),
        _ => return None,
    };

    Some(ExternSignature {
        owner: owner_name,
        member: member.to_string(),
        params,
        ret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signature_format() {
        let add = ExternSignature::new("System.Int32", "op_Addition", vec![Type::INT32, Type::INT32], Type::INT32);
        let delta = ExternSignature::new("UnityEngine.Time", "get_deltaTime", vec![], Type::SINGLE);

        assert_eq!(add.signature(), "SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32");
        assert_eq!(delta.signature(), "UnityEngineTime.__get_deltaTime__SystemSingle");
    }

    #[test]
    fn exact_overload_beats_widening_and_object() {
        let registry = ExternRegistry::with_defaults();
        let sig = registry
            .resolve("System.String", "Concat", &[Type::String, Type::String])
            .expect("concat");

        assert!(sig.params == vec![Type::String, Type::String]);

        let sig = registry
            .resolve("System.String", "Concat", &[Type::String, Type::INT32])
            .expect("concat");

        assert!(sig.params == vec![Type::Object, Type::Object]);
    }

    #[test]
    fn arrays_expose_accessors() {
        let registry = ExternRegistry::new();
        let array = Type::array_of(Type::SINGLE);
        let get = registry.resolve_on(&array, "Get", &[Type::INT32]).expect("get");

        assert_eq!(get.signature(), "SystemSingleArray.__Get__SystemInt32__SystemSingle");
        assert!(registry.resolve_on(&array, "Push", &[]).is_err());
    }

    #[test]
    fn unknown_member_is_a_missing_signature() {
        let registry = ExternRegistry::with_defaults();
        let err = registry.resolve("System.Int32", "op_Power", &[Type::INT32, Type::INT32]);

        assert!(matches!(err, Err(CompileError::MissingSignature { .. })));
    }

    #[test]
    fn object_members_are_found_on_references() {
        let registry = ExternRegistry::with_defaults();
        let ty = Type::Reference("UnityEngine.Transform".to_string());
        let sig = registry.resolve_on(&ty, "ToString", &[]).expect("to string");

        assert!(sig.owner == "SystemObject");
    }

    #[test]
    fn symbols_are_stable_and_distinct() {
        let a = extern_symbol("SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32");
        let b = extern_symbol("SystemInt32.__op_Subtraction__SystemInt32_SystemInt32__SystemInt32");

        assert!(a == extern_symbol("SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32"));
        assert!(a != b);
        assert!(a.starts_with("__extern_"));
    }
}
