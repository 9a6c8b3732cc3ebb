use super::super::operand::{Operand, OperandKey, TempId};
use super::super::tac::Tac;
use super::super::types::Type;
use super::super::unit::next_temp_id;
use super::util::use_counts;
use std::collections::{HashMap, HashSet};

fn is_container_temp(operand: &Operand) -> bool {
    operand.is_temp() && operand.ty().map(Type::is_mutable_container).unwrap_or(false)
}

fn clone_method(ty: &Type) -> &'static str {
    match ty {
        Type::Array(_) => "Clone",
        _ => "ShallowClone",
    }
}

/// Alias groups of container temporaries within one straight-line region.
#[derive(Default)]
struct AliasGroups {
    group_of: HashMap<OperandKey, usize>,
    next_group: usize,
}

impl AliasGroups {
    fn clear(&mut self) {
        self.group_of.clear();
    }

    fn isolate(&mut self, key: OperandKey) {
        self.group_of.insert(key, self.next_group);
        self.next_group += 1;
    }

    fn join(&mut self, key: OperandKey, with: &OperandKey) {
        if !self.group_of.contains_key(with) {
            self.isolate(with.clone());
        }

        if let Some(group) = self.group_of.get(with).copied() {
            self.group_of.insert(key, group);
        }
    }

    fn is_shared(&self, key: &OperandKey) -> bool {
        let Some(group) = self.group_of.get(key) else {
            return false;
        };

        self.group_of.values().filter(|other| *other == group).count() > 1
    }
}

/// Gives container temporaries value semantics across plain copies: before a
/// temporary that shares its container with another one is mutated in place,
/// it is rebound to a private clone. Only straight-line regions are tracked.
pub fn insert_copy_on_write(code: &[Tac]) -> Vec<Tac> {
    let uses = use_counts(code);
    let mut next_id: TempId = next_temp_id(code);
    let mut groups = AliasGroups::default();
    let mut clones: HashSet<OperandKey> = HashSet::new();
    let mut result = Vec::with_capacity(code.len());
    let mut inserted = 0;

    for instr in code.iter() {
        if instr.is_label() {
            groups.clear();
        }

        if let Some(object) = instr.mutated_object() {
            if is_container_temp(object) && groups.is_shared(&object.key()) {
                let ty = object.ty_or_object();
                let fresh = Operand::temp(next_id, ty.clone());
                next_id += 1;

                result.push(Tac::MethodCall {
                    dest: Some(fresh.clone()),
                    object: object.clone(),
                    method: clone_method(&ty).to_string(),
                    args: vec![],
                    tail_call: false,
                });
                result.push(Tac::copy(object.clone(), fresh));
                groups.isolate(object.key());
                inserted += 1;
            }
        }

        if let Some(dest) = instr.dest() {
            if is_container_temp(dest) {
                match instr {
                    Tac::Copy { src, .. } | Tac::Assign { src, .. }
                        if is_container_temp(src) && !clones.contains(&src.key()) =>
                    {
                        groups.join(dest.key(), &src.key())
                    }
                    Tac::MethodCall { method, args, .. }
                        if args.is_empty()
                            && (method == "Clone" || method == "ShallowClone")
                            && uses.get(&dest.key()) == Some(&1) =>
                    {
                        clones.insert(dest.key());
                        groups.isolate(dest.key())
                    }
                    _ => groups.isolate(dest.key()),
                }
            }
        }

        result.push(instr.clone());

        if instr.is_terminator() {
            groups.clear();
        }
    }

    if inserted > 0 {
        log::debug!("copy-on-write: {} defensive clones", inserted);
    }

    result
}
