use super::super::analysis::DomTree;
use super::super::cfg::Cfg;
use super::super::operand::{Operand, OperandKey};
use super::super::tac::Tac;
use super::super::types::Type;
use std::collections::{HashMap, HashSet};

fn constant_def(instr: &Tac) -> Option<(&Operand, (String, Type))> {
    let (Tac::Assign { dest, src } | Tac::Copy { dest, src }) = instr else {
        return None;
    };

    let value = src.as_constant()?;
    let ty = dest.ty()?;

    if !dest.is_temp() || src.ty() != Some(ty) {
        return None;
    }

    Some((dest, (value.literal_key(), ty.clone())))
}

/// Temporaries whose every definition stores the same literal, in order of
/// first definition.
fn literal_temps(code: &[Tac]) -> Vec<(OperandKey, (String, Type))> {
    let mut literal_of: HashMap<OperandKey, Option<(String, Type)>> = HashMap::new();
    let mut first_def: Vec<OperandKey> = vec![];

    for instr in code.iter() {
        let Some(dest) = instr.dest() else {
            continue;
        };

        let key = dest.key();
        let literal = constant_def(instr).map(|(_, literal)| literal);

        match literal_of.get_mut(&key) {
            None => {
                first_def.push(key.clone());
                literal_of.insert(key, literal);
            }
            Some(known) if *known != literal => *known = None,
            Some(_) => {}
        }
    }

    first_def
        .into_iter()
        .filter_map(|key| match literal_of.remove(&key) {
            Some(Some(literal)) => Some((key, literal)),
            _ => None,
        })
        .collect()
}

/// Merges temporaries that only ever hold the same literal into one, then
/// drops definitions already dominated by an identical one.
pub fn dedup_constants(code: &[Tac]) -> Vec<Tac> {
    let mut canonical_of: HashMap<(String, Type), OperandKey> = HashMap::new();
    let mut rename: HashMap<OperandKey, OperandKey> = HashMap::new();

    for (key, literal) in literal_temps(code).into_iter() {
        match canonical_of.get(&literal) {
            Some(canonical) => {
                rename.insert(key, canonical.clone());
            }
            None => {
                canonical_of.insert(literal, key);
            }
        }
    }

    let renamed: Vec<Tac> = code
        .iter()
        .map(|instr| {
            instr.map_operands(|operand| match (rename.get(&operand.key()), operand.ty()) {
                (Some(OperandKey::Temp(id, _)), Some(ty)) => Operand::temp(*id, ty.clone()),
                _ => operand.clone(),
            })
        })
        .collect();

    let cfg = Cfg::new(&renamed);
    let dom_tree = DomTree::compute(&cfg);
    let literal_keys: HashSet<OperandKey> = literal_temps(&renamed).into_iter().map(|(key, _)| key).collect();
    let mut defs: HashMap<OperandKey, Vec<usize>> = HashMap::new();

    for (i, instr) in renamed.iter().enumerate() {
        if let Some((dest, _)) = constant_def(instr) {
            defs.entry(dest.key()).or_default().push(i);
        }
    }

    // an identical store already executed on every path to `i`
    let dominated_by_twin = |i: usize, key: &OperandKey| -> bool {
        let Some(block) = cfg.block_of(i) else {
            return false;
        };

        defs.get(key).map(Vec::as_slice).unwrap_or(&[]).iter().any(|other| {
            match cfg.block_of(*other) {
                Some(other_block) if other_block == block => *other < i,
                Some(other_block) => dom_tree.strictly_dominates(other_block, block),
                None => false,
            }
        })
    };

    renamed
        .iter()
        .enumerate()
        .filter(|(i, instr)| match constant_def(instr) {
            Some((dest, _)) if literal_keys.contains(&dest.key()) => !dominated_by_twin(*i, &dest.key()),
            _ => true,
        })
        .map(|(_, instr)| instr.clone())
        .collect()
}
