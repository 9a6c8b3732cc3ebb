use super::super::analysis::{LivenessDFA, DFA};
use super::super::cfg::Cfg;
use super::super::operand::{LabelName, Operand, OperandKey, Variable, RESERVED_PREFIX};
use super::super::tac::Tac;
use super::super::ENTRY_BLOCK_ID;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Instruction range over which a temporary or local may hold a live value.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveInterval {
    pub key: OperandKey,
    pub category: String,
    pub start: usize,
    pub end: usize,
}

impl LiveInterval {
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Default)]
pub struct SlotAssignment {
    pub intervals: Vec<LiveInterval>,
    /// Representative key of every interval's slot. Keys mapping to
    /// themselves keep their storage.
    pub slot_of: HashMap<OperandKey, OperandKey>,
}

struct Slot {
    representative: OperandKey,
    members: usize,
    free_from: usize,
}

fn candidate(operand: &Operand, reserved: &HashSet<String>) -> bool {
    match operand {
        Operand::Temporary { version: None, .. } => true,
        Operand::Variable(var) => var.version.is_none() && var.is_genuine_local() && !reserved.contains(&var.name),
        _ => false,
    }
}

/// Live intervals of every reusable temporary and local. An interval spans all
/// references and extends over every block boundary the value is live across.
/// Values read before any write on some entry path keep their storage.
pub fn live_intervals(code: &[Tac], reserved: &HashSet<String>, pinned: &HashSet<LabelName>) -> Vec<LiveInterval> {
    let mut ranges: BTreeMap<OperandKey, (String, usize, usize)> = BTreeMap::new();
    let mut mixed: HashSet<OperandKey> = HashSet::new();

    for (i, instr) in code.iter().enumerate() {
        for operand in instr.used().into_iter().chain(instr.dest()) {
            if !candidate(operand, reserved) {
                continue;
            }

            let category = operand.ty_or_object().udon_name();
            let range = ranges.entry(operand.key()).or_insert((category.clone(), i, i));

            if range.0 != category {
                mixed.insert(operand.key());
            }

            range.1 = range.1.min(i);
            range.2 = range.2.max(i);
        }
    }

    let cfg = Cfg::new(code);
    let mut liveness = LivenessDFA::new();
    liveness.exec(&cfg, code);

    let mut entry_live: HashSet<OperandKey> = HashSet::new();

    for block in cfg.get_blocks().iter() {
        let id = block.get_id();
        let entered_from_outside = id == ENTRY_BLOCK_ID
            || block.get_predecessors().is_empty()
            || block.get_label().map(|label| pinned.contains(label)).unwrap_or(false);

        if let Some(live_in) = liveness.get_live_in(id) {
            for key in live_in.iter() {
                if entered_from_outside {
                    entry_live.insert(key.clone());
                }

                if let Some(range) = ranges.get_mut(key) {
                    range.1 = range.1.min(block.start());
                }
            }
        }

        if let Some(live_out) = liveness.get_live_out(id) {
            for key in live_out.iter() {
                if let Some(range) = ranges.get_mut(key) {
                    range.2 = range.2.max(block.end());
                }
            }
        }
    }

    ranges
        .into_iter()
        .filter(|(key, _)| !entry_live.contains(key) && !mixed.contains(key))
        .map(|(key, (category, start, end))| LiveInterval {
            key,
            category,
            start,
            end,
        })
        .collect()
}

/// Interval scheduling per storage category: intervals sorted by start take
/// the slot that became free first, or open a new one. Temporaries and locals
/// are allocated from separate pools.
pub fn allocate_slots(code: &[Tac], reserved: &HashSet<String>, pinned: &HashSet<LabelName>) -> SlotAssignment {
    let mut intervals = live_intervals(code, reserved, pinned);
    intervals.sort_by(|a, b| (a.start, &a.key).cmp(&(b.start, &b.key)));

    let mut pools: HashMap<(bool, String), Vec<Slot>> = HashMap::new();
    let mut slot_of = HashMap::with_capacity(intervals.len());

    for interval in intervals.iter() {
        let pool = pools
            .entry((interval.key.is_temp(), interval.category.clone()))
            .or_default();

        let free = pool
            .iter_mut()
            .filter(|slot| slot.free_from < interval.start)
            .min_by_key(|slot| slot.free_from);

        match free {
            Some(slot) => {
                slot.free_from = interval.end;
                slot.members += 1;
                slot_of.insert(interval.key.clone(), slot.representative.clone());
            }
            None => {
                pool.push(Slot {
                    representative: interval.key.clone(),
                    members: 1,
                    free_from: interval.end,
                });
                slot_of.insert(interval.key.clone(), interval.key.clone());
            }
        }
    }

    let shared: usize = pools.values().flatten().filter(|slot| slot.members > 1).count();
    log::debug!("slot reuse: {} intervals in {} shared slots", intervals.len(), shared);

    SlotAssignment { intervals, slot_of }
}

/// Renames temporaries and genuine locals so that values whose live intervals
/// never overlap share storage. Shared locals get a fresh internal name.
pub fn reuse_slots(code: &[Tac], reserved: &HashSet<String>, pinned: &HashSet<LabelName>) -> Vec<Tac> {
    if code.iter().any(Tac::is_phi) {
        return code.to_vec();
    }

    let assignment = allocate_slots(code, reserved, pinned);

    let mut group_sizes: HashMap<&OperandKey, usize> = HashMap::new();
    for representative in assignment.slot_of.values() {
        *group_sizes.entry(representative).or_insert(0) += 1;
    }

    let mut local_names: HashMap<OperandKey, String> = HashMap::new();
    let mut counter = 0;

    for interval in assignment.intervals.iter() {
        let Some(representative) = assignment.slot_of.get(&interval.key) else {
            continue;
        };

        let shared = group_sizes.get(representative).copied().unwrap_or(0) > 1;
        if representative.is_temp() || !shared || local_names.contains_key(representative) {
            continue;
        }

        local_names.insert(
            representative.clone(),
            format!("{RESERVED_PREFIX}local_{}_{counter}", interval.category),
        );
        counter += 1;
    }

    code.iter()
        .map(|instr| {
            instr.map_operands(|operand| {
                let Some(representative) = assignment.slot_of.get(&operand.key()) else {
                    return operand.clone();
                };

                match (operand, representative) {
                    (Operand::Temporary { ty, .. }, OperandKey::Temp(id, _)) => Operand::temp(*id, ty.clone()),
                    (Operand::Variable(var), _) => match local_names.get(representative) {
                        Some(name) => Operand::var(Variable {
                            name: name.clone(),
                            ..var.clone()
                        }),
                        None => operand.clone(),
                    },
                    _ => operand.clone(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};
    use pretty_assertions::assert_eq;

    fn t(id: u32) -> Operand {
        Operand::temp(id, Type::INT32)
    }

    fn log(value: Operand) -> Tac {
        Tac::Call {
            dest: None,
            func: "UnityEngine.Debug.Log".to_string(),
            args: vec![value],
            tail_call: false,
        }
    }

    #[test]
    fn disjoint_temporaries_share_an_id() {
        let x = Operand::local("x", Type::INT32);
        let code = vec![
            Tac::assign(x.clone(), Operand::int(1)),
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            log(t(0)),
            Tac::binary(t(1), x.clone(), BinaryOp::Mul, Operand::int(2)),
            log(t(1)),
        ];

        assert_eq!(
            reuse_slots(&code, &HashSet::new(), &HashSet::new()),
            vec![
                code[0].clone(),
                code[1].clone(),
                code[2].clone(),
                Tac::binary(t(0), x, BinaryOp::Mul, Operand::int(2)),
                log(t(0)),
            ]
        );
    }

    #[test]
    fn overlapping_or_different_types_keep_their_own_slot() {
        let x = Operand::local("x", Type::INT32);
        let s = Operand::temp(2, Type::String);
        let code = vec![
            Tac::assign(x.clone(), Operand::int(1)),
            Tac::binary(t(0), x.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::binary(t(1), x.clone(), BinaryOp::Mul, Operand::int(2)),
            Tac::binary(x.clone(), t(0), BinaryOp::Add, t(1)),
            Tac::assign(s.clone(), Operand::string("done")),
            log(s),
        ];

        assert_eq!(reuse_slots(&code, &HashSet::new(), &HashSet::new()), code);
    }

    #[test]
    fn loop_carried_value_stays_live_across_the_back_edge() {
        let i = Operand::local("i", Type::INT32);
        let j = Operand::local("j", Type::INT32);
        let c = Operand::temp(0, Type::Boolean);
        let code = vec![
            Tac::assign(i.clone(), Operand::int(0)),
            Tac::label("loop"),
            Tac::binary(c.clone(), i.clone(), BinaryOp::Lt, Operand::int(10)),
            Tac::cond_jump(c, "end"),
            Tac::assign(j.clone(), Operand::int(3)),
            log(j),
            Tac::binary(i.clone(), i.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::jump("loop"),
            Tac::label("end"),
        ];

        let assignment = allocate_slots(&code, &HashSet::new(), &HashSet::new());
        let i_slot = assignment.slot_of.get(&i.key());
        let j_slot = assignment.slot_of.get(&OperandKey::Var("j".to_string(), None));

        assert!(i_slot.is_some());
        assert!(i_slot != j_slot);
    }

    #[test]
    fn locals_read_before_written_and_reserved_names_are_left_alone() {
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let ret = Operand::local("result", Type::INT32);
        let code = vec![
            log(a.clone()),
            Tac::assign(b.clone(), Operand::int(2)),
            log(b),
            Tac::assign(ret.clone(), Operand::int(3)),
            log(ret),
        ];
        let reserved = HashSet::from(["result".to_string()]);
        let intervals = live_intervals(&code, &reserved, &HashSet::new());

        assert!(intervals.len() == 1);
        assert!(intervals[0].key == OperandKey::Var("b".to_string(), None));
    }

    #[test]
    fn shared_locals_get_an_internal_name() {
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let code = vec![
            Tac::assign(a.clone(), Operand::int(1)),
            log(a),
            Tac::assign(b.clone(), Operand::int(2)),
            log(b),
        ];
        let result = reuse_slots(&code, &HashSet::new(), &HashSet::new());
        let shared = Operand::local("__local_SystemInt32_0", Type::INT32);

        assert_eq!(
            result,
            vec![
                Tac::assign(shared.clone(), Operand::int(1)),
                log(shared.clone()),
                Tac::assign(shared.clone(), Operand::int(2)),
                log(shared),
            ]
        );
        assert_eq!(reuse_slots(&result, &HashSet::new(), &HashSet::new()), result);
    }
}
