use super::analysis::{DomTree, LivenessDFA, DFA};
use super::block::BlockId;
use super::cfg::Cfg;
use super::operand::{Operand, OperandKey, TempId, Variable, VersionId, RESERVED_PREFIX};
use super::tac::{PhiSource, Tac};
use super::unit::next_temp_id;
use super::ENTRY_BLOCK_ID;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Units are only converted when every block is reachable from an entry block
/// without predecessors and no phis are present yet.
pub fn can_convert(code: &[Tac], cfg: &Cfg) -> bool {
    !cfg.is_empty()
        && cfg[ENTRY_BLOCK_ID].get_predecessors().is_empty()
        && cfg.reachable().len() == cfg.len()
        && !code.iter().any(Tac::is_phi)
}

/// Puts the code into SSA form. Returns `None` when the unit cannot be
/// converted.
pub fn convert_to_ssa(code: &[Tac]) -> Option<Vec<Tac>> {
    let cfg = Cfg::new(code);

    if !can_convert(code, &cfg) {
        return None;
    }

    let dom_tree = DomTree::compute(&cfg);
    let mut blocks: Vec<Vec<Tac>> = cfg
        .get_blocks()
        .iter()
        .map(|block| block.instrs(code).to_vec())
        .collect();

    let mut liveness = LivenessDFA::new();
    liveness.exec(&cfg, code);

    insert_phi_nodes(code, &cfg, &dom_tree, &liveness, &mut blocks);

    // an operand read before any definition keeps its name for that incoming
    // value, so every definition of it needs a fresh version
    let live_on_entry = liveness.get_live_in(ENTRY_BLOCK_ID).cloned().unwrap_or_default();

    Some(SSAConverter::convert(code, &cfg, &dom_tree, blocks, live_on_entry))
}

fn insert_phi_nodes(code: &[Tac], cfg: &Cfg, dom_tree: &DomTree, liveness: &LivenessDFA, blocks: &mut [Vec<Tac>]) {
    let frontiers = dom_tree.dominance_frontiers(cfg);
    let mut def_blocks: BTreeMap<OperandKey, (Operand, BTreeSet<BlockId>)> = BTreeMap::new();

    for block in cfg.get_blocks().iter() {
        for instr in block.instrs(code).iter() {
            if let Some(dest) = instr.dest().filter(|d| d.is_unit_private()) {
                def_blocks
                    .entry(dest.key())
                    .or_insert_with(|| (dest.clone(), BTreeSet::new()))
                    .1
                    .insert(block.get_id());
            }
        }
    }

    for (key, (template, defined_in)) in def_blocks.iter() {
        if defined_in.len() < 2 {
            continue;
        }

        for phi_block_id in DomTree::iterated_frontier(&frontiers, defined_in.iter().copied()) {
            // not live on entry so it doesn't need a phi node
            if !liveness.is_live_on_entry(phi_block_id, key) {
                continue;
            }

            let sources = cfg[phi_block_id]
                .get_predecessors()
                .iter()
                .map(|pred| PhiSource {
                    pred: *pred,
                    value: template.clone(),
                })
                .collect();

            let instrs = &mut blocks[phi_block_id];
            let at = instrs
                .iter()
                .position(|instr| !instr.is_label() && !instr.is_phi())
                .unwrap_or(instrs.len());

            instrs.insert(
                at,
                Tac::Phi {
                    dest: template.clone(),
                    sources,
                },
            );
        }
    }
}

fn lookup(stacks: &HashMap<OperandKey, Vec<Operand>>, operand: &Operand) -> Operand {
    if !operand.is_unit_private() {
        return operand.clone();
    }

    stacks
        .get(&operand.key())
        .and_then(|stack| stack.last())
        .cloned()
        .unwrap_or_else(|| operand.clone())
}

struct SSAConverter<'a> {
    cfg: &'a Cfg,
    dom_tree: &'a DomTree,
    blocks: Vec<Vec<Tac>>,
    stacks: HashMap<OperandKey, Vec<Operand>>,
    defined: HashSet<OperandKey>,
    version_counters: HashMap<OperandKey, VersionId>,
}

impl<'a> SSAConverter<'a> {
    fn convert(
        code: &[Tac],
        cfg: &'a Cfg,
        dom_tree: &'a DomTree,
        blocks: Vec<Vec<Tac>>,
        live_on_entry: HashSet<OperandKey>,
    ) -> Vec<Tac> {
        let mut version_counters: HashMap<OperandKey, VersionId> = HashMap::new();

        // new versions must not collide with versions already in the code
        for instr in code.iter() {
            for operand in instr.used().into_iter().chain(instr.dest()) {
                if let Some(version) = operand.version() {
                    let counter = version_counters.entry(operand.base_key()).or_insert(0);
                    *counter = (*counter).max(version);
                }
            }
        }

        let mut converter = Self {
            cfg,
            dom_tree,
            blocks,
            stacks: HashMap::new(),
            defined: live_on_entry,
            version_counters,
        };

        converter.convert_block(ENTRY_BLOCK_ID);
        converter.blocks.into_iter().flatten().collect()
    }

    fn convert_block(&mut self, block_id: BlockId) {
        let mut pushed: Vec<OperandKey> = vec![];
        let instrs = std::mem::take(&mut self.blocks[block_id]);
        let mut versioned = Vec::with_capacity(instrs.len());

        for instr in instrs.into_iter() {
            let instr = if instr.is_phi() {
                instr
            } else {
                instr.map_used(|operand| lookup(&self.stacks, operand))
            };

            let instr = match instr.dest() {
                Some(dest) if dest.is_unit_private() => {
                    pushed.push(dest.key());
                    let new_dest = self.update_dest(dest);
                    instr.with_dest(new_dest)
                }
                _ => instr,
            };

            versioned.push(instr);
        }

        self.blocks[block_id] = versioned;
        self.version_successor_phi_nodes(block_id);

        let dom_tree = self.dom_tree;
        for child in dom_tree.children(block_id).iter().copied() {
            self.convert_block(child);
        }

        for key in pushed.iter() {
            if let Some(stack) = self.stacks.get_mut(key) {
                stack.pop();
            }
        }
    }

    fn version_successor_phi_nodes(&mut self, predecessor_id: BlockId) {
        let cfg = self.cfg;

        for succ_id in cfg[predecessor_id].get_successors().iter() {
            for instr in self.blocks[*succ_id].iter_mut() {
                let Tac::Phi { sources, .. } = instr else {
                    continue;
                };

                for source in sources.iter_mut().filter(|s| s.pred == predecessor_id) {
                    source.value = lookup(&self.stacks, &source.value);
                }
            }
        }
    }

    // the first definition of an operand keeps the operand as it is
    fn update_dest(&mut self, old: &Operand) -> Operand {
        let key = old.key();

        let new = if self.defined.insert(key.clone()) {
            old.clone()
        } else {
            let counter = self.version_counters.entry(old.base_key()).or_insert(0);
            *counter += 1;

            old.with_version(Some(*counter))
        };

        self.stacks.entry(key).or_default().push(new.clone());

        new
    }
}

/// Turns a parallel copy into a sequence of `Copy` instructions. Moves whose
/// destination is no longer read by another pending move go first; cycles
/// are broken with one fresh temporary.
pub fn sequentialize_copies(moves: Vec<(Operand, Operand)>, next_temp: &mut TempId) -> Vec<Tac> {
    let mut copy_pairs: Vec<(Operand, Operand)> = moves
        .into_iter()
        .filter(|(dest, src)| !dest.same_location(src))
        .collect();
    let mut result = vec![];

    loop {
        // STEP 1: EMIT EVERY MOVE WHOSE DESTINATION IS FREE
        while let Some(i) = copy_pairs
            .iter()
            .position(|(dest, _)| !copy_pairs.iter().any(|(_, src)| src.same_location(dest)))
        {
            let (dest, src) = copy_pairs.remove(i);

            result.push(Tac::copy(dest, src));
        }

        // STEP 2: BREAK A CYCLE
        let Some((dest, _)) = copy_pairs.first().cloned() else {
            break;
        };

        let tmp = Operand::temp(*next_temp, dest.ty_or_object());
        *next_temp += 1;

        result.push(Tac::copy(tmp.clone(), dest.clone()));

        for (_, src) in copy_pairs.iter_mut() {
            if src.same_location(&dest) {
                *src = tmp.clone();
            }
        }
    }

    result
}

/// Lowers every phi into copies at the end of its predecessors, then merges
/// the versions of each operand back into one location wherever no two of
/// them are ever live at the same time.
pub fn convert_from_ssa(code: &[Tac]) -> Vec<Tac> {
    let versioned = code
        .iter()
        .any(|instr| instr.dest().map(|d| d.version().is_some()).unwrap_or(false));

    if !versioned && !code.iter().any(Tac::is_phi) {
        return code.to_vec();
    }

    let cfg = Cfg::new(code);
    let mut next_temp = next_temp_id(code);
    let mut moves: BTreeMap<BlockId, Vec<(Operand, Operand)>> = BTreeMap::new();

    for block in cfg.get_blocks().iter() {
        for instr in block.instrs(code).iter() {
            if let Tac::Phi { dest, sources } = instr {
                for source in sources.iter() {
                    moves
                        .entry(source.pred)
                        .or_default()
                        .push((dest.clone(), source.value.clone()));
                }
            }
        }
    }

    let mut inserts: BTreeMap<usize, Vec<Tac>> = BTreeMap::new();
    for (pred, pred_moves) in moves.into_iter() {
        let at = cfg[pred].insertion_point(code);

        inserts
            .entry(at)
            .or_default()
            .extend(sequentialize_copies(pred_moves, &mut next_temp));
    }

    let mut result = Vec::with_capacity(code.len());
    let mut inserted = Vec::with_capacity(code.len());

    for (i, instr) in code.iter().enumerate() {
        for copy in inserts.remove(&i).unwrap_or_default() {
            result.push(copy);
            inserted.push(true);
        }

        if !instr.is_phi() {
            result.push(instr.clone());
            inserted.push(false);
        }
    }

    for copy in inserts.remove(&code.len()).unwrap_or_default() {
        result.push(copy);
        inserted.push(true);
    }

    coalesce_versions(result, inserted)
}

/// Bases (operands with the version stripped) whose versions interfere: one
/// of them is written while another is live and holds a different value.
fn interfering_bases(code: &[Tac]) -> HashSet<OperandKey> {
    let cfg = Cfg::new(code);
    let mut liveness = LivenessDFA::new();
    liveness.exec(&cfg, code);

    let mut interfering = HashSet::new();

    for block in cfg.get_blocks().iter() {
        let mut live = liveness.get_live_out(block.get_id()).cloned().unwrap_or_default();

        for instr in block.instrs(code).iter().rev() {
            if let Some(dest) = instr.dest() {
                let dest_key = dest.key();
                let copy_src = match instr {
                    Tac::Copy { src, .. } | Tac::Assign { src, .. } => Some(src.key()),
                    _ => None,
                };

                for key in live.iter() {
                    if *key != dest_key && Some(key) != copy_src.as_ref() && key.base() == dest_key.base() {
                        interfering.insert(dest_key.base());
                    }
                }

                live.remove(&dest_key);
            }

            for operand in instr.used() {
                if matches!(operand, Operand::Temporary { .. } | Operand::Variable(_)) {
                    live.insert(operand.key());
                }
            }
        }
    }

    interfering
}

/// Fresh storage for every version of an interfering base. Temporaries get
/// new ids, locals get new reserved names.
fn split_versions(code: &[Tac], interfering: &HashSet<OperandKey>) -> HashMap<OperandKey, Operand> {
    let mut next_temp = next_temp_id(code);
    let mut taken: HashSet<String> = code
        .iter()
        .flat_map(|instr| instr.used().into_iter().chain(instr.dest()))
        .filter_map(Operand::as_variable)
        .map(|var| var.name.clone())
        .collect();
    let mut storage = HashMap::new();

    for instr in code.iter() {
        for operand in instr.used().into_iter().chain(instr.dest()) {
            let key = operand.key();

            if operand.version().is_none() || !interfering.contains(&key.base()) || storage.contains_key(&key) {
                continue;
            }

            let fresh = match operand {
                Operand::Temporary { ty, .. } => {
                    next_temp += 1;
                    Operand::temp(next_temp - 1, ty.clone())
                }
                Operand::Variable(var) => {
                    let version = var.version.unwrap_or_default();
                    let mut name = format!("{RESERVED_PREFIX}{}_{version}", var.name);

                    while taken.contains(&name) {
                        name.push('_');
                    }

                    taken.insert(name.clone());
                    Operand::var(Variable {
                        name,
                        version: None,
                        ..var.clone()
                    })
                }
                other => other.with_version(None),
            };

            storage.insert(key, fresh);
        }
    }

    storage
}

fn coalesce_versions(code: Vec<Tac>, inserted: Vec<bool>) -> Vec<Tac> {
    let interfering = interfering_bases(&code);
    let split = split_versions(&code, &interfering);

    code.iter()
        .zip(inserted.iter())
        .filter_map(|(instr, inserted)| {
            let instr = instr.map_operands(|operand| {
                if operand.version().is_none() {
                    return operand.clone();
                }

                split
                    .get(&operand.key())
                    .cloned()
                    .unwrap_or_else(|| operand.with_version(None))
            });

            match &instr {
                Tac::Copy { dest, src } if *inserted && dest.same_location(src) => None,
                _ => Some(instr),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};
    use pretty_assertions::assert_eq;

    fn diamond() -> Vec<Tac> {
        let x = Operand::local("x", Type::INT32);

        vec![
            Tac::cond_jump(Operand::temp(9, Type::Boolean), "else"),
            Tac::assign(x.clone(), Operand::int(1)),
            Tac::jump("join"),
            Tac::label("else"),
            Tac::assign(x.clone(), Operand::int(2)),
            Tac::label("join"),
            Tac::Return {
                value: Some(x),
                return_var: None,
            },
        ]
    }

    #[test]
    fn diamond_gets_one_phi() {
        let ssa = convert_to_ssa(&diamond()).unwrap();
        let phis: Vec<&Tac> = ssa.iter().filter(|i| i.is_phi()).collect();

        assert_eq!(phis.len(), 1);

        let Tac::Phi { dest, sources } = phis[0] else {
            unreachable!()
        };
        let then_def = ssa[1].dest().unwrap();
        let else_def = ssa[4].dest().unwrap();

        assert!(!then_def.same_location(else_def));
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().any(|s| s.value.same_location(then_def)));
        assert!(sources.iter().any(|s| s.value.same_location(else_def)));

        let Tac::Return { value: Some(ret), .. } = ssa.last().unwrap() else {
            unreachable!()
        };
        assert!(ret.same_location(dest));
    }

    #[test]
    fn out_of_ssa_restores_unchanged_code() {
        let code = diamond();
        let ssa = convert_to_ssa(&code).unwrap();

        assert_eq!(convert_from_ssa(&ssa), code);
    }

    #[test]
    fn loop_counter_gets_header_phi() {
        let i = Operand::local("i", Type::INT32);
        let t0 = Operand::temp(0, Type::Boolean);
        let code = vec![
            Tac::assign(i.clone(), Operand::int(0)),
            Tac::label("loop_start"),
            Tac::binary(t0.clone(), i.clone(), BinaryOp::Lt, Operand::int(10)),
            Tac::cond_jump(t0, "loop_end"),
            Tac::binary(i.clone(), i.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::jump("loop_start"),
            Tac::label("loop_end"),
        ];
        let ssa = convert_to_ssa(&code).unwrap();

        assert!(ssa[1].is_label());
        assert!(ssa[2].is_phi());
        assert_eq!(convert_from_ssa(&ssa), code);
    }

    #[test]
    fn entry_with_predecessors_is_left_alone() {
        let code = vec![
            Tac::label("top"),
            Tac::assign(Operand::temp(0, Type::INT32), Operand::int(1)),
            Tac::jump("top"),
        ];

        assert!(convert_to_ssa(&code).is_none());
    }

    #[test]
    fn swap_is_broken_with_a_temp() {
        let a = Operand::local("a", Type::INT32);
        let b = Operand::local("b", Type::INT32);
        let mut next_temp = 5;
        let copies = sequentialize_copies(vec![(a.clone(), b.clone()), (b.clone(), a.clone())], &mut next_temp);
        let t5 = Operand::temp(5, Type::INT32);

        assert_eq!(
            copies,
            vec![
                Tac::copy(t5.clone(), a.clone()),
                Tac::copy(a, b.clone()),
                Tac::copy(b, t5),
            ]
        );
        assert_eq!(next_temp, 6);
    }

    #[test]
    fn chain_of_moves_needs_no_temp() {
        let a = Operand::temp(0, Type::INT32);
        let b = Operand::temp(1, Type::INT32);
        let c = Operand::temp(2, Type::INT32);
        let mut next_temp = 3;
        let copies = sequentialize_copies(vec![(b.clone(), a.clone()), (c.clone(), b.clone())], &mut next_temp);

        assert_eq!(copies, vec![Tac::copy(c, b.clone()), Tac::copy(b, a)]);
        assert_eq!(next_temp, 3);
    }

    #[test]
    fn interfering_versions_get_their_own_storage() {
        let x = Operand::local("x", Type::INT32);
        let x1 = x.with_version(Some(1));
        let y = Operand::local("y", Type::INT32);
        let sum = Tac::binary(
            x.clone(),
            Operand::local("a", Type::INT32),
            BinaryOp::Add,
            Operand::local("b", Type::INT32),
        );
        let log = |arg: Operand| Tac::Call {
            dest: None,
            func: "UnityEngine.Debug.Log".to_string(),
            args: vec![arg],
            tail_call: false,
        };
        let code = vec![
            sum.clone(),
            log(x.clone()),
            Tac::binary(x1.clone(), x.clone(), BinaryOp::Mul, Operand::int(3)),
            log(x1),
            Tac::copy(y.clone(), x.clone()),
            log(y.clone()),
        ];
        let split = Operand::local("__x_1", Type::INT32);

        let result = convert_from_ssa(&code);

        assert_eq!(
            result,
            vec![
                sum,
                log(x.clone()),
                Tac::binary(split.clone(), x.clone(), BinaryOp::Mul, Operand::int(3)),
                log(split),
                Tac::copy(y.clone(), x),
                log(y),
            ]
        );
        assert!(result
            .iter()
            .all(|instr| instr.used().into_iter().chain(instr.dest()).all(|o| o.version().is_none())));
    }

    #[test]
    fn interfering_temporaries_get_fresh_ids() {
        let t0 = Operand::temp(0, Type::INT32);
        let t0_1 = t0.with_version(Some(1));
        let keep = Operand::local("keep", Type::INT32);
        let code = vec![
            Tac::assign(t0.clone(), Operand::int(1)),
            Tac::binary(t0_1.clone(), t0.clone(), BinaryOp::Add, Operand::int(1)),
            Tac::binary(keep.clone(), t0.clone(), BinaryOp::Add, t0_1),
        ];

        let result = convert_from_ssa(&code);
        let t1 = Operand::temp(1, Type::INT32);

        assert_eq!(
            result,
            vec![
                code[0].clone(),
                Tac::binary(t1.clone(), t0.clone(), BinaryOp::Add, Operand::int(1)),
                Tac::binary(keep, t0, BinaryOp::Add, t1),
            ]
        );
    }
}
