use super::super::analysis::{DomTree, DFA};
use super::super::block::{BasicBlock, BlockId};
use super::super::cfg::Cfg;
use super::super::op::{BinaryOp, UnaryOp};
use super::super::operand::{Operand, OperandKey, THIS_NAME};
use super::super::ssa::{convert_from_ssa, convert_to_ssa};
use super::super::tac::Tac;
use super::super::ENTRY_BLOCK_ID;
use super::GvnMode;
use std::collections::HashMap;

/// Getters and zero-argument methods whose result never changes for a given
/// receiver, so reads may be shared across calls.
pub const IDEMPOTENT_MEMBERS: [&str; 5] = ["Length", "length", "transform", "gameObject", "GetType"];

/// Natives that depend on nothing but their arguments.
pub const PURE_NATIVES: [&str; 16] = [
    "UnityEngine.Mathf.Abs",
    "UnityEngine.Mathf.Sqrt",
    "UnityEngine.Mathf.Sin",
    "UnityEngine.Mathf.Cos",
    "UnityEngine.Mathf.Min",
    "UnityEngine.Mathf.Max",
    "UnityEngine.Mathf.Floor",
    "UnityEngine.Mathf.Ceil",
    "UnityEngine.Mathf.Clamp",
    "UnityEngine.Mathf.Lerp",
    "System.Math.Abs",
    "System.Math.Sqrt",
    "System.Math.Min",
    "System.Math.Max",
    "System.Math.Floor",
    "System.Math.Truncate",
];

pub fn is_idempotent_member(name: &str) -> bool {
    IDEMPOTENT_MEMBERS.contains(&name)
}

pub fn is_pure_native(func: &str) -> bool {
    PURE_NATIVES.contains(&func)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Expr {
    Binary(BinaryOp, OperandKey, OperandKey),
    Unary(UnaryOp, OperandKey),
    Cast(OperandKey),
    PropertyGet(OperandKey, String),
    ArrayAccess(OperandKey, OperandKey),
    PureCall(String, Vec<OperandKey>),
    IdempotentMethod(OperandKey, String, Vec<OperandKey>),
}

/// An expression together with the storage type of its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExprKey {
    expr: Expr,
    ty: String,
}

impl ExprKey {
    /// Reads of memory that a store or an unknown call may change.
    fn is_memory_read(&self) -> bool {
        match &self.expr {
            Expr::PropertyGet(_, property) => !is_idempotent_member(property),
            Expr::ArrayAccess(..) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    holder: Operand,
    operands: Vec<Operand>,
}

impl Entry {
    fn mentions(&self, key: &OperandKey) -> bool {
        self.holder.key() == *key || self.operands.iter().any(|operand| operand.key() == *key)
    }
}

/// Operands a callee can never reassign.
fn is_call_stable(operand: &Operand) -> bool {
    match operand {
        Operand::Variable(var) => var.is_genuine_local() || var.name == THIS_NAME,
        _ => true,
    }
}

fn keys(operands: &[Operand]) -> Vec<OperandKey> {
    operands.iter().map(Operand::key).collect()
}

/// The value computed by `instr`, if it is one the table can share.
fn expr_of(instr: &Tac) -> Option<(ExprKey, Vec<Operand>)> {
    let dest = instr.dest()?;
    let ty = dest.ty()?.udon_name();

    let (expr, operands) = match instr {
        Tac::Binary { left, op, right, .. } => {
            let strings = left.ty_or_object().is_string() || right.ty_or_object().is_string();
            let (mut l, mut r) = (left.key(), right.key());

            if op.is_commutative(strings) && r < l {
                std::mem::swap(&mut l, &mut r);
            }

            (Expr::Binary(*op, l, r), vec![left.clone(), right.clone()])
        }
        Tac::Unary { op, operand, .. } => (Expr::Unary(*op, operand.key()), vec![operand.clone()]),
        Tac::Cast { src, .. } => (Expr::Cast(src.key()), vec![src.clone()]),
        Tac::PropertyGet { object, property, .. } => {
            (Expr::PropertyGet(object.key(), property.clone()), vec![object.clone()])
        }
        Tac::ArrayAccess { array, index, .. } => {
            (Expr::ArrayAccess(array.key(), index.key()), vec![array.clone(), index.clone()])
        }
        Tac::Call { func, args, .. } if is_pure_native(func) => (Expr::PureCall(func.clone(), keys(args)), args.clone()),
        Tac::MethodCall {
            object, method, args, ..
        } if is_idempotent_member(method) => {
            let mut operands = vec![object.clone()];
            operands.extend(args.iter().cloned());

            (Expr::IdempotentMethod(object.key(), method.clone(), keys(args)), operands)
        }
        _ => return None,
    };

    if operands.iter().any(|operand| operand.ty().is_none()) {
        return None;
    }

    Some((ExprKey { expr, ty }, operands))
}

/// Calls that may read or write memory the table knows about.
fn is_impure_call(instr: &Tac) -> bool {
    match instr {
        Tac::Call { func, .. } => !is_pure_native(func),
        Tac::MethodCall { method, .. } => !is_idempotent_member(method),
        _ => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ValueTable {
    entries: HashMap<ExprKey, Entry>,
}

impl ValueTable {
    fn kill_operand(&mut self, key: &OperandKey) {
        self.entries.retain(|_, entry| !entry.mentions(key));
    }

    /// Invalidates whatever `instr` may overwrite.
    fn apply_effects(&mut self, instr: &Tac) {
        if let Some(dest) = instr.dest() {
            self.kill_operand(&dest.key());
        }

        match instr {
            Tac::PropertySet { property, .. } => self.entries.retain(|key, _| match &key.expr {
                Expr::PropertyGet(_, read) => read != property,
                _ => true,
            }),
            Tac::ArrayAssign { .. } => self
                .entries
                .retain(|key, _| !matches!(key.expr, Expr::ArrayAccess(..))),
            _ if is_impure_call(instr) => self.entries.retain(|key, entry| {
                !key.is_memory_read() && entry.operands.iter().all(is_call_stable)
            }),
            _ => {}
        }
    }

    /// Replaces a recomputation by a copy from the operand already holding
    /// the value, then records what `instr` leaves behind.
    fn number(&mut self, instr: &Tac) -> Tac {
        let expr = expr_of(instr);
        let mut rewritten = instr.clone();

        if let (Some((key, _)), Some(dest)) = (&expr, instr.dest()) {
            if let Some(entry) = self.entries.get(key) {
                if !entry.holder.same_location(dest) && entry.holder.ty() == dest.ty() {
                    rewritten = Tac::copy(dest.clone(), entry.holder.clone());
                }
            }
        }

        self.apply_effects(&rewritten);

        if rewritten != *instr {
            return rewritten;
        }

        if let (Some((key, operands)), Some(dest)) = (expr, instr.dest()) {
            let self_referencing = operands.iter().any(|operand| operand.same_location(dest));

            if dest.is_unit_private() && !self_referencing {
                self.entries.insert(
                    key,
                    Entry {
                        holder: dest.clone(),
                        operands,
                    },
                );
            }
        }

        rewritten
    }
}

fn gvn_local(code: &[Tac]) -> Vec<Tac> {
    let mut table = ValueTable::default();
    let mut result = Vec::with_capacity(code.len());

    for instr in code.iter() {
        if instr.is_label() {
            table = ValueTable::default();
        }

        result.push(table.number(instr));

        if instr.is_terminator() {
            table = ValueTable::default();
        }
    }

    result
}

/// Values available on entry to each block, intersected over predecessors.
struct AvailableValuesDFA {
    inputs: HashMap<BlockId, Option<ValueTable>>,
}

impl DFA for AvailableValuesDFA {
    type Data = Option<ValueTable>;

    fn init_block(&mut self, block: &BasicBlock, _code: &[Tac]) -> (Self::Data, Self::Data) {
        if block.get_id() == ENTRY_BLOCK_ID || block.get_predecessors().is_empty() {
            (Some(ValueTable::default()), None)
        } else {
            (None, None)
        }
    }

    fn complete(&mut self, inputs: HashMap<BlockId, Self::Data>, _outputs: HashMap<BlockId, Self::Data>) {
        self.inputs = inputs;
    }

    fn merge(&mut self, updating: &mut Self::Data, merge: &Self::Data) {
        let Some(incoming) = merge else {
            return;
        };

        match updating {
            None => *updating = Some(incoming.clone()),
            Some(table) => table
                .entries
                .retain(|key, entry| incoming.entries.get(key) == Some(entry)),
        }
    }

    fn transfer(&mut self, block: &BasicBlock, code: &[Tac], start: &Self::Data, end: &mut Self::Data) -> bool {
        let Some(start) = start else {
            return false;
        };

        let mut table = start.clone();
        for instr in block.instrs(code).iter() {
            table.number(instr);
        }

        let updated = Some(table);
        if *end != updated {
            *end = updated;
            true
        } else {
            false
        }
    }
}

fn gvn_dataflow(code: &[Tac]) -> Vec<Tac> {
    let cfg = Cfg::new(code);
    let mut dfa = AvailableValuesDFA {
        inputs: HashMap::new(),
    };

    dfa.exec(&cfg, code);

    let mut result = Vec::with_capacity(code.len());

    for block in cfg.get_blocks().iter() {
        let mut table = dfa
            .inputs
            .get(&block.get_id())
            .cloned()
            .flatten()
            .unwrap_or_default();

        for instr in block.instrs(code).iter() {
            result.push(table.number(instr));
        }
    }

    result
}

/// In SSA form every private operand has one definition, so a value computed
/// in a block is available in every block it dominates.
fn is_scopable(key: &ExprKey, operands: &[Operand]) -> bool {
    !key.is_memory_read() && operands.iter().all(|operand| operand.is_unit_private() || operand.is_constant())
}

struct ScopedNumbering<'a> {
    ssa: &'a [Tac],
    cfg: &'a Cfg,
    result: Vec<Tac>,
    scoped: HashMap<ExprKey, Operand>,
    undo: Vec<(ExprKey, Option<Operand>)>,
}

impl<'a> ScopedNumbering<'a> {
    fn number_block(&mut self, block_id: BlockId) {
        let ssa = self.ssa;
        // memory reads are only shared inside the block
        let mut memory = ValueTable::default();

        for i in self.cfg[block_id].range() {
            let instr = &ssa[i];

            let scoped = expr_of(instr).filter(|(key, operands)| is_scopable(key, operands));
            let (Some((key, _)), Some(dest)) = (scoped, instr.dest()) else {
                self.result[i] = memory.number(instr);
                continue;
            };

            match self.scoped.get(&key) {
                Some(holder) if !holder.same_location(dest) && holder.ty() == dest.ty() => {
                    self.result[i] = Tac::copy(dest.clone(), holder.clone());
                }
                _ if dest.is_unit_private() => {
                    let previous = self.scoped.insert(key.clone(), dest.clone());
                    self.undo.push((key, previous));
                }
                _ => {}
            }

            memory.apply_effects(&self.result[i]);
        }
    }

    fn unwind(&mut self, mark: usize) {
        while self.undo.len() > mark {
            let Some((key, previous)) = self.undo.pop() else {
                break;
            };

            match previous {
                Some(holder) => self.scoped.insert(key, holder),
                None => self.scoped.remove(&key),
            };
        }
    }
}

fn gvn_ssa(code: &[Tac]) -> Option<Vec<Tac>> {
    let ssa = convert_to_ssa(code)?;
    let cfg = Cfg::new(&ssa);
    let dom_tree = DomTree::compute(&cfg);
    let mut numbering = ScopedNumbering {
        ssa: &ssa,
        cfg: &cfg,
        result: ssa.clone(),
        scoped: HashMap::new(),
        undo: vec![],
    };

    numbering.number_block(ENTRY_BLOCK_ID);
    let mut stack: Vec<(BlockId, usize, usize)> = vec![(ENTRY_BLOCK_ID, 0, 0)];

    while let Some((block_id, next_child, mark)) = stack.pop() {
        let children = dom_tree.children(block_id);

        if next_child < children.len() {
            stack.push((block_id, next_child + 1, mark));

            let child = children[next_child];
            let child_mark = numbering.undo.len();

            numbering.number_block(child);
            stack.push((child, 0, child_mark));
        } else {
            numbering.unwind(mark);
        }
    }

    Some(convert_from_ssa(&numbering.result))
}

/// Replaces recomputations of an available value by a copy of the operand
/// holding it.
pub fn global_value_numbering(code: &[Tac], mode: GvnMode) -> Vec<Tac> {
    match mode {
        GvnMode::Local => gvn_local(code),
        GvnMode::Dataflow => gvn_dataflow(code),
        GvnMode::Ssa => gvn_ssa(code).unwrap_or_else(|| {
            log::debug!("unit cannot be put into SSA form, numbering values by dataflow");
            gvn_dataflow(code)
        }),
    }
}
