mod algebraic;
mod boolean;
mod cast_chain;
mod cleanup;
mod const_dedup;
mod constant_fold;
mod copy_prop;
mod cow;
mod gvn;
mod licm;
mod reassociate;
mod slot_reuse;
mod tail_call;
mod unswitch;
mod util;

use super::operand::{LabelName, Operand};
use super::tac::Tac;
use super::unit::TacUnit;
use std::collections::HashSet;

pub use algebraic::simplify_algebraic;
pub use boolean::simplify_boolean;
pub use cast_chain::fold_cast_chains;
pub use cleanup::remove_dead_code;
pub use const_dedup::dedup_constants;
pub use constant_fold::{eval_binary, eval_cast, eval_unary, fold_constants, propagate_constants};
pub use copy_prop::{propagate_copies, propagate_copies_local};
pub use cow::insert_copy_on_write;
pub use gvn::{global_value_numbering, is_idempotent_member, is_pure_native, IDEMPOTENT_MEMBERS, PURE_NATIVES};
pub use licm::hoist_loop_invariants;
pub use reassociate::reassociate;
pub use slot_reuse::{allocate_slots, live_intervals, reuse_slots, LiveInterval, SlotAssignment};
pub use tail_call::mark_tail_calls;
pub use unswitch::{unswitch_loops, DEFAULT_UNSWITCH_CEILING};

pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Scope of value numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum GvnMode {
    /// Within single blocks.
    Local,
    /// Whole CFG, available expressions intersected at joins.
    #[default]
    Dataflow,
    /// Dominator-scoped over SSA form.
    Ssa,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub enabled: bool,
    pub gvn_mode: GvnMode,
    /// Largest loop, in instructions, that unswitching may duplicate.
    pub unswitch_ceiling: usize,
    /// Bound on the local simplification fixpoint.
    pub max_rounds: usize,
    pub reuse_slots: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gvn_mode: GvnMode::default(),
            unswitch_ceiling: DEFAULT_UNSWITCH_CEILING,
            max_rounds: DEFAULT_MAX_ROUNDS,
            reuse_slots: true,
        }
    }
}

impl OptimizerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn run_pass(name: &str, code: Vec<Tac>, pass: impl FnOnce(&[Tac]) -> Vec<Tac>) -> Vec<Tac> {
    let before = code.len();
    let after = pass(&code);

    log::debug!("{name}: {before} -> {} instructions", after.len());

    after
}

/// Cheap block-local rewrites, repeated until they stop changing anything.
fn simplify(mut code: Vec<Tac>, pinned: &HashSet<LabelName>, max_rounds: usize) -> Vec<Tac> {
    for round in 0..max_rounds {
        let next = fold_constants(&code);
        let next = propagate_constants(&next);
        let next = simplify_algebraic(&next);
        let next = simplify_boolean(&next);
        let next = fold_cast_chains(&next);
        let next = reassociate(&next);
        let next = propagate_copies_local(&next);
        let next = remove_dead_code(&next, pinned);

        if next == code {
            log::debug!("local simplification settled after {round} rounds");
            break;
        }

        code = next;
    }

    code
}

/// Runs the pass pipeline over a flat instruction list. `pinned` labels are
/// entered from outside the list; `reserved` names must keep their storage.
pub fn optimize(
    code: &[Tac],
    pinned: &HashSet<LabelName>,
    reserved: &HashSet<String>,
    config: &OptimizerConfig,
) -> Vec<Tac> {
    if !config.enabled {
        return code.to_vec();
    }

    let rounds = config.max_rounds.max(1);
    let code = simplify(code.to_vec(), pinned, rounds);
    let code = run_pass("copy propagation", code, propagate_copies);
    let code = run_pass("value numbering", code, |code| {
        global_value_numbering(code, config.gvn_mode)
    });
    let code = run_pass("loop invariant motion", code, hoist_loop_invariants);
    let code = run_pass("unswitching", code, |code| {
        unswitch_loops(code, config.unswitch_ceiling, pinned)
    });
    let code = simplify(code, pinned, rounds);
    let code = run_pass("copy on write", code, insert_copy_on_write);
    let code = run_pass("tail calls", code, mark_tail_calls);
    let code = run_pass("cleanup", code, |code| remove_dead_code(code, pinned));
    let code = run_pass("constant dedup", code, dedup_constants);

    if config.reuse_slots {
        run_pass("slot reuse", code, |code| reuse_slots(code, reserved, pinned))
    } else {
        code
    }
}

/// Optimizes the instructions of `unit`. Locals that no longer appear in the
/// code are dropped from its variable list.
pub fn optimize_unit(unit: &TacUnit, config: &OptimizerConfig) -> TacUnit {
    let instructions = optimize(
        &unit.instructions,
        &unit.pinned_labels(),
        &unit.reserved_names(),
        config,
    );

    let referenced: HashSet<String> = instructions
        .iter()
        .flat_map(|instr| instr.used().into_iter().chain(instr.dest()))
        .filter_map(Operand::as_variable)
        .map(|var| var.name.clone())
        .collect();

    let variables = unit
        .variables
        .iter()
        .filter(|var| !var.is_genuine_local() || referenced.contains(&var.name))
        .cloned()
        .collect();

    TacUnit {
        instructions,
        variables,
        ..unit.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Type};
    use pretty_assertions::assert_eq;

    #[test]
    fn disabled_optimizer_returns_input() {
        let code = vec![
            Tac::binary(Operand::temp(0, Type::INT32), Operand::int(5), BinaryOp::Add, Operand::int(3)),
            Tac::assign(Operand::local("x", Type::INT32), Operand::temp(0, Type::INT32)),
        ];

        let result = optimize(&code, &HashSet::new(), &HashSet::new(), &OptimizerConfig::disabled());

        assert_eq!(result, code);
    }

    #[test]
    fn unused_locals_leave_the_variable_list() {
        let x = crate::ir::Variable::local("x", Type::INT32);
        let field = crate::ir::Variable::field("speed", Type::INT32);
        let mut unit = TacUnit::new(vec![Tac::assign(Operand::var(field.clone()), Operand::int(1))]);
        unit.variables = vec![x, field.clone()];

        let result = optimize_unit(&unit, &OptimizerConfig::default());

        assert_eq!(result.variables, vec![field]);
    }
}
