use super::super::analysis::{find_loops, DomTree, Loop};
use super::super::cfg::Cfg;
use super::super::operand::{LabelName, OperandKey};
use super::super::ssa::convert_from_ssa;
use super::super::tac::Tac;
use super::super::unit::LabelGen;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_UNSWITCH_CEILING: usize = 20;

const MAX_UNSWITCH_ROUNDS: usize = 16;

/// A loop occupying `start..=end` whose conditional jump at `branch` tests a
/// loop-invariant condition.
struct Candidate {
    start: usize,
    end: usize,
    branch: usize,
    labels: Vec<LabelName>,
}

fn find_candidate(
    code: &[Tac],
    cfg: &Cfg,
    l: &Loop,
    ceiling: usize,
    pinned: &HashSet<LabelName>,
) -> Option<Candidate> {
    if !l.is_eligible() || !l.is_contiguous(cfg) || l.instr_count(cfg) > ceiling {
        return None;
    }

    let start = cfg[l.header].start();
    let end = start + l.instr_count(cfg) - 1;
    let body = &code[start..=end];
    let header_label = code[start].label_name()?;

    if body
        .iter()
        .any(|instr| instr.is_call() || instr.is_phi() || instr.mutated_object().is_some())
    {
        return None;
    }

    let labels: Vec<LabelName> = body
        .iter()
        .filter_map(|instr| instr.label_name())
        .map(str::to_string)
        .collect();

    // the header must stay the only way in
    if labels.iter().any(|label| label != header_label && pinned.contains(label)) {
        return None;
    }

    let entered_elsewhere = code.iter().enumerate().any(|(i, instr)| {
        !(start..=end).contains(&i)
            && instr
                .jump_target()
                .map(|target| target != header_label && labels.iter().any(|l| l == target))
                .unwrap_or(false)
    });

    if entered_elsewhere {
        return None;
    }

    let defined: HashSet<OperandKey> = body.iter().filter_map(|instr| instr.dest()).map(|d| d.key()).collect();

    let branch = (start..=end).find(|i| match &code[*i] {
        Tac::CondJump { cond, label } => {
            (cond.is_constant() || !defined.contains(&cond.key())) && labels.contains(label)
        }
        _ => false,
    })?;

    Some(Candidate {
        start,
        end,
        branch,
        labels,
    })
}

fn relabel(instr: &Tac, names: &HashMap<LabelName, LabelName>) -> Tac {
    match instr {
        Tac::Label { label } => Tac::label(names.get(label).unwrap_or(label)),
        _ => match instr.jump_target().and_then(|target| names.get(target)) {
            Some(renamed) => instr.with_jump_target(renamed),
            None => instr.clone(),
        },
    }
}

/// Emits the test once in front of two relabelled copies of the loop, one
/// for each outcome of the invariant condition.
fn unswitch(code: &[Tac], candidate: Candidate) -> Vec<Tac> {
    let Candidate {
        start,
        end,
        branch,
        labels,
    } = candidate;
    let Tac::CondJump { cond, label: target } = &code[branch] else {
        return code.to_vec();
    };

    let mut gen = LabelGen::new(code);
    let true_names: HashMap<LabelName, LabelName> = labels.iter().map(|l| (l.clone(), gen.fresh(l))).collect();
    let false_names: HashMap<LabelName, LabelName> = labels.iter().map(|l| (l.clone(), gen.fresh(l))).collect();

    let header = &labels[0];
    let mut result: Vec<Tac> = code[..start].to_vec();

    result.push(Tac::label(header));
    result.push(Tac::cond_jump(cond.clone(), &false_names[header]));

    // the condition holds on this copy, so the branch is never taken
    for i in start..=end {
        if i != branch {
            result.push(relabel(&code[i], &true_names));
        }
    }

    let join = match result.last() {
        Some(last) if last.ends_flow() => None,
        _ => {
            let join = gen.fresh(header);
            result.push(Tac::jump(&join));
            Some(join)
        }
    };

    for i in start..=end {
        if i == branch {
            result.push(Tac::jump(&false_names[target]));
        } else {
            result.push(relabel(&code[i], &false_names));
        }
    }

    if let Some(join) = join {
        result.push(Tac::label(&join));
    }

    result.extend(code[end + 1..].iter().cloned());
    result
}

fn unswitch_once(code: &[Tac], ceiling: usize, pinned: &HashSet<LabelName>) -> Option<Vec<Tac>> {
    let cfg = Cfg::new(code);
    let dom_tree = DomTree::compute(&cfg);

    for l in find_loops(&cfg, &dom_tree).iter() {
        if let Some(candidate) = find_candidate(code, &cfg, l, ceiling, pinned) {
            log::debug!("unswitching the loop at block {} on instruction {}", l.header, candidate.branch);

            return Some(unswitch(code, candidate));
        }
    }

    None
}

/// Hoists loop-invariant conditional jumps out of small loops by duplicating
/// the loop body. Phis are lowered first since the copies cannot share them.
pub fn unswitch_loops(code: &[Tac], ceiling: usize, pinned: &HashSet<LabelName>) -> Vec<Tac> {
    let mut code = if code.iter().any(Tac::is_phi) {
        convert_from_ssa(code)
    } else {
        code.to_vec()
    };

    for _ in 0..MAX_UNSWITCH_ROUNDS {
        match unswitch_once(&code, ceiling, pinned) {
            Some(next) => code = next,
            None => break,
        }
    }

    code
}
