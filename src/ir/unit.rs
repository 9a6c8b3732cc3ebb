use super::operand::{LabelName, Operand, TempId, Variable};
use super::tac::Tac;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An internal routine reachable by label. Only tail calls can reach it since
/// the target has no call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub label: LabelName,
    #[serde(default)]
    pub params: Vec<Variable>,
    #[serde(default)]
    pub return_var: Option<String>,
}

/// One compiled unit as handed over by the lowering collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TacUnit {
    pub instructions: Vec<Tac>,
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    #[serde(default)]
    pub entry_points: Vec<LabelName>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub entry_class_name: Option<String>,
    #[serde(default)]
    pub inline_class_names: Vec<String>,
}

impl TacUnit {
    pub fn new(instructions: Vec<Tac>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    /// Labels that must survive even when no jump refers to them.
    pub fn pinned_labels(&self) -> HashSet<LabelName> {
        self.entry_points
            .iter()
            .cloned()
            .chain(self.functions.iter().map(|f| f.label.clone()))
            .collect()
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Names written by `Return` instructions and routine return slots.
    pub fn reserved_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self
            .functions
            .iter()
            .filter_map(|f| f.return_var.clone())
            .collect();

        for instr in self.instructions.iter() {
            if let Tac::Return {
                return_var: Some(name),
                ..
            } = instr
            {
                names.insert(name.clone());
            }
        }

        for func in self.functions.iter() {
            for param in func.params.iter() {
                names.insert(param.name.clone());
            }
        }

        names
    }
}

pub fn max_temp_id(instrs: &[Tac]) -> Option<TempId> {
    instrs
        .iter()
        .flat_map(|instr| instr.used().into_iter().chain(instr.dest()))
        .filter_map(Operand::temp_id)
        .max()
}

pub fn next_temp_id(instrs: &[Tac]) -> TempId {
    max_temp_id(instrs).map(|id| id + 1).unwrap_or(0)
}

/// Fresh label names derived from `base`, unique within the instruction list.
pub struct LabelGen {
    taken: HashSet<LabelName>,
    counter: usize,
}

impl LabelGen {
    pub fn new(instrs: &[Tac]) -> Self {
        let taken = instrs
            .iter()
            .filter_map(|instr| instr.label_name().or(instr.jump_target()))
            .map(str::to_string)
            .collect();

        Self { taken, counter: 0 }
    }

    pub fn fresh(&mut self, base: &str) -> LabelName {
        loop {
            let name = format!("{base}__{}", self.counter);
            self.counter += 1;

            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}
