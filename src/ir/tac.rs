use super::block::BlockId;
use super::op::{BinaryOp, UnaryOp};
use super::operand::{LabelName, Operand};
use serde::{Deserialize, Serialize};

/// Methods that mutate their receiver in place when it is a container.
pub const MUTATING_METHODS: [&str; 14] = [
    "Add", "AddRange", "Clear", "Insert", "InsertRange", "Remove", "RemoveAt", "RemoveRange",
    "Reverse", "Sort", "SetValue", "SetValues", "Push", "Pop",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiSource {
    pub pred: BlockId,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tac {
    Assign {
        dest: Operand,
        src: Operand,
    },
    // same semantics as Assign, marks a rename introduced inside the IR
    Copy {
        dest: Operand,
        src: Operand,
    },
    Binary {
        dest: Operand,
        left: Operand,
        op: BinaryOp,
        right: Operand,
    },
    Unary {
        dest: Operand,
        op: UnaryOp,
        operand: Operand,
    },
    Cast {
        dest: Operand,
        src: Operand,
    },
    // jumps to `label` when `cond` is false
    CondJump {
        cond: Operand,
        label: LabelName,
    },
    Jump {
        label: LabelName,
    },
    Label {
        label: LabelName,
    },
    Call {
        dest: Option<Operand>,
        func: String,
        args: Vec<Operand>,
        #[serde(default)]
        tail_call: bool,
    },
    MethodCall {
        dest: Option<Operand>,
        object: Operand,
        method: String,
        args: Vec<Operand>,
        #[serde(default)]
        tail_call: bool,
    },
    PropertyGet {
        dest: Operand,
        object: Operand,
        property: String,
    },
    PropertySet {
        object: Operand,
        property: String,
        value: Operand,
    },
    ArrayAccess {
        dest: Operand,
        array: Operand,
        index: Operand,
    },
    ArrayAssign {
        array: Operand,
        index: Operand,
        value: Operand,
    },
    Return {
        value: Option<Operand>,
        return_var: Option<String>,
    },
    Phi {
        dest: Operand,
        sources: Vec<PhiSource>,
    },
}

impl Tac {
    pub fn label(label: &str) -> Self {
        Tac::Label {
            label: label.to_string(),
        }
    }

    pub fn jump(label: &str) -> Self {
        Tac::Jump {
            label: label.to_string(),
        }
    }

    pub fn cond_jump(cond: Operand, label: &str) -> Self {
        Tac::CondJump {
            cond,
            label: label.to_string(),
        }
    }

    pub fn assign(dest: Operand, src: Operand) -> Self {
        Tac::Assign { dest, src }
    }

    pub fn copy(dest: Operand, src: Operand) -> Self {
        Tac::Copy { dest, src }
    }

    pub fn binary(dest: Operand, left: Operand, op: BinaryOp, right: Operand) -> Self {
        Tac::Binary {
            dest,
            left,
            op,
            right,
        }
    }

    pub fn dest(&self) -> Option<&Operand> {
        match self {
            Tac::Assign { dest, .. }
            | Tac::Copy { dest, .. }
            | Tac::Binary { dest, .. }
            | Tac::Unary { dest, .. }
            | Tac::Cast { dest, .. }
            | Tac::PropertyGet { dest, .. }
            | Tac::ArrayAccess { dest, .. }
            | Tac::Phi { dest, .. } => Some(dest),
            Tac::Call { dest, .. } | Tac::MethodCall { dest, .. } => dest.as_ref(),
            Tac::CondJump { .. }
            | Tac::Jump { .. }
            | Tac::Label { .. }
            | Tac::PropertySet { .. }
            | Tac::ArrayAssign { .. }
            | Tac::Return { .. } => None,
        }
    }

    pub fn used(&self) -> Vec<&Operand> {
        match self {
            Tac::Assign { src, .. } | Tac::Copy { src, .. } | Tac::Cast { src, .. } => vec![src],
            Tac::Binary { left, right, .. } => vec![left, right],
            Tac::Unary { operand, .. } => vec![operand],
            Tac::CondJump { cond, .. } => vec![cond],
            Tac::Jump { .. } | Tac::Label { .. } => vec![],
            Tac::Call { args, .. } => args.iter().collect(),
            Tac::MethodCall { object, args, .. } => {
                let mut used = vec![object];
                used.extend(args.iter());
                used
            }
            Tac::PropertyGet { object, .. } => vec![object],
            Tac::PropertySet { object, value, .. } => vec![object, value],
            Tac::ArrayAccess { array, index, .. } => vec![array, index],
            Tac::ArrayAssign { array, index, value } => vec![array, index, value],
            Tac::Return { value, .. } => value.iter().collect(),
            Tac::Phi { sources, .. } => sources.iter().map(|s| &s.value).collect(),
        }
    }

    /// Rebuilds the instruction with every used operand passed through `f`.
    pub fn map_used(&self, mut f: impl FnMut(&Operand) -> Operand) -> Tac {
        match self {
            Tac::Assign { dest, src } => Tac::Assign {
                dest: dest.clone(),
                src: f(src),
            },
            Tac::Copy { dest, src } => Tac::Copy {
                dest: dest.clone(),
                src: f(src),
            },
            Tac::Binary {
                dest,
                left,
                op,
                right,
            } => Tac::Binary {
                dest: dest.clone(),
                left: f(left),
                op: *op,
                right: f(right),
            },
            Tac::Unary { dest, op, operand } => Tac::Unary {
                dest: dest.clone(),
                op: *op,
                operand: f(operand),
            },
            Tac::Cast { dest, src } => Tac::Cast {
                dest: dest.clone(),
                src: f(src),
            },
            Tac::CondJump { cond, label } => Tac::CondJump {
                cond: f(cond),
                label: label.clone(),
            },
            Tac::Jump { .. } | Tac::Label { .. } => self.clone(),
            Tac::Call {
                dest,
                func,
                args,
                tail_call,
            } => Tac::Call {
                dest: dest.clone(),
                func: func.clone(),
                args: args.iter().map(&mut f).collect(),
                tail_call: *tail_call,
            },
            Tac::MethodCall {
                dest,
                object,
                method,
                args,
                tail_call,
            } => {
                let object = f(object);

                Tac::MethodCall {
                    dest: dest.clone(),
                    object,
                    method: method.clone(),
                    args: args.iter().map(&mut f).collect(),
                    tail_call: *tail_call,
                }
            }
            Tac::PropertyGet {
                dest,
                object,
                property,
            } => Tac::PropertyGet {
                dest: dest.clone(),
                object: f(object),
                property: property.clone(),
            },
            Tac::PropertySet {
                object,
                property,
                value,
            } => {
                let object = f(object);

                Tac::PropertySet {
                    object,
                    property: property.clone(),
                    value: f(value),
                }
            }
            Tac::ArrayAccess { dest, array, index } => {
                let array = f(array);

                Tac::ArrayAccess {
                    dest: dest.clone(),
                    array,
                    index: f(index),
                }
            }
            Tac::ArrayAssign {
                array,
                index,
                value,
            } => {
                let array = f(array);
                let index = f(index);

                Tac::ArrayAssign {
                    array,
                    index,
                    value: f(value),
                }
            }
            Tac::Return { value, return_var } => Tac::Return {
                value: value.as_ref().map(&mut f),
                return_var: return_var.clone(),
            },
            Tac::Phi { dest, sources } => Tac::Phi {
                dest: dest.clone(),
                sources: sources
                    .iter()
                    .map(|s| PhiSource {
                        pred: s.pred,
                        value: f(&s.value),
                    })
                    .collect(),
            },
        }
    }

    /// Rebuilds the instruction with its defined operand replaced. Instructions
    /// without a destination are returned unchanged.
    pub fn with_dest(&self, new_dest: Operand) -> Tac {
        let mut instr = self.clone();

        match &mut instr {
            Tac::Assign { dest, .. }
            | Tac::Copy { dest, .. }
            | Tac::Binary { dest, .. }
            | Tac::Unary { dest, .. }
            | Tac::Cast { dest, .. }
            | Tac::PropertyGet { dest, .. }
            | Tac::ArrayAccess { dest, .. }
            | Tac::Phi { dest, .. } => *dest = new_dest,
            Tac::Call { dest, .. } | Tac::MethodCall { dest, .. } => {
                if dest.is_some() {
                    *dest = Some(new_dest);
                }
            }
            _ => {}
        }

        instr
    }

    pub fn map_dest(&self, f: impl FnOnce(&Operand) -> Operand) -> Tac {
        match self.dest() {
            Some(dest) => self.with_dest(f(dest)),
            None => self.clone(),
        }
    }

    /// Applies `f` to every operand, defined or used.
    pub fn map_operands(&self, mut f: impl FnMut(&Operand) -> Operand) -> Tac {
        self.map_used(&mut f).map_dest(&mut f)
    }

    pub fn jump_target(&self) -> Option<&str> {
        match self {
            Tac::Jump { label } | Tac::CondJump { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn with_jump_target(&self, target: &str) -> Tac {
        match self {
            Tac::Jump { .. } => Tac::jump(target),
            Tac::CondJump { cond, .. } => Tac::cond_jump(cond.clone(), target),
            other => other.clone(),
        }
    }

    pub fn label_name(&self) -> Option<&str> {
        match self {
            Tac::Label { label } => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Tac::Label { .. })
    }

    /// Ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Tac::Jump { .. } | Tac::CondJump { .. } | Tac::Return { .. })
    }

    /// Control never reaches the following instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(self, Tac::Jump { .. } | Tac::Return { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Tac::Phi { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Tac::Call { .. } | Tac::MethodCall { .. })
    }

    /// Assignment, copy, binary, unary or cast: produces a value from its
    /// operands alone.
    pub fn is_pure_producer(&self) -> bool {
        matches!(
            self,
            Tac::Assign { .. } | Tac::Copy { .. } | Tac::Binary { .. } | Tac::Unary { .. } | Tac::Cast { .. }
        )
    }

    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Tac::Call { .. }
                | Tac::MethodCall { .. }
                | Tac::PropertySet { .. }
                | Tac::ArrayAssign { .. }
                | Tac::Return { .. }
                | Tac::Jump { .. }
                | Tac::CondJump { .. }
                | Tac::Label { .. }
        )
    }

    /// The container mutated in place by this instruction, if any.
    pub fn mutated_object(&self) -> Option<&Operand> {
        match self {
            Tac::PropertySet { object, .. } => Some(object),
            Tac::ArrayAssign { array, .. } => Some(array),
            Tac::MethodCall { object, method, .. } => {
                let container = object.ty().map(|ty| ty.is_mutable_container()).unwrap_or(false);

                if container && is_mutating_method(method) {
                    Some(object)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_tail_call(&self) -> bool {
        matches!(
            self,
            Tac::Call { tail_call: true, .. } | Tac::MethodCall { tail_call: true, .. }
        )
    }
}

pub fn is_mutating_method(method: &str) -> bool {
    MUTATING_METHODS.contains(&method)
}
