use crate::ir::LabelName;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub type Address = u32;

/// Jumping here ends the running event.
pub const EXIT_ADDRESS: Address = 0xFFFF_FFFC;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JumpTarget {
    Label(LabelName),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ByteCode {
    Push(Address),
    /// Pops destination then source and copies the heap value.
    Copy,
    /// Invokes the native whose signature string lives at the symbol's slot.
    Extern(String),
    Jump(JumpTarget),
    /// Pops a boolean and jumps when it is false.
    JumpIfFalse(LabelName),
    Label(LabelName),
}

impl ByteCode {
    /// Encoded size in bytes. Labels take no space.
    pub fn size(&self) -> u32 {
        match self {
            ByteCode::Copy => 4,
            ByteCode::Label(_) => 0,
            ByteCode::Push(_) | ByteCode::Extern(_) | ByteCode::Jump(_) | ByteCode::JumpIfFalse(_) => 8,
        }
    }

    pub fn jump_to(label: &str) -> Self {
        ByteCode::Jump(JumpTarget::Label(label.to_string()))
    }

    pub fn exit() -> Self {
        ByteCode::Jump(JumpTarget::Address(EXIT_ADDRESS))
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteCode::Push(address) => write!(f, "PUSH, 0x{address:08X}"),
            ByteCode::Copy => write!(f, "COPY"),
            ByteCode::Extern(symbol) => write!(f, "EXTERN, {symbol}"),
            ByteCode::Jump(JumpTarget::Label(label)) => write!(f, "JUMP, {label}"),
            ByteCode::Jump(JumpTarget::Address(address)) => write!(f, "JUMP, 0x{address:08X}"),
            ByteCode::JumpIfFalse(label) => write!(f, "JUMP_IF_FALSE, {label}"),
            ByteCode::Label(label) => write!(f, "{label}:"),
        }
    }
}

/// One preallocated heap slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataEntry {
    pub name: String,
    pub address: Address,
    pub storage_type: String,
    pub literal: Option<String>,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub code: Vec<ByteCode>,
    pub data: Vec<DataEntry>,
    /// Labels the platform may enter from outside.
    pub exports: Vec<LabelName>,
}

impl Program {
    /// Byte offset of every label in the code section.
    pub fn label_addresses(&self) -> HashMap<LabelName, Address> {
        let mut offset = 0;
        let mut addresses = HashMap::new();

        for instr in self.code.iter() {
            if let ByteCode::Label(label) = instr {
                addresses.insert(label.clone(), offset);
            }

            offset += instr.size();
        }

        addresses
    }

    /// Every jump names a label defined somewhere in the code section.
    pub fn unresolved_labels(&self) -> Vec<LabelName> {
        let addresses = self.label_addresses();
        let mut missing: Vec<LabelName> = self
            .code
            .iter()
            .filter_map(|instr| match instr {
                ByteCode::Jump(JumpTarget::Label(label)) | ByteCode::JumpIfFalse(label) => Some(label),
                _ => None,
            })
            .filter(|label| !addresses.contains_key(*label))
            .cloned()
            .collect();

        missing.sort();
        missing.dedup();
        missing
    }

    pub fn code_size(&self) -> u32 {
        self.code.iter().map(ByteCode::size).sum()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".data_start")?;

        for entry in self.data.iter() {
            if entry.exported {
                writeln!(f, "    .export {}", entry.name)?;
            }
        }

        for entry in self.data.iter() {
            let literal = entry.literal.as_deref().unwrap_or("null");
            writeln!(f, "    {}: %{}, {}", entry.name, entry.storage_type, literal)?;
        }

        writeln!(f, ".data_end")?;
        writeln!(f, ".code_start")?;

        for label in self.exports.iter() {
            writeln!(f, "    .export {label}")?;
        }

        for instr in self.code.iter() {
            match instr {
                ByteCode::Label(_) => writeln!(f, "    {instr}")?,
                _ => writeln!(f, "        {instr}")?,
            }
        }

        write!(f, ".code_end")
    }
}
