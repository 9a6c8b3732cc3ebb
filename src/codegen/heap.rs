use super::bytecode::{Address, DataEntry};
use super::externs::extern_symbol;
use crate::ir::{ConstValue, TempId, Type, Variable};
use std::collections::HashMap;

pub const TEMP_PREFIX: &str = "__tmp_";
pub const CONST_PREFIX: &str = "__const_";
pub const SCRATCH_PREFIX: &str = "__scratch_";
pub const RETURN_SLOT: &str = "__returnValue";

/// Assigns heap addresses in order of first request and records the data
/// section as it grows.
#[derive(Debug, Default)]
pub struct HeapLayout {
    next_address: Address,
    variables: HashMap<String, Address>,
    temporaries: HashMap<(TempId, String), Address>,
    constants: HashMap<(String, String), Address>,
    externs: HashMap<String, (String, Address)>,
    scratch: HashMap<String, Address>,
    entries: Vec<DataEntry>,
}

impl HeapLayout {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_entry(&mut self, name: String, ty: String, literal: Option<String>, exported: bool) -> Address {
        let address = self.next_address;
        self.next_address += 1;

        self.entries.push(DataEntry {
            name,
            address,
            storage_type: ty,
            literal,
            exported,
        });

        address
    }

    pub fn variable(&mut self, var: &Variable) -> Address {
        if let Some(address) = self.variables.get(&var.name) {
            return *address;
        }

        let address = self.push_entry(var.name.clone(), var.ty.udon_name(), None, var.is_exported);
        self.variables.insert(var.name.clone(), address);
        address
    }

    /// Slot for a named value with no declared variable, like a return slot.
    pub fn named(&mut self, name: &str, ty: &Type) -> Address {
        if let Some(address) = self.variables.get(name) {
            return *address;
        }

        let address = self.push_entry(name.to_string(), ty.udon_name(), None, false);
        self.variables.insert(name.to_string(), address);
        address
    }

    pub fn temporary(&mut self, id: TempId, ty: &Type) -> Address {
        let key = (id, ty.udon_name());

        if let Some(address) = self.temporaries.get(&key) {
            return *address;
        }

        let name = format!("{TEMP_PREFIX}{id}_{}", key.1);
        let address = self.push_entry(name, key.1.clone(), None, false);
        self.temporaries.insert(key, address);
        address
    }

    /// One slot per distinct literal and storage type.
    pub fn constant(&mut self, value: &ConstValue, ty: &Type) -> Address {
        let key = (ty.udon_name(), value.literal_key());

        if let Some(address) = self.constants.get(&key) {
            return *address;
        }

        let name = format!("{CONST_PREFIX}{}_{}", self.constants.len(), key.0);
        let address = self.push_entry(name, key.0.clone(), Some(value.to_string()), false);
        self.constants.insert(key, address);
        address
    }

    /// Interns a native signature and returns its symbol.
    pub fn extern_symbol(&mut self, signature: &str) -> String {
        if let Some((symbol, _)) = self.externs.get(signature) {
            return symbol.clone();
        }

        let symbol = extern_symbol(signature);
        let address = self.push_entry(
            symbol.clone(),
            Type::String.udon_name(),
            Some(format!("{signature:?}")),
            false,
        );

        self.externs.insert(signature.to_string(), (symbol.clone(), address));
        symbol
    }

    /// A slot for intermediate values of type `ty` that never outlive one
    /// instruction's lowering.
    pub fn scratch(&mut self, ty: &Type) -> Address {
        let category = ty.udon_name();

        if let Some(address) = self.scratch.get(&category) {
            return *address;
        }

        let name = format!("{SCRATCH_PREFIX}{category}");
        let address = self.push_entry(name, category.clone(), None, false);
        self.scratch.insert(category, address);
        address
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_entries(&self) -> &[DataEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DataEntry> {
        self.entries
    }
}
