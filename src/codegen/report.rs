use super::bytecode::DataEntry;
use super::heap::{CONST_PREFIX, SCRATCH_PREFIX, TEMP_PREFIX};
use crate::ir::{flatten_type_name, TacUnit, RESERVED_PREFIX};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Heap slots the platform preallocates for one program.
pub const DEFAULT_HEAP_BUDGET: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SlotCategory {
    Variable,
    SharedLocal,
    Temporary,
    Constant,
    Extern,
    Scratch,
}

impl SlotCategory {
    pub fn of(entry: &DataEntry) -> Self {
        let name = entry.name.as_str();

        if name.starts_with("__extern_") {
            SlotCategory::Extern
        } else if name.starts_with(CONST_PREFIX) {
            SlotCategory::Constant
        } else if name.starts_with(TEMP_PREFIX) {
            SlotCategory::Temporary
        } else if name.starts_with(SCRATCH_PREFIX) {
            SlotCategory::Scratch
        } else if name.starts_with(&format!("{RESERVED_PREFIX}local_")) {
            SlotCategory::SharedLocal
        } else {
            SlotCategory::Variable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeapUsageReport {
    pub total: usize,
    pub budget: usize,
    pub by_category: BTreeMap<SlotCategory, usize>,
    /// Variables per owning class. Fields of an inlined class are named
    /// `<Class>__<field>`; everything else belongs to the entry class.
    pub by_class: BTreeMap<String, usize>,
}

impl HeapUsageReport {
    pub fn new(data: &[DataEntry], unit: &TacUnit, budget: usize) -> Self {
        let mut by_category = BTreeMap::new();
        let mut by_class = BTreeMap::new();
        let entry_class = unit.entry_class_name.clone().unwrap_or_else(|| "<unit>".to_string());
        let inline_prefixes: Vec<(String, String)> = unit
            .inline_class_names
            .iter()
            .map(|class| (format!("{}__", flatten_type_name(class)), class.clone()))
            .collect();

        for entry in data.iter() {
            let category = SlotCategory::of(entry);
            *by_category.entry(category).or_insert(0) += 1;

            if category != SlotCategory::Variable {
                continue;
            }

            let owner = inline_prefixes
                .iter()
                .find(|(prefix, _)| entry.name.starts_with(prefix.as_str()))
                .map(|(_, class)| class.clone())
                .unwrap_or_else(|| entry_class.clone());

            *by_class.entry(owner).or_insert(0) += 1;
        }

        Self {
            total: data.len(),
            budget,
            by_category,
            by_class,
        }
    }

    pub fn exceeds_budget(&self) -> bool {
        self.total > self.budget
    }

    pub fn get_count(&self, category: SlotCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

impl fmt::Display for HeapUsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap usage: {} / {} slots", self.total, self.budget)?;

        for (category, count) in self.by_category.iter() {
            writeln!(f, "  {category:?}: {count}")?;
        }

        for (class, count) in self.by_class.iter() {
            writeln!(f, "  variables of {class}: {count}")?;
        }

        if self.exceeds_budget() {
            write!(f, "  over budget by {}", self.total - self.budget)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DataEntry {
        DataEntry {
            name: name.to_string(),
            address: 0,
            storage_type: "SystemInt32".to_string(),
            literal: None,
            exported: false,
        }
    }

    #[test]
    fn slots_are_counted_by_category_and_class() {
        let mut unit = TacUnit::default();
        unit.entry_class_name = Some("Door".to_string());
        unit.inline_class_names = vec!["Game.Counter".to_string()];

        let data = vec![
            entry("isOpen"),
            entry("GameCounter__count"),
            entry("__tmp_0_SystemInt32"),
            entry("__const_0_SystemInt32"),
            entry("__extern_00ff"),
            entry("__local_SystemInt32_0"),
        ];
        let report = HeapUsageReport::new(&data, &unit, DEFAULT_HEAP_BUDGET);

        assert!(report.total == 6);
        assert!(report.get_count(SlotCategory::Variable) == 2);
        assert!(report.get_count(SlotCategory::SharedLocal) == 1);
        assert!(report.by_class.get("Door") == Some(&1));
        assert!(report.by_class.get("Game.Counter") == Some(&1));
        assert!(!report.exceeds_budget());
    }

    #[test]
    fn over_budget_is_reported() {
        let data = vec![entry("a"), entry("b"), entry("c")];
        let report = HeapUsageReport::new(&data, &TacUnit::default(), 2);

        assert!(report.exceeds_budget());
        assert!(report.to_string().ends_with("over budget by 1"));
    }
}
