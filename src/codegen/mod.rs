mod bytecode;
mod externs;
mod heap;
mod report;
mod translator;

pub use bytecode::{Address, ByteCode, DataEntry, JumpTarget, Program, EXIT_ADDRESS};
pub use externs::{extern_symbol, ExternRegistry, ExternSignature};
pub use heap::{HeapLayout, RETURN_SLOT};
pub use report::{HeapUsageReport, SlotCategory, DEFAULT_HEAP_BUDGET};
pub use translator::{generate, CodeGenerator, CTOR_PREFIX};
