mod block;
mod cfg;
mod cfg_builder;
mod op;
mod operand;
mod tac;
mod types;
mod unit;

pub mod analysis;
pub mod cfg_vizualizer;
pub mod func_printer;
pub mod optimizer;
pub mod ssa;

pub const ENTRY_BLOCK_ID: usize = 0;

pub use block::{BasicBlock, BlockId};
pub use cfg::Cfg;
pub use op::{BinaryOp, UnaryOp};
pub use operand::{
    ConstValue, LabelName, Operand, OperandKey, TempId, Variable, VersionId, RESERVED_PREFIX, THIS_NAME,
};
pub use tac::{is_mutating_method, PhiSource, Tac, MUTATING_METHODS};
pub use types::{flatten_type_name, NumericKind, Type};
pub use unit::{max_temp_id, next_temp_id, FunctionInfo, LabelGen, TacUnit};
