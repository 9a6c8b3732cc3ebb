pub mod codegen;
pub mod driver;
pub mod error;
pub mod ir;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use session::Session;
