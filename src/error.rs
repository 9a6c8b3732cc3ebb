use thiserror::Error;

/// Fatal failures while lowering one unit. None of them leave partial output
/// behind.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// An operator, cast or instruction shape with no lowering rule
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// No registered native signature for the member and argument types
    #[error("no native signature for {owner}.{member}({})", args.join(", "))]
    MissingSignature {
        owner: String,
        member: String,
        args: Vec<String>,
    },

    /// Instruction or operand that should never reach the generator
    #[error("malformed IR: {0}")]
    MalformedIr(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
