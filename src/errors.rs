use thiserror::Error;

/// Errors raised while executing bytecode or mutating the hashed
/// collections it depends on. None of these are recoverable; they
/// propagate out of the execution loop.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{class} does not understand #{selector}")]
    DoesNotUnderstand { class: String, selector: String },
    #[error("variable {0} not found")]
    VariableNotFound(String),
    #[error("#{selector}: method takes {expected} arguments, send supplied {found}")]
    ArityMismatch {
        selector: String,
        expected: usize,
        found: usize,
    },
    #[error("dictionary full")]
    DictionaryFull,
    #[error("unknown bytecode {0}")]
    UnknownBytecode(u8),
    #[error("unknown primitive id {0}")]
    UnknownPrimitive(usize),
    #[error("context stack underflow")]
    StackUnderflow,
}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Errors reported by the bootstrap compiler. A failure aborts the
/// module being compiled; the embedder may retry with fixed source.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown class {0}")]
    UnknownClass(String),
    #[error("{0}")]
    Syntax(String),
    #[error("expected {expected}, found {found}")]
    Expected {
        expected: &'static str,
        found: String,
    },
    #[error("assign to {0} not allowed")]
    AssignToReserved(String),
    #[error("integer literal too large: {0}")]
    IntegerTooLarge(String),
    #[error("class variable {0} not defined")]
    ClassVarNotDefined(String),
    #[error("primitive {0} not registered")]
    UnknownPrimitiveName(String),
    #[error("too many literals in one method")]
    TooManyLiterals,
    #[error("too many temporaries in one method")]
    TooManyTemporaries,
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Errors raised while rebuilding the environment from the class
/// schedule. These indicate an inconsistent schedule and are fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("missing class cache {0}")]
    MissingClassCache(String),
    #[error("cannot find primitive handler {0}")]
    MissingPrimitive(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type BootstrapResult<T> = std::result::Result<T, BootstrapError>;
