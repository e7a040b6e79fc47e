use thiserror::Error;

use crate::primitives::ExecReturnValue;

/// Errors raised while setting up an execution: configuration, module
/// preparation and instantiation. Nothing the guest does at runtime ends up here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("Invalid WASM module: {0}")]
    InvalidWasm(String),

    #[error("Compilation error: {0}")]
    CompilationError(String),

    #[error("Linker error: {0}")]
    LinkerError(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Unknown host function: {0}")]
    UnknownHostFunction(String),

    #[error("Code size exceeded: {size} > {limit}")]
    CodeSizeExceeded { size: usize, limit: usize },

    #[error("Memory limit exceeded: {pages} pages > {limit}")]
    MemoryLimitExceeded { pages: u64, limit: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Fatal conditions raised by host functions. Each one aborts the guest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("out of gas")]
    OutOfGas,

    #[error("access to sandbox memory out of bounds")]
    OutOfBounds,

    #[error("output buffer too small")]
    OutputBufferTooSmall,

    #[error("failed to decode arguments from sandbox memory")]
    DecodingFailed,

    #[error("value too large")]
    ValueTooLarge,

    #[error("event has too many topics")]
    TooManyTopics,

    #[error("invalid call flags")]
    InvalidCallFlags,

    #[error("input was already forwarded to a callee")]
    InputForwarded,

    #[error("reentrance denied")]
    ReentranceDenied,

    #[error("max call depth reached")]
    MaxCallDepthReached,

    #[error("contract cannot terminate while reentrant")]
    TerminatedWhileReentrant,

    #[error("debug message is not valid UTF-8")]
    DebugMessageInvalidUtf8,

    #[error("no chain extension is registered")]
    NoChainExtension,

    #[error("unsupported host operation: {0}")]
    Unsupported(&'static str),

    #[error("backing store error: {0}")]
    Storage(String),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("contract trapped: {0}")]
    ContractTrapped(String),

    #[error("execution cancelled")]
    Cancelled,
}

/// Why a host function stopped the guest.
///
/// Carried out of the engine inside a `wasmtime::Error` and downcast again
/// when the invocation finishes.
#[derive(Debug, Error)]
pub enum TrapReason {
    /// A fatal host error.
    #[error(transparent)]
    Halt(#[from] HostError),

    /// `seal_return` was called.
    #[error("contract returned")]
    Return(ExecReturnValue),

    /// `terminate` was called.
    #[error("contract terminated")]
    Termination,
}
