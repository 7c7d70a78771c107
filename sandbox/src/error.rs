//! Sandbox error types.

use meterbridge_hostapi::HostError;

/// Top-level error type for the sandbox crate.
///
/// One variant per failure kind a run can end in; the bridge turns every
/// one of them into "no result" plus a diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Wasmtime engine or instantiation error.
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] anyhow::Error),

    /// Program bytes could not be parsed or compiled.
    #[error("malformed program: {0}")]
    InvalidProgram(String),

    /// Gas metering could not be injected into the program.
    #[error("gas instrumentation failed: {0}")]
    Instrumentation(String),

    /// The requested entry function is not exported.
    #[error("entry function not found: {0}")]
    EntryNotFound(String),

    /// The entry export cannot be called with no arguments and one result.
    #[error("entry function '{name}' has unsupported signature: {reason}")]
    EntrySignature { name: String, reason: String },

    /// A function import outside the host import table.
    #[error("import not found: {module}:{field}")]
    ImportNotFound { module: String, field: String },

    /// A known host import declared with the wrong type.
    #[error("import {module}:{field} has wrong signature: expected {expected_params} i32 params and 1 i32 result")]
    ImportSignature {
        module: String,
        field: String,
        expected_params: usize,
    },

    /// Imported globals are never supported.
    #[error("global import not supported: {module}:{field}")]
    GlobalImportUnsupported { module: String, field: String },

    /// A memory or table import the host does not provide.
    #[error("unsupported import: {module}:{field} ({kind})")]
    UnsupportedImport {
        module: String,
        field: String,
        kind: &'static str,
    },

    /// Gas limit string was not a base-10 unsigned integer.
    #[error("invalid gas limit '{0}'")]
    InvalidGasLimit(String),

    /// Caller supplied unusable input (empty program, empty entry name).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller's memory image does not fit the linear memory.
    #[error("memory image of {image_len} bytes exceeds linear memory of {memory_len} bytes")]
    MemoryImageTooLarge { image_len: usize, memory_len: usize },

    /// Host import received a region outside linear memory.
    #[error("bad pointer: [{ptr}, {ptr}+{len}) outside memory of {memory_len} bytes")]
    BadPointer { ptr: u32, len: u64, memory_len: usize },

    /// Memory operation failed (missing memory, grow failure).
    #[error("memory error: {0}")]
    MemoryError(String),

    /// Host callback failed during an import call.
    #[error("host error: {0}")]
    HostError(#[from] HostError),

    /// Gas budget exhausted.
    #[error("out of gas: limit={limit}, consumed={consumed}, requested={requested}")]
    OutOfGas {
        limit: u64,
        consumed: u64,
        requested: u64,
    },

    /// The run's cancellation token was triggered.
    #[error("execution cancelled")]
    Cancelled,

    /// WASM guest trapped.
    #[error("guest trapped: {0}")]
    GuestTrapped(String),

    /// The packaged result could not be serialized.
    #[error("result encoding failed: {0}")]
    ResultEncoding(#[from] serde_json::Error),
}

impl SandboxError {
    /// Returns true for out-of-gas failures.
    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, Self::OutOfGas { .. })
    }
}
